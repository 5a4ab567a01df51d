//! Models and the registry that routes pipes to them by name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arc_core::Pipe;

/// Transforms a pipe on its way out (pre) or back in (post).
pub type Hook = Arc<dyn Fn(Pipe) -> Pipe + Send + Sync>;

/// A named model with optional pre- and post-hooks.
#[derive(Clone)]
pub struct Model {
    name: String,
    pre: Option<Hook>,
    post: Option<Hook>,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("pre", &self.pre.is_some())
            .field("post", &self.post.is_some())
            .finish()
    }
}

impl Model {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            pre: None,
            post: None,
        }
    }

    /// Runs before sending. The pipe only leaves if this sets `state = true`.
    pub fn pre<F>(mut self, hook: F) -> Self
    where
        F: Fn(Pipe) -> Pipe + Send + Sync + 'static,
    {
        self.pre = Some(Arc::new(hook));
        self
    }

    /// Runs on the pipe returned by the server.
    pub fn post<F>(mut self, hook: F) -> Self
    where
        F: Fn(Pipe) -> Pipe + Send + Sync + 'static,
    {
        self.post = Some(Arc::new(hook));
        self
    }

    /// Sends every pipe unchanged and accepts whatever comes back.
    pub fn passthrough(name: &str) -> Self {
        Self::new(name)
            .pre(|mut pipe| {
                pipe.state = true;
                pipe
            })
            .post(|pipe| pipe)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pre_hook(&self) -> Option<Hook> {
        self.pre.clone()
    }

    pub fn post_hook(&self) -> Option<Hook> {
        self.post.clone()
    }
}

#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: HashMap<String, Model>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model, replacing any model with the same name.
    pub fn register(&mut self, model: Model) -> Option<Model> {
        self.models.insert(model.name.clone(), model)
    }

    pub fn get(&self, name: &str) -> Option<&Model> {
        self.models.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Model> {
        self.models.remove(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.models.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
