//! The page resources are materialized into.

pub mod document;
pub mod inject;

use std::collections::BTreeMap;
use std::fmt::Write as _;

pub use document::Document;
pub use inject::{InjectState, Injection, Injector, Source};

/// Fired once when a remotely sourced element finishes loading.
pub type LoadCallback = Box<dyn FnOnce() + Send>;

/// DOM operations the injector needs.
pub trait Page: Send {
    fn append_head(&mut self, element: Element);

    fn append_body(&mut self, element: Element);

    fn element_mut(&mut self, id: &str) -> Option<&mut Element>;

    /// Bind `callback` to the load event of the element with `id`.
    fn on_load(&mut self, id: &str, callback: LoadCallback);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub id: Option<String>,
    pub attributes: BTreeMap<String, String>,
    pub content: Option<String>,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            id: None,
            attributes: BTreeMap::new(),
            content: None,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_content(mut self, content: &str) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn set_attr(&mut self, name: &str, value: &str) {
        self.attributes.insert(name.to_string(), value.to_string());
    }

    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    fn is_void(&self) -> bool {
        matches!(self.tag.as_str(), "link" | "img" | "meta")
    }

    pub fn render(&self) -> String {
        let mut out = format!("<{}", self.tag);
        if let Some(id) = &self.id {
            let _ = write!(out, " id=\"{}\"", escape_attr(id));
        }
        for (name, value) in &self.attributes {
            let _ = write!(out, " {name}=\"{}\"", escape_attr(value));
        }
        out.push('>');
        if self.is_void() {
            return out;
        }
        if let Some(content) = &self.content {
            out.push_str(content);
        }
        let _ = write!(out, "</{}>", self.tag);
        out
    }
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}
