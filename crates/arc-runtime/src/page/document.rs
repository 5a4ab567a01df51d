//! In-memory page used by the CLI and the tests.

use std::collections::HashMap;
use std::fmt;

use super::{Element, LoadCallback, Page};

#[derive(Default)]
pub struct Document {
    title: Option<String>,
    head: Vec<Element>,
    body: Vec<Element>,
    pending: HashMap<String, Vec<LoadCallback>>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("head", &self.head.len())
            .field("body", &self.body.len())
            .field("pending", &self.pending_loads())
            .finish()
    }
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// Add an empty `img` that an image resource with `id` will fill in.
    pub fn with_image_placeholder(mut self, id: &str) -> Self {
        self.body.push(Element::new("img").with_id(id));
        self
    }

    pub fn head(&self) -> &[Element] {
        &self.head
    }

    pub fn body(&self) -> &[Element] {
        &self.body
    }

    pub fn find(&self, id: &str) -> Option<&Element> {
        self.head
            .iter()
            .chain(self.body.iter())
            .find(|e| e.id.as_deref() == Some(id))
    }

    /// Ids of elements still waiting for their load event, sorted.
    pub fn pending_loads(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.pending.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Fire the load event of `id`. Returns the number of callbacks run.
    pub fn complete_load(&mut self, id: &str) -> usize {
        let callbacks = self.pending.remove(id).unwrap_or_default();
        let count = callbacks.len();
        for callback in callbacks {
            callback();
        }
        count
    }

    pub fn render_html(&self) -> String {
        let mut html = String::from("<!DOCTYPE html>\n<html>\n<head>\n");
        if let Some(title) = &self.title {
            html.push_str(&format!("<title>{title}</title>\n"));
        }
        for element in &self.head {
            html.push_str(&element.render());
            html.push('\n');
        }
        html.push_str("</head>\n<body>\n");
        for element in &self.body {
            html.push_str(&element.render());
            html.push('\n');
        }
        html.push_str("</body>\n</html>\n");
        html
    }
}

impl Page for Document {
    fn append_head(&mut self, element: Element) {
        self.head.push(element);
    }

    fn append_body(&mut self, element: Element) {
        self.body.push(element);
    }

    fn element_mut(&mut self, id: &str) -> Option<&mut Element> {
        self.head
            .iter_mut()
            .chain(self.body.iter_mut())
            .find(|e| e.id.as_deref() == Some(id))
    }

    fn on_load(&mut self, id: &str, callback: LoadCallback) {
        self.pending.entry(id.to_string()).or_default().push(callback);
    }
}
