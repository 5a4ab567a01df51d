//! Materializes resolved resources into a [`Page`].
//!
//! Each resource moves `pending -> injected -> announced`. Inline content is
//! announced as soon as its element is attached; a remote source is announced
//! from the element's load event. Announcing runs the done hook and triggers
//! the bus event named by the cache key.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use arc_core::bundle::{parse_bundle, select};
use arc_core::{ContentType, Token};

use super::{Element, Page};
use crate::context::Context;
use crate::types::{RuntimeError, RuntimeResult};

/// Called with the cache key of every announced resource.
pub type DoneHook = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, Copy)]
pub enum Source<'a> {
    /// Content already in hand (fetched or cached).
    Inline(&'a str),
    /// URL the page loads by itself.
    Remote(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectState {
    Pending,
    Injected,
    Announced,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Injection {
    pub cache_key: String,
    pub content_type: ContentType,
    pub state: InjectState,
}

#[derive(Clone)]
pub struct Injector {
    context: Arc<Context>,
    on_done: Option<DoneHook>,
}

impl Injector {
    pub fn new(context: Arc<Context>) -> Self {
        Self {
            context,
            on_done: None,
        }
    }

    pub fn with_on_done(mut self, hook: Option<DoneHook>) -> Self {
        self.on_done = hook;
        self
    }

    /// Inject one resource. Text resources expand into one injection per
    /// materialized bundle entry and are not injected themselves.
    pub fn inject(
        &self,
        page: &mut dyn Page,
        token: &Token,
        source: Source<'_>,
    ) -> RuntimeResult<Vec<Injection>> {
        if token.content_type == ContentType::Text {
            return self.expand(page, token, source);
        }
        let state = match source {
            Source::Inline(content) => self.inject_inline(page, token, content)?,
            Source::Remote(url) => self.inject_remote(page, token, url)?,
        };
        Ok(vec![Injection {
            cache_key: token.cache_key.clone(),
            content_type: token.content_type,
            state,
        }])
    }

    fn expand(
        &self,
        page: &mut dyn Page,
        token: &Token,
        source: Source<'_>,
    ) -> RuntimeResult<Vec<Injection>> {
        let Source::Inline(text) = source else {
            return Err(RuntimeError::Unsupported(format!(
                "text bundle {} needs inline content",
                token.raw_source
            )));
        };

        let variant = self.context.registry().variant();
        let entries = parse_bundle(text);
        let mut injections = Vec::new();
        for entry in select(&entries, variant.as_deref()) {
            let sub = match entry.token(&token.raw_source) {
                Ok(sub) => sub,
                Err(e) => {
                    tracing::warn!("Skipping bundle entry {}: {e}", entry.cache_key());
                    continue;
                }
            };
            match self.inject(page, &sub, Source::Inline(&entry.body)) {
                Ok(done) => injections.extend(done),
                Err(e) => tracing::warn!("Failed to inject {}: {e}", sub.cache_key),
            }
        }
        tracing::debug!(
            "Expanded {} into {} of {} entries",
            token.raw_source,
            injections.len(),
            entries.len()
        );
        Ok(injections)
    }

    fn inject_inline(
        &self,
        page: &mut dyn Page,
        token: &Token,
        content: &str,
    ) -> RuntimeResult<InjectState> {
        let key = token.cache_key.as_str();
        match token.content_type {
            ContentType::Html => {
                page.append_body(Element::new("div").with_id(key).with_content(content))
            }
            ContentType::Script => {
                page.append_head(Element::new("script").with_id(key).with_content(content))
            }
            ContentType::Style => {
                page.append_head(Element::new("style").with_id(key).with_content(content))
            }
            ContentType::Icon => page.append_head(
                Element::new("link")
                    .with_id(key)
                    .attr("rel", "icon")
                    .attr("href", &data_uri(token.content_type, content)),
            ),
            ContentType::Image => {
                let img = page
                    .element_mut(key)
                    .ok_or_else(|| RuntimeError::MissingElement(key.to_string()))?;
                img.set_attr("src", &data_uri(token.content_type, content));
            }
            ContentType::Text => {
                return Err(RuntimeError::Unsupported(format!(
                    "text resource {key} cannot be attached directly"
                )))
            }
        }
        announce(&self.context, self.on_done.as_ref(), key);
        Ok(InjectState::Announced)
    }

    fn inject_remote(
        &self,
        page: &mut dyn Page,
        token: &Token,
        url: &str,
    ) -> RuntimeResult<InjectState> {
        let key = token.cache_key.as_str();
        match token.content_type {
            ContentType::Html => {
                page.append_body(Element::new("div").with_id(key).attr("data-src", url))
            }
            ContentType::Script => page.append_head(
                Element::new("script")
                    .with_id(key)
                    .attr("async", "")
                    .attr("src", url),
            ),
            ContentType::Style => page.append_head(
                Element::new("link")
                    .with_id(key)
                    .attr("rel", "stylesheet")
                    .attr("type", "text/css")
                    .attr("href", url),
            ),
            ContentType::Icon => page.append_head(
                Element::new("link")
                    .with_id(key)
                    .attr("rel", "icon")
                    .attr("href", url),
            ),
            ContentType::Image => {
                let img = page
                    .element_mut(key)
                    .ok_or_else(|| RuntimeError::MissingElement(key.to_string()))?;
                img.set_attr("src", url);
            }
            ContentType::Text => {
                return Err(RuntimeError::Unsupported(format!(
                    "text resource {key} cannot be attached directly"
                )))
            }
        }

        let context = Arc::clone(&self.context);
        let on_done = self.on_done.clone();
        let owned = key.to_string();
        page.on_load(
            key,
            Box::new(move || announce(&context, on_done.as_ref(), &owned)),
        );
        Ok(InjectState::Injected)
    }
}

fn announce(context: &Context, on_done: Option<&DoneHook>, cache_key: &str) {
    if let Some(hook) = on_done {
        hook(cache_key);
    }
    context.events().trigger(cache_key);
}

/// Inline icons and images go into `href`/`src`; wrap raw bytes as a data URI.
fn data_uri(content_type: ContentType, content: &str) -> String {
    if content.starts_with("data:") {
        return content.to_string();
    }
    format!(
        "data:{};base64,{}",
        content_type.mime(),
        STANDARD.encode(content.as_bytes())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ArcEvent;
    use crate::page::Document;
    use arc_core::Parsed;
    use std::sync::Mutex;

    fn token(path: &str) -> Token {
        match Token::parse(path).unwrap() {
            Parsed::Local(token) => token,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_inline_targets() {
        let ctx = Arc::new(Context::in_memory());
        let injector = Injector::new(Arc::clone(&ctx));
        let mut doc = Document::new();

        for (path, content) in [
            ("/v/page.htm", "<p>x</p>"),
            ("/js/app.js", "run()"),
            ("/css/site.css", "a{}"),
        ] {
            let done = injector
                .inject(&mut doc, &token(path), Source::Inline(content))
                .unwrap();
            assert_eq!(done[0].state, InjectState::Announced);
        }

        assert_eq!(doc.body()[0].tag, "div");
        assert_eq!(doc.head()[0].tag, "script");
        assert_eq!(doc.head()[1].tag, "style");
        assert_eq!(doc.find("file_site_css").unwrap().content.as_deref(), Some("a{}"));
    }

    #[test]
    fn test_remote_announced_on_load() {
        let ctx = Arc::new(Context::in_memory());
        let mut rx = ctx.events().subscribe();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let hook: DoneHook = Arc::new(move |key: &str| sink.lock().unwrap().push(key.to_string()));
        let injector = Injector::new(Arc::clone(&ctx)).with_on_done(Some(hook));
        let mut doc = Document::new();

        let done = injector
            .inject(&mut doc, &token("/css/site.css"), Source::Remote("http://h/css/site.css"))
            .unwrap();
        assert_eq!(done[0].state, InjectState::Injected);
        assert_eq!(doc.head()[0].get_attr("rel"), Some("stylesheet"));
        assert!(seen.lock().unwrap().is_empty());
        assert!(rx.try_recv().is_err());

        doc.complete_load("file_site_css");
        assert_eq!(*seen.lock().unwrap(), vec!["file_site_css"]);
        assert_eq!(
            rx.try_recv().unwrap(),
            ArcEvent::Triggered {
                name: "file_site_css".into()
            }
        );
    }

    #[test]
    fn test_image_needs_placeholder() {
        let ctx = Arc::new(Context::in_memory());
        let injector = Injector::new(ctx);
        let mut doc = Document::new();
        let img = token("/img/logo.png");

        assert!(matches!(
            injector.inject(&mut doc, &img, Source::Inline("data:image/png;base64,AA==")),
            Err(RuntimeError::MissingElement(_))
        ));

        let mut doc = Document::new().with_image_placeholder("file_logo_png");
        injector
            .inject(&mut doc, &img, Source::Inline("data:image/png;base64,AA=="))
            .unwrap();
        assert_eq!(
            doc.find("file_logo_png").unwrap().get_attr("src"),
            Some("data:image/png;base64,AA==")
        );
    }

    #[test]
    fn test_icon_content_becomes_data_uri() {
        let ctx = Arc::new(Context::in_memory());
        let injector = Injector::new(ctx);
        let mut doc = Document::new();
        injector
            .inject(&mut doc, &token("/favicon/site.ico"), Source::Inline("ab"))
            .unwrap();
        assert_eq!(
            doc.head()[0].get_attr("href"),
            Some("data:image/x-icon;base64,YWI=")
        );
    }

    #[test]
    fn test_text_bundle_variants() {
        let blob = "<!--<|intro_htm|>--><p>hi</p><!--<|{ff}fix_css|>-->a{}";
        let ctx = Arc::new(Context::in_memory());
        let injector = Injector::new(Arc::clone(&ctx));
        let bundle = token("/static/all.txt");

        ctx.registry().set("variant", serde_json::json!("ch"));
        let mut doc = Document::new();
        let done = injector.inject(&mut doc, &bundle, Source::Inline(blob)).unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].cache_key, "file_intro_htm");

        ctx.registry().set("variant", serde_json::json!("ff"));
        let mut doc = Document::new();
        let done = injector.inject(&mut doc, &bundle, Source::Inline(blob)).unwrap();
        assert_eq!(done.len(), 2);
        assert!(doc.find("file_{ff}fix_css").is_some());
    }

    #[test]
    fn test_bundle_entry_with_unknown_extension_is_skipped() {
        let ctx = Arc::new(Context::in_memory());
        let injector = Injector::new(ctx);
        let mut doc = Document::new();
        let done = injector
            .inject(
                &mut doc,
                &token("/static/all.txt"),
                Source::Inline("<!--<|a_exe|>-->x<!--<|b_js|>-->y()"),
            )
            .unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].cache_key, "file_b_js");
    }
}
