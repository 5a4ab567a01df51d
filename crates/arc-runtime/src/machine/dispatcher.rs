//! Pipe dispatcher: pre-hook, send, demultiplex the frame, post-hook.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use serde_json::{Map, Value};
use uuid::Uuid;

use arc_core::{parse_frame, FormData, Pipe, PipeTemplate};

use super::registry::{Model, ModelRegistry};
use crate::config::{MachineConfig, PATH_AJAX_KEY, PATH_KEY};
use crate::context::{ArcEvent, Context};
use crate::transport::{send_with_timeout, Request, Transport};
use crate::types::{RuntimeError, RuntimeResult};

/// How an invocation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// No pre-hook for the model; nothing was sent.
    NoPreHook { model: String },
    /// The pre-hook left `state` unset; nothing was sent.
    Held { pipe: Pipe },
    /// The request failed. No post-hook ran.
    Dropped { invocation: Uuid, reason: String },
    /// The response named a model without a post-hook.
    NoPostHook {
        invocation: Uuid,
        pipe: Pipe,
        debug: Option<String>,
    },
    Completed {
        invocation: Uuid,
        pipe: Pipe,
        debug: Option<String>,
    },
}

impl Dispatch {
    pub fn was_sent(&self) -> bool {
        matches!(
            self,
            Dispatch::Dropped { .. } | Dispatch::NoPostHook { .. } | Dispatch::Completed { .. }
        )
    }

    pub fn pipe(&self) -> Option<&Pipe> {
        match self {
            Dispatch::Held { pipe }
            | Dispatch::NoPostHook { pipe, .. }
            | Dispatch::Completed { pipe, .. } => Some(pipe),
            Dispatch::NoPreHook { .. } | Dispatch::Dropped { .. } => None,
        }
    }
}

pub struct Machine {
    context: Arc<Context>,
    transport: Arc<dyn Transport>,
    config: MachineConfig,
    template: RwLock<PipeTemplate>,
    models: RwLock<ModelRegistry>,
}

impl Machine {
    pub fn new(context: Arc<Context>, transport: Arc<dyn Transport>, config: MachineConfig) -> Self {
        Self {
            context,
            transport,
            config,
            template: RwLock::new(PipeTemplate::default()),
            models: RwLock::new(ModelRegistry::new()),
        }
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Replace the template every pipe is built from.
    pub fn define_pipe(&self, template: PipeTemplate) {
        *self.template.write().unwrap_or_else(PoisonError::into_inner) = template;
    }

    pub fn make_pipe(&self, fields: &Map<String, Value>) -> RuntimeResult<Pipe> {
        let template = self.template.read().unwrap_or_else(PoisonError::into_inner);
        Ok(template.make_pipe(fields)?)
    }

    pub fn register(&self, model: Model) {
        tracing::debug!("Registered model '{}'", model.name());
        self.models
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register(model);
    }

    pub fn model_names(&self) -> Vec<String> {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    fn model(&self, name: &str) -> Option<Model> {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub async fn invoke(&self, fields: Map<String, Value>) -> RuntimeResult<Dispatch> {
        self.run(fields, None).await
    }

    /// Invoke with an upload. The pipe travels as the `pipe` form field.
    pub async fn invoke_with_form(
        &self,
        fields: Map<String, Value>,
        form: FormData,
    ) -> RuntimeResult<Dispatch> {
        self.run(fields, Some(form)).await
    }

    async fn run(
        &self,
        fields: Map<String, Value>,
        form: Option<FormData>,
    ) -> RuntimeResult<Dispatch> {
        let mut pipe = self.make_pipe(&fields)?;
        if form.is_some() {
            pipe.form_data = form;
        }

        let Some(pre) = self.model(&pipe.model).and_then(|m| m.pre_hook()) else {
            tracing::debug!("No pre-hook for '{}'", pipe.model);
            return Ok(Dispatch::NoPreHook { model: pipe.model });
        };

        let started = Instant::now();
        let pipe = pre(pipe);
        let pre_ms = started.elapsed().as_millis() as u64;
        self.context.results().publish_pre(&pipe);

        if !pipe.state {
            tracing::debug!("Pre-hook for '{}' held the pipe", pipe.model);
            return Ok(Dispatch::Held { pipe });
        }

        let invocation = Uuid::new_v4();
        let request = self.encode(pipe)?;
        let sent = Instant::now();
        let body = match send_with_timeout(&*self.transport, request, self.config.timeout).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("Invocation {invocation} dropped: {e}");
                return Ok(Dispatch::Dropped {
                    invocation,
                    reason: e.to_string(),
                });
            }
        };

        let transit_ms = sent.elapsed().as_millis() as u64;

        let frame = parse_frame(&body)?;
        let debug = frame.debug.map(str::to_string);
        if let Some(segment) = &debug {
            tracing::info!(target: "arc::debug", "|D| {segment}");
        }
        let returned = Pipe::from_json(frame.data)?;

        let Some(post) = self.model(&returned.model).and_then(|m| m.post_hook()) else {
            tracing::debug!("No post-hook for '{}'", returned.model);
            return Ok(Dispatch::NoPostHook {
                invocation,
                pipe: returned,
                debug,
            });
        };

        let post_started = Instant::now();
        let mut finished = post(returned);
        finished.time.pre = Some(pre_ms);
        finished.time.transit = Some(transit_ms);
        finished.time.post = Some(post_started.elapsed().as_millis() as u64);

        self.context.results().publish(invocation, &finished);
        self.context.events().emit(ArcEvent::PipeCompleted {
            model: finished.model.clone(),
            invocation: invocation.to_string(),
        });

        Ok(Dispatch::Completed {
            invocation,
            pipe: finished,
            debug,
        })
    }

    fn endpoint(&self) -> RuntimeResult<String> {
        if let Some(endpoint) = &self.config.endpoint {
            return Ok(endpoint.clone());
        }
        let registry = self.context.registry();
        match (registry.get_str(PATH_KEY), registry.get_str(PATH_AJAX_KEY)) {
            (Some(path), Some(ajax)) => Ok(format!("{path}{ajax}")),
            _ => Err(RuntimeError::Config(
                "No dispatch endpoint configured".to_string(),
            )),
        }
    }

    /// Multipart when the pipe carries an upload, form-urlencoded otherwise.
    fn encode(&self, mut pipe: Pipe) -> RuntimeResult<Request> {
        let url = self.endpoint()?;
        match pipe.form_data.take() {
            Some(mut form) => {
                form.append_text("pipe", pipe.to_json()?);
                Ok(Request::Multipart { url, form })
            }
            None => {
                let json = pipe.to_json()?;
                let encoded: String = url::form_urlencoded::byte_serialize(json.as_bytes()).collect();
                Ok(Request::Post {
                    url,
                    body: format!("pipe={encoded}"),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Unreachable;

    #[async_trait::async_trait]
    impl Transport for Unreachable {
        async fn send(&self, request: Request) -> RuntimeResult<String> {
            Err(RuntimeError::Transport(format!("unreachable {}", request.url())))
        }
    }

    fn machine(config: MachineConfig) -> Machine {
        let machine = Machine::new(Arc::new(Context::in_memory()), Arc::new(Unreachable), config);
        machine.define_pipe(PipeTemplate::from_value(json!({"model": "none", "page": 1})).unwrap());
        machine
    }

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_encode_post_body() {
        let m = machine(MachineConfig {
            endpoint: Some("http://h/api".into()),
            timeout: None,
        });
        let mut pipe = Pipe::new("a b");
        pipe.state = true;
        match m.encode(pipe).unwrap() {
            Request::Post { url, body } => {
                assert_eq!(url, "http://h/api");
                assert!(body.starts_with("pipe=%7B%22model%22%3A%22a+b%22"));
            }
            other => panic!("expected post, got {other:?}"),
        }
    }

    #[test]
    fn test_encode_multipart_strips_form() {
        let m = machine(MachineConfig {
            endpoint: Some("http://h/api".into()),
            timeout: None,
        });
        let mut pipe = Pipe::new("upload");
        pipe.form_data = Some(FormData::new().file("f", "f.bin", None, vec![1]));
        match m.encode(pipe).unwrap() {
            Request::Multipart { form, .. } => {
                let json = form.text_value("pipe").unwrap();
                assert!(!json.contains("form_data"));
                assert_eq!(form.parts().len(), 2);
            }
            other => panic!("expected multipart, got {other:?}"),
        }
    }

    #[test]
    fn test_endpoint_from_registry() {
        let m = machine(MachineConfig::default());
        assert!(matches!(m.endpoint(), Err(RuntimeError::Config(_))));
        m.context().registry().set(PATH_KEY, json!("http://h"));
        m.context().registry().set(PATH_AJAX_KEY, json!("/ajax.php"));
        assert_eq!(m.endpoint().unwrap(), "http://h/ajax.php");
    }

    #[tokio::test]
    async fn test_transport_failure_drops_invocation() {
        let m = machine(MachineConfig {
            endpoint: Some("http://h/api".into()),
            timeout: None,
        });
        m.register(Model::new("go").pre(|mut p| {
            p.state = true;
            p
        }));
        let dispatch = m.invoke(fields(json!({"model": "go"}))).await.unwrap();
        assert!(matches!(dispatch, Dispatch::Dropped { .. }));
        assert!(dispatch.was_sent());
        assert_eq!(m.context().results().last_pre().unwrap().model, "go");
        assert!(m.context().results().latest().is_none());
    }

    #[tokio::test]
    async fn test_missing_model_field() {
        let m = Machine::new(
            Arc::new(Context::in_memory()),
            Arc::new(Unreachable),
            MachineConfig::default(),
        );
        assert!(m.invoke(Map::new()).await.is_err());
    }
}
