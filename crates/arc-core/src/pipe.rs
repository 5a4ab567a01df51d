//! Pipes: the request/response envelope exchanged with a model's hooks.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{ArcError, ArcResult};

/// Phase durations stamped on a finished pipe, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipeTimes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post: Option<u64>,
}

/// One part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        mime: Option<String>,
        bytes: Vec<u8>,
    },
}

/// Multipart payload carried by a pipe that uploads files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    parts: Vec<FormPart>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: impl Into<String>) -> Self {
        self.append_text(name, value);
        self
    }

    pub fn file(
        mut self,
        name: &str,
        file_name: &str,
        mime: Option<&str>,
        bytes: Vec<u8>,
    ) -> Self {
        self.parts.push(FormPart::File {
            name: name.to_string(),
            file_name: file_name.to_string(),
            mime: mime.map(str::to_string),
            bytes,
        });
        self
    }

    pub fn append_text(&mut self, name: &str, value: impl Into<String>) {
        self.parts.push(FormPart::Text {
            name: name.to_string(),
            value: value.into(),
        });
    }

    pub fn parts(&self) -> &[FormPart] {
        &self.parts
    }

    pub fn text_value(&self, name: &str) -> Option<&str> {
        self.parts.iter().find_map(|part| match part {
            FormPart::Text { name: n, value } if n == name => Some(value.as_str()),
            _ => None,
        })
    }
}

/// A request/response envelope routed to a named model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipe {
    pub model: String,
    /// Set by the pre-hook; only `true` lets the pipe leave the machine.
    #[serde(default)]
    pub state: bool,
    /// Never serialized: the JSON pipe travels alongside the upload.
    #[serde(skip)]
    pub form_data: Option<FormData>,
    #[serde(default)]
    pub time: PipeTimes,
    /// Caller and model fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Pipe {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            state: false,
            form_data: None,
            time: PipeTimes::default(),
            fields: Map::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.fields.insert(key.to_string(), value);
    }

    pub fn to_json(&self) -> ArcResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> ArcResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Application-wide pipe definition every invocation starts from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipeTemplate(Map<String, Value>);

impl PipeTemplate {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn from_value(value: Value) -> ArcResult<Self> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(ArcError::InvalidPipe(format!(
                "pipe template must be an object, got {other}"
            ))),
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Clone the template and overwrite its top-level fields with `fields`.
    ///
    /// The merge is shallow: nested objects are replaced, not combined.
    pub fn make_pipe(&self, fields: &Map<String, Value>) -> ArcResult<Pipe> {
        let mut merged = self.0.clone();
        for (key, value) in fields {
            merged.insert(key.clone(), value.clone());
        }

        if !merged.get("model").is_some_and(Value::is_string) {
            return Err(ArcError::InvalidPipe(
                "pipe has no string 'model' field".to_string(),
            ));
        }

        serde_json::from_value(Value::Object(merged))
            .map_err(|e| ArcError::InvalidPipe(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_make_pipe_is_shallow_merge() {
        let template = PipeTemplate::from_value(json!({
            "model": "default",
            "session": {"user": "anon", "lang": "en"},
            "page": 1
        }))
        .unwrap();

        let pipe = template
            .make_pipe(&object(json!({"model": "login", "session": {"user": "ada"}})))
            .unwrap();

        assert_eq!(pipe.model, "login");
        assert!(!pipe.state);
        assert_eq!(pipe.get("session"), Some(&json!({"user": "ada"})));
        assert_eq!(pipe.get("page"), Some(&json!(1)));

        // Template untouched.
        assert_eq!(template.fields()["model"], json!("default"));
    }

    #[test]
    fn test_make_pipe_requires_model() {
        let template = PipeTemplate::default();
        assert!(matches!(
            template.make_pipe(&Map::new()),
            Err(ArcError::InvalidPipe(_))
        ));
        assert!(PipeTemplate::from_value(json!([1, 2])).is_err());
    }

    #[test]
    fn test_form_data_never_serialized() {
        let mut pipe = Pipe::new("upload");
        pipe.state = true;
        pipe.form_data = Some(FormData::new().file("avatar", "a.png", None, vec![1, 2, 3]));
        pipe.set("caption", json!("hi"));

        let value: Value = serde_json::from_str(&pipe.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"model": "upload", "state": true, "time": {}, "caption": "hi"})
        );
    }

    #[test]
    fn test_decode_with_times() {
        let pipe = Pipe::from_json(
            r#"{"model":"m","state":true,"time":{"pre":1,"transit":2},"rows":[1]}"#,
        )
        .unwrap();
        assert_eq!(pipe.time.transit, Some(2));
        assert_eq!(pipe.time.post, None);
        assert_eq!(pipe.get("rows"), Some(&json!([1])));
        assert!(pipe.form_data.is_none());
    }

    #[test]
    fn test_form_text_lookup() {
        let form = FormData::new().text("pipe", "{}").text("other", "x");
        assert_eq!(form.text_value("pipe"), Some("{}"));
        assert_eq!(form.text_value("missing"), None);
        assert_eq!(form.parts().len(), 2);
    }
}
