//! HTTP transport over reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

use arc_core::{FormData, FormPart};

use super::{Request, Transport};
use crate::types::{RuntimeError, RuntimeResult};

const USER_AGENT: &str = concat!("arc/", env!("CARGO_PKG_VERSION"));

#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Client with an optional per-request timeout. No retries: a failed
    /// request fails once.
    pub fn new(timeout: Option<Duration>) -> RuntimeResult<Self> {
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(USER_AGENT);
        if let Some(limit) = timeout {
            builder = builder.timeout(limit);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    fn multipart(form: FormData) -> RuntimeResult<Form> {
        let mut multipart = Form::new();
        for part in form.parts() {
            multipart = match part {
                FormPart::Text { name, value } => multipart.text(name.clone(), value.clone()),
                FormPart::File {
                    name,
                    file_name,
                    mime,
                    bytes,
                } => {
                    let mut file = Part::bytes(bytes.clone()).file_name(file_name.clone());
                    if let Some(mime) = mime {
                        file = file.mime_str(mime)?;
                    }
                    multipart.part(name.clone(), file)
                }
            };
        }
        Ok(multipart)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: Request) -> RuntimeResult<String> {
        let url = request.url().to_string();
        tracing::debug!("{} {url}", request.method());

        let builder = match request {
            Request::Get { url } => self.client.get(url),
            Request::Post { url, body } => self
                .client
                .post(url)
                .header(
                    reqwest::header::CONTENT_TYPE,
                    "application/x-www-form-urlencoded",
                )
                .body(body),
            Request::Multipart { url, form } => {
                self.client.post(url).multipart(Self::multipart(form)?)
            }
        };

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RuntimeError::Transport(format!(
                "HTTP {} from {url}",
                status.as_u16()
            )));
        }
        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multipart_form_builds() {
        let form = FormData::new()
            .text("caption", "hi")
            .file("avatar", "a.png", Some("image/png"), vec![0x89, 0x50]);
        assert!(HttpTransport::multipart(form).is_ok());
    }

    #[test]
    fn test_invalid_mime_is_transport_error() {
        let form = FormData::new().file("f", "x", Some("not a mime"), vec![]);
        assert!(matches!(
            HttpTransport::multipart(form),
            Err(RuntimeError::Transport(_))
        ));
    }
}
