//! Serves GET requests from a local directory.
//!
//! `file://` URLs map straight to disk; any other URL has its path resolved
//! under the root. Query strings are ignored.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use super::{Request, Transport};
use crate::types::{RuntimeError, RuntimeResult};

#[derive(Debug, Clone)]
pub struct DirectoryTransport {
    root: PathBuf,
}

impl DirectoryTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, raw: &str) -> RuntimeResult<PathBuf> {
        let url = url::Url::parse(raw)?;
        let path = if url.scheme() == "file" {
            url.to_file_path()
                .map_err(|_| RuntimeError::Transport(format!("Not a local path: {raw}")))?
        } else {
            self.root.join(url.path().trim_start_matches('/'))
        };

        let escapes = path
            .components()
            .any(|c| matches!(c, Component::ParentDir));
        if escapes || !path.starts_with(&self.root) {
            return Err(RuntimeError::Transport(format!(
                "{} is outside {}",
                path.display(),
                self.root.display()
            )));
        }
        Ok(path)
    }
}

#[async_trait]
impl Transport for DirectoryTransport {
    async fn send(&self, request: Request) -> RuntimeResult<String> {
        match request {
            Request::Get { url } => {
                let path = self.resolve(&url)?;
                tracing::debug!("GET {}", path.display());
                tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| RuntimeError::Transport(format!("{}: {e}", path.display())))
            }
            other => Err(RuntimeError::Unsupported(format!(
                "{} to a directory",
                other.method()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_serves_file_urls() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("js")).unwrap();
        std::fs::write(dir.path().join("js/app.js"), "run()").unwrap();

        let transport = DirectoryTransport::new(dir.path());
        let base = url::Url::from_directory_path(dir.path()).unwrap();
        let url = base.join("js/app.js?_time=1").unwrap();

        let body = transport
            .send(Request::Get {
                url: url.to_string(),
            })
            .await
            .unwrap();
        assert_eq!(body, "run()");
    }

    #[tokio::test]
    async fn test_http_paths_map_under_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.css"), "a{}").unwrap();
        let transport = DirectoryTransport::new(dir.path());
        let body = transport
            .send(Request::Get {
                url: "http://localhost/a.css".into(),
            })
            .await
            .unwrap();
        assert_eq!(body, "a{}");
    }

    #[tokio::test]
    async fn test_missing_file_and_post() {
        let dir = tempfile::tempdir().unwrap();
        let transport = DirectoryTransport::new(dir.path());
        assert!(matches!(
            transport
                .send(Request::Get {
                    url: "http://localhost/none.js".into()
                })
                .await,
            Err(RuntimeError::Transport(_))
        ));
        assert!(matches!(
            transport
                .send(Request::Post {
                    url: "http://localhost/api".into(),
                    body: String::new()
                })
                .await,
            Err(RuntimeError::Unsupported(_))
        ));
    }
}
