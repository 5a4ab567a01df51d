//! Serial loader: drives a manifest into the page exactly once per version.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use url::Url;

use arc_core::{validate, Manifest, Parsed, Token, Validation};

use super::queue::{spawn_queue, Delivery};
use crate::config::{FailurePolicy, LoadPolicy};
use crate::context::registry::NOTICE_KEY;
use crate::context::{ArcEvent, Context};
use crate::page::inject::DoneHook;
use crate::page::{Injection, Injector, Page, Source};
use crate::transport::{send_with_timeout, Request, Transport};
use crate::types::{RuntimeError, RuntimeResult};

pub type ContextHook = Box<dyn Fn(&Context) + Send + Sync>;

/// Outcome of one boot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootReport {
    /// The capability gate stopped the boot before anything loaded.
    pub gated: bool,
    /// Resources were served from the store.
    pub cache_valid: bool,
    pub cached: usize,
    pub fetched: usize,
    /// Announced resources, bundle entries counted individually.
    pub injected: usize,
    /// Unparseable, unsupported, failed, or not injectable.
    pub skipped: usize,
    /// Cache was valid but had no entry for the resource.
    pub missing: usize,
    /// Slots never completed; nothing behind them was delivered.
    pub stalled: usize,
    pub elapsed_ms: u64,
}

impl BootReport {
    pub fn is_complete(&self) -> bool {
        !self.gated && self.stalled == 0
    }
}

struct Fetched {
    token: Token,
    body: RuntimeResult<String>,
}

pub struct Booter {
    context: Arc<Context>,
    transport: Arc<dyn Transport>,
    base: Url,
    policy: LoadPolicy,
    manifest: Option<Manifest>,
    configure: Option<ContextHook>,
    on_ready: Option<ContextHook>,
    on_resource: Option<DoneHook>,
}

impl Booter {
    pub fn new(context: Arc<Context>, transport: Arc<dyn Transport>, base: Url) -> Self {
        Self {
            context,
            transport,
            base,
            policy: LoadPolicy::default(),
            manifest: None,
            configure: None,
            on_ready: None,
            on_resource: None,
        }
    }

    pub fn with_policy(mut self, policy: LoadPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    pub fn set_resources(&mut self, manifest: Manifest) {
        self.manifest = Some(manifest);
    }

    /// Runs right before the cache check on every boot that passes the gate.
    pub fn configure<F>(&mut self, hook: F)
    where
        F: Fn(&Context) + Send + Sync + 'static,
    {
        self.configure = Some(Box::new(hook));
    }

    /// Runs once every resource of a boot has been delivered.
    pub fn on_ready<F>(&mut self, hook: F)
    where
        F: Fn(&Context) + Send + Sync + 'static,
    {
        self.on_ready = Some(Box::new(hook));
    }

    /// Runs with the cache key of every announced resource.
    pub fn on_resource<F>(&mut self, hook: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_resource = Some(Arc::new(hook));
    }

    /// Run the capability gate and record the outcome in the registry.
    pub fn validate(&self, user_agent: &str) -> Validation {
        let min = self
            .manifest
            .as_ref()
            .and_then(|m| m.min_versions)
            .unwrap_or_default();
        let validation = validate(user_agent, &min);
        self.context.registry().record_validation(&validation);
        if !validation.passed {
            tracing::warn!("Capability check failed. {}", validation.notice());
        }
        validation
    }

    /// Load the manifest into `page`. Without `force`, nothing happens unless
    /// the capability gate passed.
    pub async fn boot(&self, page: &mut dyn Page, force: bool) -> RuntimeResult<BootReport> {
        let registry = self.context.registry();
        let validated = registry.is_validated();
        if !force && !validated {
            tracing::info!("Boot gated: capability check has not passed");
            return Ok(BootReport {
                gated: true,
                ..Default::default()
            });
        }
        if !validated {
            tracing::info!("Skipping capability validation");
            registry.remove(NOTICE_KEY);
        }

        let manifest = self
            .manifest
            .as_ref()
            .ok_or_else(|| RuntimeError::Config("No resources set".to_string()))?;

        if let Some(configure) = &self.configure {
            configure(&self.context);
        }

        let started = Instant::now();
        self.context.events().emit(ArcEvent::BootStarted {
            version: manifest.version.0,
            resources: manifest.len(),
        });

        let cache_valid = self.context.cache().check(manifest.version)?;
        let injector =
            Injector::new(Arc::clone(&self.context)).with_on_done(self.on_resource.clone());
        let mut report = BootReport {
            cache_valid,
            ..Default::default()
        };

        if cache_valid {
            self.load_cached(manifest, &injector, page, &mut report);
        } else {
            self.load_remote(manifest, &injector, page, &mut report)
                .await?;
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            "Boot v{}: {} injected ({} cached, {} fetched), {} skipped, {} missing, {} stalled in {}ms",
            manifest.version,
            report.injected,
            report.cached,
            report.fetched,
            report.skipped,
            report.missing,
            report.stalled,
            report.elapsed_ms
        );

        if report.stalled == 0 {
            if let Some(on_ready) = &self.on_ready {
                on_ready(&self.context);
            }
        }
        self.context.events().emit(ArcEvent::BootComplete {
            injected: report.injected,
            cached: report.cached,
            fetched: report.fetched,
            skipped: report.skipped,
            elapsed_ms: report.elapsed_ms,
        });

        Ok(report)
    }

    /// Attach a resource the page fetches by itself, bypassing the queue.
    pub fn append(&self, page: &mut dyn Page, path: &str) -> RuntimeResult<Vec<Injection>> {
        let token = match Token::parse(path)? {
            Parsed::Local(token) => token,
            Parsed::NotImplemented { source } => {
                tracing::debug!("Not loading {source}");
                return Ok(Vec::new());
            }
        };
        let url = self.resolve(&token, self.bust_at())?;
        Injector::new(Arc::clone(&self.context))
            .with_on_done(self.on_resource.clone())
            .inject(page, &token, Source::Remote(url.as_str()))
    }

    fn load_cached(
        &self,
        manifest: &Manifest,
        injector: &Injector,
        page: &mut dyn Page,
        report: &mut BootReport,
    ) {
        for path in &manifest.resources {
            let Some(token) = parse_or_skip(path, report) else {
                continue;
            };
            let content = self.context.cache().get(&token.cache_key);
            match content {
                Some(content) => {
                    report.cached += 1;
                    inject(injector, page, &token, &content, report);
                }
                None => {
                    tracing::warn!("Cache has no entry for {}", token.cache_key);
                    report.missing += 1;
                }
            }
        }
    }

    async fn load_remote(
        &self,
        manifest: &Manifest,
        injector: &Injector,
        page: &mut dyn Page,
        report: &mut BootReport,
    ) -> RuntimeResult<()> {
        let (queue, mut deliveries, actor) = spawn_queue::<Fetched>();
        let bust = self.bust_at();

        for (index, path) in manifest.resources.iter().enumerate() {
            let Some(token) = parse_or_skip(path, report) else {
                continue;
            };
            let url = match self.resolve(&token, bust) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!("Skipping {path}: {e}");
                    report.skipped += 1;
                    continue;
                }
            };

            // Position makes the identity unique even when cache keys collide.
            let key = format!("{index}:{}", token.cache_key);
            queue.submit(&key).await?;

            let handle = queue.clone();
            let transport = Arc::clone(&self.transport);
            let policy = self.policy.clone();
            tokio::spawn(async move {
                let request = Request::Get {
                    url: url.to_string(),
                };
                match send_with_timeout(&*transport, request, policy.timeout).await {
                    Err(e) if policy.on_failure == FailurePolicy::Stall => {
                        tracing::warn!("Fetch of {} failed, slot stalls: {e}", token.raw_source);
                    }
                    body => handle.complete_detached(&key, Fetched { token, body }),
                }
            });
        }
        drop(queue);

        while let Some(Delivery { payload, .. }) = deliveries.recv().await {
            let Fetched { token, body } = payload;
            match body {
                Ok(content) => {
                    report.fetched += 1;
                    inject(injector, page, &token, &content, report);
                    if let Err(e) = self.context.cache().put(&token.cache_key, content) {
                        tracing::warn!("Failed to persist {}: {e}", token.cache_key);
                    }
                }
                Err(e) => {
                    tracing::warn!("Skipping {}: {e}", token.raw_source);
                    report.skipped += 1;
                }
            }
        }

        let summary = actor.await.map_err(|_| RuntimeError::QueueClosed)?;
        report.stalled = summary.stalled;
        Ok(())
    }

    fn bust_at(&self) -> Option<i64> {
        self.policy
            .cache_bust
            .then(|| chrono::Utc::now().timestamp_millis())
    }

    /// Root-relative paths resolve against the site root; a `file://` base is
    /// itself the root.
    fn resolve(&self, token: &Token, bust_at: Option<i64>) -> RuntimeResult<Url> {
        let path = token.fetch_path(bust_at);
        let relative = if self.base.scheme() == "file" {
            path.trim_start_matches('/')
        } else {
            path.as_str()
        };
        Ok(self.base.join(relative)?)
    }
}

fn parse_or_skip(path: &str, report: &mut BootReport) -> Option<Token> {
    match Token::parse(path) {
        Ok(Parsed::Local(token)) => Some(token),
        Ok(Parsed::NotImplemented { source }) => {
            tracing::debug!("Not loading {source}");
            report.skipped += 1;
            None
        }
        Err(e) => {
            tracing::warn!("Skipping {path}: {e}");
            report.skipped += 1;
            None
        }
    }
}

fn inject(
    injector: &Injector,
    page: &mut dyn Page,
    token: &Token,
    content: &str,
    report: &mut BootReport,
) {
    match injector.inject(page, token, Source::Inline(content)) {
        Ok(done) => report.injected += done.len(),
        Err(e) => {
            tracing::warn!("Failed to inject {}: {e}", token.cache_key);
            report.skipped += 1;
        }
    }
}
