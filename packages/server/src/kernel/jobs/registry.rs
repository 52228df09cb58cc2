//! Maps job type strings to the handlers that execute them.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;

use super::queue::{ClaimedJob, CommandMeta};
use crate::kernel::ServerDeps;

type HandlerFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
type Handler = Box<dyn Fn(serde_json::Value, Arc<ServerDeps>) -> HandlerFuture + Send + Sync>;

/// Dispatch table from job type to handler.
///
/// Domains register their background commands at startup; the runner looks
/// claimed jobs up here. A handler receives its deserialized command plus
/// [`ServerDeps`], so everything it needs arrives as arguments.
#[derive(Default)]
pub struct JobRegistry {
    handlers: HashMap<&'static str, Handler>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire a command type to its handler.
    ///
    /// The stored payload is deserialized to `C` before the handler runs.
    pub fn register<C, F, Fut>(&mut self, job_type: &'static str, handler: F)
    where
        C: CommandMeta + DeserializeOwned + Send + Sync + 'static,
        F: Fn(C, Arc<ServerDeps>) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.handlers.insert(
            job_type,
            Box::new(move |payload, deps| {
                let handler = handler.clone();
                Box::pin(async move {
                    let command: C = serde_json::from_value(payload)
                        .with_context(|| format!("{job_type} payload did not deserialize"))?;
                    handler(command, deps).await
                })
            }),
        );
    }

    /// Run a claimed job through its handler.
    pub async fn execute(&self, job: &ClaimedJob, deps: Arc<ServerDeps>) -> Result<()> {
        let job_type = job.command_type();
        let Some(handler) = self.handlers.get(job_type) else {
            bail!("no handler registered for job type {job_type}");
        };
        let Some(payload) = job.job.args.clone() else {
            bail!("job {} carries no payload", job.id);
        };

        handler(payload, deps).await
    }

    pub fn is_registered(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// Registered type names, for startup logging.
    pub fn registered_types(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }
}

/// Registry as shared between the runner and startup wiring.
pub type SharedJobRegistry = Arc<JobRegistry>;
