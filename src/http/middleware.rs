//! Middleware pipeline
//!
//! Stages are stored wire-first: index 0 sits next to the network and the
//! last stage sees each request first. [`build`] appends stages in the order
//! fault injection, retry, redirect, compression, user agent, header
//! inspection, so retry wraps injected faults and compression wraps
//! redirect handling.

use super::compression::Compression;
use super::fault::FaultInjection;
use super::headers::{HeaderInspection, HeadersInspector};
use super::redirect::{Redirect, DEFAULT_MAX_REDIRECTS};
use super::retry::{RetryPolicy, RetryStage};
use super::user_agent::UserAgent;
use crate::config::ClientOptions;
use crate::error::TransportError;
use futures::future::BoxFuture;
use reqwest::{Client, Request, Response};
use std::fmt;
use std::sync::Arc;

pub type MiddlewareFuture<'a> = BoxFuture<'a, Result<Response, TransportError>>;

/// One request/response interceptor
pub trait Middleware: Send + Sync {
    fn name(&self) -> &'static str;

    /// Handle `req`, usually by passing it on with `next.run(req)`
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> MiddlewareFuture<'a>;
}

/// The rest of the chain below the current stage
#[derive(Clone, Copy)]
pub struct Next<'a> {
    client: &'a Client,
    stages: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    pub fn run(self, req: Request) -> MiddlewareFuture<'a> {
        match self.stages.split_last() {
            Some((stage, rest)) => stage.handle(
                req,
                Next {
                    client: self.client,
                    stages: rest,
                },
            ),
            None => {
                let client = self.client;
                Box::pin(async move { client.execute(req).await.map_err(TransportError::from) })
            }
        }
    }
}

/// Ordered stages, built once and shared by every request
#[derive(Clone, Default)]
pub struct MiddlewarePipeline {
    stages: Vec<Arc<dyn Middleware>>,
    inspector: Option<HeadersInspector>,
}

impl fmt::Debug for MiddlewarePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.stage_names()).finish()
    }
}

impl MiddlewarePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage outside the ones already present
    pub fn push(&mut self, stage: Arc<dyn Middleware>) {
        self.stages.push(stage);
    }

    /// Stage names, wire-first
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Shared header buffer, when header inspection is enabled
    pub fn headers_inspector(&self) -> Option<&HeadersInspector> {
        self.inspector.as_ref()
    }

    /// Send `req` through every stage and finally `client`
    pub async fn execute(&self, client: &Client, req: Request) -> Result<Response, TransportError> {
        Next {
            client,
            stages: &self.stages,
        }
        .run(req)
        .await
    }
}

/// Build the pipeline the transport options ask for
pub fn build(cfg: &ClientOptions) -> MiddlewarePipeline {
    let mut pipeline = MiddlewarePipeline::new();

    if cfg.enable_chaos {
        pipeline.push(Arc::new(FaultInjection::new(
            cfg.chaos_percentage,
            cfg.chaos_status_code,
            &cfg.chaos_status_message,
        )));
    }

    if cfg.enable_retry {
        pipeline.push(Arc::new(RetryStage::new(RetryPolicy::from_options(cfg))));
    }

    if cfg.enable_redirect {
        let max = match cfg.max_redirects {
            0 => DEFAULT_MAX_REDIRECTS,
            n => n,
        };
        pipeline.push(Arc::new(Redirect::new(max)));
    }

    if cfg.enable_compression {
        pipeline.push(Arc::new(Compression));
    }

    if !cfg.custom_user_agent.trim().is_empty() {
        pipeline.push(Arc::new(UserAgent::new(&cfg.custom_user_agent)));
    }

    if cfg.enable_headers_inspection {
        let inspector = HeadersInspector::default();
        pipeline.push(Arc::new(HeaderInspection::new(inspector.clone())));
        pipeline.inspector = Some(inspector);
    }

    tracing::debug!("Middleware pipeline: {:?}", pipeline.stage_names());
    pipeline
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_enabled() -> ClientOptions {
        ClientOptions {
            enable_chaos: true,
            enable_retry: true,
            enable_redirect: true,
            enable_compression: true,
            custom_user_agent: "terraform/1.9".to_string(),
            enable_headers_inspection: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_fixed_relative_order() {
        let pipeline = build(&all_enabled());
        assert_eq!(
            pipeline.stage_names(),
            vec!["fault_injection", "retry", "redirect", "compression", "user_agent", "headers_inspection"]
        );
        assert!(pipeline.headers_inspector().is_some());
    }

    #[test]
    fn test_disabled_stages_are_absent() {
        let cfg = ClientOptions {
            enable_retry: true,
            enable_compression: true,
            ..Default::default()
        };
        assert_eq!(build(&cfg).stage_names(), vec!["retry", "compression"]);
        assert!(build(&ClientOptions::default()).is_empty());
        assert!(build(&cfg).headers_inspector().is_none());
    }

    #[test]
    fn test_build_is_deterministic() {
        let cfg = all_enabled();
        assert_eq!(build(&cfg).stage_names(), build(&cfg).stage_names());
    }
}
