//! Fault injection
//!
//! Replaces a share of requests with a synthetic error response so callers
//! can exercise their failure handling. Injected requests never reach the
//! network.

use super::middleware::{Middleware, MiddlewareFuture, Next};
use crate::error::TransportError;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Request, Response, StatusCode};

/// Status codes picked from when none is configured
pub const CHAOS_STATUS_FAMILY: &[u16] = &[429, 500, 502, 503, 504];

/// Marker header on every injected response
pub const CHAOS_HEADER: &str = "x-chaos-injected";

pub struct FaultInjection {
    percentage: u32,
    status: Option<StatusCode>,
    message: String,
    rng: Mutex<StdRng>,
}

impl FaultInjection {
    /// `status_code` 0 picks randomly from [`CHAOS_STATUS_FAMILY`]
    pub fn new(percentage: u32, status_code: u16, message: &str) -> Self {
        let status = match status_code {
            0 => None,
            code => match StatusCode::from_u16(code) {
                Ok(status) => Some(status),
                Err(_) => {
                    tracing::warn!("Ignoring invalid chaos_status_code {}", code);
                    None
                }
            },
        };

        Self {
            percentage: percentage.min(100),
            status,
            message: message.to_string(),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn percentage(&self) -> u32 {
        self.percentage
    }

    /// Roll the dice for one request
    pub fn should_inject(&self) -> bool {
        match self.percentage {
            0 => false,
            100 => true,
            p => self.rng.lock().gen_range(0..100) < p,
        }
    }

    /// Status for one injected response
    pub fn pick_status(&self) -> StatusCode {
        if let Some(status) = self.status {
            return status;
        }
        let code = CHAOS_STATUS_FAMILY
            .choose(&mut *self.rng.lock())
            .copied()
            .unwrap_or(503);
        StatusCode::from_u16(code).unwrap_or(StatusCode::SERVICE_UNAVAILABLE)
    }

    fn injected_response(&self, status: StatusCode) -> Result<Response, TransportError> {
        let message = if self.message.is_empty() {
            status.canonical_reason().unwrap_or("Injected fault").to_string()
        } else {
            self.message.clone()
        };
        let body = serde_json::json!({
            "error": {
                "code": "ChaosInjected",
                "message": message,
            }
        });

        let response = ::http::Response::builder()
            .status(status)
            .header(CHAOS_HEADER, "true")
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .map_err(|e| TransportError::Build(e.to_string()))?;

        Ok(Response::from(response))
    }
}

impl Middleware for FaultInjection {
    fn name(&self) -> &'static str {
        "fault_injection"
    }

    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> MiddlewareFuture<'a> {
        Box::pin(async move {
            if !self.should_inject() {
                return next.run(req).await;
            }

            let status = self.pick_status();
            tracing::debug!("Injecting {} for {} {}", status, req.method(), req.url().path());
            self.injected_response(status)
        })
    }
}
