//! Header inspection
//!
//! Records the headers of the most recent exchange where the owner of the
//! bundle can read them back.

use super::middleware::{Middleware, MiddlewareFuture, Next};
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, AUTHORIZATION, COOKIE, PROXY_AUTHORIZATION, SET_COOKIE};
use reqwest::Request;
use std::sync::Arc;

/// Headers captured from one request/response pair
#[derive(Debug, Clone, Default)]
pub struct InspectedHeaders {
    pub request: HeaderMap,
    pub response: HeaderMap,
}

/// Shared, cloneable handle onto the last captured headers
#[derive(Debug, Clone, Default)]
pub struct HeadersInspector {
    last: Arc<Mutex<Option<InspectedHeaders>>>,
}

impl HeadersInspector {
    pub fn last(&self) -> Option<InspectedHeaders> {
        self.last.lock().clone()
    }

    pub fn last_request_headers(&self) -> Option<HeaderMap> {
        self.last.lock().as_ref().map(|h| h.request.clone())
    }

    pub fn last_response_headers(&self) -> Option<HeaderMap> {
        self.last.lock().as_ref().map(|h| h.response.clone())
    }

    fn record(&self, headers: InspectedHeaders) {
        *self.last.lock() = Some(headers);
    }
}

fn is_sensitive(name: &HeaderName) -> bool {
    [AUTHORIZATION, PROXY_AUTHORIZATION, COOKIE, SET_COOKIE].contains(name)
}

/// Header names and values for trace output, credentials masked
fn loggable(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let value = if is_sensitive(name) {
                "<redacted>".to_string()
            } else {
                value.to_str().unwrap_or("<binary>").to_string()
            };
            (name.as_str().to_string(), value)
        })
        .collect()
}

pub struct HeaderInspection {
    inspector: HeadersInspector,
}

impl HeaderInspection {
    pub fn new(inspector: HeadersInspector) -> Self {
        Self { inspector }
    }
}

impl Middleware for HeaderInspection {
    fn name(&self) -> &'static str {
        "headers_inspection"
    }

    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> MiddlewareFuture<'a> {
        Box::pin(async move {
            let request = req.headers().clone();
            tracing::trace!("Request headers for {}: {:?}", req.url().path(), loggable(&request));

            let result = next.run(req).await;
            if let Ok(response) = &result {
                let headers = response.headers().clone();
                tracing::trace!("Response headers ({}): {:?}", response.status(), loggable(&headers));
                self.inspector.record(InspectedHeaders {
                    request,
                    response: headers,
                });
            }
            result
        })
    }
}
