//! Redirect following
//!
//! The HTTP client never follows redirects on its own; this stage does, so
//! the hop limit and credential stripping live in one place.

use super::middleware::{Middleware, MiddlewareFuture, Next};
use crate::error::TransportError;
use reqwest::header::{
    HeaderMap, AUTHORIZATION, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, LOCATION,
};
use reqwest::{Method, Request, Response, StatusCode};
use url::Url;

pub const DEFAULT_MAX_REDIRECTS: u32 = 5;

pub struct Redirect {
    max_redirects: u32,
}

impl Redirect {
    pub fn new(max_redirects: u32) -> Self {
        Self { max_redirects }
    }
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme() && a.host_str() == b.host_str() && a.port_or_known_default() == b.port_or_known_default()
}

/// Method for the follow-up request
fn redirected_method(status: StatusCode, method: &Method) -> Method {
    match status.as_u16() {
        303 if *method != Method::HEAD => Method::GET,
        301 | 302 if *method == Method::POST => Method::GET,
        _ => method.clone(),
    }
}

fn location(headers: &HeaderMap, base: &Url) -> Option<Url> {
    let value = headers.get(LOCATION)?.to_str().ok()?;
    base.join(value).ok()
}

impl Middleware for Redirect {
    fn name(&self) -> &'static str {
        "redirect"
    }

    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> MiddlewareFuture<'a> {
        Box::pin(async move {
            let mut current = req;
            let mut hops = 0u32;

            loop {
                let replay = current.try_clone();
                let response: Response = next.run(current).await?;

                let status = response.status();
                if !is_redirect(status) {
                    return Ok(response);
                }

                let Some(mut follow) = replay else {
                    tracing::debug!("Not following redirect for a streaming request");
                    return Ok(response);
                };
                let Some(target) = location(response.headers(), follow.url()) else {
                    tracing::debug!("Redirect {} without a usable Location, returning as-is", status);
                    return Ok(response);
                };

                if hops >= self.max_redirects {
                    return Err(TransportError::TooManyRedirects(self.max_redirects));
                }

                let method = redirected_method(status, follow.method());
                if method != *follow.method() {
                    *follow.body_mut() = None;
                    let headers = follow.headers_mut();
                    headers.remove(CONTENT_TYPE);
                    headers.remove(CONTENT_LENGTH);
                    headers.remove(CONTENT_ENCODING);
                }
                if !same_origin(follow.url(), &target) {
                    let headers = follow.headers_mut();
                    headers.remove(AUTHORIZATION);
                    headers.remove(COOKIE);
                }

                tracing::debug!("Following {} to {}", status, target);
                *follow.method_mut() = method;
                *follow.url_mut() = target;
                current = follow;
                hops += 1;
            }
        })
    }
}
