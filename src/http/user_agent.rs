use super::middleware::{Middleware, MiddlewareFuture, Next};
use reqwest::header::{HeaderValue, USER_AGENT};
use reqwest::Request;

/// Product token appended after any custom prefix
pub const PRODUCT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Sets `User-Agent` to `"{custom} {product}/{version}"`
pub struct UserAgent {
    value: HeaderValue,
}

/// Header-safe rendering of `custom`; control characters are dropped
pub fn user_agent_string(custom: &str) -> String {
    let custom: String = custom
        .trim()
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .collect();

    if custom.is_empty() {
        PRODUCT_USER_AGENT.to_string()
    } else {
        format!("{} {}", custom, PRODUCT_USER_AGENT)
    }
}

impl UserAgent {
    pub fn new(custom: &str) -> Self {
        let value = HeaderValue::from_str(&user_agent_string(custom))
            .unwrap_or_else(|_| HeaderValue::from_static(PRODUCT_USER_AGENT));
        Self { value }
    }
}

impl Middleware for UserAgent {
    fn name(&self) -> &'static str {
        "user_agent"
    }

    fn handle<'a>(&'a self, mut req: Request, next: Next<'a>) -> MiddlewareFuture<'a> {
        req.headers_mut().insert(USER_AGENT, self.value.clone());
        next.run(req)
    }
}
