use crate::http::{Method, Request, Response};
use crate::middleware::{Middleware, MiddlewareResult, Next};

/// Cross-origin policy. The default allows every origin, which is the whole
/// point of this service: the page calling `/hello` is served from a
/// different origin than the API.
#[derive(Clone)]
pub struct CorsConfig {
    pub allow_origins: Vec<String>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub max_age: Option<u32>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: vec!["*".to_string()],
            allow_methods: vec!["GET".to_string(), "HEAD".to_string(), "OPTIONS".to_string()],
            allow_headers: vec!["Content-Type".to_string()],
            max_age: Some(86400),
        }
    }
}

impl CorsConfig {
    fn allow_all(&self) -> bool {
        self.allow_origins.iter().any(|o| o == "*")
    }

    /// The `Access-Control-Allow-Origin` value for a request origin, if the
    /// policy admits it. Allow-all emits a literal `*` rather than echoing.
    fn allowed_origin(&self, origin: Option<&String>) -> Option<String> {
        if self.allow_all() {
            return Some("*".to_string());
        }
        origin
            .filter(|origin| self.allow_origins.contains(origin))
            .cloned()
    }
}

pub struct Cors {
    config: CorsConfig,
}

impl Cors {
    pub fn new(config: CorsConfig) -> Self {
        Self { config }
    }
}

impl Middleware for Cors {
    fn call(&self, req: Request, next: Next) -> MiddlewareResult {
        let config = self.config.clone();
        Box::pin(async move {
            let origin = req.get_header("origin").cloned();

            // Preflight never reaches the route handler.
            if req.method == Method::OPTIONS {
                let mut response = Response::no_content();
                if let Some(allowed) = config.allowed_origin(origin.as_ref()) {
                    response.header("Access-Control-Allow-Origin", allowed);
                }
                response.header("Access-Control-Allow-Methods", config.allow_methods.join(", "));
                response.header("Access-Control-Allow-Headers", config.allow_headers.join(", "));
                if let Some(max_age) = config.max_age {
                    response.header("Access-Control-Max-Age", max_age.to_string());
                }
                return Ok(response);
            }

            let mut response = next.handle(req).await?;
            if let Some(allowed) = config.allowed_origin(origin.as_ref()) {
                response.header("Access-Control-Allow-Origin", allowed);
            }
            Ok(response)
        })
    }

    fn clone_box(&self) -> Box<dyn Middleware> {
        Box::new(Self::new(self.config.clone()))
    }
}
