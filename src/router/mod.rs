use crate::handler::{Handler, HttpResult, IntoResponse};
use crate::http::{Method, Request};
use crate::middleware::{Middleware, MiddlewareManager, Next};
use std::collections::HashMap;

#[derive(Clone)]
pub(crate) struct Route {
    pub(crate) middlewares: MiddlewareManager,
    pub(crate) handler: Box<dyn Handler>,
}

impl Route {
    pub async fn handle(&self, req: Request) -> HttpResult {
        self.middlewares
            .call(req, Next::new_handler(self.handler.clone()))
            .await
    }
}

/// Exact-path route table. Paths are stored with the trailing slash
/// normalized away, so `/hello` and `/hello/` resolve to the same route.
#[derive(Clone)]
pub struct Router {
    middlewares: MiddlewareManager,
    pub(crate) routes: HashMap<String, HashMap<Method, Route>>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            middlewares: MiddlewareManager::new(),
            routes: HashMap::new(),
        }
    }

    pub fn get<F, R>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Request) -> R + Send + Clone + Sync + 'static,
        R: IntoResponse + 'static,
    {
        self.add(Method::GET, path, handler);
        self
    }

    /// Middlewares apply to routes registered after this call.
    pub fn middleware(&mut self, middleware: impl Middleware + 'static) {
        self.middlewares.add(middleware);
    }

    fn add<F, R>(&mut self, method: Method, path: &str, handler: F)
    where
        F: Fn(Request) -> R + Send + Sync + Clone + 'static,
        R: IntoResponse,
    {
        let path = Self::normalize(path);
        self.routes.entry(path).or_default().insert(
            method,
            Route {
                middlewares: self.middlewares.clone(),
                handler: Box::new(handler),
            },
        );
    }

    pub(crate) fn normalize(path: &str) -> String {
        let path = path.trim_end_matches('/');
        if path.is_empty() {
            "/".to_string()
        } else {
            path.to_string()
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Response;

    #[test]
    fn normalizes_trailing_slashes() {
        assert_eq!(Router::normalize("/hello/"), "/hello");
        assert_eq!(Router::normalize("/hello"), "/hello");
        assert_eq!(Router::normalize("/"), "/");
        assert_eq!(Router::normalize(""), "/");
    }

    #[tokio::test]
    async fn registered_route_is_reachable() {
        let mut router = Router::new();
        router.get("/hello", |_req| async { Ok(Response::text("Hello World!")) });

        let route = router
            .routes
            .get("/hello")
            .and_then(|methods| methods.get(&Method::GET))
            .expect("route registered");
        let response = route.handle(Request::new(Method::GET, "/hello")).await.unwrap();
        assert_eq!(response.body, "Hello World!");
    }
}
