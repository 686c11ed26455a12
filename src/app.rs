//! The server entry point: an [`Application`] owns the route table and the
//! accept loop, and turns TCP connections into one request/response pair each.

use crate::error::{ServerError, ServerResult};
use crate::handler::{HttpResult, IntoResponse};
use crate::http::{Method, Request, Response};
use crate::middleware::Middleware;
use crate::router::{Route, Router};
use futures::FutureExt;
use std::collections::HashMap;
use std::fs;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::runtime::Runtime;

/// A configured server: routes, middlewares, an optional static directory.
///
/// ```no_run
/// use hello_service::{Application, Response};
///
/// let mut app = Application::new();
/// app.get("/hello", |_req| async { Ok(Response::text("Hello World!")) });
/// app.listen("0.0.0.0:3000").unwrap();
/// ```
#[derive(Clone)]
pub struct Application {
    pub max_connections: usize,
    router: Router,
    static_dir: Option<PathBuf>,
}

impl Application {
    pub fn new() -> Self {
        Self {
            max_connections: 256,
            router: Router::new(),
            static_dir: None,
        }
    }

    /// Registers a GET route handler.
    pub fn get<F, R>(&mut self, path: &str, handler: F)
    where
        F: Fn(Request) -> R + Send + Clone + Sync + 'static,
        R: IntoResponse + 'static,
    {
        self.router.get(path, handler);
    }

    /// Adds a middleware. Middlewares wrap every route registered after this
    /// call, so register them first.
    pub fn middleware(&mut self, middleware: impl Middleware + 'static) {
        self.router.middleware(middleware);
    }

    /// Serves files from `dir` for paths no route claims. `/` maps to
    /// `index.html`.
    pub fn static_dir(&mut self, dir: &str) -> &mut Self {
        self.static_dir = Some(PathBuf::from(dir));
        self
    }

    /// Binds `addr` and blocks serving it on a fresh runtime.
    pub fn listen(self, addr: &str) -> ServerResult<()> {
        let runtime = Runtime::new()?;
        runtime.block_on(async {
            let listener = TcpListener::bind(addr).await?;
            log::info!("Listening on http://{}.", addr);
            self.serve(listener).await
        })
    }

    /// Serves an already-bound listener inside the caller's runtime. Tests
    /// bind port 0 and drive the server through this.
    pub async fn serve(self, listener: TcpListener) -> ServerResult<()> {
        let open_connections = Arc::new(AtomicUsize::new(0));
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    log::error!("Accept failed: {}", err);
                    continue;
                }
            };

            if open_connections.load(Ordering::Relaxed) >= self.max_connections {
                log::warn!("Connection limit reached, dropping {}", peer);
                continue;
            }

            open_connections.fetch_add(1, Ordering::Relaxed);
            let app = self.clone();
            let counter = Arc::clone(&open_connections);
            tokio::spawn(async move {
                if let Err(err) = app.handle_connection(stream).await {
                    log::error!("Connection error: {}", err);
                }
                counter.fetch_sub(1, Ordering::Relaxed);
            });
        }
    }

    async fn handle_connection<S>(&self, mut stream: S) -> ServerResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let response = {
            let mut reader = BufReader::new(&mut stream);
            let mut request_line = String::new();
            reader.read_line(&mut request_line).await?;
            if request_line.is_empty() {
                return Ok(());
            }

            match Self::read_request(&mut reader, &request_line).await {
                Ok(request) => {
                    let started = Instant::now();
                    let method = request.method;
                    let path = request.path.clone();
                    // A panicking handler answers 500 instead of killing the task
                    // silently.
                    let outcome = AssertUnwindSafe(self.handle(request)).catch_unwind().await;
                    let outcome = outcome.unwrap_or_else(|panic| {
                        let message = if let Some(msg) = panic.downcast_ref::<&str>() {
                            msg.to_string()
                        } else if let Some(msg) = panic.downcast_ref::<String>() {
                            msg.clone()
                        } else {
                            "unknown panic".to_string()
                        };
                        Err(ServerError::PanicError(message))
                    });
                    let response = outcome.unwrap_or_else(|err| self.handle_error(err));
                    log::info!(
                        "{} {} -> {} ({}ms)",
                        method.as_str(),
                        path,
                        response.status,
                        started.elapsed().as_millis()
                    );
                    response
                }
                Err(err) => self.handle_error(err),
            }
        };

        Self::write_response(&mut stream, response).await
    }

    async fn read_request<R>(reader: &mut R, request_line: &str) -> ServerResult<Request>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut parts = request_line.trim().split_whitespace();
        let method = parts
            .next()
            .ok_or_else(|| ServerError::BadRequest("empty request line".to_string()))?;
        let method = Method::parse(method)
            .ok_or_else(|| ServerError::BadRequest(format!("unsupported method {}", method)))?;
        let target = parts
            .next()
            .ok_or_else(|| ServerError::BadRequest("missing request target".to_string()))?;

        let mut target = target.splitn(2, '?');
        let path = Router::normalize(target.next().unwrap_or("/"));
        let query = target.next().map(Self::parse_query).unwrap_or_default();

        let mut headers = HashMap::new();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).await?;
            if line.trim().is_empty() {
                break;
            }
            if let Some((key, value)) = line.trim().split_once(':') {
                headers.insert(key.trim().to_lowercase(), value.trim().to_string());
            }
        }

        // No route reads a request body, but a peer may still send one; drain
        // it so the connection stays in sync until the response is written.
        if let Some(length) = headers
            .get("content-length")
            .and_then(|value| value.parse::<u64>().ok())
        {
            tokio::io::copy(&mut reader.take(length), &mut tokio::io::sink()).await?;
        }

        Ok(Request {
            method,
            path,
            query,
            headers,
        })
    }

    async fn handle(&self, req: Request) -> HttpResult {
        let method = req.method;
        if let Some(routes) = self.router.routes.get(&req.path) {
            if let Some(route) = routes.get(&method) {
                return route.handle(req).await;
            }
            // HEAD and OPTIONS fall back to the GET route: HEAD strips the
            // body, OPTIONS runs the middleware chain (CORS preflight) over
            // an empty handler.
            if method == Method::HEAD {
                if let Some(route) = routes.get(&Method::GET) {
                    return Self::handle_head(route.clone(), req).await;
                }
            }
            if method == Method::OPTIONS {
                if let Some(route) = routes.get(&Method::GET) {
                    return Self::handle_options(route.clone(), req).await;
                }
            }
        }

        if method == Method::GET || method == Method::HEAD {
            if let Some(mut response) = self.handle_static_file(&req.path) {
                if method == Method::HEAD {
                    response.body.clear();
                }
                return Ok(response);
            }
        }

        Err(ServerError::NotFound)
    }

    async fn handle_head(route: Route, mut req: Request) -> HttpResult {
        req.method = Method::GET;
        let mut response = route.handle(req).await?;
        response.body.clear();
        Ok(response)
    }

    async fn handle_options(route: Route, req: Request) -> HttpResult {
        let route = Route {
            middlewares: route.middlewares.clone(),
            handler: Box::new(|_req| async { Ok(Response::new(200)) }),
        };
        route.handle(req).await
    }

    fn handle_error(&self, error: ServerError) -> Response {
        Response::error(error)
    }

    async fn write_response<S>(stream: &mut S, response: Response) -> ServerResult<()>
    where
        S: AsyncWrite + Unpin,
    {
        let mut wire = format!(
            "HTTP/1.1 {} {}\r\n",
            response.status,
            Response::reason(response.status)
        );
        for (name, value) in &response.headers {
            wire += &format!("{}: {}\r\n", name, value);
        }
        wire += &format!(
            "Content-Length: {}\r\nConnection: close\r\n\r\n",
            response.body.len()
        );
        wire += &response.body;
        stream.write_all(wire.as_bytes()).await?;
        Ok(())
    }

    fn handle_static_file(&self, path: &str) -> Option<Response> {
        let static_dir = self.static_dir.as_ref()?;
        let relative = path.trim_start_matches('/');
        let relative = if relative.is_empty() { "index.html" } else { relative };

        // Canonicalize before serving so `..` segments cannot escape the
        // static directory.
        let canonical = fs::canonicalize(static_dir.join(relative)).ok()?;
        if !canonical.starts_with(fs::canonicalize(static_dir).ok()?) || !canonical.is_file() {
            return None;
        }
        Self::serve_file(&canonical)
    }

    fn serve_file(path: &Path) -> Option<Response> {
        let contents = fs::read(path).ok()?;
        let mut response = Response::new(200);

        let content_type = match path.extension().and_then(|e| e.to_str()) {
            Some("html") => "text/html",
            Some("css") => "text/css",
            Some("js") => "text/javascript",
            Some("svg") => "image/svg+xml",
            Some("ico") => "image/x-icon",
            _ => "application/octet-stream",
        };
        response.header("Content-Type", content_type);
        // Short-lived caching so edits to config.js take effect quickly.
        response.header("Cache-Control", "public, max-age=300");

        if let Ok(metadata) = fs::metadata(path) {
            if let Ok(modified) = metadata.modified() {
                response.header("Last-Modified", httpdate::fmt_http_date(modified));
            }
            let modified_secs = metadata
                .modified()
                .ok()
                .and_then(|m| m.duration_since(SystemTime::UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0);
            response.header("ETag", format!("\"{}-{}\"", metadata.len(), modified_secs));
        }

        response.body = String::from_utf8_lossy(&contents).to_string();
        Some(response)
    }

    fn parse_query(query: &str) -> HashMap<String, String> {
        query
            .split('&')
            .filter(|s| !s.is_empty())
            .filter_map(|pair| {
                let mut parts = pair.splitn(2, '=');
                Some((
                    parts.next()?.to_string(),
                    parts.next().unwrap_or("").to_string(),
                ))
            })
            .collect()
    }
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_query_pairs() {
        let query = Application::parse_query("a=1&b=&c");
        assert_eq!(query.get("a").map(String::as_str), Some("1"));
        assert_eq!(query.get("b").map(String::as_str), Some(""));
        assert_eq!(query.get("c").map(String::as_str), Some(""));
    }

    #[tokio::test]
    async fn bad_method_maps_to_bad_request() {
        let mut reader = tokio::io::BufReader::new(&b"\r\n"[..]);
        let result = Application::read_request(&mut reader, "BREW /hello HTTP/1.1").await;
        assert!(matches!(result, Err(ServerError::BadRequest(_))));
    }

    #[tokio::test]
    async fn reads_path_query_and_headers() {
        let mut reader = tokio::io::BufReader::new(&b"Origin: http://example.com\r\n\r\n"[..]);
        let request = Application::read_request(&mut reader, "GET /hello?from=page HTTP/1.1")
            .await
            .unwrap();
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.path, "/hello");
        assert_eq!(request.query.get("from").map(String::as_str), Some("page"));
        assert_eq!(
            request.get_header("origin").map(String::as_str),
            Some("http://example.com")
        );
    }
}
