//! # hello-service
//!
//! Two small servers and the plumbing they share:
//!
//! - the `api` binary exposes `GET /hello`, answering `Hello World!` as plain
//!   text with allow-all CORS, on port 3000;
//! - the `website` binary serves the static browser page that calls it.
//!
//! The HTTP layer is intentionally minimal: an accept loop over
//! [`tokio::net::TcpListener`], exact-path routing, and an Express-style
//! middleware chain. Handlers are async closures:
//!
//! ```no_run
//! use hello_service::{Application, Response};
//!
//! let mut app = Application::new();
//! app.get("/hello", |_req| async { Ok(Response::text("Hello World!")) });
//! app.listen("0.0.0.0:3000").unwrap();
//! ```

pub mod app;
pub mod error;
pub mod handler;
pub mod http;
pub mod middleware;
pub mod router;
pub mod service;

pub use app::Application;
pub use error::{ServerError, ServerResult};
pub use http::{Request, Response};
