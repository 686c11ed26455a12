//! Wiring for the two concrete servers. Binaries and integration tests both
//! build their [`Application`]s here.

use crate::app::Application;
use crate::http::Response;
use crate::middleware::{Cors, CorsConfig};

pub const API_ADDR: &str = "0.0.0.0:3000";
pub const WEBSITE_ADDR: &str = "0.0.0.0:8080";
pub const STATIC_DIR: &str = "public";

/// The API server: `GET /hello` answering `Hello World!`, open to every
/// origin.
pub fn api() -> Application {
    let mut app = Application::new();
    app.middleware(Cors::new(CorsConfig::default()));
    app.get("/hello", |_req| async { Ok(Response::text("Hello World!")) });
    app
}

/// The website server: static files only. The page reads the API base URL
/// from `config.js` at load time.
pub fn website() -> Application {
    let mut app = Application::new();
    app.static_dir(STATIC_DIR);
    app
}
