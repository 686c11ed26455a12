use crate::error::ServerError;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub body: String,
    pub headers: HashMap<String, String>,
}

impl Response {
    pub fn new(status: u16) -> Response {
        Response {
            status,
            headers: HashMap::new(),
            body: String::new(),
        }
    }

    pub fn body<T: AsRef<str>>(&mut self, body: T) -> &mut Self {
        self.body = body.as_ref().to_string();
        self
    }

    pub fn header<K: AsRef<str>, V: AsRef<str>>(&mut self, name: K, value: V) -> &mut Self {
        self.headers
            .insert(name.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    pub fn json<T: Serialize>(&mut self, value: &T) -> Result<&mut Self, ServerError> {
        let json_string = serde_json::to_string(value)
            .map_err(|e| ServerError::InternalError(format!("JSON serialization error: {}", e)))?;
        self.header("Content-Type", "application/json");
        self.body(json_string);
        Ok(self)
    }

    pub fn text<T: AsRef<str>>(content: T) -> Response {
        let mut response = Response::new(200);
        response.header("Content-Type", "text/plain").body(content);
        response
    }

    pub fn html<T: AsRef<str>>(content: T) -> Response {
        let mut response = Response::new(200);
        response.header("Content-Type", "text/html").body(content);
        response
    }

    pub fn no_content() -> Response {
        Response::new(204)
    }

    /// Renders a [`ServerError`] as the JSON error body clients see.
    pub fn error(err: ServerError) -> Response {
        let status = err.status_code();
        let mut response = Response::new(status);
        let body = serde_json::json!({
            "error": {
                "message": err.to_string(),
                "status": status
            }
        });
        // Serializing a json! literal cannot fail.
        let _ = response.json(&body);
        response
    }

    /// The reason phrase written after the status code on the wire.
    pub(crate) fn reason(status: u16) -> &'static str {
        match status {
            200 => "OK",
            204 => "No Content",
            400 => "Bad Request",
            404 => "Not Found",
            500 => "Internal Server Error",
            _ => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_sets_plain_content_type() {
        let response = Response::text("Hello World!");
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "Hello World!");
        assert_eq!(
            response.headers.get("Content-Type").map(String::as_str),
            Some("text/plain")
        );
    }

    #[test]
    fn html_sets_html_content_type() {
        let response = Response::html("<p>hi</p>");
        assert_eq!(
            response.headers.get("Content-Type").map(String::as_str),
            Some("text/html")
        );
    }

    #[test]
    fn error_renders_status_and_json_body() {
        let response = Response::error(ServerError::NotFound);
        assert_eq!(response.status, 404);
        let parsed: serde_json::Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(parsed["error"]["status"], 404);
    }
}
