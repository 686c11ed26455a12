use std::collections::HashMap;

#[derive(Eq, Hash, PartialEq, Copy, Clone, Debug)]
pub enum Method {
    GET,
    POST,
    PUT,
    DELETE,
    HEAD,
    CONNECT,
    OPTIONS,
    TRACE,
    PATCH,
}

impl Method {
    pub fn parse(s: &str) -> Option<Method> {
        match s {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            "PUT" => Some(Method::PUT),
            "DELETE" => Some(Method::DELETE),
            "HEAD" => Some(Method::HEAD),
            "CONNECT" => Some(Method::CONNECT),
            "OPTIONS" => Some(Method::OPTIONS),
            "TRACE" => Some(Method::TRACE),
            "PATCH" => Some(Method::PATCH),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::CONNECT => "CONNECT",
            Method::OPTIONS => "OPTIONS",
            Method::TRACE => "TRACE",
            Method::PATCH => "PATCH",
        }
    }
}

/// A parsed incoming request. This protocol has no request bodies, so only
/// the request line and headers are kept.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
}

impl Request {
    pub fn new(method: Method, path: &str) -> Request {
        Request {
            method,
            path: path.to_string(),
            query: HashMap::new(),
            headers: HashMap::new(),
        }
    }

    /// Header lookup by lowercased name.
    pub fn get_header(&self, name: &str) -> Option<&String> {
        self.headers.get(&name.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_methods() {
        assert_eq!(Method::parse("GET"), Some(Method::GET));
        assert_eq!(Method::parse("OPTIONS"), Some(Method::OPTIONS));
        assert_eq!(Method::parse("HEAD"), Some(Method::HEAD));
    }

    #[test]
    fn rejects_unknown_and_lowercase_methods() {
        assert_eq!(Method::parse("BREW"), None);
        assert_eq!(Method::parse("get"), None);
    }

    #[test]
    fn header_lookup_is_case_insensitive_on_the_query_side() {
        let mut req = Request::new(Method::GET, "/hello");
        req.headers.insert("origin".to_string(), "http://example.com".to_string());
        assert_eq!(req.get_header("Origin").map(String::as_str), Some("http://example.com"));
    }
}
