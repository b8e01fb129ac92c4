//! Connection events delivered to the reactor.

use axum::extract::ws::Message;
use axum::http::{header, HeaderMap, Method, Version};
use bytes::Bytes;

/// An HTTP request as seen by page handlers. The body is fully buffered.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Path component only.
    pub uri: String,
    pub query: Option<String>,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpRequest {
    pub fn new(method: Method, uri: &str) -> Self {
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (uri, None),
        };
        Self {
            method,
            uri: path.to_string(),
            query,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Form or query variable. Form fields of urlencoded bodies win.
    pub fn var(&self, name: &str) -> Option<String> {
        let is_form = self
            .header(header::CONTENT_TYPE.as_str())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

        if is_form {
            if let Some(value) = find_var(&self.body, name) {
                return Some(value);
            }
        }
        self.query
            .as_deref()
            .and_then(|query| find_var(query.as_bytes(), name))
    }

    /// Whether the connection may be reused after this exchange.
    pub fn keep_alive(&self) -> bool {
        let connection = self.header(header::CONNECTION.as_str()).map(str::to_ascii_lowercase);
        match self.version {
            Version::HTTP_09 | Version::HTTP_10 => {
                connection.is_some_and(|c| c.contains("keep-alive"))
            }
            _ => !connection.is_some_and(|c| c.contains("close")),
        }
    }

    /// Raw bytes identifying this request, used as session-id entropy.
    pub fn fingerprint(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(256 + self.body.len());
        bytes.extend_from_slice(self.method.as_str().as_bytes());
        bytes.push(b' ');
        bytes.extend_from_slice(self.uri.as_bytes());
        if let Some(query) = &self.query {
            bytes.push(b'?');
            bytes.extend_from_slice(query.as_bytes());
        }
        bytes.extend_from_slice(b"\r\n");
        for (name, value) in &self.headers {
            bytes.extend_from_slice(name.as_str().as_bytes());
            bytes.extend_from_slice(b": ");
            bytes.extend_from_slice(value.as_bytes());
            bytes.extend_from_slice(b"\r\n");
        }
        bytes.extend_from_slice(b"\r\n");
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

fn find_var(encoded: &[u8], name: &str) -> Option<String> {
    url::form_urlencoded::parse(encoded)
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Events a connection receives, in arrival order.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    HttpRequest(HttpRequest),
    WebSocketHandshakeComplete,
    WebSocketFrame(Message),
    /// The transport drained everything queued and can take more output.
    SendReady,
    /// Cross-thread wake-up for the attached handler.
    Poll,
    Close,
}

impl ConnectionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::HttpRequest(_) => "http_request",
            Self::WebSocketHandshakeComplete => "ws_handshake_complete",
            Self::WebSocketFrame(_) => "ws_frame",
            Self::SendReady => "send_ready",
            Self::Poll => "poll",
            Self::Close => "close",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn splits_query_from_path() {
        let request = HttpRequest::new(Method::GET, "/api/execute?command=stat&x=1");
        assert_eq!(request.uri, "/api/execute");
        assert_eq!(request.var("command").as_deref(), Some("stat"));
        assert_eq!(request.var("missing"), None);
    }

    #[test]
    fn form_body_wins_over_query() {
        let mut request = HttpRequest::new(Method::POST, "/login?username=query");
        request.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        request.body = Bytes::from_static(b"username=admin&password=a%26b+c");

        assert_eq!(request.var("username").as_deref(), Some("admin"));
        assert_eq!(request.var("password").as_deref(), Some("a&b c"));
    }

    #[test]
    fn keep_alive_rules() {
        let mut request = HttpRequest::new(Method::GET, "/");
        assert!(request.keep_alive());

        request.headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
        assert!(!request.keep_alive());

        request.version = Version::HTTP_10;
        request.headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        assert!(request.keep_alive());
        request.headers.remove(header::CONNECTION);
        assert!(!request.keep_alive());
    }

    #[test]
    fn fingerprint_covers_request() {
        let mut a = HttpRequest::new(Method::POST, "/login");
        let b = a.clone();
        a.body = Bytes::from_static(b"password=x");
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert!(b.fingerprint().starts_with(b"POST /login\r\n"));
    }
}
