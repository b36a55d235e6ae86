//! Blocking HTTP client for script code
//!
//! Requests run on a private current-thread tokio runtime and block the
//! calling thread (the dispatcher) until they finish. Nothing else runs on
//! the dispatcher meanwhile; only the request timeout bounds the wait.
//!
//! Transport failures come back as [`RepleteError`] values and are turned
//! into `{error: message}` records by the binding; they are never raised.

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, HOST, USER_AGENT};
use replete_common::error::{RepleteError, Result};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

/// Options accepted by the request native.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpOptions {
    pub url: String,
    /// Applies to connect and to the whole exchange. `None` means no limit.
    pub timeout: Option<Duration>,
    pub binary_response: bool,
    pub method: String,
    pub body: Option<String>,
    pub headers: Vec<(String, String)>,
    pub user_agent: Option<String>,
    pub insecure: bool,
    /// Unix domain socket to send the request over instead of TCP.
    pub socket: Option<PathBuf>,
}

impl HttpOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: None,
            binary_response: false,
            method: "GET".to_string(),
            body: None,
            headers: Vec::new(),
            user_agent: None,
            insecure: false,
            socket: None,
        }
    }

    /// Timeout given in whole seconds; zero means no timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_binary_response(mut self, binary: bool) -> Self {
        self.binary_response = binary;
        self
    }
}

/// A completed HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    /// One entry per header name, values joined as `v1,v2,` (each value
    /// followed by a comma, no spaces).
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Lazily-built runtime used only by the dispatcher thread.
#[derive(Debug, Default)]
pub struct HttpClient {
    runtime: OnceLock<tokio::runtime::Runtime>,
}

impl HttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn runtime(&self) -> Result<&tokio::runtime::Runtime> {
        if let Some(runtime) = self.runtime.get() {
            return Ok(runtime);
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(self.runtime.get_or_init(|| runtime))
    }

    /// Perform the request, blocking until it completes or times out.
    pub fn execute(&self, options: &HttpOptions) -> Result<HttpResponse> {
        let runtime = self.runtime()?;
        tracing::debug!("HTTP {} {}", options.method, options.url);

        let exchange = async {
            match &options.socket {
                Some(socket) => send_over_unix_socket(socket, options).await,
                None => send_over_tcp(options).await,
            }
        };

        runtime.block_on(async move {
            match options.timeout {
                Some(limit) => match tokio::time::timeout(limit, exchange).await {
                    Ok(result) => result,
                    Err(_) => Err(RepleteError::Timeout(limit.as_millis() as u64)),
                },
                None => exchange.await,
            }
        })
    }
}

fn request_headers(options: &HttpOptions) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    if let Some(agent) = &options.user_agent {
        headers.insert(USER_AGENT, header_value(agent)?);
    }
    for (name, value) in &options.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| RepleteError::InvalidRequest(format!("Invalid header name '{}': {}", name, e)))?;
        headers.insert(name, header_value(value)?);
    }
    if let Some(body) = &options.body {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
    }
    Ok(headers)
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| RepleteError::InvalidRequest(format!("Invalid header value '{}': {}", value, e)))
}

fn method(options: &HttpOptions) -> Result<hyper::Method> {
    hyper::Method::from_bytes(options.method.as_bytes())
        .map_err(|e| RepleteError::InvalidRequest(format!("Invalid method '{}': {}", options.method, e)))
}

async fn send_over_tcp(options: &HttpOptions) -> Result<HttpResponse> {
    let mut builder = reqwest::Client::builder().danger_accept_invalid_certs(options.insecure);
    if let Some(limit) = options.timeout {
        builder = builder.connect_timeout(limit).timeout(limit);
    }
    let client = builder
        .build()
        .map_err(|e| RepleteError::Transport(format!("Failed to build client: {}", e)))?;

    let mut request = client
        .request(method(options)?, &options.url)
        .headers(request_headers(options)?);
    if let Some(body) = &options.body {
        request = request.body(body.clone());
    }

    let response = request
        .send()
        .await
        .map_err(|e| RepleteError::Transport(e.to_string()))?;

    let status = response.status().as_u16();
    let headers = join_header_values(response.headers());
    let body = response
        .bytes()
        .await
        .map_err(|e| RepleteError::Transport(format!("Failed to read response: {}", e)))?;

    Ok(HttpResponse {
        status,
        headers,
        body: body.to_vec(),
    })
}

#[cfg(unix)]
async fn send_over_unix_socket(socket: &std::path::Path, options: &HttpOptions) -> Result<HttpResponse> {
    use hyper_util::rt::TokioIo;

    let uri: hyper::Uri = options
        .url
        .parse()
        .map_err(|e| RepleteError::InvalidRequest(format!("Invalid URL '{}': {}", options.url, e)))?;

    let stream = tokio::net::UnixStream::connect(socket).await?;
    let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|e| RepleteError::Transport(e.to_string()))?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::debug!("Unix socket connection ended: {}", e);
        }
    });

    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let mut request = hyper::Request::builder()
        .method(method(options)?)
        .uri(path)
        .header(HOST, uri.host().unwrap_or("localhost"));
    if let Some(headers) = request.headers_mut() {
        headers.extend(request_headers(options)?);
    }
    let body = options.body.clone().unwrap_or_default();
    let request = request
        .body(Full::new(Bytes::from(body)))
        .map_err(|e| RepleteError::InvalidRequest(format!("Failed to build request: {}", e)))?;

    let response = sender
        .send_request(request)
        .await
        .map_err(|e| RepleteError::Transport(e.to_string()))?;

    let status = response.status().as_u16();
    let headers = join_header_values(response.headers());
    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| RepleteError::Transport(format!("Failed to read response: {}", e)))?
        .to_bytes();

    Ok(HttpResponse {
        status,
        headers,
        body: body.to_vec(),
    })
}

#[cfg(not(unix))]
async fn send_over_unix_socket(_socket: &std::path::Path, _options: &HttpOptions) -> Result<HttpResponse> {
    Err(RepleteError::InvalidRequest(
        "Unix domain sockets are not supported on this platform".into(),
    ))
}

/// Collapse a header map to one entry per name, in first-seen order.
///
/// Each value is followed by a comma with no space, so `a` and `b` become
/// `a,b,`. Callers depend on this exact shape.
pub fn join_header_values(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .keys()
        .map(|name| {
            let joined = headers
                .get_all(name)
                .iter()
                .fold(String::new(), |mut acc, value| {
                    acc.push_str(&String::from_utf8_lossy(value.as_bytes()));
                    acc.push(',');
                    acc
                });
            (name.as_str().to_string(), joined)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = HttpOptions::new("http://example.com");
        assert_eq!(options.method, "GET");
        assert!(!options.binary_response);
        assert!(options.timeout.is_none());
        assert!(!options.insecure);
    }

    #[test]
    fn test_zero_timeout_means_none() {
        assert!(HttpOptions::new("x").with_timeout_secs(0).timeout.is_none());
        assert_eq!(
            HttpOptions::new("x").with_timeout_secs(3).timeout,
            Some(Duration::from_secs(3))
        );
    }

    #[test]
    fn test_join_header_values_shape() {
        let mut headers = HeaderMap::new();
        headers.append("set-cookie", HeaderValue::from_static("a=1"));
        headers.append("set-cookie", HeaderValue::from_static("b=2"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let joined = join_header_values(&headers);
        let cookie = joined.iter().find(|(k, _)| k == "set-cookie").unwrap();
        let content_type = joined.iter().find(|(k, _)| k == "content-type").unwrap();

        assert_eq!(cookie.1, "a=1,b=2,");
        assert_eq!(content_type.1, "application/json,");
        assert_eq!(joined.len(), 2);
    }

    #[test]
    fn test_request_headers_sets_content_length() {
        let options = HttpOptions::new("http://x")
            .with_body("héllo")
            .with_header("X-Token", "abc");
        let headers = request_headers(&options).unwrap();

        assert_eq!(headers[CONTENT_LENGTH], "6");
        assert_eq!(headers["x-token"], "abc");
    }

    #[test]
    fn test_invalid_method_is_rejected() {
        let options = HttpOptions::new("http://x").with_method("BAD METHOD");
        assert!(matches!(method(&options), Err(RepleteError::InvalidRequest(_))));
    }

    #[test]
    fn test_unreachable_host_returns_error() {
        let client = HttpClient::new();
        // port 9 on loopback: nothing listens there in the test environment
        let options = HttpOptions::new("http://127.0.0.1:9/").with_timeout_secs(5);
        let err = client.execute(&options).unwrap_err();
        assert!(!err.to_string().is_empty());
    }
}
