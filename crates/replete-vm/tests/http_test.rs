//! HTTP Integration Tests
//!
//! Runs a local hyper server and issues requests through the request
//! native, checking the text and binary result shapes, header joining and
//! transport failure records. The same handler is also served over a Unix
//! domain socket for the `socket` option.

mod common;

use common::Session;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;

const JSON_BODY: &str = r#"{"greeting":"héllo","items":[1,2,3]}"#;

async fn handle(request: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match request.uri().path() {
        "/json" => Response::builder()
            .status(200)
            .header("content-type", "application/json")
            .header("x-multi", "a")
            .header("x-multi", "b")
            .body(Full::new(Bytes::from(JSON_BODY))),
        "/echo" => {
            let method = request.method().to_string();
            let agent = request
                .headers()
                .get("user-agent")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            let custom = request
                .headers()
                .get("x-custom")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            let length = request
                .headers()
                .get("content-length")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            Response::builder()
                .status(200)
                .body(Full::new(Bytes::from(format!("{method}|{agent}|{custom}|{length}"))))
        }
        "/host" => {
            let host = request
                .headers()
                .get("host")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            Response::builder().status(200).body(Full::new(Bytes::from(host)))
        }
        _ => Response::builder()
            .status(404)
            .body(Full::new(Bytes::from("missing"))),
    };
    Ok(response.unwrap())
}

/// Serve on an ephemeral port from a background thread.
fn spawn_server() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();

    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    continue;
                };
                tokio::spawn(async move {
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service_fn(handle))
                        .await;
                });
            }
        });
    });

    addr
}

/// Serve on a Unix domain socket inside `dir` from a background thread.
#[cfg(unix)]
fn spawn_unix_server(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("http.sock");
    let listener = std::os::unix::net::UnixListener::bind(&path).unwrap();
    listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let listener = tokio::net::UnixListener::from_std(listener).unwrap();
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    continue;
                };
                tokio::spawn(async move {
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service_fn(handle))
                        .await;
                });
            }
        });
    });

    path
}

#[test]
fn test_text_response() {
    let addr = spawn_server();
    let mut session = Session::start("phone");
    session.eval_ok(&format!("var res = REPLETE_REQUEST({{url: 'http://{addr}/json'}})"));

    assert_eq!(session.eval_ok("res.status"), "200");
    assert_eq!(session.eval_ok("typeof res.body"), "string");
    assert_eq!(session.eval_ok("JSON.parse(res.body).greeting"), "héllo");
    assert_eq!(session.eval_ok("res.headers['content-type']"), "application/json,");
    assert_eq!(session.eval_ok("res.headers['x-multi']"), "a,b,");
}

#[test]
fn test_binary_response_has_identical_length() {
    let addr = spawn_server();
    let mut session = Session::start("phone");
    session.eval_ok(&format!(
        "var res = REPLETE_REQUEST({{url: 'http://{addr}/json', 'binary-response': true}})"
    ));

    assert_eq!(session.eval_ok("res.status"), "200");
    assert_eq!(session.eval_ok("res.body instanceof ArrayBuffer"), "true");
    assert_eq!(
        session.eval_ok("res.body.byteLength"),
        JSON_BODY.len().to_string()
    );
}

#[test]
fn test_request_options_are_sent() {
    let addr = spawn_server();
    let mut session = Session::start("phone");
    session.eval_ok(&format!(
        "var res = REPLETE_REQUEST({{url: 'http://{addr}/echo', method: 'POST', body: 'héllo', \
         'user-agent': 'replete-test', headers: {{'X-Custom': 'yes'}}, timeout: 5}})"
    ));
    assert_eq!(session.eval_ok("res.body"), "POST|replete-test|yes|6");
}

#[test]
fn test_error_status_still_returns_record() {
    let addr = spawn_server();
    let mut session = Session::start("phone");
    session.eval_ok(&format!("var res = REPLETE_REQUEST({{url: 'http://{addr}/nothing'}})"));
    assert_eq!(session.eval_ok("res.status"), "404");
    assert_eq!(session.eval_ok("res.body"), "missing");
    assert_eq!(session.eval_ok("res.error"), "undefined");
}

#[test]
fn test_unreachable_host_returns_error_record() {
    let mut session = Session::start("phone");
    session.eval_ok("var res = REPLETE_REQUEST({url: 'http://127.0.0.1:9/', timeout: 2})");
    assert_eq!(session.eval_ok("typeof res.error"), "string");
    assert_eq!(session.eval_ok("res.error.length > 0"), "true");
}

#[test]
fn test_insecure_option_is_accepted_over_plain_http() {
    let addr = spawn_server();
    let mut session = Session::start("phone");
    session.eval_ok(&format!(
        "var res = REPLETE_REQUEST({{url: 'http://{addr}/json', insecure: true, timeout: 5}})"
    ));
    assert_eq!(session.eval_ok("res.status"), "200");
    assert_eq!(session.eval_ok("JSON.parse(res.body).items.length"), "3");
}

#[cfg(unix)]
#[test]
fn test_unix_socket_response() {
    let dir = tempfile::tempdir().unwrap();
    let socket = spawn_unix_server(dir.path());
    let mut session = Session::start("phone");
    session.eval_ok(&format!(
        "var res = REPLETE_REQUEST({{url: 'http://localhost/json', socket: '{}', timeout: 5}})",
        socket.display()
    ));

    assert_eq!(session.eval_ok("res.error"), "undefined");
    assert_eq!(session.eval_ok("res.status"), "200");
    assert_eq!(session.eval_ok("JSON.parse(res.body).greeting"), "héllo");
    assert_eq!(session.eval_ok("res.headers['content-type']"), "application/json,");
    assert_eq!(session.eval_ok("res.headers['x-multi']"), "a,b,");
}

#[cfg(unix)]
#[test]
fn test_unix_socket_sends_host_and_options() {
    let dir = tempfile::tempdir().unwrap();
    let socket = spawn_unix_server(dir.path());
    let mut session = Session::start("phone");
    let path = socket.display();

    session.eval_ok(&format!(
        "var host = REPLETE_REQUEST({{url: 'http://docker.local/host', socket: '{path}'}})"
    ));
    assert_eq!(session.eval_ok("host.body"), "docker.local");

    session.eval_ok(&format!(
        "var echo = REPLETE_REQUEST({{url: 'http://localhost/echo', socket: '{path}', method: 'PUT', \
         body: 'abc', 'user-agent': 'sock', headers: {{'X-Custom': 'on'}}}})"
    ));
    assert_eq!(session.eval_ok("echo.body"), "PUT|sock|on|3");

    session.eval_ok(&format!(
        "var bin = REPLETE_REQUEST({{url: 'http://localhost/json', socket: '{path}', 'binary-response': true}})"
    ));
    assert_eq!(session.eval_ok("bin.body.byteLength"), JSON_BODY.len().to_string());
}

#[cfg(unix)]
#[test]
fn test_missing_unix_socket_returns_error_record() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = Session::start("phone");
    session.eval_ok(&format!(
        "var res = REPLETE_REQUEST({{url: 'http://localhost/json', socket: '{}'}})",
        dir.path().join("absent.sock").display()
    ));
    assert_eq!(session.eval_ok("typeof res.error"), "string");
    assert_eq!(session.eval_ok("res.status"), "undefined");
}
