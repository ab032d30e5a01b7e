//! HTTP stub server for exercising the blocking clients.
//!
//! An axum router with a single fallback handler: every request is recorded
//! and answered with the next canned response, in order. Once the canned
//! responses run out the server answers 500.

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;

#[derive(Clone, Debug)]
pub struct StubResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
    /// Held back this long before answering.
    pub delay: Duration,
}

impl StubResponse {
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn empty(status: u16) -> Self {
        Self::text(status, "")
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl IntoResponse for StubResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, [(header::CONTENT_TYPE, self.content_type)], self.body).into_response()
    }
}

#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    /// Path plus query string.
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or_default()
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

struct StubState {
    responses: Mutex<VecDeque<StubResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

pub struct StubServer {
    addr: SocketAddr,
    state: Arc<StubState>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl StubServer {
    /// Bind an ephemeral local port and serve `responses` in order.
    ///
    /// The server runs on its own thread with a current-thread runtime, so
    /// blocking clients can call it from the test thread.
    pub fn start(responses: Vec<StubResponse>) -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind stub server");
        listener
            .set_nonblocking(true)
            .expect("stub listener nonblocking");
        let addr = listener.local_addr().expect("stub server address");
        let state = Arc::new(StubState {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        });
        let router = Router::new()
            .fallback(stub_handler)
            .with_state(Arc::clone(&state));
        let (shutdown, stopped) = oneshot::channel::<()>();

        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("stub server runtime");
            runtime.block_on(async move {
                let listener =
                    tokio::net::TcpListener::from_std(listener).expect("stub server listener");
                axum::serve(listener, router)
                    .with_graceful_shutdown(async {
                        let _ = stopped.await;
                    })
                    .await
                    .expect("stub server");
            });
        });

        Self {
            addr,
            state,
            shutdown: Some(shutdown),
        }
    }

    /// Base URL without a trailing slash.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state
            .requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn stub_handler(
    State(state): State<Arc<StubState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = RecordedRequest {
        method: method.as_str().to_string(),
        target: uri
            .path_and_query()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| uri.path().to_string()),
        headers: headers
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    String::from_utf8_lossy(v.as_bytes()).into_owned(),
                )
            })
            .collect(),
        body: body.to_vec(),
    };
    state
        .requests
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .push(request);

    let next = state
        .responses
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .pop_front();
    match next {
        Some(response) => {
            if !response.delay.is_zero() {
                tokio::time::sleep(response.delay).await;
            }
            response.into_response()
        }
        None => (StatusCode::INTERNAL_SERVER_ERROR, "no stub response left").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_request_and_serves_responses_in_order() {
        let server = StubServer::start(vec![
            StubResponse::json(201, r#"{"ok":true}"#),
            StubResponse::empty(204),
        ]);
        let client = reqwest::blocking::Client::new();

        let first = client
            .post(format!("{}/rest/x?a=1", server.url()))
            .header("X-Request-Id", "h")
            .body("ping")
            .send()
            .unwrap();
        assert_eq!(first.status().as_u16(), 201);
        assert_eq!(
            first.headers()["content-type"].to_str().unwrap(),
            "application/json"
        );
        assert_eq!(first.text().unwrap(), r#"{"ok":true}"#);

        let second = client.get(format!("{}/rest/y", server.url())).send().unwrap();
        assert_eq!(second.status().as_u16(), 204);

        let requests = server.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].target, "/rest/x?a=1");
        assert_eq!(requests[0].path(), "/rest/x");
        assert_eq!(requests[0].header("x-request-id"), Some("h"));
        assert_eq!(requests[0].body_text(), "ping");
        assert_eq!(requests[1].method, "GET");
    }

    #[test]
    fn exhausted_responses_answer_500() {
        let server = StubServer::start(Vec::new());
        let status = reqwest::blocking::get(format!("{}/anything", server.url()))
            .unwrap()
            .status();
        assert_eq!(status.as_u16(), 500);
        assert_eq!(server.requests().len(), 1);
    }
}
