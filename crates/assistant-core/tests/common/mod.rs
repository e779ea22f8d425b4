//! One-shot axum server standing in for the completion service.
#![allow(dead_code)]

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures_util::{stream, Stream, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

type Chunks = Pin<Box<dyn Stream<Item = Result<Bytes, io::Error>> + Send>>;

const PIECE_PAUSE: Duration = Duration::from_millis(10);

pub struct Captured {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Captured {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body is JSON")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub enum Reply {
    /// Event stream written piece by piece with a short pause in between.
    Sse(Vec<String>),
    /// Event stream that fails after its pieces, cutting the connection.
    Broken(Vec<String>),
    /// Event stream that never ends; `hung_up` fires once the client goes away.
    HoldOpen {
        pieces: Vec<String>,
        hung_up: oneshot::Sender<()>,
    },
    Json { status: StatusCode, body: String },
    Status(StatusCode),
}

pub fn sse(pieces: &[&str]) -> Reply {
    Reply::Sse(owned(pieces))
}

pub fn broken(pieces: &[&str]) -> Reply {
    Reply::Broken(owned(pieces))
}

pub fn hold_open(pieces: &[&str]) -> (Reply, oneshot::Receiver<()>) {
    let (hung_up, rx) = oneshot::channel();
    (
        Reply::HoldOpen {
            pieces: owned(pieces),
            hung_up,
        },
        rx,
    )
}

pub fn json(status: StatusCode, body: &str) -> Reply {
    Reply::Json {
        status,
        body: body.to_string(),
    }
}

pub fn status(status: StatusCode) -> Reply {
    Reply::Status(status)
}

fn owned(pieces: &[&str]) -> Vec<String> {
    pieces.iter().map(|p| p.to_string()).collect()
}

/// Fires when the response body is dropped, i.e. hyper gave up on the client.
struct HangUpGuard(Option<oneshot::Sender<()>>);

impl Drop for HangUpGuard {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

fn paced(pieces: Vec<String>) -> impl Stream<Item = Result<Bytes, io::Error>> + Send {
    stream::iter(pieces).then(|piece| async move {
        tokio::time::sleep(PIECE_PAUSE).await;
        Ok(Bytes::from(piece))
    })
}

// Comment frames keep writing so a vanished client is noticed on the next write.
fn keep_alive() -> impl Stream<Item = Result<Bytes, io::Error>> + Send {
    stream::unfold((), |()| async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Some((Ok(Bytes::from_static(b": keep-alive\n\n")), ()))
    })
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let chunks: Chunks = match self {
            Reply::Json { status, body } => {
                return (status, [(header::CONTENT_TYPE, "application/json")], body)
                    .into_response();
            }
            Reply::Status(status) => return status.into_response(),
            Reply::Sse(pieces) => Box::pin(paced(pieces)),
            Reply::Broken(pieces) => Box::pin(paced(pieces).chain(stream::once(async {
                tokio::time::sleep(PIECE_PAUSE).await;
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "upstream went away"))
            }))),
            Reply::HoldOpen { pieces, hung_up } => {
                let guard = HangUpGuard(Some(hung_up));
                Box::pin(paced(pieces).chain(keep_alive()).map(move |chunk| {
                    let _guard = &guard;
                    chunk
                }))
            }
        };

        (
            [(header::CONTENT_TYPE, "text/event-stream")],
            Body::from_stream(chunks),
        )
            .into_response()
    }
}

struct OneShot {
    reply: Mutex<Option<Reply>>,
    captured: Mutex<Option<oneshot::Sender<Captured>>>,
}

async fn answer(state: Arc<OneShot>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("read request body");

    let captured = state.captured.lock().expect("capture lock").take();
    if let Some(tx) = captured {
        let _ = tx.send(Captured {
            method: parts.method,
            path: parts.uri.path().to_string(),
            headers: parts.headers,
            body,
        });
    }

    let reply = state.reply.lock().expect("reply lock").take();
    match reply {
        Some(reply) => reply.into_response(),
        None => StatusCode::GONE.into_response(),
    }
}

/// Serve `reply` to the first request; returns the base URL and that request.
pub async fn serve_once(reply: Reply) -> (String, oneshot::Receiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (tx, rx) = oneshot::channel();

    let state = Arc::new(OneShot {
        reply: Mutex::new(Some(reply)),
        captured: Mutex::new(Some(tx)),
    });
    let app = Router::new().fallback(move |request: Request| answer(state.clone(), request));

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });

    (format!("http://{}", addr), rx)
}

/// Base URL where nothing is listening.
pub async fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{}", addr)
}
