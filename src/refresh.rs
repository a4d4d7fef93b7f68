// ============================================================================
// hmr-runner - Browser refresh protocol
//
// A single HTTP endpoint, bound to a reserved path, that browsers long-poll:
// HEAD is a liveness check, GET opens a streaming text/plain body emitting
// a `0\n` heartbeat at most once a second and a terminal `1\n` on reload.
// An injection middleware appends the client script to HTML responses.
//
// The supervisor serves `router()` on its own listener (the user's server is
// an opaque `AppServer`, not a router this crate can wrap in middleware).
// `with_injection`/`inject_script` are exported for application authors who
// build their server on `axum` inside their own dylib and want the same
// script spliced into their HTML responses.
// ============================================================================

use std::convert::Infallible;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use futures::stream;
use tokio::sync::broadcast;

pub const DEFAULT_REFRESH_PATH: &str = "/---hmr-runner-refresh---";

const RUNTIME_JS: &str = include_str!("refresh_client.js");

/// Broadcasts a reload signal to every subscriber at most once per
/// generation. Mirrors the per-subscriber queue in the original reload hub,
/// just backed by `tokio::sync::broadcast` instead of a `Lock`-guarded dict.
#[derive(Clone)]
pub struct ReloadHub {
    tx: broadcast::Sender<()>,
}

impl ReloadHub {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(16);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Tell every currently-subscribed stream to emit its terminal line and
    /// close.
    pub fn broadcast(&self) {
        let _ = self.tx.send(());
    }
}

impl Default for ReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the router exposing the reserved refresh path and, optionally,
/// wraps a downstream app router with the HTML-injection middleware.
pub fn router(hub: ReloadHub, path: &str) -> Router {
    Router::new().route(path, any(handle_refresh)).with_state(hub)
}

async fn handle_refresh(State(hub): State<ReloadHub>, method: Method) -> Response {
    match method {
        Method::HEAD => StatusCode::ACCEPTED.into_response(),
        Method::GET => {
            let rx = hub.subscribe();
            let body_stream = stream::unfold(RefreshState { rx, done: false }, |mut state| async move {
                if state.done {
                    return None;
                }
                tokio::select! {
                    result = state.rx.recv() => {
                        match result {
                            Ok(()) => {
                                state.done = true;
                                Some((Ok::<_, Infallible>("1\n".to_string()), state))
                            }
                            Err(broadcast::error::RecvError::Closed) => None,
                            Err(broadcast::error::RecvError::Lagged(_)) => {
                                state.done = true;
                                Some((Ok("1\n".to_string()), state))
                            }
                        }
                    }
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {
                        Some((Ok("0\n".to_string()), state))
                    }
                }
            });

            let mut response = Response::new(Body::from_stream(body_stream));
            *response.status_mut() = StatusCode::CREATED;
            response.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
            response
        }
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

struct RefreshState {
    rx: broadcast::Receiver<()>,
    done: bool,
}

/// Middleware appending the injected client script to HTML responses.
/// Skips non-GET requests, the refresh endpoint's own path, responses whose
/// `content-type` doesn't contain `html`, and anything already encoded
/// (`content-encoding` other than identity, where splicing would corrupt
/// the body).
pub async fn inject_script(req: axum::extract::Request, next: Next) -> Response {
    let is_get = req.method() == Method::GET;
    let path = req.uri().path().to_string();
    let mut response = next.run(req).await;

    if !is_get || path == DEFAULT_REFRESH_PATH {
        return response;
    }

    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("html"))
        .unwrap_or(false);
    let is_identity = response
        .headers()
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|enc| enc == "identity")
        .unwrap_or(true);

    if !is_html || !is_identity {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let Ok(bytes) = axum::body::to_bytes(body, usize::MAX).await else {
        return Response::from_parts(parts, Body::empty());
    };
    let mut html = bytes.to_vec();
    html.extend_from_slice(b"\n\n<script>");
    html.extend_from_slice(RUNTIME_JS.as_bytes());
    html.extend_from_slice(b"</script>");

    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.remove(header::TRANSFER_ENCODING);
    response = Response::from_parts(parts, Body::from(html));
    response
}

pub fn with_injection(app: Router) -> Router {
    app.layer(middleware::from_fn(inject_script))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hub_broadcast_wakes_all_subscribers() {
        let hub = ReloadHub::new();
        let mut rx1 = hub.subscribe();
        let mut rx2 = hub.subscribe();
        hub.broadcast();
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn default_refresh_path_is_reserved_and_unlikely_to_collide() {
        assert!(DEFAULT_REFRESH_PATH.starts_with('/'));
    }
}
