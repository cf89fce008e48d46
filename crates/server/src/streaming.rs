//! Heartbeat-and-disconnect streaming layer
//!
//! Sits between the workflow's framed output stream and the wire. A reader
//! task pulls frames into a bounded channel; the response body drains the
//! channel with a timeout and emits a heartbeat frame whenever the backend
//! is still prefilling. Client disconnects surface as the body stream being
//! dropped, which converts into a cancellation for the request (firing the
//! backend's abort callback) before the registry entry is cleared.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::mpsc;

use llm_gateway_core::{heartbeat_frame, ApiKind, CancellationRegistry};

/// Kept short so a client abort is noticed before the next workflow node
/// spends tokens on a dead request.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

const CHANNEL_CAPACITY: usize = 32;

/// Converts a dropped response body into a cancellation, and clears the
/// registry entry once the stream is over either way.
struct DisconnectGuard {
    registry: Arc<CancellationRegistry>,
    request_id: String,
    finished: bool,
}

impl DisconnectGuard {
    fn new(registry: Arc<CancellationRegistry>, request_id: String) -> Self {
        Self {
            registry,
            request_id,
            finished: false,
        }
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if !self.finished && !self.registry.is_cancelled(&self.request_id) {
            tracing::info!(
                request_id = %self.request_id,
                "Client disconnected mid-stream, requesting cancellation"
            );
            self.registry.request_cancellation(&self.request_id);
        }
        self.registry.acknowledge_cancellation(&self.request_id);
    }
}

/// Wrap a workflow output stream into a response body with heartbeats.
pub fn heartbeat_stream(
    api_kind: ApiKind,
    request_id: String,
    registry: Arc<CancellationRegistry>,
    mut upstream: BoxStream<'static, String>,
) -> Body {
    let (tx, mut rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);

    let reader_id = request_id.clone();
    tokio::spawn(async move {
        while let Some(frame) = upstream.next().await {
            if tx.send(frame).await.is_err() {
                tracing::debug!(
                    request_id = %reader_id,
                    "Response body gone, stopping workflow reader"
                );
                break;
            }
        }
    });

    let mut guard = DisconnectGuard::new(registry, request_id);
    Body::from_stream(async_stream::stream! {
        loop {
            match tokio::time::timeout(HEARTBEAT_INTERVAL, rx.recv()).await {
                Ok(Some(frame)) => {
                    yield Ok::<_, std::convert::Infallible>(Bytes::from(frame));
                }
                Ok(None) => break,
                Err(_) => {
                    yield Ok(Bytes::from_static(heartbeat_frame(api_kind)));
                }
            }
        }
        guard.finish();
    })
}

/// Direct forwarding without heartbeats, for deployments that disable them.
/// Disconnect detection is delayed until the next write in this mode.
pub fn direct_stream(
    request_id: String,
    registry: Arc<CancellationRegistry>,
    upstream: BoxStream<'static, String>,
) -> Body {
    let mut guard = DisconnectGuard::new(registry, request_id);
    Body::from_stream(async_stream::stream! {
        futures::pin_mut!(upstream);
        while let Some(frame) = upstream.next().await {
            yield Ok::<_, std::convert::Infallible>(Bytes::from(frame));
        }
        guard.finish();
    })
}
