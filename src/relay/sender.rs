//! Output sender: engine outbound channel to the client's event stream
//!
//! The stream opens with one `endpoint` event naming the submit URL, then
//! carries one `message` event per engine output. It stays open while the
//! session streams, stops at the first cancellation, and closes once the
//! response body is dropped. Dropping it early (client gone) trips the
//! session's disconnect guard.

use super::lifecycle::DisconnectGuard;
use super::RelaySettings;
use crate::mailbox::SessionId;
use crate::mcp::JsonRpcMessage;
use axum::body::{Body, Bytes};
use axum::http::header::{HeaderValue, CACHE_CONTROL, CONTENT_TYPE};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

/// Header telling reverse proxies not to buffer the stream.
pub const X_ACCEL_BUFFERING: &str = "x-accel-buffering";

/// Submit URL advertised to the client for `session_id`.
///
/// Each path segment is percent-encoded; the session id goes in the query
/// string as 32 hex digits.
pub fn endpoint_url(settings: &RelaySettings, session_id: &SessionId) -> String {
    let path = format!(
        "{}/{}",
        settings.public_base_path.trim_end_matches('/'),
        settings.messages_path.trim_start_matches('/')
    );
    let encoded = path
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    format!("{encoded}?session_id={}", session_id.simple())
}

/// Comment line written ahead of the first event so buffering proxies flush.
pub fn padding_comment(len: usize) -> Bytes {
    let mut buf = Vec::with_capacity(len + 4);
    buf.extend_from_slice(b": ");
    buf.resize(len + 2, b' ');
    buf.extend_from_slice(b"\n\n");
    Bytes::from(buf)
}

pub struct OutputSender {
    session_id: SessionId,
    endpoint_url: String,
    outbound: mpsc::Receiver<JsonRpcMessage>,
    cancel: CancellationToken,
    guard: DisconnectGuard,
    keep_alive: Duration,
    padding_bytes: usize,
}

impl OutputSender {
    pub(crate) fn new(
        session_id: SessionId,
        outbound: mpsc::Receiver<JsonRpcMessage>,
        cancel: CancellationToken,
        guard: DisconnectGuard,
        settings: &RelaySettings,
    ) -> Self {
        Self {
            session_id,
            endpoint_url: endpoint_url(settings, &session_id),
            outbound,
            cancel,
            guard,
            keep_alive: settings.keep_alive,
            padding_bytes: settings.padding_bytes,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    /// The session's events, ending at cancellation or when the engine
    /// drops its outbound sender.
    pub fn into_events(self) -> SessionEventStream {
        let endpoint = Event::default().event("endpoint").data(self.endpoint_url);
        let messages = ReceiverStream::new(self.outbound)
            .map(|message| Event::default().event("message").data(message.to_json()));

        let inner = stream::once(async move { endpoint })
            .chain(messages)
            .take_until(self.cancel.cancelled_owned())
            .map(Ok)
            .boxed();

        SessionEventStream {
            inner,
            _guard: self.guard,
        }
    }

    /// Full streaming response: SSE framing, keep-alive comments, proxy
    /// headers and the first-chunk padding.
    pub fn into_response(self) -> Response {
        let keep_alive = KeepAlive::new().interval(self.keep_alive).text("ping");
        let padding = self.padding_bytes;
        let response = Sse::new(self.into_events())
            .keep_alive(keep_alive)
            .into_response();

        let (mut parts, body) = response.into_parts();
        parts
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
        parts
            .headers
            .insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        parts
            .headers
            .insert(X_ACCEL_BUFFERING, HeaderValue::from_static("no"));

        let body = if padding > 0 {
            pad_first_chunk(body, padding_comment(padding))
        } else {
            body
        };
        Response::from_parts(parts, body)
    }
}

/// Event stream that keeps the disconnect guard alive for as long as the
/// response body exists.
pub struct SessionEventStream {
    inner: BoxStream<'static, Result<Event, Infallible>>,
    _guard: DisconnectGuard,
}

impl Stream for SessionEventStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

fn pad_first_chunk(body: Body, prefix: Bytes) -> Body {
    let mut prefix = Some(prefix);
    let stream = body.into_data_stream().map(move |chunk| {
        chunk.map(|bytes| match prefix.take() {
            Some(prefix) => {
                let mut buf = Vec::with_capacity(prefix.len() + bytes.len());
                buf.extend_from_slice(&prefix);
                buf.extend_from_slice(&bytes);
                Bytes::from(buf)
            }
            None => bytes,
        })
    });
    Body::from_stream(stream)
}
