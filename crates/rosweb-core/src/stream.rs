// ── Reactive streams ──
//
// Channel-backed adapters for consumers that prefer `Stream` combinators
// over callbacks.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use rosweb_api::ConnectionState;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::{UnboundedReceiverStream, WatchStream};

use crate::registry::{InboundMessage, SubscriptionHandle};

/// Messages of one subscription, delivered through an unbounded channel.
///
/// Dropping the stream does not unsubscribe; pass [`handle`](Self::handle)
/// to `unsubscribe` for that. After unsubscribe or session shutdown the
/// stream ends once the buffered messages are drained.
pub struct TopicStream {
    handle: SubscriptionHandle,
    inner: UnboundedReceiverStream<InboundMessage>,
}

impl TopicStream {
    pub(crate) fn new(
        handle: SubscriptionHandle,
        receiver: mpsc::UnboundedReceiver<InboundMessage>,
    ) -> Self {
        Self {
            handle,
            inner: UnboundedReceiverStream::new(receiver),
        }
    }

    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }

    /// Wait for the next message. Returns `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<InboundMessage> {
        std::future::poll_fn(|cx| Pin::new(&mut self.inner).poll_next(cx)).await
    }
}

impl Stream for TopicStream {
    type Item = InboundMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Connection state changes as a `Stream`, starting with the current state.
pub struct ConnectionStream {
    inner: WatchStream<ConnectionState>,
}

impl ConnectionStream {
    pub(crate) fn new(receiver: watch::Receiver<ConnectionState>) -> Self {
        Self {
            inner: WatchStream::new(receiver),
        }
    }
}

impl Stream for ConnectionStream {
    type Item = ConnectionState;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
