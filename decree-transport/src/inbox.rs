//! Actor mailboxes: the receiving half of a request/reply exchange.
//!
//! An actor owns an [`Inbox`] and processes one request at a time, in
//! arrival order. Each request comes with a [`ReplyHandle`] that must be
//! fulfilled exactly once; dropping it unfulfilled surfaces to the
//! caller as [`CallError::Down`](crate::CallError::Down).

use decree_core::{JsonCodec, MessageCodec};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

/// A request in flight: the encoded payload plus the channel the reply
/// travels back on.
pub(crate) struct Envelope {
    pub(crate) payload: Vec<u8>,
    pub(crate) reply: oneshot::Sender<Vec<u8>>,
}

/// The receiving end of an actor's mailbox.
pub struct Inbox {
    rx: mpsc::Receiver<Envelope>,
    codec: JsonCodec,
}

impl Inbox {
    pub(crate) fn new(rx: mpsc::Receiver<Envelope>, codec: JsonCodec) -> Self {
        Self { rx, codec }
    }

    /// Receive the next request, decoded as `Req`.
    ///
    /// Requests that fail to decode are logged and skipped; a malformed
    /// message never takes the actor down. Returns `None` when the
    /// mailbox is closed (the node left the cluster).
    pub async fn next<Req: DeserializeOwned>(&mut self) -> Option<(Req, ReplyHandle)> {
        loop {
            let envelope = self.rx.recv().await?;
            match self.codec.decode::<Req>(&envelope.payload) {
                Ok(request) => {
                    return Some((
                        request,
                        ReplyHandle {
                            tx: envelope.reply,
                            codec: self.codec,
                        },
                    ))
                }
                Err(error) => {
                    tracing::warn!(%error, "dropping undecodable request");
                }
            }
        }
    }
}

/// One-shot handle for answering a single request.
pub struct ReplyHandle {
    tx: oneshot::Sender<Vec<u8>>,
    codec: JsonCodec,
}

impl ReplyHandle {
    /// Encode and send the reply. Consumes the handle.
    ///
    /// A caller that already gave up (timed out) is not an error; the
    /// reply is silently discarded.
    pub fn send<Rep: Serialize>(self, reply: &Rep) {
        match self.codec.encode(reply) {
            Ok(payload) => {
                let _ = self.tx.send(payload);
            }
            Err(error) => {
                tracing::error!(%error, "failed to encode reply");
            }
        }
    }
}
