//! ## Multiplexed broadcast transport
//!
//! Lets any number of independently typed message streams share one broadcast medium.
//!
//! Every message on the wire is `<tag><json>`, with no delimiter in between, where `tag` is
//! the [Tagged::TAG] of the message type and `json` is the message encoded as a JSON object.
//! The receiver picks the destination stream by testing for `tag` followed directly by `{`.
//!
//! Which streams go where is decided once, at startup, by registering them on a
//! [TransmitterBuilder] or [ReceiverBuilder]. `build()` checks the registration table and
//! refuses configurations where the tag alone would be ambiguous. These errors are meant to
//! stop the program, see [TransportConfigError].
//!
//! ## Payloads that can not be encoded
//! `build()` does not look at payload values. That a type is serializable at all is checked by the
//! compiler through the serde bounds on [Tagged]. A value that serde_json still refuses (a map with
//! non-tuple keys, a failing custom `Serialize`) or that encodes to something else than a JSON
//! object is only found when it is sent. The transmitter then logs an [EncodeError] and drops that
//! one message, it does not stop.
//!
//! ## Tag prefixes
//! If one tag is a textual prefix of another (`a.Ping` and `a.PingReply`), a plain prefix test
//! would route `a.PingReply{..}` to the `a.Ping` stream as well. The receiver avoids this by
//! requiring the `{` right after the tag, and tags are not allowed to contain `{`. Such pairs are
//! still reported with a warning at startup, since other nodes on the medium may not be as strict.

use crate::config;
use crate::print;
use super::medium::Medium;

use std::any::TypeId;
use std::io;
use futures::future::{self, BoxFuture};
use futures::stream::{self, BoxStream, SelectAll};
use futures::{FutureExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;


/// First byte of every encoded payload
pub const OBJECT_OPEN: u8 = b'{';

/// A message type that can be sent through the transport.
///
/// `TAG` must be stable between builds and unique among all message types sharing a port.
/// The convention in this crate is `"<module>.<TypeName>"`.
///
/// The type has to serialize to a JSON object (a struct or a map with string keys). This is not
/// checked at startup: other values fail with [EncodeError] on every send.
///
/// ## Example
/// ```
/// use serde::{Serialize, Deserialize};
/// use elevatorsync::network::bcast::Tagged;
///
/// #[derive(Serialize, Deserialize)]
/// struct Heartbeat { seq: u32 }
///
/// impl Tagged for Heartbeat {
///     const TAG: &'static str = "demo.Heartbeat";
/// }
/// ```
pub trait Tagged: Serialize + DeserializeOwned + Send + 'static {
    /// Wire tag written in front of every encoded message of this type
    const TAG: &'static str;
}


/// Invalid transport configuration. Detected once at startup, and should abort the program.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportConfigError {
    /// Two streams carry the same message type
    #[error("all streams must carry different message types, stream #{first} and stream #{second} both carry '{type_name}'")]
    DuplicateType {
        /// Position of the first stream (1-based)
        first: usize,
        /// Position of the second stream (1-based)
        second: usize,
        /// Name of the message type
        type_name: &'static str,
    },

    /// Two different message types use the same tag
    #[error("stream #{first} and stream #{second} both use tag '{tag}'")]
    DuplicateTag {
        /// Position of the first stream (1-based)
        first: usize,
        /// Position of the second stream (1-based)
        second: usize,
        /// The shared tag
        tag: &'static str,
    },

    /// The tag can not be matched reliably on the wire
    #[error("tag '{tag}' of stream #{index} can not be used on the wire: {reason}")]
    InvalidTag {
        /// Position of the stream (1-based)
        index: usize,
        /// The offending tag
        tag: &'static str,
        /// What is wrong with it
        reason: &'static str,
    },
}

/// A message that could not be put on the wire
#[derive(Debug, Error)]
pub enum EncodeError {
    /// serde_json refused the value, e.g. a map with non-string keys
    #[error("failed to encode '{tag}': {source}")]
    Json {
        /// Tag of the message type
        tag: &'static str,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// The value encoded to something else than a JSON object and could never be matched by a receiver
    #[error("'{tag}' does not encode to a JSON object")]
    NotAnObject {
        /// Tag of the message type
        tag: &'static str,
    },
}


/// Encodes `msg` as `<tag><json>`.
///
/// ## Returns
/// - The datagram, ready to be broadcast
/// - [EncodeError] if the message has no JSON object representation
pub fn encode<T: Tagged>(msg: &T) -> Result<Vec<u8>, EncodeError> {
    let json = serde_json::to_vec(msg).map_err(|source| EncodeError::Json { tag: T::TAG, source })?;
    if json.first() != Some(&OBJECT_OPEN) {
        return Err(EncodeError::NotAnObject { tag: T::TAG });
    }
    let mut datagram = Vec::with_capacity(T::TAG.len() + json.len());
    datagram.extend_from_slice(T::TAG.as_bytes());
    datagram.extend_from_slice(&json);
    Ok(datagram)
}

/// Returns `true` if `datagram` starts with `tag` directly followed by [OBJECT_OPEN].
pub fn matches_tag(datagram: &[u8], tag: &str) -> bool {
    datagram.starts_with(tag.as_bytes()) && datagram.get(tag.len()) == Some(&OBJECT_OPEN)
}

/// Decodes a datagram tagged for `T`.
///
/// ## Returns
/// - `None` if the datagram is for another type, or is malformed
pub fn decode<T: Tagged>(datagram: &[u8]) -> Option<T> {
    if !matches_tag(datagram, T::TAG) {
        return None;
    }
    serde_json::from_slice(&datagram[T::TAG.len()..]).ok()
}


/// One row in the registration table
#[derive(Debug, Clone)]
struct Registration {
    type_id: TypeId,
    type_name: &'static str,
    tag: &'static str,
}

impl Registration {
    fn of<T: Tagged>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            tag: T::TAG,
        }
    }
}

/// Checks the registration table. Stream positions in errors are 1-based.
fn validate(table: &[Registration]) -> Result<(), TransportConfigError> {
    for (i, reg) in table.iter().enumerate() {
        if reg.tag.is_empty() {
            return Err(TransportConfigError::InvalidTag { index: i + 1, tag: reg.tag, reason: "tag is empty" });
        }
        if reg.tag.as_bytes().contains(&OBJECT_OPEN) {
            return Err(TransportConfigError::InvalidTag { index: i + 1, tag: reg.tag, reason: "tag contains '{'" });
        }

        for (j, earlier) in table[..i].iter().enumerate() {
            if earlier.type_id == reg.type_id {
                return Err(TransportConfigError::DuplicateType { first: j + 1, second: i + 1, type_name: reg.type_name });
            }
            if earlier.tag == reg.tag {
                return Err(TransportConfigError::DuplicateTag { first: j + 1, second: i + 1, tag: reg.tag });
            }
        }
    }

    for a in table {
        for b in table {
            if a.tag != b.tag && b.tag.starts_with(a.tag) {
                print::warn(format!(
                    "Tag '{}' is a prefix of tag '{}'. Routed by the '{{' after the tag, but peers matching on the prefix alone will mix them up",
                    a.tag, b.tag
                ));
            }
        }
    }
    Ok(())
}


/// Collects the outbound streams of a [Transmitter]
pub struct TransmitterBuilder {
    table: Vec<Registration>,
    frames: Vec<BoxStream<'static, Result<Vec<u8>, EncodeError>>>,
}

impl TransmitterBuilder {
    /// Registers an outbound stream. Every value received on `rx` is broadcast.
    pub fn stream<T: Tagged>(mut self, rx: mpsc::Receiver<T>) -> Self {
        self.table.push(Registration::of::<T>());
        let frames = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (encode(&msg), rx))
        });
        self.frames.push(frames.boxed());
        self
    }

    /// Validates the registration table.
    ///
    /// ## Returns
    /// - [TransportConfigError] if two streams carry the same type or tag, or a tag is unusable
    ///
    /// ## Note
    /// Only the tags are checked. Payloads that can not be encoded show up as [EncodeError] when sent.
    pub fn build(self) -> Result<Transmitter, TransportConfigError> {
        validate(&self.table)?;
        Ok(Transmitter {
            tags: self.table.iter().map(|r| r.tag).collect(),
            frames: stream::select_all(self.frames),
        })
    }
}

/// Encodes values from all registered streams and broadcasts them.
pub struct Transmitter {
    tags: Vec<&'static str>,
    frames: SelectAll<BoxStream<'static, Result<Vec<u8>, EncodeError>>>,
}

impl Transmitter {
    /// Starts an empty registration table
    pub fn builder() -> TransmitterBuilder {
        TransmitterBuilder { table: Vec::new(), frames: Vec::new() }
    }

    /// Tags of the registered streams, in registration order
    pub fn tags(&self) -> &[&'static str] {
        &self.tags
    }

    /// Runs the transmitter on `medium`.
    ///
    /// ## Behavior
    /// - Waits for any registered stream to have a value. There is no priority between the streams
    /// - Encodes the value and broadcasts it right away
    /// - Order is kept within one stream, not across streams
    /// - Failed sends are logged and dropped. The periodic re-broadcast of the state makes up for lost packets
    ///
    /// ## Note
    /// Returns when every registered stream is closed.
    pub async fn run<M: Medium>(mut self, mut medium: M) {
        while let Some(frame) = self.frames.next().await {
            match frame {
                Ok(datagram) => {
                    if let Err(e) = medium.send(&datagram).await {
                        print::warn(format!("bcast.rs, transmitter: send failed: {}", e));
                    }
                }
                Err(e) => print::err(format!("bcast.rs, transmitter: {}", e)),
            }
        }
    }
}


/// A destination stream, type erased so the receiver can hold a table of them
trait Route: Send + Sync {
    fn tag(&self) -> &'static str;
    /// Completes when the destination has been dropped
    fn closed(&self) -> BoxFuture<'_, ()>;
    /// Decodes the datagram. `None` if it is not for this route or malformed
    fn deliver<'a>(&'a self, datagram: &[u8]) -> Option<BoxFuture<'a, ()>>;
}

struct TypedRoute<T> {
    tx: mpsc::Sender<T>,
}

impl<T: Tagged> Route for TypedRoute<T> {
    fn tag(&self) -> &'static str {
        T::TAG
    }

    fn closed(&self) -> BoxFuture<'_, ()> {
        self.tx.closed().boxed()
    }

    fn deliver<'a>(&'a self, datagram: &[u8]) -> Option<BoxFuture<'a, ()>> {
        let msg = decode::<T>(datagram)?;
        Some(async move {
            // Mottakar borte: meldinga har ingen å gå til
            let _ = self.tx.send(msg).await;
        }.boxed())
    }
}

/// Collects the inbound streams of a [Receiver]
pub struct ReceiverBuilder {
    table: Vec<Registration>,
    routes: Vec<Box<dyn Route>>,
}

impl ReceiverBuilder {
    /// Registers an inbound stream. Every datagram tagged for `T` is decoded and sent on `tx`.
    pub fn stream<T: Tagged>(mut self, tx: mpsc::Sender<T>) -> Self {
        self.table.push(Registration::of::<T>());
        self.routes.push(Box::new(TypedRoute { tx }));
        self
    }

    /// Validates the registration table.
    ///
    /// ## Returns
    /// - [TransportConfigError] if two streams carry the same type or tag, or a tag is unusable
    pub fn build(self) -> Result<Receiver, TransportConfigError> {
        validate(&self.table)?;
        Ok(Receiver { routes: self.routes })
    }
}

/// Reads datagrams and hands them to the registered streams
pub struct Receiver {
    routes: Vec<Box<dyn Route>>,
}

impl Receiver {
    /// Starts an empty registration table
    pub fn builder() -> ReceiverBuilder {
        ReceiverBuilder { table: Vec::new(), routes: Vec::new() }
    }

    /// Tags of the registered streams, in registration order
    pub fn tags(&self) -> Vec<&'static str> {
        self.routes.iter().map(|r| r.tag()).collect()
    }

    /// Delivers one datagram to every stream whose tag it matches.
    ///
    /// Waits for room in the destination channel.
    ///
    /// ## Returns
    /// - `true` if the datagram was delivered somewhere, `false` if it was unmatched or malformed
    pub async fn dispatch(&self, datagram: &[u8]) -> bool {
        let mut delivered = false;
        for route in &self.routes {
            if let Some(delivery) = route.deliver(datagram) {
                delivery.await;
                delivered = true;
            }
        }
        delivered
    }

    /// Runs the receiver on `medium`.
    ///
    /// ## Behavior
    /// - Reads one datagram at a time and [dispatch](Receiver::dispatch)es it
    /// - Unmatched or malformed datagrams are dropped. Other traffic on the port is expected
    /// - Receive errors are logged and reading continues
    /// - Stops waiting as soon as every destination is dropped, also on a quiet medium
    ///
    /// ## Returns
    /// - `Ok(())` when every destination stream is closed
    /// - `Err` if the medium is gone for good
    pub async fn run<M: Medium>(self, mut medium: M) -> io::Result<()> {
        let mut buf = vec![0u8; config::UDP_BUFFER];
        let all_closed = future::join_all(self.routes.iter().map(|r| r.closed()));
        tokio::pin!(all_closed);

        loop {
            let received = tokio::select! {
                received = medium.recv(&mut buf) => received,
                _ = &mut all_closed => return Ok(()),
            };

            match received {
                Ok(len) => {
                    if !self.dispatch(&buf[..len]).await {
                        print::debug(format!("bcast.rs, receiver: dropped {} byte datagram", len));
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => return Err(e),
                Err(e) => print::warn(format!("bcast.rs, receiver: recv failed: {}", e)),
            }
        }
    }
}
