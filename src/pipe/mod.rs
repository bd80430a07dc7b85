//! Coalescing pipe carrying identity updates to SVID store plugins.
//!
//! [`buffered_pipe`] returns the two ends of a single-producer,
//! single-consumer pipe. The producer ([`PipeIn`]) is the identity rotation
//! path; it must never stall behind a slow consumer. The consumer
//! ([`PipeOut`]) is a storage plugin that only cares about the latest state.
//!
//! A forwarding task moves updates from the producer into a bounded buffer.
//! When the buffer is full, the oldest queued update is dropped to make room,
//! so memory stays bounded and the producer keeps making progress; the
//! consumer may never see intermediate updates that were superseded.
//!
//! # Example
//!
//! ```no_run
//! use futures::StreamExt as _;
//! use spire_trust::pipe::{buffered_pipe, IdentityUpdate};
//!
//! # async fn example(update: IdentityUpdate) {
//! let (pipe_in, pipe_out) = buffered_pipe(10);
//!
//! let consumer = tokio::spawn(async move {
//!     let mut updates = Box::pin(pipe_out.get_update());
//!     while let Some(update) = updates.next().await {
//!         println!("store {}", update.entry.spiffe_id);
//!     }
//! });
//!
//! if pipe_in.is_storable(&update.entry.selectors) {
//!     pipe_in.push(update).await;
//! }
//!
//! pipe_in.close().await;
//! consumer.await.unwrap();
//! # }
//! ```

mod buffer;

use crate::bundle::TrustBundle;
use crate::cert::{Certificate, PrivateKey};
use crate::prelude::{debug, error, info, warn};
use crate::selectors::Selector;
use crate::spiffe_id::{SpiffeId, TrustDomain};
use buffer::{CoalescingBuffer, Pop};
use futures::Stream;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The registration entry an identity was issued for.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RegistrationEntry {
    /// Entry id.
    pub entry_id: String,
    /// The SPIFFE ID issued to the workload.
    pub spiffe_id: SpiffeId,
    /// Selectors of the entry, including storage-capability markers.
    pub selectors: Vec<Selector>,
}

/// Newly issued or rotated identity material, with the bundles needed to
/// verify it.
#[derive(Clone)]
pub struct IdentityUpdate {
    /// The entry the identity belongs to.
    pub entry: RegistrationEntry,
    /// X.509 SVID chain, leaf first.
    pub svid: Vec<Certificate>,
    /// Private key of the leaf certificate.
    pub private_key: PrivateKey,
    /// Bundle of the entry's own trust domain.
    pub bundle: TrustBundle,
    /// Bundles of the trust domains the entry federates with.
    pub federated_bundles: HashMap<TrustDomain, TrustBundle>,
}

impl fmt::Debug for IdentityUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityUpdate")
            .field("entry", &self.entry)
            .field("svid_len", &self.svid.len())
            .field("private_key", &self.private_key)
            .field("bundle", &self.bundle.trust_domain_id())
            .field(
                "federated_bundles",
                &self.federated_bundles.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Returns `true` if one of `selectors` marks the entry as storable by SVID
/// store plugins.
pub fn is_storable(selectors: &[Selector]) -> bool {
    selectors.iter().any(Selector::is_svid_store)
}

/// Creates a coalescing pipe holding at most `buffer_size` pending updates.
///
/// A `buffer_size` of zero is raised to one: the pipe always keeps the latest
/// update.
///
/// The forwarding task is spawned on the current Tokio runtime.
///
/// # Panics
///
/// Panics if called outside of a Tokio runtime.
pub fn buffered_pipe(buffer_size: usize) -> (PipeIn, PipeOut) {
    let capacity = if buffer_size == 0 {
        warn!("Pipe buffer size must be positive; using 1");
        1
    } else {
        buffer_size
    };

    // Single-slot intake: a push completes once the worker can take the update.
    let (tx, rx) = mpsc::channel(1);
    let buffer = Arc::new(CoalescingBuffer::new(capacity));
    let worker = tokio::spawn(forward(rx, Arc::clone(&buffer)));

    let pipe_in = PipeIn {
        intake: RwLock::new(Some(Intake { tx, worker })),
        done: CancellationToken::new(),
    };

    (pipe_in, PipeOut { buffer })
}

async fn forward(
    mut rx: mpsc::Receiver<IdentityUpdate>,
    buffer: Arc<CoalescingBuffer<IdentityUpdate>>,
) {
    // Drains every accepted update before closing the buffer.
    while let Some(update) = rx.recv().await {
        if let Some(dropped) = buffer.push_evicting(update) {
            debug!(
                "Dropped superseded identity update: entry_id={}, spiffe_id={}",
                dropped.entry.entry_id, dropped.entry.spiffe_id
            );
        }
    }
    buffer.close();
    info!("Identity update pipe closed");
}

struct Intake {
    tx: mpsc::Sender<IdentityUpdate>,
    worker: JoinHandle<()>,
}

/// Producer end of the pipe.
pub struct PipeIn {
    // `push` holds the read side for the duration of its attempt; `close`
    // takes the write side, so the intake is never torn down mid-push.
    intake: RwLock<Option<Intake>>,
    done: CancellationToken,
}

impl fmt::Debug for PipeIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeIn")
            .field("intake", &"<RwLock<Option<Intake>>>")
            .field("closed", &self.done.is_cancelled())
            .finish()
    }
}

impl PipeIn {
    /// Returns `true` if one of `selectors` marks the entry as storable.
    ///
    /// See [`is_storable`].
    pub fn is_storable(&self, selectors: &[Selector]) -> bool {
        is_storable(selectors)
    }

    /// Hands `update` to the pipe.
    ///
    /// Waits only until the forwarding task accepts the update, never for the
    /// consumer. Once [`PipeIn::close`] has been called the update is
    /// silently dropped, and a push still waiting at that point gives up.
    pub async fn push(&self, update: IdentityUpdate) {
        if self.done.is_cancelled() {
            return;
        }

        let intake = self.intake.read().await;
        let Some(intake) = intake.as_ref() else {
            return;
        };

        let entry_id = update.entry.entry_id.clone();
        tokio::select! {
            biased;
            () = self.done.cancelled() => {
                debug!("Pipe closed; dropping identity update: entry_id={entry_id}");
            }
            res = intake.tx.send(update) => {
                if res.is_err() {
                    debug!("Forwarding task gone; dropping identity update: entry_id={entry_id}");
                }
            }
        }
    }

    /// Closes the pipe and waits for the forwarding task to exit.
    ///
    /// Updates already accepted are still delivered to the buffer before the
    /// consumer observes the end of the stream. Calling `close` again is a
    /// no-op.
    pub async fn close(&self) {
        self.done.cancel();

        let mut intake = self.intake.write().await;
        let Some(Intake { tx, worker }) = intake.take() else {
            return;
        };
        drop(tx);

        if let Err(e) = worker.await {
            error!("Identity update forwarding task failed: {e}");
        }
    }

    /// Returns `true` once [`PipeIn::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.done.is_cancelled()
    }
}

/// Consumer end of the pipe.
///
/// There is exactly one consumer per pipe: this type is not `Clone`, and
/// reading requires `&mut self` or ownership.
pub struct PipeOut {
    buffer: Arc<CoalescingBuffer<IdentityUpdate>>,
}

impl fmt::Debug for PipeOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeOut")
            .field("pending", &self.buffer.len())
            .field("closed", &self.buffer.is_closed())
            .finish()
    }
}

impl PipeOut {
    /// Waits for the next pending update.
    ///
    /// Returns `None` once the pipe is closed and every pending update has
    /// been read.
    pub async fn recv(&mut self) -> Option<IdentityUpdate> {
        loop {
            match self.buffer.try_pop() {
                Pop::Item(update) => return Some(update),
                Pop::Closed => return None,
                Pop::Empty => self.buffer.wait().await,
            }
        }
    }

    /// Returns the next pending update without waiting.
    pub fn try_recv(&mut self) -> Option<IdentityUpdate> {
        match self.buffer.try_pop() {
            Pop::Item(update) => Some(update),
            Pop::Empty | Pop::Closed => None,
        }
    }

    /// Returns `true` once the pipe is closed and fully drained.
    pub fn is_closed(&self) -> bool {
        self.buffer.is_closed() && self.buffer.len() == 0
    }

    /// Turns this end into a stream of updates that ends when the pipe is
    /// closed and drained.
    pub fn get_update(self) -> impl Stream<Item = IdentityUpdate> + Send + 'static {
        futures::stream::unfold(self, |mut out| async move {
            let update = out.recv().await?;
            Some((update, out))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use futures::StreamExt as _;
    use std::time::Duration;

    fn update(entry_id: &str) -> IdentityUpdate {
        let td = TrustDomain::new("example.org").unwrap();
        IdentityUpdate {
            entry: RegistrationEntry {
                entry_id: entry_id.to_string(),
                spiffe_id: SpiffeId::new("spiffe://example.org/workload").unwrap(),
                selectors: vec![Selector::new("svidstore", "type:aws_secretsmanager")],
            },
            svid: vec![Certificate::from(vec![1, 2, 3])],
            private_key: PrivateKey::from(vec![4, 5, 6]),
            bundle: TrustBundle::new(&td),
            federated_bundles: HashMap::new(),
        }
    }

    #[test]
    fn test_is_storable() {
        assert!(is_storable(&[
            Selector::new("unix", "uid:1000"),
            Selector::new("SVIDStore", "type:disk"),
        ]));
        assert!(!is_storable(&[Selector::new("unix", "uid:1000")]));
        assert!(!is_storable(&[]));
    }

    #[tokio::test]
    async fn test_zero_capacity_keeps_latest() {
        let (pipe_in, mut pipe_out) = buffered_pipe(0);
        assert!(pipe_in.is_storable(&update("a").entry.selectors));

        pipe_in.push(update("a")).await;
        pipe_in.push(update("b")).await;
        pipe_in.close().await;

        assert_eq!(pipe_out.recv().await.unwrap().entry.entry_id, "b");
        assert!(pipe_out.recv().await.is_none());
        assert!(pipe_out.is_closed());
    }

    #[tokio::test]
    async fn test_try_recv_on_empty_pipe() {
        let (pipe_in, mut pipe_out) = buffered_pipe(2);
        assert!(pipe_out.try_recv().is_none());
        assert!(!pipe_out.is_closed());

        pipe_in.close().await;
        assert!(pipe_out.try_recv().is_none());
        assert!(pipe_out.is_closed());
    }

    #[tokio::test]
    async fn test_stream_ends_after_close() {
        let (pipe_in, pipe_out) = buffered_pipe(4);

        let consumer = tokio::spawn(async move {
            pipe_out
                .get_update()
                .map(|u| u.entry.entry_id)
                .collect::<Vec<_>>()
                .await
        });

        pipe_in.push(update("a")).await;
        pipe_in.push(update("b")).await;
        pipe_in.close().await;

        let seen = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("stream ends within timeout")
            .unwrap();
        assert_eq!(seen, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_debug_hides_key_material() {
        let rendered = format!("{:?}", update("a"));
        assert!(rendered.contains("entry_id: \"a\""));
        assert!(!rendered.contains("[4, 5, 6]"));
    }
}
