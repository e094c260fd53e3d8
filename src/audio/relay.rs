// Chunk relay queue
//
// Unbounded FIFO between one producer and one consumer. The producer side
// is cloneable (the transcoder reader and the session coordinator both hold
// it) but all clones share a single end marker: once `finish` has run,
// every later `put` is rejected.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::chunk::{Chunk, RelayItem};
use crate::error::{RelayError, Result};

/// Counters shared by both ends of a queue.
#[derive(Debug, Default)]
pub struct RelayCounters {
    enqueued: AtomicUsize,
    rejected_after_end: AtomicUsize,
}

impl RelayCounters {
    pub fn enqueued(&self) -> usize {
        self.enqueued.load(Ordering::SeqCst)
    }

    pub fn rejected_after_end(&self) -> usize {
        self.rejected_after_end.load(Ordering::SeqCst)
    }
}

struct ProducerInner {
    tx: Mutex<Option<mpsc::UnboundedSender<RelayItem>>>,
    counters: Arc<RelayCounters>,
}

impl ProducerInner {
    fn finish(&self) -> bool {
        // Taking the sender out under the lock makes the marker the last item.
        let Some(tx) = self.tx.lock().take() else {
            return false;
        };
        // The consumer may already be gone; the marker is still "sent".
        let _ = tx.send(RelayItem::End);
        true
    }
}

impl Drop for ProducerInner {
    fn drop(&mut self) {
        if self.finish() {
            debug!("Relay producer dropped without finish, end marker enqueued");
        }
    }
}

/// Producer half of the relay queue.
#[derive(Clone)]
pub struct RelayProducer {
    inner: Arc<ProducerInner>,
}

impl RelayProducer {
    /// Enqueue a chunk. Never blocks.
    ///
    /// Fails with `QueueClosed` once the end marker has been enqueued; the
    /// chunk is dropped and counted.
    pub fn put(&self, chunk: Chunk) -> Result<()> {
        let guard = self.inner.tx.lock();
        match guard.as_ref() {
            Some(tx) => {
                // A vanished consumer is not an error for the producer.
                let _ = tx.send(RelayItem::Chunk(chunk));
                self.inner.counters.enqueued.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => {
                self.inner
                    .counters
                    .rejected_after_end
                    .fetch_add(1, Ordering::SeqCst);
                warn!(bytes = chunk.len(), "Chunk rejected after end marker");
                Err(RelayError::QueueClosed)
            }
        }
    }

    /// Enqueue the end marker. Returns `true` only for the call that did it.
    pub fn finish(&self) -> bool {
        self.inner.finish()
    }

    pub fn is_finished(&self) -> bool {
        self.inner.tx.lock().is_none()
    }

    pub fn counters(&self) -> Arc<RelayCounters> {
        Arc::clone(&self.inner.counters)
    }
}

/// Consumer half of the relay queue.
pub struct RelayConsumer {
    rx: mpsc::UnboundedReceiver<RelayItem>,
    finished: bool,
}

impl RelayConsumer {
    /// Wait for the next item. After `End` has been observed every call
    /// returns `End` immediately.
    pub async fn get(&mut self) -> RelayItem {
        if self.finished {
            return RelayItem::End;
        }

        // A closed channel can only follow the marker, but treat it the same.
        let item = self.rx.recv().await.unwrap_or(RelayItem::End);
        if item.is_end() {
            self.finished = true;
        }
        item
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Create a new relay queue.
pub fn channel() -> (RelayProducer, RelayConsumer) {
    let (tx, rx) = mpsc::unbounded_channel();
    let producer = RelayProducer {
        inner: Arc::new(ProducerInner {
            tx: Mutex::new(Some(tx)),
            counters: Arc::new(RelayCounters::default()),
        }),
    };
    let consumer = RelayConsumer {
        rx,
        finished: false,
    };
    (producer, consumer)
}
