//! Ordered completion queue as an actor.
//!
//! The actor owns an [`OrderedQueue`] and is driven by `Submit` / `Complete`
//! messages. Releases leave through a channel as [`Delivery`] values in
//! submission order. Submitting from inside a delivery handler is just another
//! message, so reentrancy needs no special casing.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use arc_core::{OrderedQueue, QueueError};

use crate::types::{RuntimeError, RuntimeResult};

enum Message<T> {
    Submit {
        key: String,
        reply: oneshot::Sender<Result<(), QueueError>>,
    },
    Complete {
        key: String,
        payload: T,
        reply: Option<oneshot::Sender<Result<usize, QueueError>>>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery<T> {
    pub key: String,
    pub payload: T,
}

/// Final tally reported when the actor stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueSummary {
    pub delivered: usize,
    /// Entries still pending when the last handle was dropped.
    pub stalled: usize,
}

pub struct QueueHandle<T> {
    tx: mpsc::UnboundedSender<Message<T>>,
}

impl<T> Clone for QueueHandle<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Send + 'static> QueueHandle<T> {
    pub async fn submit(&self, key: &str) -> RuntimeResult<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Message::Submit {
                key: key.to_string(),
                reply,
            })
            .map_err(|_| RuntimeError::QueueClosed)?;
        rx.await
            .map_err(|_| RuntimeError::QueueClosed)?
            .map_err(|e| RuntimeError::Core(e.into()))
    }

    /// Complete `key` and wait for the number of deliveries it released.
    pub async fn complete(&self, key: &str, payload: T) -> RuntimeResult<usize> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Message::Complete {
                key: key.to_string(),
                payload,
                reply: Some(reply),
            })
            .map_err(|_| RuntimeError::QueueClosed)?;
        rx.await
            .map_err(|_| RuntimeError::QueueClosed)?
            .map_err(|e| RuntimeError::Core(e.into()))
    }

    /// Complete without waiting. Rejections are logged by the actor.
    pub fn complete_detached(&self, key: &str, payload: T) {
        let _ = self.tx.send(Message::Complete {
            key: key.to_string(),
            payload,
            reply: None,
        });
    }
}

/// Start the actor. It runs until every handle is dropped.
pub fn spawn_queue<T: Send + 'static>() -> (
    QueueHandle<T>,
    mpsc::UnboundedReceiver<Delivery<T>>,
    JoinHandle<QueueSummary>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (out, deliveries) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(rx, out));
    (QueueHandle { tx }, deliveries, task)
}

async fn run<T>(
    mut rx: mpsc::UnboundedReceiver<Message<T>>,
    out: mpsc::UnboundedSender<Delivery<T>>,
) -> QueueSummary {
    let mut queue: OrderedQueue<String, T> = OrderedQueue::new();
    let mut summary = QueueSummary::default();

    while let Some(message) = rx.recv().await {
        match message {
            Message::Submit { key, reply } => {
                let result = queue.submit(key);
                if let Err(e) = &result {
                    tracing::warn!("Queue rejected submit: {e}");
                }
                let _ = reply.send(result);
            }
            Message::Complete {
                key,
                payload,
                reply,
            } => {
                let result = queue.complete(&key, payload).map(|released| {
                    let count = released.len();
                    for (key, payload) in released {
                        let _ = out.send(Delivery { key, payload });
                    }
                    count
                });
                match &result {
                    Ok(count) => summary.delivered += count,
                    Err(e) => tracing::warn!("Queue rejected completion: {e}"),
                }
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
        }
    }

    summary.stalled = queue.len();
    if summary.stalled > 0 {
        tracing::warn!(
            "Queue stopped with {} entries stalled ({} blocked behind the head)",
            summary.stalled,
            queue.blocked_count()
        );
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<Delivery<u32>>) -> Vec<String> {
        let mut keys = Vec::new();
        while let Ok(d) = rx.try_recv() {
            keys.push(d.key);
        }
        keys
    }

    #[tokio::test]
    async fn test_releases_in_submission_order() {
        let (handle, mut rx, task) = spawn_queue::<u32>();
        for key in ["a", "b", "c"] {
            handle.submit(key).await.unwrap();
        }

        assert_eq!(handle.complete("c", 3).await.unwrap(), 0);
        assert_eq!(handle.complete("b", 2).await.unwrap(), 0);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(handle.complete("a", 1).await.unwrap(), 3);
        assert_eq!(drain(&mut rx), vec!["a", "b", "c"]);

        drop(handle);
        let summary = task.await.unwrap();
        assert_eq!(summary, QueueSummary { delivered: 3, stalled: 0 });
    }

    #[tokio::test]
    async fn test_rejections_leave_queue_intact() {
        let (handle, mut rx, task) = spawn_queue::<u32>();
        handle.submit("a").await.unwrap();
        assert!(handle.submit("a").await.is_err());
        assert!(handle.complete("zzz", 0).await.is_err());

        handle.complete("a", 1).await.unwrap();
        assert!(handle.complete("a", 1).await.is_err());
        assert_eq!(drain(&mut rx), vec!["a"]);

        drop(handle);
        assert_eq!(task.await.unwrap().stalled, 0);
    }

    #[tokio::test]
    async fn test_stalled_head_blocks_successors() {
        let (handle, mut rx, task) = spawn_queue::<u32>();
        handle.submit("a").await.unwrap();
        handle.submit("b").await.unwrap();
        handle.complete_detached("b", 2);
        drop(handle);

        let summary = task.await.unwrap();
        assert_eq!(summary.stalled, 2);
        assert_eq!(summary.delivered, 0);
        assert!(drain(&mut rx).is_empty());
    }
}
