//! Ordered relay from the stream worker to the consumer
//!
//! The worker task owns a [`DispatchSender`]; the session keeps the matching
//! [`Dispatcher`] and drains it on the consumer's context. Deltas travel on a
//! bounded queue and are never reordered. The terminal outcome travels on a
//! separate single-slot channel and becomes visible only once every queued
//! delta has been taken, so completion can never overtake a chunk.
//!
//! A full queue does not block the worker: the send fails with
//! [`AiorgError::Overload`] instead. Once the session's cancellation token
//! fires, nothing more is relayed, including deltas already queued.

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::{AiorgError, ChatResult};

/// Default number of deltas that may wait for the consumer
pub const DEFAULT_DISPATCH_CAPACITY: usize = 64;

/// Event handed to the consumer side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Non-empty text delta
    Chunk(String),
    /// End of the send; `Ok` means the completion record was seen
    Finished(ChatResult<()>),
}

/// Creates a connected sender/dispatcher pair
///
/// # Examples
///
/// ```
/// use aiorg::chat::dispatcher::{channel, Dispatch};
/// use tokio_util::sync::CancellationToken;
///
/// let (sender, mut dispatcher) = channel(8, CancellationToken::new());
/// sender.relay("Hel".to_string()).unwrap();
/// sender.finish(Ok(()));
///
/// assert_eq!(dispatcher.try_next(), Some(Dispatch::Chunk("Hel".to_string())));
/// assert_eq!(dispatcher.try_next(), Some(Dispatch::Finished(Ok(()))));
/// assert_eq!(dispatcher.try_next(), None);
/// ```
pub fn channel(capacity: usize, token: CancellationToken) -> (DispatchSender, Dispatcher) {
    let capacity = capacity.max(1);
    let (chunk_tx, chunk_rx) = mpsc::channel(capacity);
    let (outcome_tx, outcome_rx) = oneshot::channel();

    (
        DispatchSender {
            chunks: chunk_tx,
            outcome: outcome_tx,
            capacity,
        },
        Dispatcher {
            chunks: chunk_rx,
            outcome: Some(outcome_rx),
            token,
        },
    )
}

/// Worker half of the relay
#[derive(Debug)]
pub struct DispatchSender {
    chunks: mpsc::Sender<String>,
    outcome: oneshot::Sender<ChatResult<()>>,
    capacity: usize,
}

impl DispatchSender {
    /// Queues a delta without waiting
    ///
    /// # Errors
    ///
    /// Returns [`AiorgError::Overload`] if the consumer has not drained the
    /// queue, or [`AiorgError::Cancelled`] if the consumer side is gone.
    pub fn relay(&self, delta: String) -> ChatResult<()> {
        match self.chunks.try_send(delta) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    "Dispatch queue full ({} chunks), failing the send",
                    self.capacity
                );
                Err(AiorgError::Overload {
                    capacity: self.capacity,
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(AiorgError::Cancelled),
        }
    }

    /// Publishes the terminal outcome and closes the queue
    pub fn finish(self, outcome: ChatResult<()>) {
        let Self {
            chunks, outcome: slot, ..
        } = self;
        // The outcome must be in place before the queue reports disconnection.
        let _ = slot.send(outcome);
        drop(chunks);
    }
}

/// Consumer half of the relay
#[derive(Debug)]
pub struct Dispatcher {
    chunks: mpsc::Receiver<String>,
    outcome: Option<oneshot::Receiver<ChatResult<()>>>,
    token: CancellationToken,
}

impl Dispatcher {
    /// Returns the next event if one is ready, without waiting
    pub fn try_next(&mut self) -> Option<Dispatch> {
        if self.token.is_cancelled() {
            return None;
        }

        match self.chunks.try_recv() {
            Ok(delta) => Some(Dispatch::Chunk(delta)),
            Err(mpsc::error::TryRecvError::Empty) => None,
            Err(mpsc::error::TryRecvError::Disconnected) => {
                let slot = self.outcome.as_mut()?;
                let outcome = match slot.try_recv() {
                    Ok(outcome) => outcome,
                    Err(oneshot::error::TryRecvError::Empty) => return None,
                    Err(oneshot::error::TryRecvError::Closed) => Err(worker_lost()),
                };
                self.outcome = None;
                Some(Dispatch::Finished(outcome))
            }
        }
    }

    /// Waits for the next event
    ///
    /// Returns `None` once the terminal outcome has been handed out or the
    /// send was cancelled. Dropping the returned future loses nothing.
    pub async fn next(&mut self) -> Option<Dispatch> {
        let delta = tokio::select! {
            biased;
            _ = self.token.cancelled() => return None,
            delta = self.chunks.recv() => delta,
        };
        if let Some(delta) = delta {
            return Some(Dispatch::Chunk(delta));
        }

        let slot = self.outcome.as_mut()?;
        let outcome = tokio::select! {
            biased;
            _ = self.token.cancelled() => return None,
            outcome = slot => outcome.unwrap_or_else(|_| Err(worker_lost())),
        };
        self.outcome = None;
        Some(Dispatch::Finished(outcome))
    }
}

fn worker_lost() -> AiorgError {
    AiorgError::Connection("stream worker stopped without reporting an outcome".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_chunks_then_outcome_in_order() {
        let (sender, mut dispatcher) = channel(4, CancellationToken::new());
        sender.relay("a".to_string()).unwrap();
        sender.relay("b".to_string()).unwrap();
        sender.finish(Err(AiorgError::Protocol("bad line".to_string())));

        assert_eq!(dispatcher.try_next(), Some(Dispatch::Chunk("a".to_string())));
        assert_eq!(dispatcher.try_next(), Some(Dispatch::Chunk("b".to_string())));
        assert_eq!(
            dispatcher.try_next(),
            Some(Dispatch::Finished(Err(AiorgError::Protocol(
                "bad line".to_string()
            ))))
        );
        assert_eq!(dispatcher.try_next(), None);
    }

    #[test]
    fn test_try_next_empty_while_worker_running() {
        let (_sender, mut dispatcher) = channel(4, CancellationToken::new());
        assert_eq!(dispatcher.try_next(), None);
    }

    #[test]
    fn test_full_queue_is_overload() {
        let (sender, _dispatcher) = channel(2, CancellationToken::new());
        sender.relay("1".to_string()).unwrap();
        sender.relay("2".to_string()).unwrap();
        let err = sender.relay("3".to_string()).unwrap_err();
        assert_eq!(err, AiorgError::Overload { capacity: 2 });
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let (sender, _dispatcher) = channel(0, CancellationToken::new());
        assert!(sender.relay("1".to_string()).is_ok());
    }

    #[test]
    fn test_dropped_dispatcher_reports_cancelled() {
        let (sender, dispatcher) = channel(2, CancellationToken::new());
        drop(dispatcher);
        assert_eq!(
            sender.relay("late".to_string()).unwrap_err(),
            AiorgError::Cancelled
        );
    }

    #[test]
    fn test_cancellation_hides_queued_chunks() {
        let token = CancellationToken::new();
        let (sender, mut dispatcher) = channel(4, token.clone());
        sender.relay("queued".to_string()).unwrap();
        sender.finish(Ok(()));

        token.cancel();
        assert_eq!(dispatcher.try_next(), None);
    }

    #[test]
    fn test_worker_dropped_without_outcome() {
        let (sender, mut dispatcher) = channel(4, CancellationToken::new());
        drop(sender);
        assert!(matches!(
            dispatcher.try_next(),
            Some(Dispatch::Finished(Err(AiorgError::Connection(_))))
        ));
    }

    #[tokio::test]
    async fn test_next_waits_for_worker() {
        let (sender, mut dispatcher) = channel(4, CancellationToken::new());

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            sender.relay("Hel".to_string()).unwrap();
            sender.relay("lo".to_string()).unwrap();
            sender.finish(Ok(()));
        });

        let mut events = Vec::new();
        while let Some(event) = dispatcher.next().await {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                Dispatch::Chunk("Hel".to_string()),
                Dispatch::Chunk("lo".to_string()),
                Dispatch::Finished(Ok(())),
            ]
        );
    }

    #[tokio::test]
    async fn test_next_returns_none_on_cancel() {
        let token = CancellationToken::new();
        let (_sender, mut dispatcher) = channel(4, token.clone());

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let next = tokio::time::timeout(Duration::from_secs(1), dispatcher.next())
            .await
            .unwrap();
        assert_eq!(next, None);
    }
}
