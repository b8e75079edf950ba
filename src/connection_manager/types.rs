//! Connection handle and related types

use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use crate::websocket::{OutboundMessage, ServerMessage};

/// Handle for a single client connection.
///
/// Holds the transport side of the connection: its outbound queue, its
/// liveness flag and the signal used to force-close it. Presence state
/// (user, rooms) lives in the registry index.
pub struct ConnectionHandle {
    pub id: Uuid,
    sender: mpsc::Sender<OutboundMessage>,
    /// Cleared by each heartbeat probe, set again by any answer
    alive: AtomicBool,
    terminated: AtomicBool,
    terminate: Notify,
}

impl ConnectionHandle {
    pub fn new(sender: mpsc::Sender<OutboundMessage>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            alive: AtomicBool::new(true),
            terminated: AtomicBool::new(false),
            terminate: Notify::new(),
        }
    }

    /// Whether the transport can still accept frames
    pub fn is_open(&self) -> bool {
        !self.terminated.load(Ordering::Acquire) && !self.sender.is_closed()
    }

    /// Record an answer to the last liveness probe
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::Release);
    }

    /// Whether the last probe was answered; resets the flag to pending
    pub(crate) fn take_liveness(&self) -> bool {
        self.alive.swap(false, Ordering::AcqRel)
    }

    /// Queue a message, serialized by the writer task
    pub fn send(&self, message: ServerMessage) -> Result<(), SendError> {
        self.send_outbound(OutboundMessage::Raw(message))
    }

    /// Queue a frame without waiting for room in the queue
    pub fn send_outbound(&self, message: OutboundMessage) -> Result<(), SendError> {
        if self.terminated.load(Ordering::Acquire) {
            return Err(SendError::Closed);
        }

        self.sender.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Force the transport closed. Only the first call has an effect.
    pub fn terminate(&self) {
        if !self.terminated.swap(true, Ordering::AcqRel) {
            self.terminate.notify_one();
        }
    }

    /// Resolves once [`terminate`](Self::terminate) has been called
    pub async fn terminated(&self) {
        if self.terminated.load(Ordering::Acquire) {
            return;
        }
        self.terminate.notified().await;
    }
}

/// Failure to queue a frame on a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("connection closed")]
    Closed,
    #[error("outbound queue full")]
    Full,
}

/// Rejected presence operation. The client has already been told why.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PresenceError {
    #[error("User ID required")]
    UserIdRequired,
    #[error("Room ID required")]
    RoomIdRequired,
    #[error("Unknown connection: {0}")]
    UnknownConnection(Uuid),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_liveness_flag() {
        let (tx, _rx) = mpsc::channel(4);
        let handle = ConnectionHandle::new(tx);

        assert!(handle.take_liveness());
        assert!(!handle.take_liveness());
        handle.mark_alive();
        assert!(handle.take_liveness());
    }

    #[test]
    fn test_send_errors() {
        let (tx, rx) = mpsc::channel(1);
        let handle = ConnectionHandle::new(tx);

        handle.send(ServerMessage::pong()).unwrap();
        assert_eq!(handle.send(ServerMessage::pong()), Err(SendError::Full));

        drop(rx);
        assert!(!handle.is_open());
        assert_eq!(handle.send(ServerMessage::pong()), Err(SendError::Closed));
    }

    #[test]
    fn test_terminated_pending_until_terminate() {
        let (tx, _rx) = mpsc::channel(4);
        let handle = ConnectionHandle::new(tx);

        let mut waiter = tokio_test::task::spawn(handle.terminated());
        tokio_test::assert_pending!(waiter.poll());

        handle.terminate();
        assert!(waiter.is_woken());
        tokio_test::assert_ready!(waiter.poll());
    }

    #[tokio::test]
    async fn test_terminate_wakes_waiter() {
        let (tx, _rx) = mpsc::channel(4);
        let handle = std::sync::Arc::new(ConnectionHandle::new(tx));

        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.terminated().await })
        };

        handle.terminate();
        handle.terminate();

        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .expect("waiter should not panic");
        assert!(!handle.is_open());
        assert_eq!(handle.send(ServerMessage::pong()), Err(SendError::Closed));
    }
}
