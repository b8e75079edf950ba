use uuid::Uuid;

use crate::connection_manager::{ConnectionHandle, ConnectionManager, PresenceError};
use crate::metrics::WsMessageMetrics;

use super::message::{ClientMessage, InboundError, ServerMessage};

/// Route one inbound text frame.
///
/// Every failure is answered on the same connection; nothing is returned
/// to the caller and the connection stays open.
#[tracing::instrument(name = "ws.message", skip(manager, handle, raw), fields(connection_id = %handle.id))]
pub fn dispatch_inbound(manager: &ConnectionManager, handle: &ConnectionHandle, raw: &str) {
    let message = match ClientMessage::parse(raw) {
        Ok(message) => message,
        Err(e) => {
            match &e {
                InboundError::Malformed => {
                    WsMessageMetrics::record_invalid();
                    tracing::warn!(connection_id = %handle.id, "Failed to parse client message");
                }
                InboundError::UnknownType(kind) => {
                    WsMessageMetrics::record("unknown");
                    tracing::warn!(connection_id = %handle.id, message_type = %kind, "Unknown message type");
                }
            }
            let _ = handle.send(ServerMessage::error(e.to_string()));
            return;
        }
    };

    WsMessageMetrics::record(message.kind());

    let outcome = match message {
        ClientMessage::Authenticate { user_id } => manager
            .authenticate(handle.id, user_id.as_deref().unwrap_or_default())
            .map(drop),
        ClientMessage::JoinRoom { room_id } => manager
            .join_room(handle.id, room_id.as_deref().unwrap_or_default())
            .map(drop),
        ClientMessage::LeaveRoom { room_id } => manager
            .leave_room(handle.id, room_id.as_deref().unwrap_or_default())
            .map(drop),
        ClientMessage::Ping => {
            handle.mark_alive();
            let _ = handle.send(ServerMessage::pong());
            Ok(())
        }
    };

    if let Err(e) = outcome {
        log_rejection(handle.id, &e);
    }
}

fn log_rejection(connection_id: Uuid, error: &PresenceError) {
    match error {
        PresenceError::UnknownConnection(_) => {
            tracing::debug!(connection_id = %connection_id, "Message from unregistered connection ignored");
        }
        _ => {
            tracing::warn!(connection_id = %connection_id, error = %error, "Client message rejected");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::websocket::{OutboundMessage, ServerEvent};
    use tokio::sync::mpsc;

    fn connect(manager: &ConnectionManager) -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundMessage>) {
        let (tx, mut rx) = mpsc::channel(16);
        let handle = manager.accept(tx).unwrap();
        let _ = rx.try_recv();
        (handle, rx)
    }

    fn next_event(rx: &mut mpsc::Receiver<OutboundMessage>) -> ServerEvent {
        match rx.try_recv() {
            Ok(OutboundMessage::Raw(message)) => message.event,
            other => panic!("expected a raw server message, got {:?}", other),
        }
    }

    #[test]
    fn test_authenticate_message() {
        let manager = ConnectionManager::new();
        let (handle, mut rx) = connect(&manager);

        dispatch_inbound(&manager, &handle, r#"{"type":"authenticate","data":{"userId":"u1"}}"#);

        assert_eq!(
            next_event(&mut rx),
            ServerEvent::Authenticated {
                user_id: "u1".to_string(),
                sessions: 1
            }
        );
        assert_eq!(manager.user_of(handle.id).as_deref(), Some("u1"));
    }

    #[test]
    fn test_authenticate_without_data() {
        let manager = ConnectionManager::new();
        let (handle, mut rx) = connect(&manager);

        dispatch_inbound(&manager, &handle, r#"{"type":"authenticate"}"#);

        assert_eq!(
            next_event(&mut rx),
            ServerEvent::AuthError {
                message: "User ID required".to_string()
            }
        );
        assert_eq!(manager.stats().authenticated_users, 0);
    }

    #[test]
    fn test_join_and_leave_messages() {
        let manager = ConnectionManager::new();
        let (handle, mut rx) = connect(&manager);

        dispatch_inbound(&manager, &handle, r#"{"type":"join_room","data":{"roomId":"parking_5"}}"#);
        assert_eq!(
            next_event(&mut rx),
            ServerEvent::JoinedRoom {
                room_id: "parking_5".to_string()
            }
        );
        assert!(manager.is_room_member(handle.id, "parking_5"));

        dispatch_inbound(&manager, &handle, r#"{"type":"leave_room","data":{"roomId":"parking_5"}}"#);
        assert!(!manager.is_room_member(handle.id, "parking_5"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_leave_without_room_id() {
        let manager = ConnectionManager::new();
        let (handle, mut rx) = connect(&manager);

        dispatch_inbound(&manager, &handle, r#"{"type":"leave_room","data":{}}"#);

        assert_eq!(
            next_event(&mut rx),
            ServerEvent::Error {
                message: "Room ID required".to_string()
            }
        );
    }

    #[test]
    fn test_ping_answers_pong_and_marks_alive() {
        let manager = ConnectionManager::new();
        let (handle, mut rx) = connect(&manager);
        assert!(handle.take_liveness());

        dispatch_inbound(&manager, &handle, r#"{"type":"ping"}"#);

        assert_eq!(next_event(&mut rx), ServerEvent::Pong);
        assert!(handle.take_liveness());
    }

    #[test]
    fn test_unknown_type_is_echoed() {
        let manager = ConnectionManager::new();
        let (handle, mut rx) = connect(&manager);

        dispatch_inbound(&manager, &handle, r#"{"type":"subscribe_all","data":{}}"#);

        assert_eq!(
            next_event(&mut rx),
            ServerEvent::Error {
                message: "Unknown message type: subscribe_all".to_string()
            }
        );
        assert!(manager.get_connection(handle.id).is_some());
    }

    #[test]
    fn test_malformed_json() {
        let manager = ConnectionManager::new();
        let (handle, mut rx) = connect(&manager);

        dispatch_inbound(&manager, &handle, "{not json");

        assert_eq!(
            next_event(&mut rx),
            ServerEvent::Error {
                message: "Invalid message format".to_string()
            }
        );
        assert!(manager.get_connection(handle.id).is_some());
    }

    #[test]
    fn test_message_after_disconnect_is_ignored() {
        let manager = ConnectionManager::new();
        let (handle, mut rx) = connect(&manager);
        manager.disconnect(handle.id);

        dispatch_inbound(&manager, &handle, r#"{"type":"join_room","data":{"roomId":"parking_5"}}"#);

        assert!(rx.try_recv().is_err());
        assert!(manager.list_rooms().is_empty());
    }
}
