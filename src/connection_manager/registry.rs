use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::websocket::{OutboundMessage, ServerMessage};

use super::stats::{ConnectionStats, RoomInfo, SweepReport};
use super::types::{ConnectionHandle, PresenceError, SendError};

/// Presence state of one connection
#[derive(Debug, Default)]
struct Session {
    /// Set once the connection authenticates
    user_id: Option<String>,
    rooms: HashSet<String>,
}

/// User and room indexes, always mutated together
#[derive(Debug, Default)]
struct PresenceIndex {
    /// connection_id -> Session
    sessions: HashMap<Uuid, Session>,
    /// user_id -> Set<connection_id> (supports multiple tabs)
    users: HashMap<String, HashSet<Uuid>>,
    /// room_name -> Set<connection_id>
    rooms: HashMap<String, HashSet<Uuid>>,
}

impl PresenceIndex {
    fn remove_from_user(&mut self, user_id: &str, connection_id: Uuid) {
        if let Some(conns) = self.users.get_mut(user_id) {
            conns.remove(&connection_id);
            if conns.is_empty() {
                self.users.remove(user_id);
            }
        }
    }

    fn remove_from_room(&mut self, room: &str, connection_id: Uuid) {
        if let Some(conns) = self.rooms.get_mut(room) {
            conns.remove(&connection_id);
            if conns.is_empty() {
                self.rooms.remove(room);
                tracing::debug!(room = %room, "Room deleted (empty)");
            }
        }
    }
}

/// Registry of live connections.
///
/// Every mutation of the user index, the room index and the per-connection
/// room sets runs under a single lock, so the three always agree. Critical
/// sections never await and never write to a transport; replies are queued
/// after the lock is released.
pub struct ConnectionManager {
    /// connection_id -> ConnectionHandle
    connections: DashMap<Uuid, Arc<ConnectionHandle>>,
    index: Mutex<PresenceIndex>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            index: Mutex::new(PresenceIndex::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PresenceIndex> {
        // Mutations never panic halfway, so a poisoned index is still consistent
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new, unauthenticated connection and greet it.
    ///
    /// Returns `None` without leaving any trace when the transport closed
    /// before registration completed.
    pub fn accept(&self, sender: mpsc::Sender<OutboundMessage>) -> Option<Arc<ConnectionHandle>> {
        let handle = Arc::new(ConnectionHandle::new(sender));
        let connection_id = handle.id;

        {
            let mut index = self.lock();
            index.sessions.insert(connection_id, Session::default());
            self.connections.insert(connection_id, handle.clone());
        }

        if handle.send(ServerMessage::connected()).is_err() || !handle.is_open() {
            self.disconnect(connection_id);
            tracing::debug!(connection_id = %connection_id, "Transport closed before registration completed");
            return None;
        }

        tracing::info!(connection_id = %connection_id, "Connection registered");
        Some(handle)
    }

    /// Bind a connection to a user.
    ///
    /// Returns the number of sessions the user now has. A connection that
    /// re-authenticates as another user moves to that user.
    pub fn authenticate(&self, connection_id: Uuid, user_id: &str) -> Result<usize, PresenceError> {
        let handle = self
            .get_connection(connection_id)
            .ok_or(PresenceError::UnknownConnection(connection_id))?;

        if user_id.trim().is_empty() {
            let _ = handle.send(ServerMessage::auth_error(PresenceError::UserIdRequired.to_string()));
            return Err(PresenceError::UserIdRequired);
        }

        let sessions = {
            let mut index = self.lock();
            let session = index
                .sessions
                .get_mut(&connection_id)
                .ok_or(PresenceError::UnknownConnection(connection_id))?;
            let previous = session.user_id.replace(user_id.to_string());

            if let Some(previous) = previous.filter(|p| p != user_id) {
                index.remove_from_user(&previous, connection_id);
                tracing::info!(
                    connection_id = %connection_id,
                    previous_user_id = %previous,
                    "Connection re-authenticated as another user"
                );
            }

            let conns = index.users.entry(user_id.to_string()).or_default();
            conns.insert(connection_id);
            conns.len()
        };

        tracing::info!(
            connection_id = %connection_id,
            user_id = %user_id,
            sessions = sessions,
            "User authenticated"
        );
        let _ = handle.send(ServerMessage::authenticated(user_id, sessions));

        Ok(sessions)
    }

    /// Add a connection to a room, creating the room if needed.
    ///
    /// Returns the room size. Joining twice is harmless and still confirmed.
    pub fn join_room(&self, connection_id: Uuid, room: &str) -> Result<usize, PresenceError> {
        let handle = self
            .get_connection(connection_id)
            .ok_or(PresenceError::UnknownConnection(connection_id))?;

        if room.trim().is_empty() {
            let _ = handle.send(ServerMessage::error(PresenceError::RoomIdRequired.to_string()));
            return Err(PresenceError::RoomIdRequired);
        }

        let room_size = {
            let mut index = self.lock();
            let session = index
                .sessions
                .get_mut(&connection_id)
                .ok_or(PresenceError::UnknownConnection(connection_id))?;
            session.rooms.insert(room.to_string());

            let conns = index.rooms.entry(room.to_string()).or_default();
            conns.insert(connection_id);
            conns.len()
        };

        tracing::info!(
            connection_id = %connection_id,
            room = %room,
            room_size = room_size,
            "Client joined room"
        );
        let _ = handle.send(ServerMessage::joined_room(room));

        Ok(room_size)
    }

    /// Remove a connection from a room; an emptied room is deleted.
    ///
    /// Returns whether the connection was a member. No reply is sent on success.
    pub fn leave_room(&self, connection_id: Uuid, room: &str) -> Result<bool, PresenceError> {
        let handle = self
            .get_connection(connection_id)
            .ok_or(PresenceError::UnknownConnection(connection_id))?;

        if room.trim().is_empty() {
            let _ = handle.send(ServerMessage::error(PresenceError::RoomIdRequired.to_string()));
            return Err(PresenceError::RoomIdRequired);
        }

        let was_member = {
            let mut index = self.lock();
            let session = index
                .sessions
                .get_mut(&connection_id)
                .ok_or(PresenceError::UnknownConnection(connection_id))?;
            let was_member = session.rooms.remove(room);
            index.remove_from_room(room, connection_id);
            was_member
        };

        tracing::info!(connection_id = %connection_id, room = %room, "Client left room");
        Ok(was_member)
    }

    /// Drop a connection from every index and close its transport.
    ///
    /// Returns `false` if it was already gone.
    pub fn disconnect(&self, connection_id: Uuid) -> bool {
        let removed = {
            let mut index = self.lock();
            let handle = self.connections.remove(&connection_id).map(|(_, h)| h);

            if let Some(session) = index.sessions.remove(&connection_id) {
                if let Some(user_id) = &session.user_id {
                    index.remove_from_user(user_id, connection_id);
                }
                for room in &session.rooms {
                    index.remove_from_room(room, connection_id);
                }
                handle.map(|h| (h, session.user_id))
            } else {
                handle.map(|h| (h, None))
            }
        };

        match removed {
            Some((handle, user_id)) => {
                handle.terminate();
                tracing::info!(
                    connection_id = %connection_id,
                    user_id = ?user_id,
                    "Connection unregistered"
                );
                true
            }
            None => false,
        }
    }

    /// Close connections that missed the previous probe and probe the rest.
    pub fn heartbeat_sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        for handle in self.get_all_connections() {
            if !handle.take_liveness() {
                tracing::info!(connection_id = %handle.id, "Terminating dead connection");
                self.disconnect(handle.id);
                report.terminated += 1;
                continue;
            }

            match handle.send_outbound(OutboundMessage::Probe) {
                Ok(()) => report.probed += 1,
                Err(SendError::Full) => {
                    // Left pending; reaped next sweep unless it answers
                    tracing::debug!(connection_id = %handle.id, "Outbound queue full, probe skipped");
                }
                Err(SendError::Closed) => {
                    self.disconnect(handle.id);
                    report.terminated += 1;
                }
            }
        }

        report
    }

    /// Close every connection, e.g. on shutdown. Returns how many were closed.
    pub fn disconnect_all(&self) -> usize {
        let ids: Vec<Uuid> = self.connections.iter().map(|r| *r.key()).collect();
        ids.into_iter().filter(|id| self.disconnect(*id)).count()
    }

    /// Get all connections for a user
    pub fn get_user_connections(&self, user_id: &str) -> Vec<Arc<ConnectionHandle>> {
        let index = self.lock();
        index
            .users
            .get(user_id)
            .map(|conn_ids| self.resolve(conn_ids))
            .unwrap_or_default()
    }

    /// Get all connections that joined a room
    pub fn get_room_connections(&self, room: &str) -> Vec<Arc<ConnectionHandle>> {
        let index = self.lock();
        index
            .rooms
            .get(room)
            .map(|conn_ids| self.resolve(conn_ids))
            .unwrap_or_default()
    }

    /// Get all connections
    pub fn get_all_connections(&self) -> Vec<Arc<ConnectionHandle>> {
        let _index = self.lock();
        self.connections.iter().map(|r| r.value().clone()).collect()
    }

    /// Get connection by ID
    pub fn get_connection(&self, connection_id: Uuid) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(&connection_id).map(|h| h.clone())
    }

    /// User a connection is authenticated as
    pub fn user_of(&self, connection_id: Uuid) -> Option<String> {
        self.lock()
            .sessions
            .get(&connection_id)
            .and_then(|s| s.user_id.clone())
    }

    /// Rooms a connection has joined, sorted
    pub fn rooms_of(&self, connection_id: Uuid) -> Vec<String> {
        let mut rooms: Vec<String> = self
            .lock()
            .sessions
            .get(&connection_id)
            .map(|s| s.rooms.iter().cloned().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }

    /// Number of sessions currently authenticated as `user_id`
    pub fn user_session_count(&self, user_id: &str) -> usize {
        self.lock().users.get(user_id).map_or(0, HashSet::len)
    }

    /// Whether `room` currently has `connection_id` as a member
    pub fn is_room_member(&self, connection_id: Uuid, room: &str) -> bool {
        self.lock()
            .rooms
            .get(room)
            .is_some_and(|conns| conns.contains(&connection_id))
    }

    /// Get statistics
    pub fn stats(&self) -> ConnectionStats {
        let index = self.lock();
        ConnectionStats {
            total_connections: index.sessions.len(),
            authenticated_users: index.users.len(),
            active_rooms: index.rooms.len(),
        }
    }

    /// Active rooms with their member counts, sorted by name
    pub fn list_rooms(&self) -> Vec<RoomInfo> {
        let mut rooms: Vec<RoomInfo> = self
            .lock()
            .rooms
            .iter()
            .map(|(name, conns)| RoomInfo {
                name: name.clone(),
                member_count: conns.len(),
            })
            .collect();
        rooms.sort_by(|a, b| a.name.cmp(&b.name));
        rooms
    }

    fn resolve(&self, conn_ids: &HashSet<Uuid>) -> Vec<Arc<ConnectionHandle>> {
        conn_ids
            .iter()
            .filter_map(|id| self.connections.get(id).map(|h| h.clone()))
            .collect()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
