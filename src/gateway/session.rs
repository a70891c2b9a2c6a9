use chrono::{DateTime, Utc};

use crate::lobby::ConnectionId;

/// What the hub knows about one open connection.
///
/// Created when the socket connects and dropped when it closes. `name` is the
/// identity the client asked for; inside a lobby the member name may carry a
/// numeric suffix, so `lobby_name` holds what the lobby actually recorded.
#[derive(Debug, Clone)]
pub struct ConnectionSession {
    pub id: ConnectionId,
    pub name: Option<String>,
    pub lobby: Option<String>,
    pub lobby_name: Option<String>,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl ConnectionSession {
    pub fn new(id: ConnectionId) -> Self {
        let now = Utc::now();
        ConnectionSession {
            id,
            name: None,
            lobby: None,
            lobby_name: None,
            connected_at: now,
            last_activity: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Name to join with: the identified name, else the placeholder.
    pub fn requested_name(&self) -> &str {
        self.name
            .as_deref()
            .unwrap_or(crate::lobby::membership::DEFAULT_NAME)
    }

    pub fn enter(&mut self, lobby: &str, member_name: &str) {
        self.lobby = Some(lobby.to_string());
        self.lobby_name = Some(member_name.to_string());
    }

    /// Forget the current lobby; returns it.
    pub fn exit(&mut self) -> Option<String> {
        self.lobby_name = None;
        self.lobby.take()
    }

    /// Display label for logs.
    pub fn label(&self) -> String {
        match (&self.lobby_name, &self.name) {
            (Some(n), _) | (None, Some(n)) => format!("{} ({})", n, self.id),
            (None, None) => self.id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle() {
        let mut s = ConnectionSession::new(ConnectionId(7));
        assert_eq!(s.requested_name(), "Adventurer");
        assert_eq!(s.label(), "conn-7");
        s.name = Some("Rin".into());
        s.enter("tavern", "Rin2");
        assert_eq!(s.label(), "Rin2 (conn-7)");
        assert_eq!(s.exit().as_deref(), Some("tavern"));
        assert!(s.lobby_name.is_none());
        assert_eq!(s.label(), "Rin (conn-7)");
    }
}
