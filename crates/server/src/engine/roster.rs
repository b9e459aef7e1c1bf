// Session registry: respondent identities, live connections, presenters.

use std::collections::HashMap;

use livepoll_common::{protocol::ws::WsMessage, types::Participant};
use tokio::sync::mpsc;
use uuid::Uuid;

/// One respondent identity.
///
/// The identity outlives its connection: a disconnect only clears
/// `connection`, while name and answered state are retained so a reconnect
/// resumes where it left off. Hard deletion happens only through
/// [`Roster::remove`].
#[derive(Debug)]
pub struct RespondentRecord {
    pub name: String,
    pub connection: Option<Connection>,
    pub has_answered: bool,
}

/// A live outbound channel, tagged with a per-socket id so a stale socket's
/// cleanup cannot clobber the connection that replaced it.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: Uuid,
    pub outbound: mpsc::UnboundedSender<WsMessage>,
}

/// Tracks every known respondent identity and every presenter listener.
#[derive(Debug, Default)]
pub struct Roster {
    respondents: HashMap<Uuid, RespondentRecord>,
    presenters: HashMap<Uuid, mpsc::UnboundedSender<WsMessage>>,
}

impl Roster {
    /// Allocate a fresh identity for `name`. The identity exists from this
    /// point on, independent of any connection.
    pub fn register(&mut self, name: String) -> Uuid {
        let respondent_id = Uuid::new_v4();
        self.respondents
            .insert(respondent_id, RespondentRecord { name, connection: None, has_answered: false });
        respondent_id
    }

    /// Attach a connection to `respondent_id`, implicitly creating the
    /// identity on first contact. A non-empty name updates the stored one.
    pub fn attach_respondent(
        &mut self,
        respondent_id: Uuid,
        name: String,
        connection: Connection,
    ) {
        let record = self.respondents.entry(respondent_id).or_insert(RespondentRecord {
            name: name.clone(),
            connection: None,
            has_answered: false,
        });
        if !name.is_empty() {
            record.name = name;
        }
        record.connection = Some(connection);
    }

    /// Mark `respondent_id` disconnected, but only if `connection_id` still
    /// owns the slot. Returns whether anything changed.
    pub fn detach_respondent(&mut self, respondent_id: Uuid, connection_id: Uuid) -> bool {
        match self.respondents.get_mut(&respondent_id) {
            Some(record) if record.connection.as_ref().is_some_and(|c| c.id == connection_id) => {
                record.connection = None;
                true
            }
            _ => false,
        }
    }

    /// Delete the identity outright. The only path that forgets a
    /// respondent; returns the record so the caller can notify its socket.
    pub fn remove(&mut self, respondent_id: Uuid) -> Option<RespondentRecord> {
        self.respondents.remove(&respondent_id)
    }

    pub fn attach_presenter(
        &mut self,
        connection_id: Uuid,
        outbound: mpsc::UnboundedSender<WsMessage>,
    ) {
        self.presenters.insert(connection_id, outbound);
    }

    pub fn detach_presenter(&mut self, connection_id: Uuid) {
        self.presenters.remove(&connection_id);
    }

    pub fn contains(&self, respondent_id: Uuid) -> bool {
        self.respondents.contains_key(&respondent_id)
    }

    pub fn set_answered(&mut self, respondent_id: Uuid, has_answered: bool) {
        if let Some(record) = self.respondents.get_mut(&respondent_id) {
            record.has_answered = has_answered;
        }
    }

    pub fn reset_answered(&mut self) {
        for record in self.respondents.values_mut() {
            record.has_answered = false;
        }
    }

    pub fn name_of(&self, respondent_id: Uuid) -> Option<&str> {
        self.respondents.get(&respondent_id).map(|record| record.name.as_str())
    }

    /// Number of registered identities (connected or not). This is the
    /// denominator for the full-coverage check.
    pub fn respondent_count(&self) -> usize {
        self.respondents.len()
    }

    /// Participant view, sorted by name for deterministic listings.
    pub fn participants(&self) -> Vec<Participant> {
        let mut participants: Vec<Participant> = self
            .respondents
            .iter()
            .map(|(id, record)| Participant {
                id: *id,
                name: record.name.clone(),
                connected: record.connection.is_some(),
                has_answered: record.has_answered,
            })
            .collect();
        participants.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        participants
    }

    /// Push `message` to every connected party (respondents and
    /// presenters). Returns how many sends went through; closed channels
    /// are skipped, their sockets clean themselves up on disconnect.
    pub fn fan_out(&self, message: &WsMessage) -> usize {
        let mut sent = 0;
        for record in self.respondents.values() {
            if let Some(connection) = &record.connection {
                if connection.outbound.send(message.clone()).is_ok() {
                    sent += 1;
                }
            }
        }
        for outbound in self.presenters.values() {
            if outbound.send(message.clone()).is_ok() {
                sent += 1;
            }
        }
        sent
    }

    /// Push `message` to one respondent's live connection, if any.
    pub fn send_to(&self, respondent_id: Uuid, message: WsMessage) -> bool {
        self.respondents
            .get(&respondent_id)
            .and_then(|record| record.connection.as_ref())
            .is_some_and(|connection| connection.outbound.send(message).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> (Connection, mpsc::UnboundedReceiver<WsMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Connection { id: Uuid::new_v4(), outbound: sender }, receiver)
    }

    #[test]
    fn register_creates_a_disconnected_identity() {
        let mut roster = Roster::default();
        let id = roster.register("Ada".into());

        assert!(roster.contains(id));
        assert_eq!(roster.respondent_count(), 1);
        let participants = roster.participants();
        assert!(!participants[0].connected);
        assert!(!participants[0].has_answered);
    }

    #[test]
    fn attach_implicitly_creates_unknown_respondents() {
        let mut roster = Roster::default();
        let id = Uuid::new_v4();
        let (conn, _rx) = connection();

        roster.attach_respondent(id, "Grace".into(), conn);

        assert!(roster.contains(id));
        assert_eq!(roster.name_of(id), Some("Grace"));
        assert!(roster.participants()[0].connected);
    }

    #[test]
    fn detach_retains_identity_and_answer_state() {
        let mut roster = Roster::default();
        let id = roster.register("Ada".into());
        let (conn, _rx) = connection();
        let conn_id = conn.id;
        roster.attach_respondent(id, "Ada".into(), conn);
        roster.set_answered(id, true);

        assert!(roster.detach_respondent(id, conn_id));

        assert!(roster.contains(id));
        let participant = &roster.participants()[0];
        assert!(!participant.connected);
        assert!(participant.has_answered, "answered flag survives disconnect");
    }

    #[test]
    fn stale_socket_cannot_detach_a_reconnected_respondent() {
        let mut roster = Roster::default();
        let id = roster.register("Ada".into());
        let (old_conn, _old_rx) = connection();
        let old_conn_id = old_conn.id;
        roster.attach_respondent(id, "Ada".into(), old_conn);

        // Reconnect replaces the slot before the old socket's cleanup runs.
        let (new_conn, _new_rx) = connection();
        roster.attach_respondent(id, "Ada".into(), new_conn);

        assert!(!roster.detach_respondent(id, old_conn_id));
        assert!(roster.participants()[0].connected);
    }

    #[test]
    fn remove_is_the_only_deleting_path() {
        let mut roster = Roster::default();
        let id = roster.register("Ada".into());

        let record = roster.remove(id).expect("known respondent");
        assert_eq!(record.name, "Ada");
        assert!(!roster.contains(id));
        assert!(roster.remove(id).is_none());
    }

    #[test]
    fn fan_out_reaches_respondents_and_presenters() {
        let mut roster = Roster::default();
        let id = roster.register("Ada".into());
        let (conn, mut respondent_rx) = connection();
        roster.attach_respondent(id, "Ada".into(), conn);

        let (presenter_tx, mut presenter_rx) = mpsc::unbounded_channel();
        roster.attach_presenter(Uuid::new_v4(), presenter_tx);

        let sent = roster.fan_out(&WsMessage::ParticipantCount { count: 1 });

        assert_eq!(sent, 2);
        assert!(matches!(respondent_rx.try_recv(), Ok(WsMessage::ParticipantCount { count: 1 })));
        assert!(matches!(presenter_rx.try_recv(), Ok(WsMessage::ParticipantCount { count: 1 })));
    }

    #[test]
    fn fan_out_skips_disconnected_respondents() {
        let mut roster = Roster::default();
        roster.register("Ada".into());
        assert_eq!(roster.fan_out(&WsMessage::ParticipantCount { count: 1 }), 0);
    }

    #[test]
    fn participants_sorted_by_name() {
        let mut roster = Roster::default();
        roster.register("Niklaus".into());
        roster.register("Ada".into());
        roster.register("Grace".into());

        let names: Vec<_> = roster.participants().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Ada", "Grace", "Niklaus"]);
    }
}
