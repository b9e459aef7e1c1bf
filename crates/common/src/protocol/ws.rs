// WebSocket message types for the livepoll real-time channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{AggregatedResult, Poll};

/// All message types on the livepoll WebSocket channel.
///
/// One tagged variant per event; payloads are validated here at the
/// boundary before anything reaches the session engine. The transport is
/// at-least-once — exactly-once answer semantics come from the ledger's
/// duplicate check, not from the framing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Respondent -> Server: attach (or first-contact register) an identity.
    Join { respondent_id: Uuid, name: String },

    /// Presenter -> Server: register a presenter-role listener.
    PresenterJoin,

    /// Respondent -> Server: answer the active poll.
    SubmitAnswer { respondent_id: Uuid, option: String },

    /// Server -> one client: point-in-time replay on join.
    ///
    /// `has_answered` is present for respondents; `result` and
    /// `participant_count` are present for presenters.
    CurrentState {
        poll: Option<Poll>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        has_answered: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<AggregatedResult>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        participant_count: Option<usize>,
    },

    /// Server -> all: a new poll is live.
    PollStarted { poll: Poll },

    /// Server -> all: results changed after an accepted answer.
    ResultUpdate { result: AggregatedResult },

    /// Server -> all: the poll concluded (timer or full coverage).
    PollEnded { result: AggregatedResult, ended_at: DateTime<Utc> },

    /// Server -> all: the respondent roster changed size.
    ParticipantCount { count: usize },

    /// Server -> one respondent: answer recorded.
    AnswerAccepted { option: String },

    /// Server -> one client: the triggering operation was rejected.
    Rejected { code: String, message: String, retryable: bool },

    /// Server -> one respondent: forced removal notice; the connection is
    /// closed right after this frame.
    Removed { reason: String },
}
