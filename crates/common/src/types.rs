// Core domain types shared across all livepoll crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The single poll that may be live at any instant.
///
/// Immutable once created. The id is a strictly increasing millisecond
/// timestamp so clients can order polls without extra state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Poll {
    pub id: i64,
    pub question: String,
    /// 2–6 distinct, non-empty option strings, input order preserved.
    pub options: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub time_limit_secs: u64,
}

impl Poll {
    /// Whether `option` is a member of this poll's option list.
    pub fn has_option(&self, option: &str) -> bool {
        self.options.iter().any(|candidate| candidate == option)
    }
}

/// Registry view of one respondent.
///
/// `connected` flips on attach/detach; the identity (and `has_answered`)
/// survives disconnects and is deleted only by presenter removal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub id: Uuid,
    pub name: String,
    pub connected: bool,
    pub has_answered: bool,
}

/// Attribution for one recorded answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attribution {
    pub id: Uuid,
    pub name: String,
}

/// Tally for a single option, emitted in poll option order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptionTally {
    pub option: String,
    pub count: usize,
    /// count / total_answers × 100 when total_answers > 0, else 0.
    pub percentage: f64,
    pub respondents: Vec<Attribution>,
}

/// Derived snapshot of the active poll's results.
///
/// Always recomputed from the ledger, never patched incrementally, so
/// removing a respondent mid-poll cannot leave stale counts behind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregatedResult {
    pub poll_id: i64,
    pub question: String,
    pub tallies: Vec<OptionTally>,
    pub total_answers: usize,
    pub total_respondents: usize,
    pub created_at: DateTime<Utc>,
    pub time_limit_secs: u64,
}

impl AggregatedResult {
    /// Tally for a named option, if the poll has it.
    pub fn tally(&self, option: &str) -> Option<&OptionTally> {
        self.tallies.iter().find(|tally| tally.option == option)
    }
}

/// Immutable record of a concluded poll kept in the bounded archive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryRecord {
    #[serde(flatten)]
    pub result: AggregatedResult,
    pub ended_at: DateTime<Utc>,
}
