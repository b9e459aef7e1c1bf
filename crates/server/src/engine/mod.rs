// The session engine: authoritative in-memory model of the one active
// poll, the respondent roster, the answer ledger, and the fan-out of state
// changes to every connected party.
//
// All mutations go through a single `tokio::sync::Mutex`, so the engine
// behaves as a single-writer state machine even though the surrounding
// transport is multi-connection: the duplicate-answer and full-coverage
// checks can never observe a torn state, and broadcasts are emitted inside
// the critical section that committed the triggering mutation, which gives
// every connection the same event order.

pub mod history;
pub mod ledger;
pub mod results;
pub mod roster;

use std::sync::Arc;

use chrono::Utc;
use livepoll_common::{
    protocol::ws::WsMessage,
    types::{HistoryRecord, Participant, Poll},
};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::EngineLimits;
use crate::error::PollError;
use history::HistoryArchive;
use ledger::AnswerLedger;
use roster::{Connection, Roster};

/// Counts reported by `GET /api/poll/current`.
#[derive(Debug, Clone, Serialize)]
pub struct EngineOverview {
    pub poll: Option<Poll>,
    pub respondent_count: usize,
    pub answer_count: usize,
}

enum Lifecycle {
    Idle,
    Active(ActivePoll),
}

struct ActivePoll {
    poll: Poll,
    /// Monotonic per-poll token; the expiry timer carries it so a timer
    /// firing after cancellation (or after its poll was superseded) is a
    /// guaranteed no-op.
    generation: u64,
    timer: tokio::task::JoinHandle<()>,
}

struct EngineState {
    lifecycle: Lifecycle,
    next_generation: u64,
    last_poll_id: i64,
    ledger: AnswerLedger,
    roster: Roster,
    history: HistoryArchive,
    /// Latched when an internal invariant violation is observed; new polls
    /// are rejected rather than risking silent corruption.
    safe_mode: bool,
    limits: EngineLimits,
}

/// Handle to the engine. Cheap to clone; all clones share one state.
#[derive(Clone)]
pub struct PollEngine {
    inner: Arc<Mutex<EngineState>>,
}

impl PollEngine {
    pub fn new(limits: EngineLimits) -> Self {
        let history = HistoryArchive::new(limits.history_cap);
        Self {
            inner: Arc::new(Mutex::new(EngineState {
                lifecycle: Lifecycle::Idle,
                next_generation: 0,
                last_poll_id: 0,
                ledger: AnswerLedger::default(),
                roster: Roster::default(),
                history,
                safe_mode: false,
                limits,
            })),
        }
    }

    // ── Poll lifecycle ─────────────────────────────────────────────

    /// Start a new poll, superseding a fully resolved previous one.
    pub async fn create_poll(
        &self,
        question: &str,
        options: Vec<String>,
        time_limit_secs: Option<u64>,
    ) -> Result<Poll, PollError> {
        let mut state = self.inner.lock().await;

        if state.safe_mode {
            return Err(PollError::SafeMode);
        }

        let question = question.trim();
        if question.is_empty() {
            return Err(PollError::Validation("question must not be empty".into()));
        }
        let options = normalize_options(options)?;
        let time_limit_secs = clamp_time_limit(time_limit_secs, &state.limits);

        if matches!(state.lifecycle, Lifecycle::Active(_)) {
            let respondents = state.roster.respondent_count();
            if respondents > 0 && state.ledger.len() < respondents {
                return Err(PollError::Conflict(
                    "cannot start a new poll while respondents are still answering".into(),
                ));
            }
        }

        // Archive the superseded poll's final aggregate. No poll_ended
        // fan-out here; the poll_started below supersedes it for clients.
        state.conclude_active(false);

        state.ledger.clear();
        state.roster.reset_answered();

        let now = Utc::now();
        let poll_id = now.timestamp_millis().max(state.last_poll_id + 1);
        state.last_poll_id = poll_id;
        let poll = Poll {
            id: poll_id,
            question: question.to_string(),
            options,
            created_at: now,
            time_limit_secs,
        };

        state.next_generation += 1;
        let generation = state.next_generation;
        let engine = self.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(time_limit_secs)).await;
            engine.handle_expiry(generation).await;
        });

        state.lifecycle =
            Lifecycle::Active(ActivePoll { poll: poll.clone(), generation, timer });
        state.roster.fan_out(&WsMessage::PollStarted { poll: poll.clone() });

        info!(poll_id, question = %poll.question, time_limit_secs, "poll started");
        Ok(poll)
    }

    /// End the active poll. Idempotent: returns `None` when already idle.
    pub async fn end_poll(&self) -> Option<HistoryRecord> {
        let mut state = self.inner.lock().await;
        state.conclude_active(true)
    }

    /// Termination path for the expiry timer. The generation check makes a
    /// late firing after cancellation or supersession a no-op.
    async fn handle_expiry(&self, generation: u64) {
        let mut state = self.inner.lock().await;
        match &state.lifecycle {
            Lifecycle::Active(active) if active.generation == generation => {
                info!(poll_id = active.poll.id, "poll time limit elapsed");
                state.conclude_active(true);
            }
            _ => {}
        }
    }

    // ── Answers ────────────────────────────────────────────────────

    /// Record one respondent's answer for the active poll.
    ///
    /// Duplicate detection, the insert, and the full-coverage check all run
    /// in one critical section; near-simultaneous submissions from the same
    /// respondent cannot both succeed.
    pub async fn submit_answer(
        &self,
        respondent_id: Uuid,
        option: String,
    ) -> Result<String, PollError> {
        let mut state = self.inner.lock().await;

        let poll = match &state.lifecycle {
            Lifecycle::Active(active) => active.poll.clone(),
            Lifecycle::Idle => return Err(PollError::NoActivePoll),
        };
        if !state.roster.contains(respondent_id) {
            // A removal that won the race against this submission.
            return Err(PollError::UnknownRespondent);
        }
        if state.ledger.has_answered(respondent_id) {
            return Err(PollError::DuplicateAnswer);
        }
        if !poll.has_option(&option) {
            return Err(PollError::InvalidOption(option));
        }

        state.ledger.record(respondent_id, option.clone());
        state.roster.set_answered(respondent_id, true);

        let result = results::aggregate(&poll, &state.ledger, &state.roster);
        state.roster.fan_out(&WsMessage::ResultUpdate { result });

        let respondents = state.roster.respondent_count();
        if respondents > 0 && state.ledger.len() == respondents {
            info!(poll_id = poll.id, respondents, "all respondents answered");
            state.conclude_active(true);
        }

        Ok(option)
    }

    // ── Registry ───────────────────────────────────────────────────

    /// Allocate a fresh respondent identity, independent of any connection.
    pub async fn register(&self, name: &str) -> Result<(Uuid, String), PollError> {
        let mut state = self.inner.lock().await;
        let name = normalize_name(name, state.limits.max_name_chars);
        if name.is_empty() {
            return Err(PollError::Validation("name must not be empty".into()));
        }
        let respondent_id = state.roster.register(name.clone());
        info!(%respondent_id, name = %name, "respondent registered");
        Ok((respondent_id, name))
    }

    /// Attach a respondent connection and return its replay snapshot.
    ///
    /// The snapshot is computed inside the same critical section that
    /// commits the attach, never from a cache, so a slow join racing a fast
    /// poll transition still observes a consistent state.
    pub async fn attach_respondent(
        &self,
        respondent_id: Uuid,
        name: &str,
        connection_id: Uuid,
        outbound: mpsc::UnboundedSender<WsMessage>,
    ) -> WsMessage {
        let mut state = self.inner.lock().await;
        let name = normalize_name(name, state.limits.max_name_chars);
        state
            .roster
            .attach_respondent(respondent_id, name, Connection { id: connection_id, outbound });
        let has_answered = state.ledger.has_answered(respondent_id);
        state.roster.set_answered(respondent_id, has_answered);

        let poll = state.active_poll_cloned();
        let count = state.roster.respondent_count();
        state.roster.fan_out(&WsMessage::ParticipantCount { count });

        WsMessage::CurrentState {
            poll,
            has_answered: Some(has_answered),
            result: None,
            participant_count: None,
        }
    }

    /// Attach a presenter listener and return its replay snapshot.
    pub async fn attach_presenter(
        &self,
        connection_id: Uuid,
        outbound: mpsc::UnboundedSender<WsMessage>,
    ) -> WsMessage {
        let mut state = self.inner.lock().await;
        state.roster.attach_presenter(connection_id, outbound);

        let poll = state.active_poll_cloned();
        let result =
            poll.as_ref().map(|poll| results::aggregate(poll, &state.ledger, &state.roster));
        WsMessage::CurrentState {
            poll,
            has_answered: None,
            result,
            participant_count: Some(state.roster.respondent_count()),
        }
    }

    /// Socket cleanup on disconnect. Identity and answer state survive.
    pub async fn detach_respondent(&self, respondent_id: Uuid, connection_id: Uuid) {
        let mut state = self.inner.lock().await;
        if state.roster.detach_respondent(respondent_id, connection_id) {
            let count = state.roster.respondent_count();
            state.roster.fan_out(&WsMessage::ParticipantCount { count });
        }
    }

    pub async fn detach_presenter(&self, connection_id: Uuid) {
        let mut state = self.inner.lock().await;
        state.roster.detach_presenter(connection_id);
    }

    /// Presenter-initiated hard removal: deletes the identity and any
    /// ledger entry, notifies the victim's socket, and re-broadcasts both
    /// the count and (when a poll is live) the corrected result.
    pub async fn remove_respondent(&self, respondent_id: Uuid) -> Result<(), PollError> {
        let mut state = self.inner.lock().await;
        let Some(record) = state.roster.remove(respondent_id) else {
            return Err(PollError::UnknownRespondent);
        };
        state.ledger.remove(respondent_id);

        if let Some(connection) = record.connection {
            let _ = connection.outbound.send(WsMessage::Removed {
                reason: "you have been removed from the session".into(),
            });
        }

        let count = state.roster.respondent_count();
        state.roster.fan_out(&WsMessage::ParticipantCount { count });

        if let Some(poll) = state.active_poll_cloned() {
            let result = results::aggregate(&poll, &state.ledger, &state.roster);
            state.roster.fan_out(&WsMessage::ResultUpdate { result });
        }

        info!(%respondent_id, name = %record.name, "respondent removed by presenter");
        Ok(())
    }

    // ── Read surface ───────────────────────────────────────────────

    pub async fn overview(&self) -> EngineOverview {
        let state = self.inner.lock().await;
        EngineOverview {
            poll: state.active_poll_cloned(),
            respondent_count: state.roster.respondent_count(),
            answer_count: state.ledger.len(),
        }
    }

    pub async fn participants(&self) -> Vec<Participant> {
        self.inner.lock().await.roster.participants()
    }

    pub async fn history(&self, limit: usize) -> Vec<HistoryRecord> {
        self.inner.lock().await.history.list(limit)
    }

    pub async fn is_safe_mode(&self) -> bool {
        self.inner.lock().await.safe_mode
    }

    #[cfg(test)]
    pub(crate) async fn corrupt_ledger_for_tests(&self, respondent_id: Uuid, option: &str) {
        let mut state = self.inner.lock().await;
        state.ledger.record(respondent_id, option.to_string());
    }
}

impl EngineState {
    fn active_poll_cloned(&self) -> Option<Poll> {
        match &self.lifecycle {
            Lifecycle::Active(active) => Some(active.poll.clone()),
            Lifecycle::Idle => None,
        }
    }

    /// Shared termination path for explicit end, timer expiry, full
    /// coverage, and (without the terminal fan-out) supersession.
    fn conclude_active(&mut self, announce: bool) -> Option<HistoryRecord> {
        let lifecycle = std::mem::replace(&mut self.lifecycle, Lifecycle::Idle);
        let Lifecycle::Active(active) = lifecycle else {
            return None;
        };
        // Aborting an already-finished task is a no-op, so this is safe
        // from every termination path, including the timer's own.
        active.timer.abort();

        self.check_ledger_integrity(&active.poll);

        let result = results::aggregate(&active.poll, &self.ledger, &self.roster);
        let ended_at = Utc::now();
        let record = HistoryRecord { result: result.clone(), ended_at };
        self.history.record(record.clone());

        if announce {
            self.roster.fan_out(&WsMessage::PollEnded { result: result.clone(), ended_at });
        }

        info!(
            poll_id = active.poll.id,
            answers = result.total_answers,
            respondents = result.total_respondents,
            "poll ended"
        );
        Some(record)
    }

    /// Invariant: every ledger entry names an option of the active poll.
    /// A violation means the "at most one active poll" model broke down
    /// somewhere; latch safe mode instead of corrupting aggregates.
    fn check_ledger_integrity(&mut self, poll: &Poll) {
        for (respondent_id, option) in self.ledger.iter() {
            if !poll.has_option(option) {
                error!(
                    poll_id = poll.id,
                    %respondent_id,
                    option,
                    "ledger entry references an option outside the active poll; \
                     entering safe mode"
                );
                self.safe_mode = true;
                return;
            }
        }
    }
}

fn normalize_name(raw: &str, max_chars: usize) -> String {
    raw.trim().chars().take(max_chars).collect()
}

/// Trim options, drop empties and duplicates (first occurrence wins,
/// order preserved), and require 2–6 survivors.
fn normalize_options(options: Vec<String>) -> Result<Vec<String>, PollError> {
    let mut normalized: Vec<String> = Vec::with_capacity(options.len());
    for option in options {
        let trimmed = option.trim();
        if trimmed.is_empty() || normalized.iter().any(|existing| existing == trimmed) {
            continue;
        }
        normalized.push(trimmed.to_string());
    }
    if !(2..=6).contains(&normalized.len()) {
        return Err(PollError::Validation(format!(
            "polls need between 2 and 6 distinct options, got {}",
            normalized.len()
        )));
    }
    Ok(normalized)
}

/// Out-of-range time limits are clamped to the default, not rejected.
/// Presenters typing an absurd limit get a working poll instead of an
/// error round-trip; the bounds themselves come from configuration.
fn clamp_time_limit(requested: Option<u64>, limits: &EngineLimits) -> u64 {
    match requested {
        Some(secs) if limits.time_limit_bounds_secs.contains(&secs) => secs,
        Some(secs) => {
            warn!(
                requested_secs = secs,
                default_secs = limits.default_time_limit_secs,
                "time limit out of bounds, clamping to default"
            );
            limits.default_time_limit_secs
        }
        None => limits.default_time_limit_secs,
    }
}
