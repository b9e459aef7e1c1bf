// Result aggregation: a pure function of poll, ledger, and roster.

use livepoll_common::types::{AggregatedResult, Attribution, OptionTally, Poll};

use super::{ledger::AnswerLedger, roster::Roster};

/// Compute the aggregate for `poll` from scratch.
///
/// Recomputing (rather than patching counts incrementally) is what keeps
/// the numbers honest when a respondent is removed mid-poll: their ledger
/// entry is gone, so the next aggregate simply no longer counts it.
/// The aggregator reports raw counts only; any "leading option" display
/// and its tie-breaking belong to the consumer.
pub fn aggregate(poll: &Poll, ledger: &AnswerLedger, roster: &Roster) -> AggregatedResult {
    let total_answers = ledger.len();

    let tallies = poll
        .options
        .iter()
        .map(|option| {
            let mut respondents: Vec<Attribution> = ledger
                .iter()
                .filter(|(_, recorded)| *recorded == option.as_str())
                .map(|(respondent_id, _)| Attribution {
                    id: respondent_id,
                    name: roster.name_of(respondent_id).unwrap_or_default().to_string(),
                })
                .collect();
            respondents.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

            let count = respondents.len();
            let percentage = if total_answers > 0 {
                count as f64 / total_answers as f64 * 100.0
            } else {
                0.0
            };

            OptionTally { option: option.clone(), count, percentage, respondents }
        })
        .collect();

    AggregatedResult {
        poll_id: poll.id,
        question: poll.question.clone(),
        tallies,
        total_answers,
        total_respondents: roster.respondent_count(),
        created_at: poll.created_at,
        time_limit_secs: poll.time_limit_secs,
    }
}
