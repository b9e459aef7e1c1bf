// Answer ledger for the active poll.

use std::collections::HashMap;

use uuid::Uuid;

/// At most one recorded option per respondent identity, scoped to the
/// current poll generation. The lifecycle controller is the only caller of
/// [`AnswerLedger::clear`]; everything here runs inside the engine's single
/// critical section, which is what makes the insert-if-absent atomic with
/// respect to the duplicate check.
#[derive(Debug, Default)]
pub struct AnswerLedger {
    entries: HashMap<Uuid, String>,
}

impl AnswerLedger {
    /// Record `option` for `respondent_id`. Returns `false` (and leaves the
    /// existing entry untouched) if the respondent already answered.
    pub fn record(&mut self, respondent_id: Uuid, option: String) -> bool {
        match self.entries.entry(respondent_id) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(option);
                true
            }
        }
    }

    pub fn has_answered(&self, respondent_id: Uuid) -> bool {
        self.entries.contains_key(&respondent_id)
    }

    /// Delete a respondent's entry (presenter removal path).
    pub fn remove(&mut self, respondent_id: Uuid) -> Option<String> {
        self.entries.remove(&respondent_id)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Uuid, &str)> + '_ {
        self.entries.iter().map(|(id, option)| (*id, option.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_record_for_same_respondent_is_rejected() {
        let mut ledger = AnswerLedger::default();
        let respondent = Uuid::new_v4();

        assert!(ledger.record(respondent, "4".into()));
        assert!(!ledger.record(respondent, "3".into()));

        assert_eq!(ledger.len(), 1);
        let recorded: Vec<_> = ledger.iter().collect();
        assert_eq!(recorded[0].1, "4", "the first answer must win");
    }

    #[test]
    fn distinct_respondents_record_independently() {
        let mut ledger = AnswerLedger::default();
        assert!(ledger.record(Uuid::new_v4(), "a".into()));
        assert!(ledger.record(Uuid::new_v4(), "a".into()));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn remove_deletes_the_entry() {
        let mut ledger = AnswerLedger::default();
        let respondent = Uuid::new_v4();
        ledger.record(respondent, "4".into());

        assert_eq!(ledger.remove(respondent), Some("4".into()));
        assert!(!ledger.has_answered(respondent));
        assert_eq!(ledger.remove(respondent), None);
    }

    #[test]
    fn clear_resets_for_a_new_generation() {
        let mut ledger = AnswerLedger::default();
        let respondent = Uuid::new_v4();
        ledger.record(respondent, "4".into());

        ledger.clear();

        assert_eq!(ledger.len(), 0);
        assert!(ledger.record(respondent, "3".into()), "cleared respondent may answer again");
    }
}
