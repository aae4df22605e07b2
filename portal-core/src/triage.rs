use std::cmp::Reverse;

use crate::model::ChatSession;

/// Orders a patient's sessions for clinician review, most urgent first.
///
/// The priority field is externally supplied and untrusted, so the ordering
/// must degrade instead of failing: sessions without a summary, or whose
/// declared score is out of range or non-numeric, sort as score 0. The sort is
/// stable, and callers pass sessions in creation-time-descending order (what
/// [`SessionStore::list_for_patient`](crate::session::SessionStore) returns),
/// so equal scores break ties most-recent-created first.
pub fn rank(sessions: Vec<ChatSession>) -> Vec<ChatSession> {
    let mut ranked = sessions;
    ranked.sort_by_key(|session| Reverse(session.priority_score()));
    ranked
}
