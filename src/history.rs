//! Append-only audit trail. Entries are written in the same atomic unit
//! as the status change they record and are never mutated or deleted;
//! replaying them in creation order reconstructs the full status walk.
use crate::state::TicketStatus;
use crate::types::TimeStamp;
use chrono::Utc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct StatusHistoryEntry {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub ticket_id: String,
    #[n(2)]
    pub old_status: TicketStatus,
    #[n(3)]
    pub new_status: TicketStatus,
    #[n(4)]
    pub changed_by: String,
    #[n(5)]
    pub changed_at: TimeStamp<Utc>,
    #[n(6)]
    pub notes: Option<String>,
    /// Populated for assignment, escalation and reassignment events.
    #[n(7)]
    pub to_user: Option<String>,
}

/// Whether `old -> new` is an edge of the state machine. Self-edges on
/// non-terminal statuses are legal: escalation and reassignment transfer
/// ownership without changing status.
pub fn is_valid_edge(old: TicketStatus, new: TicketStatus) -> bool {
    use TicketStatus::*;

    if old == new {
        return !old.is_terminal();
    }
    match (old, new) {
        (Open, InProgress) => true,
        (Open | InProgress | ReopenedInProgress | Completed, RejectedPendingL3Review) => true,
        (RejectedPendingL3Review, RejectedFinal | InProgress) => true,
        (InProgress | ReopenedInProgress, Completed) => true,
        (Completed, Closed | ReopenedInProgress) => true,
        _ => false,
    }
}

/// Replay a ticket's history from the initial `open` status. Returns the
/// final status, or `None` if the walk is broken (an entry whose old
/// status does not match, or an illegal edge) -- which would mean the
/// audit trail was corrupted, since the engine can never commit one.
pub fn replay(entries: &[StatusHistoryEntry]) -> Option<TicketStatus> {
    let mut current = TicketStatus::Open;
    for entry in entries {
        if entry.old_status != current || !is_valid_edge(entry.old_status, entry.new_status) {
            return None;
        }
        current = entry.new_status;
    }
    Some(current)
}
