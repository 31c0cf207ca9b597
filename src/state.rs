//! Ticket status machine: the closed status enumeration and the single
//! guard/transition table every write goes through.
//!
//! No other code path assigns `status`. The engine evaluates
//! [`transition_target`] against the in-transaction ticket, so guards that
//! read mutable fields (the current assignee) can never act on a stale
//! snapshot.
use crate::error::WorkflowError;
use crate::types::ApprovalLevel;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TicketStatus {
    #[n(0)]
    Open,
    #[n(1)]
    InProgress,
    #[n(2)]
    ReopenedInProgress,
    #[n(3)]
    Completed,
    #[n(4)]
    Closed,
    #[n(5)]
    RejectedPendingL3Review,
    #[n(6)]
    RejectedFinal,
}

impl TicketStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TicketStatus::Closed | TicketStatus::RejectedFinal)
    }

    /// In-progress family: an accepted ticket being worked, original or
    /// reopened. Escalation keeps the ticket in this family.
    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            TicketStatus::InProgress | TicketStatus::ReopenedInProgress
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::ReopenedInProgress => "reopened_in_progress",
            TicketStatus::Completed => "completed",
            TicketStatus::Closed => "closed",
            TicketStatus::RejectedPendingL3Review => "rejected_pending_l3_review",
            TicketStatus::RejectedFinal => "rejected_final",
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Accept,
    Reject,
    Complete,
    Escalate,
    Close,
    Reopen,
    Reassign,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Accept => "accept",
            Action::Reject => "reject",
            Action::Complete => "complete",
            Action::Escalate => "escalate",
            Action::Close => "close",
            Action::Reopen => "reopen",
            Action::Reassign => "reassign",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything a guard may look at, captured from the in-transaction ticket.
#[derive(Debug, Clone, Copy)]
pub struct GuardInput {
    pub current: TicketStatus,
    pub actor_level: ApprovalLevel,
    pub actor_is_assignee: bool,
    pub actor_is_reporter: bool,
    pub unassigned: bool,
}

fn no_edge(action: Action, current: TicketStatus) -> WorkflowError {
    WorkflowError::validation(
        "action",
        format!("`{action}` is not valid from status `{current}`"),
    )
}

/// The transition table. Returns the target status when the actor is
/// allowed to perform `action` from `g.current`, an `Authorization` error
/// when a row exists but its guard fails, and a `Validation` error when no
/// row exists for the (status, action) pair at all.
pub fn transition_target(action: Action, g: &GuardInput) -> Result<TicketStatus, WorkflowError> {
    match action {
        Action::Accept => match g.current {
            TicketStatus::Open => {
                if g.actor_level < ApprovalLevel::L2 {
                    return Err(WorkflowError::authorization(
                        "accept requires approval level L2 or above",
                    ));
                }
                if !g.unassigned && !g.actor_is_assignee {
                    return Err(WorkflowError::authorization(
                        "ticket is already assigned to another person",
                    ));
                }
                Ok(TicketStatus::InProgress)
            }
            // Override-accept: only L3 can pull a ticket back out of the
            // pending rejection review.
            TicketStatus::RejectedPendingL3Review => {
                if g.actor_level < ApprovalLevel::L3 {
                    return Err(WorkflowError::authorization(
                        "overriding a pending rejection requires approval level L3",
                    ));
                }
                Ok(TicketStatus::InProgress)
            }
            current => Err(no_edge(action, current)),
        },
        Action::Reject => {
            if g.current.is_terminal() {
                return Err(no_edge(action, g.current));
            }
            match g.actor_level {
                ApprovalLevel::L3 => {
                    // Confirming an already-pending rejection finalizes it;
                    // a first-time L3 reject still gets the one required
                    // confirmation step.
                    if g.current == TicketStatus::RejectedPendingL3Review {
                        Ok(TicketStatus::RejectedFinal)
                    } else {
                        Ok(TicketStatus::RejectedPendingL3Review)
                    }
                }
                ApprovalLevel::L2 if g.current == TicketStatus::Open => {
                    Ok(TicketStatus::RejectedPendingL3Review)
                }
                ApprovalLevel::L2 => Err(WorkflowError::authorization(
                    "approval level L2 may only reject open tickets",
                )),
                _ => Err(WorkflowError::authorization(
                    "reject requires approval level L2 or above",
                )),
            }
        }
        Action::Complete => {
            if !g.current.is_in_progress() {
                return Err(no_edge(action, g.current));
            }
            if g.actor_level < ApprovalLevel::L2 || !g.actor_is_assignee {
                return Err(WorkflowError::authorization(
                    "complete requires the assignee holding approval level L2 or above",
                ));
            }
            Ok(TicketStatus::Completed)
        }
        Action::Escalate => {
            if !g.current.is_in_progress() {
                return Err(no_edge(action, g.current));
            }
            if g.actor_level < ApprovalLevel::L2 || !g.actor_is_assignee {
                return Err(WorkflowError::authorization(
                    "escalate requires the assignee holding approval level L2 or above",
                ));
            }
            // Ownership transfer, not a status change.
            Ok(g.current)
        }
        Action::Close => {
            if g.current != TicketStatus::Completed {
                return Err(no_edge(action, g.current));
            }
            if !g.actor_is_reporter {
                return Err(WorkflowError::authorization(
                    "only the reporter may close a completed ticket",
                ));
            }
            Ok(TicketStatus::Closed)
        }
        Action::Reopen => {
            if g.current != TicketStatus::Completed {
                return Err(no_edge(action, g.current));
            }
            if !g.actor_is_reporter {
                return Err(WorkflowError::authorization(
                    "only the reporter may reopen a completed ticket",
                ));
            }
            Ok(TicketStatus::ReopenedInProgress)
        }
        Action::Reassign => {
            if g.current.is_terminal() {
                return Err(no_edge(action, g.current));
            }
            if g.actor_level < ApprovalLevel::L3 {
                return Err(WorkflowError::authorization(
                    "reassign requires approval level L3",
                ));
            }
            Ok(g.current)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(current: TicketStatus, level: ApprovalLevel) -> GuardInput {
        GuardInput {
            current,
            actor_level: level,
            actor_is_assignee: false,
            actor_is_reporter: false,
            unassigned: true,
        }
    }

    #[test]
    fn l2_reject_never_lands_final() {
        let g = guard(TicketStatus::Open, ApprovalLevel::L2);
        assert_eq!(
            transition_target(Action::Reject, &g).unwrap(),
            TicketStatus::RejectedPendingL3Review
        );

        let g = guard(TicketStatus::RejectedPendingL3Review, ApprovalLevel::L2);
        assert!(matches!(
            transition_target(Action::Reject, &g),
            Err(WorkflowError::Authorization { .. })
        ));
    }

    #[test]
    fn l3_reject_finalizes_only_from_pending_review() {
        let g = guard(TicketStatus::Completed, ApprovalLevel::L3);
        assert_eq!(
            transition_target(Action::Reject, &g).unwrap(),
            TicketStatus::RejectedPendingL3Review
        );

        let g = guard(TicketStatus::RejectedPendingL3Review, ApprovalLevel::L3);
        assert_eq!(
            transition_target(Action::Reject, &g).unwrap(),
            TicketStatus::RejectedFinal
        );
    }

    #[test]
    fn terminal_states_refuse_every_action() {
        for current in [TicketStatus::Closed, TicketStatus::RejectedFinal] {
            for action in [
                Action::Accept,
                Action::Reject,
                Action::Complete,
                Action::Escalate,
                Action::Close,
                Action::Reopen,
                Action::Reassign,
            ] {
                let mut g = guard(current, ApprovalLevel::L3);
                g.actor_is_assignee = true;
                g.actor_is_reporter = true;
                assert!(
                    transition_target(action, &g).is_err(),
                    "{action} from {current} should be refused"
                );
            }
        }
    }

    #[test]
    fn accept_refuses_foreign_assignment() {
        let mut g = guard(TicketStatus::Open, ApprovalLevel::L3);
        g.unassigned = false;
        g.actor_is_assignee = false;
        assert!(matches!(
            transition_target(Action::Accept, &g),
            Err(WorkflowError::Authorization { .. })
        ));

        g.actor_is_assignee = true;
        assert_eq!(
            transition_target(Action::Accept, &g).unwrap(),
            TicketStatus::InProgress
        );
    }

    #[test]
    fn escalate_and_reassign_keep_status() {
        let mut g = guard(TicketStatus::ReopenedInProgress, ApprovalLevel::L2);
        g.actor_is_assignee = true;
        assert_eq!(
            transition_target(Action::Escalate, &g).unwrap(),
            TicketStatus::ReopenedInProgress
        );

        let g = guard(TicketStatus::Completed, ApprovalLevel::L3);
        assert_eq!(
            transition_target(Action::Reassign, &g).unwrap(),
            TicketStatus::Completed
        );
    }
}
