//! Post-commit notification port. The engine only decides *that* an event
//! fires; delivery is someone else's problem and best effort -- a failure
//! here is logged and can never roll back the already-committed transition.
use crate::state::{Action, TicketStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketEvent {
    Accepted,
    Rejected,
    RejectionFinalized,
    Completed,
    Escalated,
    Closed,
    Reopened,
    Reassigned,
}

impl TicketEvent {
    pub fn from_action(action: Action, new_status: TicketStatus) -> Self {
        match action {
            Action::Accept => TicketEvent::Accepted,
            Action::Reject if new_status == TicketStatus::RejectedFinal => {
                TicketEvent::RejectionFinalized
            }
            Action::Reject => TicketEvent::Rejected,
            Action::Complete => TicketEvent::Completed,
            Action::Escalate => TicketEvent::Escalated,
            Action::Close => TicketEvent::Closed,
            Action::Reopen => TicketEvent::Reopened,
            Action::Reassign => TicketEvent::Reassigned,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TicketEvent::Accepted => "accepted",
            TicketEvent::Rejected => "rejected",
            TicketEvent::RejectionFinalized => "rejection_finalized",
            TicketEvent::Completed => "completed",
            TicketEvent::Escalated => "escalated",
            TicketEvent::Closed => "closed",
            TicketEvent::Reopened => "reopened",
            TicketEvent::Reassigned => "reassigned",
        }
    }
}

impl std::fmt::Display for TicketEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(thiserror::Error, Debug)]
#[error("notification delivery failed: {0}")]
pub struct NotificationError(pub String);

/// Fire-and-forget delivery seam, invoked strictly after the atomic
/// commit. Implementations must be cheap or hand off internally; the
/// engine calls this synchronously and does not retry.
pub trait NotificationPort: Send + Sync {
    fn notify(&self, ticket_id: &str, event: TicketEvent) -> Result<(), NotificationError>;
}

/// Default port: writes the event to the log and nothing else.
pub struct LogNotifier;

impl NotificationPort for LogNotifier {
    fn notify(&self, ticket_id: &str, event: TicketEvent) -> Result<(), NotificationError> {
        tracing::info!(ticket = %ticket_id, event = %event, "ticket event");
        Ok(())
    }
}
