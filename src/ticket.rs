//! Ticket aggregate, the draft builder used at creation, and the child
//! records the ticket exclusively owns (comments, images).
use crate::error::WorkflowError;
use crate::state::TicketStatus;
use crate::types::{Priority, Severity, TimeStamp};
use chrono::Utc;

/// The aggregate root. `status` is only ever written by the workflow
/// engine through the transition table; `id`, `ticket_number`,
/// `reporter_id` and `area_id` are immutable after creation.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Ticket {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub ticket_number: String,
    #[n(2)]
    pub title: String,
    #[n(3)]
    pub description: String,
    #[n(4)]
    pub production_unit_id: String,
    #[n(5)]
    pub severity: Severity,
    #[n(6)]
    pub priority: Priority,
    #[n(7)]
    pub status: TicketStatus,
    #[n(8)]
    pub reporter_id: String,
    #[n(9)]
    pub assigned_to: Option<String>,
    #[n(10)]
    pub area_id: String,
    #[n(11)]
    pub scheduled_complete: Option<TimeStamp<Utc>>,
    #[n(12)]
    pub downtime_avoidance_hours: Option<f64>,
    #[n(13)]
    pub cost_avoidance: Option<f64>,
    #[n(14)]
    pub failure_mode_id: Option<u32>,
    #[n(15)]
    pub satisfaction_rating: Option<u8>,
    #[n(16)]
    pub created_at: TimeStamp<Utc>,
    #[n(17)]
    pub updated_at: TimeStamp<Utc>,
    #[n(18)]
    pub resolved_at: Option<TimeStamp<Utc>>,
    #[n(19)]
    pub closed_at: Option<TimeStamp<Utc>>,
    /// Count of appended history entries; also the next history key suffix.
    #[n(20)]
    pub history_seq: u64,
}

// Used for constructing ticket drafts before anything is persisted.
#[derive(Debug, Default, Clone)]
pub struct TicketDraft {
    title: Option<String>,
    description: Option<String>,
    production_unit_id: Option<String>,
    severity: Option<Severity>,
    priority: Option<Priority>,
    reporter_id: Option<String>,
    area_id: Option<String>,
}

impl TicketDraft {
    /// Construct a new builder object, this becomes the basis for a draft
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }
    pub fn set_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
    pub fn set_production_unit(mut self, production_unit_id: &str) -> Self {
        self.production_unit_id = Some(production_unit_id.to_string());
        self
    }
    pub fn set_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }
    pub fn set_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }
    pub fn set_reporter(mut self, reporter_id: &str) -> Self {
        self.reporter_id = Some(reporter_id.to_string());
        self
    }
    pub fn set_area(mut self, area_id: &str) -> Self {
        self.area_id = Some(area_id.to_string());
        self
    }

    /// Checks required fields and turns the draft into a fresh `open`
    /// ticket. The surrogate id and the human-readable ticket number are
    /// assigned by the store, which owns uniqueness.
    pub(crate) fn finalise(self, id: String, ticket_number: String) -> Result<Ticket, WorkflowError> {
        let title = match self.title {
            Some(t) if !t.trim().is_empty() => t,
            _ => return Err(WorkflowError::validation("title", "must not be empty")),
        };
        let description = match self.description {
            Some(d) if !d.trim().is_empty() => d,
            _ => return Err(WorkflowError::validation("description", "must not be empty")),
        };
        let production_unit_id = self
            .production_unit_id
            .ok_or_else(|| WorkflowError::validation("production_unit_id", "is required"))?;
        let severity = self
            .severity
            .ok_or_else(|| WorkflowError::validation("severity", "is required"))?;
        let priority = self
            .priority
            .ok_or_else(|| WorkflowError::validation("priority", "is required"))?;
        let reporter_id = self
            .reporter_id
            .ok_or_else(|| WorkflowError::validation("reporter_id", "is required"))?;
        let area_id = self
            .area_id
            .ok_or_else(|| WorkflowError::validation("area_id", "is required"))?;

        let now = TimeStamp::new();
        Ok(Ticket {
            id,
            ticket_number,
            title,
            description,
            production_unit_id,
            severity,
            priority,
            status: TicketStatus::Open,
            reporter_id,
            assigned_to: None,
            area_id,
            scheduled_complete: None,
            downtime_avoidance_hours: None,
            cost_avoidance: None,
            failure_mode_id: None,
            satisfaction_rating: None,
            created_at: now.clone(),
            updated_at: now,
            resolved_at: None,
            closed_at: None,
            history_seq: 0,
        })
    }
}

/// Free-text note on a ticket. Independent of the workflow, append-only.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub ticket_id: String,
    #[n(2)]
    pub user_id: String,
    #[n(3)]
    pub body: String,
    #[n(4)]
    pub created_at: TimeStamp<Utc>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    #[n(0)]
    Before,
    #[n(1)]
    After,
}

impl ImageKind {
    /// Whether an image of this kind may be attached while the ticket is
    /// in `status`. Checked at upload time against the persisted status,
    /// never against an earlier read.
    pub fn allowed_in(self, status: TicketStatus) -> bool {
        match self {
            ImageKind::Before => !matches!(
                status,
                TicketStatus::Closed
                    | TicketStatus::RejectedPendingL3Review
                    | TicketStatus::RejectedFinal
            ),
            ImageKind::After => matches!(
                status,
                TicketStatus::InProgress
                    | TicketStatus::ReopenedInProgress
                    | TicketStatus::Completed
                    | TicketStatus::Closed
            ),
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct TicketImage {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub ticket_id: String,
    #[n(2)]
    pub kind: ImageKind,
    #[n(3)]
    pub url: String,
    #[n(4)]
    pub name: String,
}

/// Failure-mode catalog entry referenced by completed tickets.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct FailureMode {
    #[n(0)]
    pub id: u32,
    #[n(1)]
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_requires_every_field() {
        let draft = TicketDraft::new()
            .set_title("pump leaking")
            .set_description("oil residue under pump P-301")
            .set_production_unit("PU-7")
            .set_severity(Severity::High)
            .set_priority(Priority::Urgent)
            .set_reporter("user_abc")
            .set_area("area_xyz");

        let ticket = draft
            .clone()
            .finalise("tkt_1".into(), "TKT-000001".into())
            .unwrap();
        assert_eq!(ticket.status, TicketStatus::Open);
        assert!(ticket.assigned_to.is_none());
        assert_eq!(ticket.history_seq, 0);

        let missing = TicketDraft::new()
            .set_title("pump leaking")
            .finalise("tkt_2".into(), "TKT-000002".into());
        assert!(missing.is_err());
    }

    #[test]
    fn ticket_encoding_round_trips() {
        let ticket = TicketDraft::new()
            .set_title("belt misaligned")
            .set_description("conveyor belt drifting left")
            .set_production_unit("PU-2")
            .set_severity(Severity::Medium)
            .set_priority(Priority::Normal)
            .set_reporter("user_r")
            .set_area("area_a")
            .finalise("tkt_3".into(), "TKT-000003".into())
            .unwrap();

        let encoding = minicbor::to_vec(&ticket).unwrap();
        let decoded: Ticket = minicbor::decode(&encoding).unwrap();
        assert_eq!(ticket, decoded);
    }

    #[test]
    fn after_images_need_an_accepted_ticket() {
        assert!(!ImageKind::After.allowed_in(TicketStatus::Open));
        assert!(!ImageKind::After.allowed_in(TicketStatus::RejectedPendingL3Review));
        assert!(ImageKind::After.allowed_in(TicketStatus::InProgress));
        assert!(ImageKind::After.allowed_in(TicketStatus::Closed));

        assert!(ImageKind::Before.allowed_in(TicketStatus::Open));
        assert!(ImageKind::Before.allowed_in(TicketStatus::Completed));
        assert!(!ImageKind::Before.allowed_in(TicketStatus::Closed));
        assert!(!ImageKind::Before.allowed_in(TicketStatus::RejectedFinal));
    }
}
