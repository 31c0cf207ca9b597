//! Workflow engine: the only write path for ticket status.
//!
//! Every client action funnels through [`TicketWorkflowEngine::submit_transition`]
//! with the status the caller believes the ticket is in. The engine
//! validates the payload, resolves the actor's approval level for the
//! ticket's area, evaluates the guard table against the in-transaction
//! ticket, commits the compare-and-set together with exactly one audit
//! entry, and then fires one best-effort notification.
use crate::directory::ApprovalDirectory;
use crate::error::WorkflowError;
use crate::history::StatusHistoryEntry;
use crate::notify::{NotificationPort, TicketEvent};
use crate::state::{Action, GuardInput, TicketStatus, transition_target};
use crate::store::TicketStore;
use crate::ticket::Ticket;
use crate::types::{ApprovalLevel, TimeStamp};
use chrono::Utc;
use std::sync::Arc;

/// Per-transition input fields. Which ones are required depends on the
/// action; `validate_for` surfaces the specific missing field.
#[derive(Debug, Default, Clone)]
pub struct TransitionPayload {
    scheduled_complete: Option<TimeStamp<Utc>>,
    notes: Option<String>,
    downtime_avoidance_hours: Option<f64>,
    cost_avoidance: Option<f64>,
    failure_mode_id: Option<u32>,
    satisfaction_rating: Option<u8>,
    assignee: Option<String>,
}

impl TransitionPayload {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_scheduled_complete(mut self, date: TimeStamp<Utc>) -> Self {
        self.scheduled_complete = Some(date);
        self
    }
    pub fn set_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.to_string());
        self
    }
    pub fn set_downtime_avoidance_hours(mut self, hours: f64) -> Self {
        self.downtime_avoidance_hours = Some(hours);
        self
    }
    pub fn set_cost_avoidance(mut self, amount: f64) -> Self {
        self.cost_avoidance = Some(amount);
        self
    }
    pub fn set_failure_mode(mut self, failure_mode_id: u32) -> Self {
        self.failure_mode_id = Some(failure_mode_id);
        self
    }
    pub fn set_satisfaction_rating(mut self, rating: u8) -> Self {
        self.satisfaction_rating = Some(rating);
        self
    }
    /// Target person: escalation/reassignment target, or the explicit
    /// assignee of an L3 override-accept.
    pub fn set_assignee(mut self, person_id: &str) -> Self {
        self.assignee = Some(person_id.to_string());
        self
    }

    fn require_notes(&self) -> Result<(), WorkflowError> {
        match &self.notes {
            Some(n) if !n.trim().is_empty() => Ok(()),
            _ => Err(WorkflowError::validation("notes", "a reason is required")),
        }
    }

    fn validate_for(&self, action: Action) -> Result<(), WorkflowError> {
        match action {
            Action::Accept => {
                if self.scheduled_complete.is_none() {
                    return Err(WorkflowError::validation(
                        "scheduled_complete",
                        "required to enter in_progress",
                    ));
                }
            }
            Action::Reject | Action::Reopen => self.require_notes()?,
            Action::Complete => {
                let hours = self.downtime_avoidance_hours.ok_or_else(|| {
                    WorkflowError::validation("downtime_avoidance_hours", "is required")
                })?;
                if !hours.is_finite() || hours < 0.0 {
                    return Err(WorkflowError::validation(
                        "downtime_avoidance_hours",
                        "must be a non-negative number",
                    ));
                }
                let cost = self
                    .cost_avoidance
                    .ok_or_else(|| WorkflowError::validation("cost_avoidance", "is required"))?;
                if !cost.is_finite() || cost < 0.0 {
                    return Err(WorkflowError::validation(
                        "cost_avoidance",
                        "must be a non-negative number",
                    ));
                }
                if self.failure_mode_id.is_none() {
                    return Err(WorkflowError::validation("failure_mode_id", "is required"));
                }
            }
            Action::Close => {
                if let Some(rating) = self.satisfaction_rating {
                    if !(1..=5).contains(&rating) {
                        return Err(WorkflowError::validation(
                            "satisfaction_rating",
                            "must be between 1 and 5",
                        ));
                    }
                }
            }
            Action::Escalate => {
                if self.assignee.is_none() {
                    return Err(WorkflowError::validation(
                        "assignee",
                        "an escalation target is required",
                    ));
                }
            }
            Action::Reassign => {
                if self.assignee.is_none() {
                    return Err(WorkflowError::validation(
                        "assignee",
                        "a reassignment target is required",
                    ));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct TransitionResult {
    pub ticket: Ticket,
    pub entry: StatusHistoryEntry,
    pub event: TicketEvent,
}

pub struct TicketWorkflowEngine {
    store: TicketStore,
    directory: ApprovalDirectory,
    notifier: Arc<dyn NotificationPort>,
}

impl TicketWorkflowEngine {
    pub fn new(
        store: TicketStore,
        directory: ApprovalDirectory,
        notifier: Arc<dyn NotificationPort>,
    ) -> Self {
        Self {
            store,
            directory,
            notifier,
        }
    }

    /// Resolve and check the escalation/reassignment target named in the
    /// payload. Target problems are payload validation, not authorization:
    /// authorization is about the acting person.
    fn resolve_target(
        &self,
        action: Action,
        payload: &TransitionPayload,
        ticket: &Ticket,
    ) -> Result<Option<String>, WorkflowError> {
        let Some(target) = payload.assignee.clone() else {
            return Ok(None);
        };
        let target_level = self.directory.resolve_level(&target, &ticket.area_id)?;
        match action {
            Action::Escalate => {
                if target_level != ApprovalLevel::L3 {
                    return Err(WorkflowError::validation(
                        "assignee",
                        "escalation target must hold level L3 in the ticket's area",
                    ));
                }
            }
            Action::Reassign => {
                if target_level < ApprovalLevel::L2 {
                    return Err(WorkflowError::validation(
                        "assignee",
                        "reassignment target must hold level L2 or above in the ticket's area",
                    ));
                }
                if target == ticket.reporter_id {
                    return Err(WorkflowError::validation(
                        "assignee",
                        "reassignment target must not be the ticket's reporter",
                    ));
                }
            }
            // L3 override-accept may name an explicit assignee; the table
            // puts no level requirement on it.
            _ => {}
        }
        Ok(Some(target))
    }

    pub fn submit_transition(
        &self,
        ticket_id: &str,
        actor_id: &str,
        action: Action,
        expected_status: TicketStatus,
        payload: TransitionPayload,
    ) -> Result<TransitionResult, WorkflowError> {
        payload.validate_for(action)?;

        // Pre-reads: area, levels and the failure-mode reference are
        // read-only lookups; the authoritative status check happens inside
        // the store transaction.
        let snapshot = self.store.load_ticket(ticket_id)?;
        let actor_level = self.directory.resolve_level(actor_id, &snapshot.area_id)?;
        let target = self.resolve_target(action, &payload, &snapshot)?;
        if action == Action::Complete {
            if let Some(failure_mode_id) = payload.failure_mode_id {
                self.store.require_failure_mode(failure_mode_id)?;
            }
        }

        // Who ends up assigned, if this action assigns. For accept the
        // expected status tells us whether this is an L3 override (which
        // may name an explicit assignee) or a plain claim by the actor.
        let assignee_after: Option<String> = match action {
            Action::Accept => {
                if expected_status == TicketStatus::RejectedPendingL3Review {
                    Some(target.clone().unwrap_or_else(|| actor_id.to_string()))
                } else {
                    Some(actor_id.to_string())
                }
            }
            Action::Escalate | Action::Reassign => target.clone(),
            _ => None,
        };

        let (ticket, entry) = self.store.compare_and_set_status(
            ticket_id,
            expected_status,
            actor_id,
            payload.notes.as_deref(),
            assignee_after.as_deref(),
            |ticket| {
                let guard = GuardInput {
                    current: ticket.status,
                    actor_level,
                    actor_is_assignee: ticket.assigned_to.as_deref() == Some(actor_id),
                    actor_is_reporter: ticket.reporter_id == actor_id,
                    unassigned: ticket.assigned_to.is_none(),
                };
                let next = transition_target(action, &guard)?;

                match action {
                    Action::Accept => {
                        ticket.scheduled_complete = payload.scheduled_complete.clone();
                        if let Some(assignee) = &assignee_after {
                            ticket.assigned_to = Some(assignee.clone());
                        }
                    }
                    Action::Complete => {
                        ticket.downtime_avoidance_hours = payload.downtime_avoidance_hours;
                        ticket.cost_avoidance = payload.cost_avoidance;
                        ticket.failure_mode_id = payload.failure_mode_id;
                        ticket.resolved_at = Some(TimeStamp::new());
                    }
                    Action::Escalate | Action::Reassign => {
                        if let Some(assignee) = &assignee_after {
                            ticket.assigned_to = Some(assignee.clone());
                        }
                    }
                    Action::Close => {
                        ticket.satisfaction_rating = payload.satisfaction_rating;
                        ticket.closed_at = Some(TimeStamp::new());
                    }
                    Action::Reopen => {
                        // resolved_at survives a reopen; only the close
                        // timestamp is cleared.
                        ticket.closed_at = None;
                    }
                    Action::Reject => {}
                }
                Ok(next)
            },
        )?;

        tracing::info!(
            ticket = %ticket.ticket_number,
            action = %action,
            old = %entry.old_status,
            new = %entry.new_status,
            by = %actor_id,
            "transition committed"
        );

        // Best effort, strictly after the commit. A delivery failure is
        // logged and never surfaced: the transition already happened.
        let event = TicketEvent::from_action(action, entry.new_status);
        if let Err(err) = self.notifier.notify(&ticket.id, event) {
            tracing::warn!(ticket = %ticket.id, event = %event, error = %err, "notification delivery failed");
        }

        Ok(TransitionResult {
            ticket,
            entry,
            event,
        })
    }
}
