//! Read-side facade for the UI layer.
//!
//! Derives the requesting actor's relationship and approval level from the
//! same directory resolution the engine uses, so the UI can only offer
//! actions the engine would actually allow. Pure reads, no side effects.
use crate::directory::{ApprovalDirectory, PersonRef};
use crate::error::WorkflowError;
use crate::store::TicketStore;
use crate::ticket::Ticket;
use crate::types::{ApprovalLevel, UserRelationship};

#[derive(Debug)]
pub struct TicketView {
    pub ticket: Ticket,
    pub user_relationship: UserRelationship,
    pub user_approval_level: ApprovalLevel,
}

pub struct TicketQueryFacade {
    store: TicketStore,
    directory: ApprovalDirectory,
}

impl TicketQueryFacade {
    pub fn new(store: TicketStore, directory: ApprovalDirectory) -> Self {
        Self { store, directory }
    }

    pub fn get_for_actor(
        &self,
        ticket_id: &str,
        actor_id: &str,
    ) -> Result<TicketView, WorkflowError> {
        let ticket = self.store.load_ticket(ticket_id)?;
        let user_approval_level = self.directory.resolve_level(actor_id, &ticket.area_id)?;

        let user_relationship = if ticket.reporter_id == actor_id {
            UserRelationship::Creator
        } else if user_approval_level >= ApprovalLevel::L2 {
            UserRelationship::Approver
        } else {
            UserRelationship::Viewer
        };

        Ok(TicketView {
            ticket,
            user_relationship,
            user_approval_level,
        })
    }

    /// Assignee/escalation-target picker data. Reassignment pickers pass
    /// the ticket's reporter as `exclude`; escalation pickers pass `None`,
    /// since a reporter may hold L3 for some other ticket's area.
    pub fn list_available_assignees(
        &self,
        area_id: &str,
        min_level: ApprovalLevel,
        exclude: Option<&str>,
    ) -> Result<Vec<PersonRef>, WorkflowError> {
        self.directory.list_by_level(area_id, min_level, exclude)
    }
}
