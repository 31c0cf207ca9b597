//! End-to-end walk of the ticket lifecycle against a local sled database.
use std::sync::Arc;

use ticket_workflow::{
    directory::{ApprovalDirectory, ApprovalGrant},
    engine::{TicketWorkflowEngine, TransitionPayload},
    notify::LogNotifier,
    query::TicketQueryFacade,
    state::{Action, TicketStatus},
    store::TicketStore,
    ticket::TicketDraft,
    types::{ApprovalLevel, Priority, Severity, TimeStamp},
    utils,
};

fn main() -> anyhow::Result<()> {
    let db = sled::open("sled")?;
    if !db.is_empty() {
        db.clear()?;
    }

    let store = TicketStore::open(&db)?;
    let directory = ApprovalDirectory::open(&db)?;
    let engine = TicketWorkflowEngine::new(store.clone(), directory.clone(), Arc::new(LogNotifier));
    let query = TicketQueryFacade::new(store.clone(), directory.clone());

    // One area, one reporter, one L2 approver.
    let area_id = utils::new_uuid_to_bech32("area")?;
    let reporter = utils::new_uuid_to_bech32("user")?;
    let approver = utils::new_uuid_to_bech32("user")?;

    directory.register_area(&area_id, "compressor hall")?;
    directory.upsert_grant(ApprovalGrant {
        person_id: approver.clone(),
        area_id: area_id.clone(),
        level: ApprovalLevel::L2,
        is_active: true,
    })?;

    store.register_failure_mode(7, "bearing wear")?;

    let ticket = store.create_ticket(
        TicketDraft::new()
            .set_title("abnormal vibration on compressor C-2")
            .set_description("vibration above alarm threshold on the drive end")
            .set_production_unit("PU-2")
            .set_severity(Severity::High)
            .set_priority(Priority::Urgent)
            .set_reporter(&reporter)
            .set_area(&area_id),
    )?;
    println!("created {} ({})", ticket.ticket_number, ticket.id);

    // accept -> complete -> close
    engine.submit_transition(
        &ticket.id,
        &approver,
        Action::Accept,
        TicketStatus::Open,
        TransitionPayload::new().set_scheduled_complete(TimeStamp::new()),
    )?;
    engine.submit_transition(
        &ticket.id,
        &approver,
        Action::Complete,
        TicketStatus::InProgress,
        TransitionPayload::new()
            .set_downtime_avoidance_hours(2.5)
            .set_cost_avoidance(5000.0)
            .set_failure_mode(7),
    )?;
    engine.submit_transition(
        &ticket.id,
        &reporter,
        Action::Close,
        TicketStatus::Completed,
        TransitionPayload::new().set_satisfaction_rating(5),
    )?;

    let view = query.get_for_actor(&ticket.id, &reporter)?;
    println!(
        "{} is now {:?} (viewer relationship: {:?})",
        view.ticket.ticket_number, view.ticket.status, view.user_relationship
    );

    for entry in store.list_history(&ticket.id)? {
        println!(
            "  {} -> {} by {}",
            entry.old_status, entry.new_status, entry.changed_by
        );
    }

    Ok(())
}
