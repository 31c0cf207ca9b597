//! End-to-end workflow scenarios against a real sled database.
use anyhow::Context;
use std::sync::Arc;
use std::thread;
use tempfile::{TempDir, tempdir};

use ticket_workflow::{
    directory::{ApprovalDirectory, ApprovalGrant},
    engine::{TicketWorkflowEngine, TransitionPayload},
    error::WorkflowError,
    notify::LogNotifier,
    state::{Action, TicketStatus},
    store::TicketStore,
    ticket::{Ticket, TicketDraft},
    types::{ApprovalLevel, Priority, Severity, TimeStamp},
    utils,
};

// Sled uses file-based locking to prevent concurrent access, so each test
// gets its own database under a temp dir for simplified cleanup.
struct Fixture {
    _tmp: TempDir,
    store: TicketStore,
    engine: Arc<TicketWorkflowEngine>,
    area_id: String,
    reporter: String,
    l2_a: String,
    l2_b: String,
    l3: String,
}

fn fixture(name: &str) -> anyhow::Result<Fixture> {
    let tmp = tempdir()?;
    let db = sled::open(tmp.path().join(name))?;
    db.clear()?;

    let store = TicketStore::open(&db)?;
    let directory = ApprovalDirectory::open(&db)?;
    let engine = Arc::new(TicketWorkflowEngine::new(
        store.clone(),
        directory.clone(),
        Arc::new(LogNotifier),
    ));

    let area_id = utils::new_uuid_to_bech32("area")?;
    let reporter = utils::new_uuid_to_bech32("user")?;
    let l2_a = utils::new_uuid_to_bech32("user")?;
    let l2_b = utils::new_uuid_to_bech32("user")?;
    let l3 = utils::new_uuid_to_bech32("user")?;

    directory.register_area(&area_id, "line 3")?;
    for (person, level) in [
        (&l2_a, ApprovalLevel::L2),
        (&l2_b, ApprovalLevel::L2),
        (&l3, ApprovalLevel::L3),
    ] {
        directory.upsert_grant(ApprovalGrant {
            person_id: person.clone(),
            area_id: area_id.clone(),
            level,
            is_active: true,
        })?;
    }
    store.register_failure_mode(7, "seal failure")?;

    Ok(Fixture {
        _tmp: tmp,
        store,
        engine,
        area_id,
        reporter,
        l2_a,
        l2_b,
        l3,
    })
}

fn new_ticket(fx: &Fixture) -> anyhow::Result<Ticket> {
    let ticket = fx.store.create_ticket(
        TicketDraft::new()
            .set_title("coolant leak at press 4")
            .set_description("steady drip from the hydraulic return line")
            .set_production_unit("PU-4")
            .set_severity(Severity::Medium)
            .set_priority(Priority::High)
            .set_reporter(&fx.reporter)
            .set_area(&fx.area_id),
    )?;
    Ok(ticket)
}

/// Scenario A: L2 accepts an open ticket with a scheduled completion date.
#[test]
fn accept_claims_open_ticket() -> anyhow::Result<()> {
    let fx = fixture("scenario_a")?;
    let ticket = new_ticket(&fx)?;

    let result = fx
        .engine
        .submit_transition(
            &ticket.id,
            &fx.l2_a,
            Action::Accept,
            TicketStatus::Open,
            TransitionPayload::new()
                .set_scheduled_complete(TimeStamp::new_with(2025, 6, 1, 0, 0, 0)),
        )
        .context("accept failed")?;

    assert_eq!(result.ticket.status, TicketStatus::InProgress);
    assert_eq!(result.ticket.assigned_to.as_deref(), Some(fx.l2_a.as_str()));
    assert!(result.ticket.scheduled_complete.is_some());

    let history = fx.store.list_history(&ticket.id)?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].old_status, TicketStatus::Open);
    assert_eq!(history[0].new_status, TicketStatus::InProgress);
    assert_eq!(history[0].to_user.as_deref(), Some(fx.l2_a.as_str()));
    Ok(())
}

/// Scenario B: the assignee completes an in-progress ticket.
#[test]
fn complete_records_avoidance_figures() -> anyhow::Result<()> {
    let fx = fixture("scenario_b")?;
    let ticket = new_ticket(&fx)?;

    fx.engine.submit_transition(
        &ticket.id,
        &fx.l2_a,
        Action::Accept,
        TicketStatus::Open,
        TransitionPayload::new().set_scheduled_complete(TimeStamp::new()),
    )?;

    let result = fx
        .engine
        .submit_transition(
            &ticket.id,
            &fx.l2_a,
            Action::Complete,
            TicketStatus::InProgress,
            TransitionPayload::new()
                .set_downtime_avoidance_hours(2.5)
                .set_cost_avoidance(5000.0)
                .set_failure_mode(7),
        )
        .context("complete failed")?;

    assert_eq!(result.ticket.status, TicketStatus::Completed);
    assert!(result.ticket.resolved_at.is_some());
    assert_eq!(result.ticket.downtime_avoidance_hours, Some(2.5));
    assert_eq!(result.ticket.cost_avoidance, Some(5000.0));
    assert_eq!(result.ticket.failure_mode_id, Some(7));

    let history = fx.store.list_history(&ticket.id)?;
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].new_status, TicketStatus::Completed);
    Ok(())
}

/// Scenario C: an L2 reject parks the ticket for L3 review; only a second,
/// L3 reject finalizes it.
#[test]
fn rejection_requires_l3_confirmation() -> anyhow::Result<()> {
    let fx = fixture("scenario_c")?;
    let ticket = new_ticket(&fx)?;

    let first = fx.engine.submit_transition(
        &ticket.id,
        &fx.l2_a,
        Action::Reject,
        TicketStatus::Open,
        TransitionPayload::new().set_notes("duplicate"),
    )?;
    assert_eq!(first.ticket.status, TicketStatus::RejectedPendingL3Review);

    let second = fx.engine.submit_transition(
        &ticket.id,
        &fx.l3,
        Action::Reject,
        TicketStatus::RejectedPendingL3Review,
        TransitionPayload::new().set_notes("confirmed duplicate of TKT-000017"),
    )?;
    assert_eq!(second.ticket.status, TicketStatus::RejectedFinal);

    let history = fx.store.list_history(&ticket.id)?;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].notes.as_deref(), Some("duplicate"));
    Ok(())
}

/// Scenario D: close is reporter-only regardless of approval level.
#[test]
fn close_by_non_reporter_is_refused() -> anyhow::Result<()> {
    let fx = fixture("scenario_d")?;
    let ticket = new_ticket(&fx)?;

    fx.engine.submit_transition(
        &ticket.id,
        &fx.l2_a,
        Action::Accept,
        TicketStatus::Open,
        TransitionPayload::new().set_scheduled_complete(TimeStamp::new()),
    )?;
    fx.engine.submit_transition(
        &ticket.id,
        &fx.l2_a,
        Action::Complete,
        TicketStatus::InProgress,
        TransitionPayload::new()
            .set_downtime_avoidance_hours(0.0)
            .set_cost_avoidance(0.0)
            .set_failure_mode(7),
    )?;

    let err = fx
        .engine
        .submit_transition(
            &ticket.id,
            &fx.l2_b,
            Action::Close,
            TicketStatus::Completed,
            TransitionPayload::new(),
        )
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Authorization { .. }));

    // No state change, no audit entry.
    let current = fx.store.load_ticket(&ticket.id)?;
    assert_eq!(current.status, TicketStatus::Completed);
    assert_eq!(fx.store.list_history(&ticket.id)?.len(), 2);

    // The reporter may close, with an optional rating.
    let closed = fx.engine.submit_transition(
        &ticket.id,
        &fx.reporter,
        Action::Close,
        TicketStatus::Completed,
        TransitionPayload::new().set_satisfaction_rating(4),
    )?;
    assert_eq!(closed.ticket.status, TicketStatus::Closed);
    assert!(closed.ticket.closed_at.is_some());
    assert_eq!(closed.ticket.satisfaction_rating, Some(4));
    Ok(())
}

/// Scenario E: two L2 approvers race to accept the same unassigned open
/// ticket. Exactly one wins; the loser observes the now-current status.
#[test]
fn concurrent_accepts_serialize() -> anyhow::Result<()> {
    let fx = fixture("scenario_e")?;
    let ticket = new_ticket(&fx)?;

    let mut handles = Vec::new();
    for actor in [fx.l2_a.clone(), fx.l2_b.clone()] {
        let engine = Arc::clone(&fx.engine);
        let ticket_id = ticket.id.clone();
        handles.push(thread::spawn(move || {
            let outcome = engine.submit_transition(
                &ticket_id,
                &actor,
                Action::Accept,
                TicketStatus::Open,
                TransitionPayload::new().set_scheduled_complete(TimeStamp::new()),
            );
            (actor, outcome)
        }));
    }

    let mut winners = Vec::new();
    let mut conflicts = 0;
    for handle in handles {
        let (actor, outcome) = handle.join().expect("accept thread panicked");
        match outcome {
            Ok(result) => {
                assert_eq!(result.ticket.status, TicketStatus::InProgress);
                assert_eq!(result.ticket.assigned_to.as_deref(), Some(actor.as_str()));
                winners.push(actor);
            }
            Err(WorkflowError::Conflict { expected, actual }) => {
                assert_eq!(expected, TicketStatus::Open);
                assert_eq!(actual, TicketStatus::InProgress);
                conflicts += 1;
            }
            Err(other) => panic!("unexpected error from racing accept: {other}"),
        }
    }

    assert_eq!(winners.len(), 1, "exactly one accept must win");
    assert_eq!(conflicts, 1);

    // One logical transition, one audit entry, assigned to the winner.
    let current = fx.store.load_ticket(&ticket.id)?;
    assert_eq!(current.assigned_to.as_deref(), Some(winners[0].as_str()));
    let history = fx.store.list_history(&ticket.id)?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].changed_by, winners[0]);
    Ok(())
}

/// An L3 pulling a pending rejection back into work, naming an explicit
/// assignee.
#[test]
fn override_accept_assigns_explicitly() -> anyhow::Result<()> {
    let fx = fixture("override_accept")?;
    let ticket = new_ticket(&fx)?;

    fx.engine.submit_transition(
        &ticket.id,
        &fx.l2_a,
        Action::Reject,
        TicketStatus::Open,
        TransitionPayload::new().set_notes("not reproducible"),
    )?;

    let result = fx.engine.submit_transition(
        &ticket.id,
        &fx.l3,
        Action::Accept,
        TicketStatus::RejectedPendingL3Review,
        TransitionPayload::new()
            .set_scheduled_complete(TimeStamp::new())
            .set_assignee(&fx.l2_b),
    )?;

    assert_eq!(result.ticket.status, TicketStatus::InProgress);
    assert_eq!(result.ticket.assigned_to.as_deref(), Some(fx.l2_b.as_str()));
    Ok(())
}

/// Reopen hands the ticket back to the previous assignee family of
/// statuses and clears nothing but the close timestamp.
#[test]
fn reopen_preserves_resolution_data() -> anyhow::Result<()> {
    let fx = fixture("reopen")?;
    let ticket = new_ticket(&fx)?;

    fx.engine.submit_transition(
        &ticket.id,
        &fx.l2_a,
        Action::Accept,
        TicketStatus::Open,
        TransitionPayload::new().set_scheduled_complete(TimeStamp::new()),
    )?;
    fx.engine.submit_transition(
        &ticket.id,
        &fx.l2_a,
        Action::Complete,
        TicketStatus::InProgress,
        TransitionPayload::new()
            .set_downtime_avoidance_hours(1.0)
            .set_cost_avoidance(250.0)
            .set_failure_mode(7),
    )?;

    let reopened = fx.engine.submit_transition(
        &ticket.id,
        &fx.reporter,
        Action::Reopen,
        TicketStatus::Completed,
        TransitionPayload::new().set_notes("leak came back overnight"),
    )?;

    assert_eq!(reopened.ticket.status, TicketStatus::ReopenedInProgress);
    assert!(reopened.ticket.closed_at.is_none());
    assert!(reopened.ticket.resolved_at.is_some());
    assert_eq!(
        reopened.ticket.assigned_to.as_deref(),
        Some(fx.l2_a.as_str())
    );

    // The reopened ticket can be completed and finally closed.
    fx.engine.submit_transition(
        &ticket.id,
        &fx.l2_a,
        Action::Complete,
        TicketStatus::ReopenedInProgress,
        TransitionPayload::new()
            .set_downtime_avoidance_hours(3.0)
            .set_cost_avoidance(900.0)
            .set_failure_mode(7),
    )?;
    let closed = fx.engine.submit_transition(
        &ticket.id,
        &fx.reporter,
        Action::Close,
        TicketStatus::Completed,
        TransitionPayload::new(),
    )?;
    assert_eq!(closed.ticket.status, TicketStatus::Closed);
    assert_eq!(fx.store.list_history(&ticket.id)?.len(), 5);
    Ok(())
}
