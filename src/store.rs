//! Durable ticket state over sled.
//!
//! One tree per record family. The status row is the only shared resource
//! needing mutual exclusion; [`TicketStore::compare_and_set_status`] gives
//! it a serialized compare-and-set through a multi-tree sled transaction,
//! so the history entry lands in the same atomic unit as the status change
//! and concurrent writers for the same ticket linearize.
use crate::error::WorkflowError;
use crate::history::StatusHistoryEntry;
use crate::state::TicketStatus;
use crate::ticket::{Comment, FailureMode, ImageKind, Ticket, TicketDraft, TicketImage};
use crate::types::TimeStamp;
use crate::utils;
use sled::Transactional;
use sled::transaction::{ConflictableTransactionError, TransactionError};

#[derive(Clone)]
pub struct TicketStore {
    db: sled::Db,
    tickets: sled::Tree,
    history: sled::Tree,
    comments: sled::Tree,
    images: sled::Tree,
    failure_modes: sled::Tree,
}

fn encode<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>, WorkflowError> {
    minicbor::to_vec(value).map_err(|e| WorkflowError::Codec(e.to_string()))
}

fn decode<'b, T: minicbor::Decode<'b, ()>>(raw: &'b [u8]) -> Result<T, WorkflowError> {
    minicbor::decode(raw).map_err(|e| WorkflowError::Codec(e.to_string()))
}

/// History keys are `{ticket_id}/{seq}` with a zero-padded sequence so a
/// prefix scan yields entries in creation order.
fn history_key(ticket_id: &str, seq: u64) -> String {
    format!("{ticket_id}/{seq:010}")
}

impl TicketStore {
    pub fn open(db: &sled::Db) -> Result<Self, WorkflowError> {
        Ok(Self {
            db: db.clone(),
            tickets: db.open_tree("tickets")?,
            history: db.open_tree("history")?,
            comments: db.open_tree("comments")?,
            images: db.open_tree("images")?,
            failure_modes: db.open_tree("failure_modes")?,
        })
    }

    /// Validate a draft and persist it as a fresh `open` ticket. The
    /// ticket number comes off sled's monotonic id generator, so it is
    /// unique for the lifetime of the database.
    pub fn create_ticket(&self, draft: TicketDraft) -> Result<Ticket, WorkflowError> {
        let id = utils::new_id("tkt");
        let ticket_number = format!("TKT-{:06}", self.db.generate_id()?);
        let ticket = draft.finalise(id, ticket_number)?;

        self.tickets.insert(ticket.id.as_bytes(), encode(&ticket)?)?;
        Ok(ticket)
    }

    pub fn load_ticket(&self, ticket_id: &str) -> Result<Ticket, WorkflowError> {
        let raw = self
            .tickets
            .get(ticket_id.as_bytes())?
            .ok_or_else(|| WorkflowError::not_found("ticket", ticket_id))?;
        decode(&raw)
    }

    /// The atomic transition primitive.
    ///
    /// Inside one serialized transaction: re-read the ticket, verify its
    /// persisted status equals `expected` (mismatch aborts with `Conflict`
    /// carrying the actual status, changing nothing), run `mutate` against
    /// the fresh record (it applies field changes and returns the target
    /// status, or aborts with its own error), then write the ticket and
    /// append exactly one history entry. The closure may run more than
    /// once if sled retries the transaction, so `mutate` must be pure
    /// apart from the ticket it is handed.
    pub fn compare_and_set_status<F>(
        &self,
        ticket_id: &str,
        expected: TicketStatus,
        changed_by: &str,
        notes: Option<&str>,
        to_user: Option<&str>,
        mutate: F,
    ) -> Result<(Ticket, StatusHistoryEntry), WorkflowError>
    where
        F: Fn(&mut Ticket) -> Result<TicketStatus, WorkflowError>,
    {
        let result = (&self.tickets, &self.history).transaction(|(tickets, history)| {
            let raw = tickets.get(ticket_id.as_bytes())?.ok_or_else(|| {
                ConflictableTransactionError::Abort(WorkflowError::not_found("ticket", ticket_id))
            })?;
            let mut ticket: Ticket =
                decode(&raw).map_err(ConflictableTransactionError::Abort)?;

            let old = ticket.status;
            if old != expected {
                return Err(ConflictableTransactionError::Abort(WorkflowError::Conflict {
                    expected,
                    actual: old,
                }));
            }

            let next = mutate(&mut ticket).map_err(ConflictableTransactionError::Abort)?;
            ticket.status = next;
            ticket.updated_at = TimeStamp::new();
            ticket.history_seq += 1;

            let entry = StatusHistoryEntry {
                id: utils::new_id("hist"),
                ticket_id: ticket_id.to_string(),
                old_status: old,
                new_status: next,
                changed_by: changed_by.to_string(),
                changed_at: ticket.updated_at.clone(),
                notes: notes.map(str::to_string),
                to_user: to_user.map(str::to_string),
            };

            tickets.insert(
                ticket_id.as_bytes(),
                encode(&ticket).map_err(ConflictableTransactionError::Abort)?,
            )?;
            history.insert(
                history_key(ticket_id, ticket.history_seq).as_bytes(),
                encode(&entry).map_err(ConflictableTransactionError::Abort)?,
            )?;

            Ok((ticket, entry))
        });

        match result {
            Ok(committed) => Ok(committed),
            Err(TransactionError::Abort(err)) => Err(err),
            Err(TransactionError::Storage(err)) => Err(WorkflowError::Storage(err)),
        }
    }

    /// Complete audit timeline for a ticket, in creation order.
    pub fn list_history(&self, ticket_id: &str) -> Result<Vec<StatusHistoryEntry>, WorkflowError> {
        let prefix = format!("{ticket_id}/");
        let mut entries = Vec::new();
        for item in self.history.scan_prefix(prefix.as_bytes()) {
            let (_, raw) = item?;
            entries.push(decode(&raw)?);
        }
        Ok(entries)
    }

    pub fn add_comment(
        &self,
        ticket_id: &str,
        user_id: &str,
        body: &str,
    ) -> Result<Comment, WorkflowError> {
        if body.trim().is_empty() {
            return Err(WorkflowError::validation("body", "must not be empty"));
        }
        // Comments are independent of the workflow; existence is the only
        // thing checked against the ticket.
        self.load_ticket(ticket_id)?;

        let comment = Comment {
            id: utils::new_id("cmt"),
            ticket_id: ticket_id.to_string(),
            user_id: user_id.to_string(),
            body: body.to_string(),
            created_at: TimeStamp::new(),
        };
        let key = format!("{ticket_id}/{:010}", self.db.generate_id()?);
        self.comments.insert(key.as_bytes(), encode(&comment)?)?;
        Ok(comment)
    }

    pub fn list_comments(&self, ticket_id: &str) -> Result<Vec<Comment>, WorkflowError> {
        let prefix = format!("{ticket_id}/");
        let mut comments = Vec::new();
        for item in self.comments.scan_prefix(prefix.as_bytes()) {
            let (_, raw) = item?;
            comments.push(decode(&raw)?);
        }
        Ok(comments)
    }

    /// Attach an image, re-checking the persisted status inside the
    /// transaction: a transition racing the upload may have moved the
    /// ticket since the caller last read it.
    pub fn attach_image(
        &self,
        ticket_id: &str,
        kind: ImageKind,
        url: &str,
        name: &str,
    ) -> Result<TicketImage, WorkflowError> {
        let key = format!("{ticket_id}/{:010}", self.db.generate_id()?);

        let result = (&self.tickets, &self.images).transaction(|(tickets, images)| {
            let raw = tickets.get(ticket_id.as_bytes())?.ok_or_else(|| {
                ConflictableTransactionError::Abort(WorkflowError::not_found("ticket", ticket_id))
            })?;
            let ticket: Ticket = decode(&raw).map_err(ConflictableTransactionError::Abort)?;

            if !kind.allowed_in(ticket.status) {
                return Err(ConflictableTransactionError::Abort(
                    WorkflowError::validation(
                        "kind",
                        format!("image kind not allowed while ticket is `{}`", ticket.status),
                    ),
                ));
            }

            let image = TicketImage {
                id: utils::new_id("img"),
                ticket_id: ticket_id.to_string(),
                kind,
                url: url.to_string(),
                name: name.to_string(),
            };
            images.insert(
                key.as_bytes(),
                encode(&image).map_err(ConflictableTransactionError::Abort)?,
            )?;
            Ok(image)
        });

        match result {
            Ok(image) => Ok(image),
            Err(TransactionError::Abort(err)) => Err(err),
            Err(TransactionError::Storage(err)) => Err(WorkflowError::Storage(err)),
        }
    }

    pub fn list_images(&self, ticket_id: &str) -> Result<Vec<TicketImage>, WorkflowError> {
        let prefix = format!("{ticket_id}/");
        let mut found = Vec::new();
        for item in self.images.scan_prefix(prefix.as_bytes()) {
            let (_, raw) = item?;
            found.push(decode(&raw)?);
        }
        Ok(found)
    }

    pub fn register_failure_mode(&self, id: u32, name: &str) -> Result<(), WorkflowError> {
        let mode = FailureMode {
            id,
            name: name.to_string(),
        };
        self.failure_modes.insert(id.to_be_bytes(), encode(&mode)?)?;
        Ok(())
    }

    /// Existence check for the failure-mode reference a `complete`
    /// transition carries. The engine only checks presence; the catalog
    /// lives here.
    pub fn require_failure_mode(&self, id: u32) -> Result<(), WorkflowError> {
        if self.failure_modes.get(id.to_be_bytes())?.is_none() {
            return Err(WorkflowError::not_found("failure mode", id.to_string()));
        }
        Ok(())
    }
}
