//! Approval directory: organizational areas and per-area approval grants.
//!
//! A person may hold different levels in different areas; resolution is
//! always for one area, never global. Grants are keyed
//! `{area_id}/{person_id}/{level}` so both per-person resolution and
//! per-area listing are prefix scans.
use crate::error::WorkflowError;
use crate::types::ApprovalLevel;
use std::collections::BTreeMap;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Area {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ApprovalGrant {
    #[n(0)]
    pub person_id: String,
    #[n(1)]
    pub area_id: String,
    #[n(2)]
    pub level: ApprovalLevel,
    #[n(3)]
    pub is_active: bool,
}

/// A person surfaced by an assignee/escalation-target picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonRef {
    pub person_id: String,
    pub level: ApprovalLevel,
}

#[derive(Clone)]
pub struct ApprovalDirectory {
    areas: sled::Tree,
    grants: sled::Tree,
}

fn decode_grant(raw: &[u8]) -> Result<ApprovalGrant, WorkflowError> {
    minicbor::decode(raw).map_err(|e| WorkflowError::Codec(e.to_string()))
}

impl ApprovalDirectory {
    pub fn open(db: &sled::Db) -> Result<Self, WorkflowError> {
        Ok(Self {
            areas: db.open_tree("areas")?,
            grants: db.open_tree("grants")?,
        })
    }

    pub fn register_area(&self, area_id: &str, name: &str) -> Result<(), WorkflowError> {
        let area = Area {
            id: area_id.to_string(),
            name: name.to_string(),
        };
        let cbor = minicbor::to_vec(&area).map_err(|e| WorkflowError::Codec(e.to_string()))?;
        self.areas.insert(area_id.as_bytes(), cbor)?;
        Ok(())
    }

    /// Insert or replace the grant for (person, area, level). Deactivating
    /// is an upsert with `is_active = false`; history of old grants is not
    /// kept here.
    pub fn upsert_grant(&self, grant: ApprovalGrant) -> Result<(), WorkflowError> {
        self.require_area(&grant.area_id)?;
        if grant.level == ApprovalLevel::None {
            return Err(WorkflowError::validation(
                "level",
                "a grant must carry level L1, L2 or L3",
            ));
        }
        let key = format!(
            "{}/{}/{}",
            grant.area_id,
            grant.person_id,
            grant.level.as_u8()
        );
        let cbor = minicbor::to_vec(&grant).map_err(|e| WorkflowError::Codec(e.to_string()))?;
        self.grants.insert(key.as_bytes(), cbor)?;
        Ok(())
    }

    fn require_area(&self, area_id: &str) -> Result<(), WorkflowError> {
        if self.areas.get(area_id.as_bytes())?.is_none() {
            return Err(WorkflowError::not_found("area", area_id));
        }
        Ok(())
    }

    /// Highest active level the person holds in the area; `None` when the
    /// person has no active grant there at all.
    pub fn resolve_level(
        &self,
        person_id: &str,
        area_id: &str,
    ) -> Result<ApprovalLevel, WorkflowError> {
        self.require_area(area_id)?;

        let prefix = format!("{area_id}/{person_id}/");
        let mut level = ApprovalLevel::None;
        for item in self.grants.scan_prefix(prefix.as_bytes()) {
            let (_, raw) = item?;
            let grant = decode_grant(&raw)?;
            if grant.is_active && grant.level > level {
                level = grant.level;
            }
        }
        Ok(level)
    }

    /// All persons holding an active level >= `min_level` in the area,
    /// each at their highest level. `exclude` drops one person from the
    /// result -- reassignment pickers exclude the ticket's reporter,
    /// escalation pickers do not.
    pub fn list_by_level(
        &self,
        area_id: &str,
        min_level: ApprovalLevel,
        exclude: Option<&str>,
    ) -> Result<Vec<PersonRef>, WorkflowError> {
        self.require_area(area_id)?;

        let prefix = format!("{area_id}/");
        let mut best: BTreeMap<String, ApprovalLevel> = BTreeMap::new();
        for item in self.grants.scan_prefix(prefix.as_bytes()) {
            let (_, raw) = item?;
            let grant = decode_grant(&raw)?;
            if !grant.is_active {
                continue;
            }
            let entry = best
                .entry(grant.person_id.clone())
                .or_insert(ApprovalLevel::None);
            if grant.level > *entry {
                *entry = grant.level;
            }
        }

        Ok(best
            .into_iter()
            .filter(|(person, level)| *level >= min_level && Some(person.as_str()) != exclude)
            .map(|(person_id, level)| PersonRef { person_id, level })
            .collect())
    }
}
