//! Whole-store invariant audit.
//!
//! Checks, for every active record:
//! - each stored ancestor pointer names an existing, active record of the
//!   level it is stored at;
//! - the chain equals the chain derived from its primary parent, or for an
//!   orphan, from the deepest ancestor it still points at;
//! - at most one active role record per member, one active family group per
//!   preacher and one active zone per supervisor;
//! - offerings carry a contributor tag matching the level of the record they
//!   reference.
//!
//! Records are checked in parallel against an immutable id index.

use crate::core::broker::DbBroker;
use crate::core::error::FellowshipError;
use crate::core::store::Store;
use crate::hierarchy::model::{AncestorChain, Level, Node};
use crate::hierarchy::repo;
use crate::registry::offering;
use rayon::prelude::*;
use rusqlite::Connection;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    ChainMismatch,
    InactiveAncestor,
    MissingAncestor,
    WrongAncestorLevel,
    MultipleActiveRoles,
    PreacherLeadsMany,
    SupervisorZonesMany,
    OfferingTagMismatch,
}

impl ViolationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ViolationKind::ChainMismatch => "chain_mismatch",
            ViolationKind::InactiveAncestor => "inactive_ancestor",
            ViolationKind::MissingAncestor => "missing_ancestor",
            ViolationKind::WrongAncestorLevel => "wrong_ancestor_level",
            ViolationKind::MultipleActiveRoles => "multiple_active_roles",
            ViolationKind::PreacherLeadsMany => "preacher_leads_many",
            ViolationKind::SupervisorZonesMany => "supervisor_zones_many",
            ViolationKind::OfferingTagMismatch => "offering_tag_mismatch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub record_id: String,
    pub kind: ViolationKind,
    pub detail: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.kind.as_str(), self.record_id, self.detail)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub records_checked: usize,
    pub offerings_checked: usize,
    pub violations: Vec<Violation>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

fn violation(record_id: &str, kind: ViolationKind, detail: String) -> Violation {
    Violation {
        record_id: record_id.to_string(),
        kind,
        detail,
    }
}

/// Pointer and chain checks for one active record.
fn check_node(node: &Node, index: &FxHashMap<&str, &Node>) -> Vec<Violation> {
    let mut out = Vec::new();
    let allowed = node.level.ancestor_levels();
    for (level, id) in node.chain.entries() {
        if !allowed.contains(&level) {
            out.push(violation(
                &node.id,
                ViolationKind::WrongAncestorLevel,
                format!("a {} cannot point at a {} ({})", node.level, level, id),
            ));
            continue;
        }
        match index.get(id) {
            None => out.push(violation(
                &node.id,
                ViolationKind::MissingAncestor,
                format!("{} pointer {} does not exist", level, id),
            )),
            Some(ancestor) if ancestor.level != level => out.push(violation(
                &node.id,
                ViolationKind::WrongAncestorLevel,
                format!("{} pointer {} is a {}", level, id, ancestor.level),
            )),
            Some(ancestor) if !ancestor.is_active() => out.push(violation(
                &node.id,
                ViolationKind::InactiveAncestor,
                format!("{} pointer {} is inactive", level, id),
            )),
            Some(_) => {}
        }
    }
    if let Some((_, anchor_id)) = node.chain_anchor() {
        if let Some(anchor) = index.get(anchor_id) {
            let expected = AncestorChain::under(anchor);
            if expected != node.chain {
                out.push(violation(
                    &node.id,
                    ViolationKind::ChainMismatch,
                    format!("stored chain differs from the chain through {}", anchor_id),
                ));
            }
        }
    }
    out
}

/// Uniqueness checks over the active records.
fn check_uniqueness<'a>(active: impl Iterator<Item = &'a Node>) -> Vec<Violation> {
    let mut by_member: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
    let mut by_preacher: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
    let mut by_supervisor: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
    for node in active {
        if let Some(member_id) = node.member_id.as_deref() {
            by_member.entry(member_id).or_default().push(&node.id);
        }
        match node.level {
            Level::FamilyGroup => {
                if let Some(p) = node.chain.preacher.as_deref() {
                    by_preacher.entry(p).or_default().push(&node.id);
                }
            }
            Level::Zone => {
                if let Some(s) = node.chain.supervisor.as_deref() {
                    by_supervisor.entry(s).or_default().push(&node.id);
                }
            }
            _ => {}
        }
    }
    let mut out = Vec::new();
    let groups = [
        (by_member, ViolationKind::MultipleActiveRoles, "active role records"),
        (by_preacher, ViolationKind::PreacherLeadsMany, "active family groups"),
        (by_supervisor, ViolationKind::SupervisorZonesMany, "active zones"),
    ];
    for (map, kind, what) in groups {
        for (owner, ids) in map {
            if ids.len() > 1 {
                out.push(violation(
                    owner,
                    kind,
                    format!("{} {}: {}", ids.len(), what, ids.join(", ")),
                ));
            }
        }
    }
    out
}

/// Audit a set of records that fit in memory as a whole.
pub fn audit_nodes(nodes: &[Node]) -> Vec<Violation> {
    let index: FxHashMap<&str, &Node> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();
    let mut violations: Vec<Violation> = nodes
        .par_iter()
        .filter(|n| n.is_active())
        .flat_map_iter(|n| check_node(n, &index))
        .collect();
    violations.extend(check_uniqueness(nodes.iter().filter(|n| n.is_active())));
    violations.sort_by(|a, b| a.record_id.cmp(&b.record_id).then(a.detail.cmp(&b.detail)));
    violations
}

fn check_offerings(conn: &Connection, index: &FxHashMap<&str, &Node>) -> Result<(usize, Vec<Violation>), FellowshipError> {
    let offerings = offering::list_offerings(conn, None)?;
    let violations = offerings
        .par_iter()
        .filter_map(|o| {
            let (record_id, expected) = o.contributor.record_ref()?;
            let node = index.get(record_id)?;
            (node.level != expected).then(|| {
                violation(
                    &o.id,
                    ViolationKind::OfferingTagMismatch,
                    format!(
                        "tagged {} but {} is a {}",
                        o.contributor.tag(),
                        record_id,
                        node.level
                    ),
                )
            })
        })
        .collect();
    Ok((offerings.len(), violations))
}

pub fn audit_store(store: &Store) -> Result<AuditReport, FellowshipError> {
    DbBroker::new(store).with_read(|conn| {
        let nodes = repo::list_nodes(conn, None, None)?;
        let mut violations = audit_nodes(&nodes);
        let index: FxHashMap<&str, &Node> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        let (offerings_checked, offering_violations) = check_offerings(conn, &index)?;
        violations.extend(offering_violations);
        Ok(AuditReport {
            records_checked: nodes.len(),
            offerings_checked,
            violations,
        })
    })
}

/// Audit only `ids` (and the member / preacher / supervisor slots they
/// occupy), loading just the records those checks read.
pub fn audit_records(store: &Store, ids: &[String]) -> Result<Vec<Violation>, FellowshipError> {
    DbBroker::new(store).with_read(|conn| {
        let mut loaded: FxHashMap<String, Node> = FxHashMap::default();
        let mut targets = Vec::new();
        for id in ids {
            if let Some(node) = repo::get_node(conn, id)? {
                targets.push(node.id.clone());
                loaded.insert(node.id.clone(), node);
            }
        }
        let mut wanted: FxHashSet<String> = FxHashSet::default();
        for id in &targets {
            if let Some(node) = loaded.get(id) {
                wanted.extend(node.chain.entries().map(|(_, v)| v.to_string()));
            }
        }
        for id in wanted {
            if !loaded.contains_key(&id) {
                if let Some(node) = repo::get_node(conn, &id)? {
                    loaded.insert(id, node);
                }
            }
        }

        let index: FxHashMap<&str, &Node> = loaded.iter().map(|(k, v)| (k.as_str(), v)).collect();
        let mut violations: Vec<Violation> = targets
            .par_iter()
            .filter_map(|id| index.get(id.as_str()).copied())
            .filter(|n| n.is_active())
            .flat_map_iter(|n| check_node(n, &index))
            .collect();

        for id in &targets {
            let Some(node) = index.get(id.as_str()) else {
                continue;
            };
            if !node.is_active() {
                continue;
            }
            let mut slot: Vec<Node> = Vec::new();
            if let Some(member_id) = node.member_id.as_deref() {
                slot.extend(repo::list_active_by_member(conn, member_id)?);
            }
            match (node.level, node.chain.preacher.as_deref(), node.chain.supervisor.as_deref()) {
                (Level::FamilyGroup, Some(preacher_id), _) => {
                    slot.extend(active_children(conn, Level::FamilyGroup, Level::Preacher, preacher_id)?);
                }
                (Level::Zone, _, Some(supervisor_id)) => {
                    slot.extend(active_children(conn, Level::Zone, Level::Supervisor, supervisor_id)?);
                }
                _ => {}
            }
            violations.extend(check_uniqueness(slot.iter()));
        }
        violations.sort_by(|a, b| a.record_id.cmp(&b.record_id).then(a.detail.cmp(&b.detail)));
        violations.dedup();
        Ok(violations)
    })
}

fn active_children(
    conn: &Connection,
    level: Level,
    ancestor_level: Level,
    ancestor_id: &str,
) -> Result<Vec<Node>, FellowshipError> {
    Ok(repo::list_by_ancestor(conn, ancestor_level, ancestor_id, true)?
        .into_iter()
        .filter(|n| n.level == level)
        .collect())
}
