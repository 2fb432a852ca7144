//! Cascade planner: turns a validated transition into an ordered write-set.
//!
//! Planning only reads. The descendants of the transitioning record are
//! loaded once, in depth order, into an id-keyed arena; each one's chain is
//! recomputed from its (possibly already recomputed) parent, or from its
//! nearest remaining ancestor while orphaned, and a row is written only when
//! its chain actually changed.
//!
//! Write order inside a plan is fixed:
//! 1. `Delete` of the record a promotion replaces, so the new one can take
//!    the member's single active slot;
//! 2. `Create` of the new record;
//! 3. `Touch` of the parent a record is created under or moved to, which
//!    serializes competing plans under the same parent;
//! 4. `Update` of the transitioning record, then of its descendants.

use crate::core::actor::{Actor, AuditStamp};
use crate::core::error::{FellowshipError, ValidationRule};
use crate::core::store::Store;
use crate::core::time;
use crate::hierarchy::model::{AncestorChain, InactivationCause, Level, Node, RecordStatus};
use crate::hierarchy::repo;
use crate::hierarchy::transitions::{Transition, TransitionKind};
use crate::hierarchy::validator::{PromotionCheck, ReassignmentCheck};
use rusqlite::Connection;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One row-level step of a plan. Every step that touches an existing row
/// carries the version it was planned against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Write {
    Create { node: Node },
    Update { node: Node, expected_version: i64 },
    Delete { id: String, level: Level, expected_version: i64 },
    Touch { id: String, expected_version: i64 },
}

impl Write {
    pub fn record_id(&self) -> &str {
        match self {
            Write::Create { node } | Write::Update { node, .. } => &node.id,
            Write::Delete { id, .. } | Write::Touch { id, .. } => id,
        }
    }

    /// Creates and updates change a record's content; deletes and touches do not.
    pub fn changes_content(&self) -> bool {
        matches!(self, Write::Create { .. } | Write::Update { .. })
    }
}

/// Per-plan context: who acts, when, and how large a plan may grow.
#[derive(Debug, Clone)]
pub struct PlanContext {
    pub actor: Actor,
    pub ts: String,
    pub max_writes: usize,
}

impl PlanContext {
    pub fn new(store: &Store, actor: &Actor) -> Self {
        Self {
            actor: actor.clone(),
            ts: time::now_epoch_z(),
            max_writes: store.config.max_cascade_writes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadePlan {
    pub plan_id: String,
    pub transition: Transition,
    /// The record the transition leaves in place: the new record of a
    /// promotion or creation, otherwise the transitioning record itself.
    pub root_id: String,
    pub writes: Vec<Write>,
    /// Direct children whose parent link this plan removes.
    pub orphaned: Vec<String>,
    pub actor: Actor,
    pub ts: String,
}

impl CascadePlan {
    pub fn kind(&self) -> TransitionKind {
        self.transition.kind()
    }

    /// Ids of every record whose content the plan writes, in write order.
    pub fn updated_ids(&self) -> Vec<String> {
        self.writes
            .iter()
            .filter(|w| w.changes_content())
            .map(|w| w.record_id().to_string())
            .collect()
    }

    pub fn removed_ids(&self) -> Vec<String> {
        self.writes
            .iter()
            .filter(|w| matches!(w, Write::Delete { .. }))
            .map(|w| w.record_id().to_string())
            .collect()
    }

    /// Content hash over the transition and write-set. Two plans with equal
    /// fingerprints write the same rows to the same values.
    pub fn fingerprint(&self) -> Result<String, FellowshipError> {
        let bytes = serde_json::to_vec(&(&self.transition, &self.writes))?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// The planned end state of `id`, if the plan creates or updates it.
    pub fn planned_node(&self, id: &str) -> Option<&Node> {
        self.writes.iter().find_map(|w| match w {
            Write::Create { node } | Write::Update { node, .. } if node.id == id => Some(node),
            _ => None,
        })
    }
}

fn bump(node: &Node, ctx: &PlanContext) -> Node {
    Node {
        version: node.version + 1,
        audit: node.audit.touched(&ctx.actor, &ctx.ts),
        ..node.clone()
    }
}

fn new_node(level: Level, member_id: Option<String>, chain: AncestorChain, ctx: &PlanContext) -> Node {
    Node {
        id: time::new_record_id(level.id_prefix()),
        level,
        member_id,
        name: None,
        code: None,
        status: RecordStatus::Active,
        inactivation_cause: None,
        chain,
        version: 1,
        audit: AuditStamp::created(&ctx.actor, &ctx.ts),
    }
}

/// Recompute the chains of every active descendant of `old` so they agree
/// with `root`, its planned new state.
///
/// With `remove` set, `old` leaves the hierarchy: every descendant's pointer
/// to it is nulled and the direct children are returned as orphans. Inactive
/// descendants are never written.
pub fn cascade_descendants(
    conn: &Connection,
    old: &Node,
    root: Option<&Node>,
    remove: bool,
    ctx: &PlanContext,
    writes: &mut Vec<Write>,
) -> Result<Vec<String>, FellowshipError> {
    let descendants = repo::list_by_ancestor(conn, old.level, &old.id, true)?;
    let mut arena: FxHashMap<String, Node> = FxHashMap::default();
    if let Some(root) = root {
        arena.insert(root.id.clone(), root.clone());
    }
    let mut orphaned = Vec::new();

    for original in descendants {
        let mut next = original.clone();
        if remove {
            if original.primary_parent().map(|(_, id)| id) == Some(old.id.as_str()) {
                orphaned.push(original.id.clone());
            }
            next.chain.set(old.level, None);
        }
        // orphans derive from their deepest remaining ancestor, so a move
        // above the gap still reaches them and their subtree
        if let Some((_, anchor_id)) = next.chain_anchor() {
            let anchor = match arena.get(anchor_id) {
                Some(anchor) => anchor.clone(),
                None => repo::require_node(conn, anchor_id)?,
            };
            // an inactive anchor is not a source of truth for the chain
            if anchor.is_active() {
                next.chain = AncestorChain::under(&anchor);
            }
        }
        if next.chain != original.chain {
            next = bump(&next, ctx);
            writes.push(Write::Update {
                node: next.clone(),
                expected_version: original.version,
            });
        }
        arena.insert(next.id.clone(), next);
    }
    Ok(orphaned)
}

fn check_size(writes: &[Write], ctx: &PlanContext) -> Result<(), FellowshipError> {
    if writes.len() > ctx.max_writes {
        return Err(ValidationRule::CascadeTooLarge {
            writes: writes.len(),
            limit: ctx.max_writes,
        }
        .into());
    }
    Ok(())
}

fn touch(parent: &Node) -> Write {
    Write::Touch {
        id: parent.id.clone(),
        expected_version: parent.version,
    }
}

/// Replace the member's current record with a new one a level up, under
/// the checked parent. The old record's descendants lose their link to it.
pub fn plan_promotion(
    conn: &Connection,
    check: &PromotionCheck,
    ctx: &PlanContext,
) -> Result<CascadePlan, FellowshipError> {
    let current = &check.current;
    let chain = AncestorChain::under(&check.parent);
    let promoted = new_node(check.step.to.level(), current.member_id.clone(), chain, ctx);

    let mut writes = vec![
        Write::Delete {
            id: current.id.clone(),
            level: current.level,
            expected_version: current.version,
        },
        Write::Create {
            node: promoted.clone(),
        },
        touch(&check.parent),
    ];
    let orphaned = cascade_descendants(conn, current, None, true, ctx, &mut writes)?;
    check_size(&writes, ctx)?;

    Ok(CascadePlan {
        plan_id: time::new_record_id("PL"),
        transition: Transition::Promote {
            member_id: current.member_id.clone().unwrap_or_default(),
            target: check.step.to,
            ancestor_id: check.ancestor.id.clone(),
        },
        root_id: promoted.id,
        writes,
        orphaned,
        actor: ctx.actor.clone(),
        ts: ctx.ts.clone(),
    })
}

/// Move a record under the checked parent; every descendant follows.
pub fn plan_reassignment(
    conn: &Connection,
    check: &ReassignmentCheck,
    ctx: &PlanContext,
) -> Result<CascadePlan, FellowshipError> {
    let record = &check.record;
    let mut moved = bump(record, ctx);
    moved.chain = AncestorChain::under(&check.parent);

    let mut writes = vec![
        touch(&check.parent),
        Write::Update {
            node: moved.clone(),
            expected_version: record.version,
        },
    ];
    cascade_descendants(conn, record, Some(&moved), false, ctx, &mut writes)?;
    check_size(&writes, ctx)?;

    Ok(CascadePlan {
        plan_id: time::new_record_id("PL"),
        transition: Transition::Reassign {
            record_id: record.id.clone(),
            new_ancestor_id: check.ancestor.id.clone(),
        },
        root_id: record.id.clone(),
        writes,
        orphaned: Vec::new(),
        actor: ctx.actor.clone(),
        ts: ctx.ts.clone(),
    })
}

/// Mark a record inactive and cut every active descendant's link to it.
pub fn plan_inactivation(
    conn: &Connection,
    record: &Node,
    cause: InactivationCause,
    ctx: &PlanContext,
) -> Result<CascadePlan, FellowshipError> {
    let mut inactive = bump(record, ctx);
    inactive.status = RecordStatus::Inactive;
    inactive.inactivation_cause = Some(cause);

    let mut writes = vec![Write::Update {
        node: inactive,
        expected_version: record.version,
    }];
    let orphaned = cascade_descendants(conn, record, None, true, ctx, &mut writes)?;
    check_size(&writes, ctx)?;

    Ok(CascadePlan {
        plan_id: time::new_record_id("PL"),
        transition: Transition::Inactivate {
            record_id: record.id.clone(),
            cause,
        },
        root_id: record.id.clone(),
        writes,
        orphaned,
        actor: ctx.actor.clone(),
        ts: ctx.ts.clone(),
    })
}

/// Create a record of `level` under `parent` (a church has none).
pub fn plan_creation(
    level: Level,
    member_id: Option<String>,
    name: Option<String>,
    code: Option<String>,
    parent: Option<&Node>,
    ctx: &PlanContext,
) -> Result<CascadePlan, FellowshipError> {
    let chain = parent.map(AncestorChain::under).unwrap_or_default();
    let mut node = new_node(level, member_id, chain, ctx);
    node.name = name;
    node.code = code;

    let mut writes = vec![Write::Create { node: node.clone() }];
    if let Some(parent) = parent {
        writes.push(touch(parent));
    }
    check_size(&writes, ctx)?;

    Ok(CascadePlan {
        plan_id: time::new_record_id("PL"),
        transition: Transition::Create {
            level,
            ancestor_id: parent.map(|p| p.id.clone()),
        },
        root_id: node.id,
        writes,
        orphaned: Vec::new(),
        actor: ctx.actor.clone(),
        ts: ctx.ts.clone(),
    })
}
