//! Hierarchy consistency engine.
//!
//! Leaves first: [`model`] and [`repo`] hold and persist records, [`ledger`]
//! answers who holds which role, [`transitions`] is the role state machine,
//! [`validator`] rejects illegal transitions, [`planner`] computes the
//! write-set, [`executor`] applies it atomically and [`engine`] ties them
//! together.

pub mod audit;
pub mod engine;
pub mod executor;
pub mod inactivation;
pub mod journal;
pub mod ledger;
pub mod model;
pub mod planner;
pub mod repo;
pub mod transitions;
pub mod validator;

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "hierarchy",
        "version": "0.1.0",
        "description": "Role ledger, validator, cascade planner and executor for the church hierarchy",
        "commands": [
            { "name": "promote", "parameters": ["member_id", "role", "ancestor_id", "actor"] },
            { "name": "reassign", "parameters": ["record_id", "ancestor_id", "actor"] },
            { "name": "inactivate", "parameters": ["record_id", "cause", "actor"] },
            { "name": "role", "parameters": ["member_id"] },
            { "name": "audit", "parameters": [] },
            { "name": "journal list", "parameters": ["root_id", "limit"] },
            { "name": "journal verify", "parameters": [] }
        ],
        "levels": model::Level::all().iter().map(|l| l.as_str()).collect::<Vec<_>>(),
        "storage": [crate::core::schemas::HIERARCHY_DB_NAME]
    })
}
