//! Collaborator records around the engine: members, structural nodes,
//! offerings and search.

pub mod member;
pub mod offering;
pub mod search;
pub mod structure;

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "registry",
        "version": "0.1.0",
        "description": "Members, churches, zones, family groups, offerings and search",
        "commands": [
            { "name": "member add", "parameters": ["first_names", "last_names", "birth_date", "gender", "marital_status"] },
            { "name": "member get", "parameters": ["id"] },
            { "name": "member list", "parameters": ["limit"] },
            { "name": "member update", "parameters": ["id", "email", "phone", "country", "city", "address"] },
            { "name": "church create", "parameters": ["name", "code"] },
            { "name": "enroll", "parameters": ["member_id", "role", "ancestor_id"] },
            { "name": "zone create", "parameters": ["supervisor_id", "name"] },
            { "name": "family-group create", "parameters": ["zone_id", "preacher_id", "name", "code"] },
            { "name": "offering add", "parameters": ["kind", "amount_cents", "currency", "received_on", "contributor"] },
            { "name": "offering list", "parameters": ["record_id", "member_id"] },
            { "name": "offering inactivate", "parameters": ["id"] },
            { "name": "find", "parameters": ["by", "term", "level"] }
        ],
        "storage": [crate::core::schemas::HIERARCHY_DB_NAME]
    })
}
