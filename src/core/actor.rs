//! Acting-user identity, threaded explicitly through every mutating call.

use crate::core::error::{FellowshipError, ValidationRule};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Actor(String);

impl Actor {
    pub fn new(id: &str) -> Result<Self, FellowshipError> {
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(ValidationRule::InvalidField {
                field: "actor",
                reason: "actor identity must not be empty".to_string(),
            }
            .into());
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Creation and last-update stamps carried by every record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStamp {
    pub created_at: String,
    pub created_by: String,
    pub updated_at: Option<String>,
    pub updated_by: Option<String>,
}

impl AuditStamp {
    pub fn created(actor: &Actor, ts: &str) -> Self {
        Self {
            created_at: ts.to_string(),
            created_by: actor.as_str().to_string(),
            updated_at: None,
            updated_by: None,
        }
    }

    pub fn touched(&self, actor: &Actor, ts: &str) -> Self {
        Self {
            updated_at: Some(ts.to_string()),
            updated_by: Some(actor.as_str().to_string()),
            ..self.clone()
        }
    }
}
