//! User domain model

use serde::{Deserialize, Serialize};

/// A user known to the engine. Only active users are visited by scheduled jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub active: bool,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            active: true,
        }
    }

    pub fn inactive(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            active: false,
        }
    }
}
