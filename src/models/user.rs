use serde::{Deserialize, Serialize};

/// Minimal identity handed to the mutation paths.
///
/// Browsing works without an account; only remote submissions need one,
/// so everything here takes `Option<&UserIdentity>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: String,
}

impl UserIdentity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}
