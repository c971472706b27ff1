use serde::{Deserialize, Serialize};
use async_trait::async_trait;
use uuid::Uuid;
use unipool_shared::UserRole;

use crate::CoreResult;

/// The authenticated party behind a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: UserRole,
}

impl Caller {
    pub fn new(user_id: Uuid, role: UserRole) -> Self {
        Self { user_id, role }
    }
}

/// Resolves an opaque bearer token to a caller. Token issuance lives elsewhere.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Fails with `CoreError::Unauthenticated` for unknown, expired or malformed tokens
    async fn resolve(&self, token: &str) -> CoreResult<Caller>;
}
