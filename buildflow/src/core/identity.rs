//! Requesting user and request-scoped context.
//!
//! The requesting user is passed explicitly with every trigger call rather
//! than cached process-wide.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user that can trigger builds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    /// Stable user id.
    pub id: Uuid,
    /// Login name.
    pub username: String,
}

impl User {
    /// Creates a user with a fresh id.
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
        }
    }

    /// Creates a user with a known id.
    #[must_use]
    pub fn with_id(id: Uuid, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }
}

/// Context of one trigger request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    /// The request id, for log correlation.
    pub request_id: Uuid,
    /// The requesting user.
    pub user: User,
}

impl RequestContext {
    /// Creates a context for a user with a generated request id.
    #[must_use]
    pub fn new(user: User) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            user,
        }
    }

    /// Sets the request id.
    #[must_use]
    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }

    /// The requesting user's id.
    #[must_use]
    pub fn user_id(&self) -> Uuid {
        self.user.id
    }
}
