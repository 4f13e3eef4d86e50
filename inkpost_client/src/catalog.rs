use std::sync::Arc;

use crate::error::{ApiError, FieldErrors, Outcome};
use crate::gateway::{Auth, RequestGateway};
use crate::models::{NewPost, Post, UserIdentity};

/// Post browsing and creation. Read-only copies of server-owned posts;
/// nothing here touches interaction state.
pub struct PostCatalog {
    gateway: Arc<RequestGateway>,
}

impl PostCatalog {
    pub fn new(gateway: Arc<RequestGateway>) -> Self {
        Self { gateway }
    }

    pub async fn list(&self) -> Outcome<Vec<Post>> {
        self.gateway.get("/posts", Auth::Public).await
    }

    pub async fn search(&self, query: &str) -> Outcome<Vec<Post>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ApiError::field("search", "search query is required"));
        }
        self.gateway
            .get_query("/posts", &[("search", query)], Auth::Public)
            .await
    }

    pub async fn create(&self, draft: &NewPost) -> Outcome<Post> {
        let mut errors = FieldErrors::default();
        if draft.title.trim().is_empty() {
            errors.push("title", "title is required");
        }
        if draft.content.trim().is_empty() {
            errors.push("content", "content is required");
        }
        if !errors.is_empty() {
            return Err(ApiError::Validation(errors));
        }
        self.gateway.post("/posts", Some(draft), Auth::Required).await
    }

    /// Identity of the authenticated user, as the server currently sees it.
    pub async fn profile(&self) -> Outcome<UserIdentity> {
        self.gateway.get("/auth/me", Auth::Required).await
    }
}
