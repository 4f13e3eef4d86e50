use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Mutex as ActionMutex;

use crate::error::{ApiError, Outcome};
use crate::gateway::{Auth, RequestGateway};
use crate::models::{BookmarkStatus, Comment, CommentId, LikeStatus, NewComment, Post, PostId};

/// Per-post derived social state: like/bookmark flags and counts plus the
/// comment sequence. Built from server data and reconciled after each
/// mutating action; there is deliberately no way to nudge a count without a
/// full server payload, so flag and count can never drift apart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InteractionState {
    pub is_liked: bool,
    pub likes_count: u32,
    pub is_bookmarked: bool,
    pub bookmarks_count: u32,
    pub comments: Vec<Comment>,
}

impl InteractionState {
    fn apply_like(&mut self, status: LikeStatus) {
        self.is_liked = status.is_liked;
        self.likes_count = status.likes_count;
    }

    fn apply_bookmark(&mut self, status: BookmarkStatus) {
        self.is_bookmarked = status.is_bookmarked;
        self.bookmarks_count = status.bookmarks_count;
    }

    fn set_comments(&mut self, comments: Vec<Comment>) {
        self.comments = comments;
    }

    fn append_comment(&mut self, comment: Comment) {
        self.comments.push(comment);
    }

    /// Replaces the comment with the same id in place, preserving its
    /// position. Returns false when the id is not present.
    fn replace_comment(&mut self, comment: &Comment) -> bool {
        match self.comments.iter_mut().find(|c| c.id == comment.id) {
            Some(slot) => {
                *slot = comment.clone();
                true
            }
            None => false,
        }
    }

    /// Removes the comment by id; a no-op when it is already gone.
    fn remove_comment(&mut self, id: CommentId) {
        self.comments.retain(|c| c.id != id);
    }

    fn contains_comment(&self, id: CommentId) -> bool {
        self.comments.iter().any(|c| c.id == id)
    }
}

/// One outstanding request per (post, kind); a second invocation of the same
/// action queues behind the first so responses apply in issue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ActionKind {
    Fetch,
    Like,
    Bookmark,
    Comment,
}

struct PostEntry {
    /// View generation this entry was opened under; responses issued against
    /// an older generation are discarded instead of applied.
    generation: u64,
    state: InteractionState,
}

/// Orchestrates like/bookmark/comment actions against posts, owning the
/// per-post [`InteractionState`] entries. All state writes happen here and
/// only from a `Success` payload.
pub struct PostInteractionController {
    gateway: Arc<RequestGateway>,
    entries: Mutex<HashMap<PostId, PostEntry>>,
    /// Monotonic per-post view generation; survives entry removal so a late
    /// response from before a close can never land in a reopened view.
    generations: Mutex<HashMap<PostId, u64>>,
    locks: Mutex<HashMap<(PostId, ActionKind), Arc<ActionMutex<()>>>>,
}

impl PostInteractionController {
    pub fn new(gateway: Arc<RequestGateway>) -> Self {
        Self {
            gateway,
            entries: Mutex::new(HashMap::new()),
            generations: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Read surface for the UI; a clone, never a live reference.
    pub fn snapshot(&self, post_id: PostId) -> Option<InteractionState> {
        self.entries()
            .get(&post_id)
            .map(|entry| entry.state.clone())
    }

    /// Fetches the post and seeds (or refreshes) its interaction entry from
    /// the payload. Already-loaded comments are kept.
    pub async fn load_post(&self, post_id: PostId) -> Outcome<Post> {
        let lock = self.action_lock(post_id, ActionKind::Fetch);
        let _serialized = lock.lock().await;
        let issued = self.current_generation(post_id);

        let post: Post = self
            .gateway
            .get(&format!("/posts/{post_id}"), Auth::Public)
            .await?;

        self.seed_entry(post_id, issued, &post);
        Ok(post)
    }

    /// Replaces the comment sequence wholesale with the server's ordering.
    pub async fn load_comments(&self, post_id: PostId) -> Outcome<Vec<Comment>> {
        let lock = self.action_lock(post_id, ActionKind::Comment);
        let _serialized = lock.lock().await;
        let issued = self.current_generation(post_id);

        let comments: Vec<Comment> = self
            .gateway
            .get(&format!("/posts/{post_id}/comments"), Auth::Public)
            .await?;

        self.with_live_entry(post_id, issued, |state| {
            state.set_comments(comments.clone());
        });
        Ok(comments)
    }

    /// Single idempotent toggle; flag and count are replaced atomically from
    /// the response, never derived from the prior local value.
    pub async fn toggle_like(&self, post_id: PostId) -> Outcome<LikeStatus> {
        let lock = self.action_lock(post_id, ActionKind::Like);
        let _serialized = lock.lock().await;
        let issued = self.current_generation(post_id);

        let status: LikeStatus = self
            .gateway
            .post(&format!("/posts/{post_id}/like"), Option::<&()>::None, Auth::Required)
            .await?;

        self.with_live_entry(post_id, issued, |state| state.apply_like(status));
        Ok(status)
    }

    /// Identical shape to [`toggle_like`](Self::toggle_like), independent of
    /// like state.
    pub async fn toggle_bookmark(&self, post_id: PostId) -> Outcome<BookmarkStatus> {
        let lock = self.action_lock(post_id, ActionKind::Bookmark);
        let _serialized = lock.lock().await;
        let issued = self.current_generation(post_id);

        let status: BookmarkStatus = self
            .gateway
            .post(&format!("/posts/{post_id}/bookmark"), Option::<&()>::None, Auth::Required)
            .await?;

        self.with_live_entry(post_id, issued, |state| state.apply_bookmark(status));
        Ok(status)
    }

    /// Submits a comment. Blank content is rejected synchronously with no
    /// network call; on failure the caller's draft is untouched (the content
    /// is only borrowed).
    pub async fn add_comment(&self, post_id: PostId, content: &str) -> Outcome<Comment> {
        if content.trim().is_empty() {
            return Err(ApiError::field("content", "comment text is required"));
        }

        let lock = self.action_lock(post_id, ActionKind::Comment);
        let _serialized = lock.lock().await;
        let issued = self.current_generation(post_id);

        let body = NewComment {
            content: content.to_string(),
        };
        let comment: Comment = self
            .gateway
            .post(&format!("/posts/{post_id}/comments"), Some(&body), Auth::Required)
            .await?;

        self.with_live_entry(post_id, issued, |state| {
            state.append_comment(comment.clone());
        });
        Ok(comment)
    }

    /// Edits a comment in place; the sequence position is preserved and the
    /// list is not resorted.
    pub async fn edit_comment(&self, comment_id: CommentId, content: &str) -> Outcome<Comment> {
        if content.trim().is_empty() {
            return Err(ApiError::field("content", "comment text is required"));
        }

        let owner = self.owner_of(comment_id);
        let lock = owner.map(|post_id| self.action_lock(post_id, ActionKind::Comment));
        let _serialized = match &lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };
        let issued = owner.map(|post_id| self.current_generation(post_id));

        let body = NewComment {
            content: content.to_string(),
        };
        let comment: Comment = self
            .gateway
            .put(&format!("/comments/{comment_id}"), Some(&body), Auth::Required)
            .await?;

        if let (Some(post_id), Some(issued)) = (owner, issued) {
            self.with_live_entry(post_id, issued, |state| {
                state.replace_comment(&comment);
            });
        }
        Ok(comment)
    }

    /// Deletes a comment. When no loaded entry holds the id any more (e.g. a
    /// duplicate delete click), this is a local no-op: no request, no error,
    /// sequence unchanged.
    pub async fn delete_comment(&self, comment_id: CommentId) -> Outcome<()> {
        let Some(post_id) = self.owner_of(comment_id) else {
            tracing::debug!(comment_id, "comment already absent; skipping delete");
            return Ok(());
        };

        let lock = self.action_lock(post_id, ActionKind::Comment);
        let _serialized = lock.lock().await;
        let issued = self.current_generation(post_id);

        self.gateway
            .delete(&format!("/comments/{comment_id}"), Auth::Required)
            .await?;

        self.with_live_entry(post_id, issued, |state| state.remove_comment(comment_id));
        Ok(())
    }

    /// Deletes the post server-side. A `Success` return is the caller's cue
    /// to navigate away; the local entry is dropped but no navigation is
    /// performed here.
    pub async fn delete_post(&self, post_id: PostId) -> Outcome<()> {
        let lock = self.action_lock(post_id, ActionKind::Fetch);
        let _serialized = lock.lock().await;

        self.gateway
            .delete(&format!("/posts/{post_id}"), Auth::Required)
            .await?;

        self.close_post(post_id);
        Ok(())
    }

    /// View unmount: drops the entry and bumps the generation so any
    /// response still in flight is discarded rather than applied. The
    /// underlying requests are left to complete server-side.
    pub fn close_post(&self, post_id: PostId) {
        *self
            .generations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(post_id)
            .or_insert(0) += 1;
        self.entries().remove(&post_id);
    }

    fn seed_entry(&self, post_id: PostId, issued: u64, post: &Post) {
        if self.current_generation(post_id) != issued {
            tracing::debug!(post_id, "discarding stale post load");
            return;
        }
        let mut entries = self.entries();
        let entry = entries.entry(post_id).or_insert_with(|| PostEntry {
            generation: issued,
            state: InteractionState::default(),
        });
        entry.generation = issued;
        entry.state.apply_like(LikeStatus {
            is_liked: post.is_liked,
            likes_count: post.likes_count,
        });
        entry.state.apply_bookmark(BookmarkStatus {
            is_bookmarked: post.is_bookmarked,
            bookmarks_count: post.bookmarks_count,
        });
    }

    /// Applies `mutate` only when the entry still exists and was opened under
    /// the same generation the request was issued under.
    fn with_live_entry(
        &self,
        post_id: PostId,
        issued: u64,
        mutate: impl FnOnce(&mut InteractionState),
    ) -> bool {
        let mut entries = self.entries();
        match entries.get_mut(&post_id) {
            Some(entry) if entry.generation == issued => {
                mutate(&mut entry.state);
                true
            }
            _ => {
                tracing::debug!(post_id, "discarding response for closed post view");
                false
            }
        }
    }

    fn owner_of(&self, comment_id: CommentId) -> Option<PostId> {
        self.entries()
            .iter()
            .find(|(_, entry)| entry.state.contains_comment(comment_id))
            .map(|(post_id, _)| *post_id)
    }

    fn current_generation(&self, post_id: PostId) -> u64 {
        self.generations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&post_id)
            .copied()
            .unwrap_or(0)
    }

    fn action_lock(&self, post_id: PostId, kind: ActionKind) -> Arc<ActionMutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((post_id, kind))
            .or_insert_with(|| Arc::new(ActionMutex::new(())))
            .clone()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<PostId, PostEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn comment(id: CommentId, content: &str) -> Comment {
        Comment {
            id,
            content: content.into(),
            author: "ada".into(),
            created_at: "2024-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn apply_like_replaces_flag_and_count_together() {
        let mut state = InteractionState::default();
        state.apply_like(LikeStatus {
            is_liked: true,
            likes_count: 7,
        });
        assert!(state.is_liked);
        assert_eq!(state.likes_count, 7);
        // Bookmark side untouched.
        assert!(!state.is_bookmarked);
        assert_eq!(state.bookmarks_count, 0);
    }

    #[test]
    fn replace_comment_preserves_position() {
        let mut state = InteractionState::default();
        state.set_comments(vec![comment(5, "a"), comment(7, "b"), comment(9, "c")]);

        let replaced = state.replace_comment(&comment(7, "fixed"));
        assert!(replaced);
        assert_eq!(
            state.comments.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![5, 7, 9]
        );
        assert_eq!(state.comments[1].content, "fixed");

        assert!(!state.replace_comment(&comment(42, "missing")));
    }

    #[test]
    fn remove_comment_is_idempotent() {
        let mut state = InteractionState::default();
        state.set_comments(vec![comment(5, "a"), comment(7, "b")]);

        state.remove_comment(7);
        assert_eq!(state.comments.len(), 1);
        state.remove_comment(7);
        assert_eq!(state.comments.len(), 1);
        assert_eq!(state.comments[0].id, 5);
    }
}
