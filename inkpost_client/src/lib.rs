//! Session & Interaction Client for the Inkpost blog platform.
//!
//! Maintains an authentication token across requests, issues authenticated
//! calls through a single gateway, reconciles per-post social state (likes,
//! bookmarks, comments) strictly from server responses, and recovers when
//! the server rejects a request, times out, or invalidates the session
//! mid-flow.

pub mod catalog;
pub mod config;
pub mod error;
pub mod gateway;
pub mod interactions;
pub mod models;
pub mod session;
pub mod token_store;

pub use catalog::PostCatalog;
pub use config::ClientConfig;
pub use error::{ApiError, FieldErrors, Outcome};
pub use gateway::{Auth, RequestGateway};
pub use interactions::{InteractionState, PostInteractionController};
pub use models::{
    BookmarkStatus, Comment, CommentId, Credentials, LikeStatus, NewComment, NewPost, Post,
    PostId, Registration, Session, UserIdentity,
};
pub use session::{SessionController, SessionEvent};
pub use token_store::TokenStore;
