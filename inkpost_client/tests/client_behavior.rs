use std::sync::Arc;

use inkpost_client::{
    ApiError, Credentials, InteractionState, PostInteractionController, Registration,
    RequestGateway, Session, SessionController, SessionEvent, TokenStore, UserIdentity,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestClient {
    _dir: TempDir,
    server: MockServer,
    tokens: Arc<TokenStore>,
    gateway: Arc<RequestGateway>,
}

async fn test_client() -> TestClient {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let tokens =
        Arc::new(TokenStore::open(dir.path().join("session.json")).expect("open token store"));
    let gateway =
        Arc::new(RequestGateway::new(server.uri(), Arc::clone(&tokens)).expect("build gateway"));
    TestClient {
        _dir: dir,
        server,
        tokens,
        gateway,
    }
}

fn seeded_session(token: &str) -> Session {
    Session {
        token: token.into(),
        identity: UserIdentity {
            username: "ada".into(),
            email: "ada@example.com".into(),
        },
    }
}

fn post_body(id: u64) -> serde_json::Value {
    json!({
        "id": id,
        "slug": "consistency-under-latency",
        "title": "Consistency under latency",
        "content": "<p>hello</p>",
        "author": "ada",
        "createdAt": "2024-01-01T00:00:00Z",
        "tags": ["distributed"],
        "isLiked": false,
        "likesCount": 2,
        "isBookmarked": false,
        "bookmarksCount": 4
    })
}

fn comment_body(id: u64, content: &str) -> serde_json::Value {
    json!({
        "id": id,
        "content": content,
        "author": "a",
        "createdAt": "2024-01-01"
    })
}

// --- session -----------------------------------------------------------

#[tokio::test]
async fn login_success_stores_token() {
    let client = test_client().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "tok-1",
            "user": { "username": "ada", "email": "ada@example.com" }
        })))
        .mount(&client.server)
        .await;

    let sessions = SessionController::new(Arc::clone(&client.gateway), Arc::clone(&client.tokens));
    let session = sessions
        .login(&Credentials {
            username: "ada".into(),
            password: "hunter2".into(),
        })
        .await
        .expect("login succeeds");

    assert_eq!(session.token, "tok-1");
    assert_eq!(client.tokens.get().expect("stored session").token, "tok-1");
    assert_eq!(sessions.last_username().as_deref(), Some("ada"));
}

#[tokio::test]
async fn login_failure_leaves_token_store_untouched() {
    let client = test_client().await;
    client.tokens.set(&seeded_session("tok-0")).expect("seed");
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"detail": "invalid credentials"})),
        )
        .mount(&client.server)
        .await;

    let sessions = SessionController::new(Arc::clone(&client.gateway), Arc::clone(&client.tokens));
    let outcome = sessions
        .login(&Credentials {
            username: "ada".into(),
            password: "wrong".into(),
        })
        .await;

    assert!(matches!(outcome, Err(ApiError::Validation(_))));
    assert_eq!(client.tokens.get().expect("prior session kept").token, "tok-0");
}

#[tokio::test]
async fn login_with_blank_fields_never_hits_the_network() {
    let client = test_client().await;
    let sessions = SessionController::new(Arc::clone(&client.gateway), Arc::clone(&client.tokens));

    let outcome = sessions
        .login(&Credentials {
            username: "  ".into(),
            password: String::new(),
        })
        .await;

    let Err(ApiError::Validation(errors)) = outcome else {
        panic!("expected validation failure");
    };
    assert!(!errors.get("username").is_empty());
    assert!(!errors.get("password").is_empty());
    assert_eq!(client.server.received_requests().await.unwrap_or_default().len(), 0);
}

#[tokio::test]
async fn register_success_does_not_imply_login() {
    let client = test_client().await;
    Mock::given(method("POST"))
        .and(path("/auth/register"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&client.server)
        .await;

    let sessions = SessionController::new(Arc::clone(&client.gateway), Arc::clone(&client.tokens));
    sessions
        .register(&Registration {
            username: "ada".into(),
            email: "ada@example.com".into(),
            password: "hunter2".into(),
        })
        .await
        .expect("registration succeeds");

    assert!(client.tokens.get().is_none());
}

#[tokio::test]
async fn register_rejects_malformed_email_synchronously() {
    let client = test_client().await;
    let sessions = SessionController::new(Arc::clone(&client.gateway), Arc::clone(&client.tokens));

    let outcome = sessions
        .register(&Registration {
            username: "ada".into(),
            email: "not-an-address".into(),
            password: "hunter2".into(),
        })
        .await;

    let Err(ApiError::Validation(errors)) = outcome else {
        panic!("expected validation failure");
    };
    assert_eq!(errors.get("email"), ["email is invalid"]);
    assert_eq!(client.server.received_requests().await.unwrap_or_default().len(), 0);
}

#[tokio::test]
async fn expiry_notification_is_coalesced() {
    let client = test_client().await;
    client.tokens.set(&seeded_session("tok-stale")).expect("seed");
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&client.server)
        .await;

    let sessions = SessionController::new(Arc::clone(&client.gateway), Arc::clone(&client.tokens));
    let events = sessions.events();
    let interactions = PostInteractionController::new(Arc::clone(&client.gateway));

    // First 401 tears the session down and notifies once.
    assert_eq!(interactions.toggle_like(1).await, Err(ApiError::AuthExpired));
    assert!(matches!(events.try_recv(), Ok(SessionEvent::Expired)));
    assert!(client.tokens.get().is_none());

    // Follow-up failures while logged out stay silent.
    assert_eq!(interactions.toggle_like(2).await, Err(ApiError::AuthExpired));
    assert_eq!(
        interactions.toggle_bookmark(1).await,
        Err(ApiError::AuthExpired)
    );
    assert!(events.try_recv().is_err());

    // Logout after expiry is a harmless no-op.
    sessions.logout();
    assert!(client.tokens.get().is_none());
}

// --- interactions ------------------------------------------------------

#[tokio::test]
async fn toggle_like_reconciles_from_each_server_response() {
    let client = test_client().await;
    client.tokens.set(&seeded_session("tok-1")).expect("seed");
    Mock::given(method("GET"))
        .and(path("/posts/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(post_body(42)))
        .mount(&client.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/posts/42/like"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"isLiked": true, "likesCount": 3})),
        )
        .up_to_n_times(1)
        .mount(&client.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/posts/42/like"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"isLiked": false, "likesCount": 2})),
        )
        .mount(&client.server)
        .await;

    let interactions = PostInteractionController::new(Arc::clone(&client.gateway));
    interactions.load_post(42).await.expect("load post");

    interactions.toggle_like(42).await.expect("first toggle");
    let mid = interactions.snapshot(42).expect("state");
    assert!(mid.is_liked);
    assert_eq!(mid.likes_count, 3);

    interactions.toggle_like(42).await.expect("second toggle");
    let after = interactions.snapshot(42).expect("state");
    // Final state is exactly the last server payload, not a local derivation.
    assert!(!after.is_liked);
    assert_eq!(after.likes_count, 2);
}

#[tokio::test]
async fn toggle_failure_leaves_state_unchanged() {
    let client = test_client().await;
    client.tokens.set(&seeded_session("tok-1")).expect("seed");
    Mock::given(method("GET"))
        .and(path("/posts/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(post_body(42)))
        .mount(&client.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/posts/42/like"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&client.server)
        .await;

    let interactions = PostInteractionController::new(Arc::clone(&client.gateway));
    interactions.load_post(42).await.expect("load post");
    let before = interactions.snapshot(42).expect("state");

    let outcome = interactions.toggle_like(42).await;
    assert!(matches!(outcome, Err(ApiError::Server { status: 500, .. })));
    assert_eq!(interactions.snapshot(42).expect("state"), before);
}

#[tokio::test]
async fn bookmark_toggle_updates_only_bookmark_fields() {
    let client = test_client().await;
    client.tokens.set(&seeded_session("tok-1")).expect("seed");
    Mock::given(method("GET"))
        .and(path("/posts/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(post_body(42)))
        .mount(&client.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/posts/42/bookmark"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"isBookmarked": true, "bookmarksCount": 5})),
        )
        .mount(&client.server)
        .await;

    let interactions = PostInteractionController::new(Arc::clone(&client.gateway));
    interactions.load_post(42).await.expect("load post");

    interactions.toggle_bookmark(42).await.expect("toggle");
    assert_eq!(
        interactions.snapshot(42).expect("state"),
        InteractionState {
            is_liked: false,
            likes_count: 2,
            is_bookmarked: true,
            bookmarks_count: 5,
            comments: Vec::new(),
        }
    );
}

#[tokio::test]
async fn blank_comment_is_rejected_without_a_request() {
    let client = test_client().await;
    let interactions = PostInteractionController::new(Arc::clone(&client.gateway));

    let outcome = interactions.add_comment(5, "   ").await;
    let Err(ApiError::Validation(errors)) = outcome else {
        panic!("expected validation failure");
    };
    assert_eq!(errors.get("content"), ["comment text is required"]);
    assert_eq!(client.server.received_requests().await.unwrap_or_default().len(), 0);
}

#[tokio::test]
async fn added_comment_is_appended_with_server_fields() {
    let client = test_client().await;
    client.tokens.set(&seeded_session("tok-1")).expect("seed");
    Mock::given(method("GET"))
        .and(path("/posts/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(post_body(42)))
        .mount(&client.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/posts/42/comments"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([comment_body(5, "first")])),
        )
        .mount(&client.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/posts/42/comments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(comment_body(9, "second")))
        .mount(&client.server)
        .await;

    let interactions = PostInteractionController::new(Arc::clone(&client.gateway));
    interactions.load_post(42).await.expect("load post");
    interactions.load_comments(42).await.expect("load comments");

    let comment = interactions
        .add_comment(42, "second")
        .await
        .expect("comment accepted");
    assert_eq!(comment.id, 9);

    let state = interactions.snapshot(42).expect("state");
    assert_eq!(
        state.comments.iter().map(|c| c.id).collect::<Vec<_>>(),
        vec![5, 9]
    );
}

#[tokio::test]
async fn edited_comment_is_replaced_in_place() {
    let client = test_client().await;
    client.tokens.set(&seeded_session("tok-1")).expect("seed");
    Mock::given(method("GET"))
        .and(path("/posts/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(post_body(42)))
        .mount(&client.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/posts/42/comments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            comment_body(5, "a"),
            comment_body(7, "typo"),
            comment_body(9, "c")
        ])))
        .mount(&client.server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/comments/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(comment_body(7, "fixed")))
        .mount(&client.server)
        .await;

    let interactions = PostInteractionController::new(Arc::clone(&client.gateway));
    interactions.load_post(42).await.expect("load post");
    interactions.load_comments(42).await.expect("load comments");

    interactions.edit_comment(7, "fixed").await.expect("edit");

    let state = interactions.snapshot(42).expect("state");
    assert_eq!(
        state.comments.iter().map(|c| c.id).collect::<Vec<_>>(),
        vec![5, 7, 9]
    );
    assert_eq!(state.comments[1].content, "fixed");
    assert_eq!(state.comments[0].content, "a");
    assert_eq!(state.comments[2].content, "c");
}

#[tokio::test]
async fn duplicate_comment_delete_is_a_local_no_op() {
    let client = test_client().await;
    client.tokens.set(&seeded_session("tok-1")).expect("seed");
    Mock::given(method("GET"))
        .and(path("/posts/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(post_body(42)))
        .mount(&client.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/posts/42/comments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            comment_body(5, "keep"),
            comment_body(7, "drop")
        ])))
        .mount(&client.server)
        .await;
    // The server sees exactly one delete; the duplicate never leaves the client.
    Mock::given(method("DELETE"))
        .and(path("/comments/7"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&client.server)
        .await;

    let interactions = PostInteractionController::new(Arc::clone(&client.gateway));
    interactions.load_post(42).await.expect("load post");
    interactions.load_comments(42).await.expect("load comments");

    interactions.delete_comment(7).await.expect("first delete");
    let after_first = interactions.snapshot(42).expect("state");
    assert_eq!(after_first.comments.len(), 1);

    interactions.delete_comment(7).await.expect("second delete");
    let after_second = interactions.snapshot(42).expect("state");
    assert_eq!(after_second, after_first);
}

#[tokio::test]
async fn deleting_a_post_drops_its_local_entry() {
    let client = test_client().await;
    client.tokens.set(&seeded_session("tok-1")).expect("seed");
    Mock::given(method("GET"))
        .and(path("/posts/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(post_body(42)))
        .mount(&client.server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/posts/42"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&client.server)
        .await;

    let interactions = PostInteractionController::new(Arc::clone(&client.gateway));
    interactions.load_post(42).await.expect("load post");
    assert!(interactions.snapshot(42).is_some());

    interactions.delete_post(42).await.expect("delete");
    assert!(interactions.snapshot(42).is_none());
}

#[tokio::test]
async fn responses_after_close_are_discarded_not_applied() {
    let client = test_client().await;
    client.tokens.set(&seeded_session("tok-1")).expect("seed");
    Mock::given(method("GET"))
        .and(path("/posts/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(post_body(42)))
        .mount(&client.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/posts/42/like"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"isLiked": true, "likesCount": 3})),
        )
        .mount(&client.server)
        .await;

    let interactions = PostInteractionController::new(Arc::clone(&client.gateway));
    interactions.load_post(42).await.expect("load post");
    interactions.close_post(42);

    // The request still completes server-side; the payload just has nowhere
    // to land any more.
    let status = interactions.toggle_like(42).await.expect("toggle");
    assert!(status.is_liked);
    assert!(interactions.snapshot(42).is_none());
}

// --- gateway classification --------------------------------------------

#[tokio::test]
async fn missing_token_fails_fast_without_a_request() {
    let client = test_client().await;
    let interactions = PostInteractionController::new(Arc::clone(&client.gateway));

    assert_eq!(interactions.toggle_like(1).await, Err(ApiError::AuthExpired));
    assert_eq!(client.server.received_requests().await.unwrap_or_default().len(), 0);
}

#[tokio::test]
async fn connection_refusal_maps_to_network_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let tokens =
        Arc::new(TokenStore::open(dir.path().join("session.json")).expect("open token store"));
    tokens.set(&seeded_session("tok-1")).expect("seed");

    // Bind then drop to get a port nothing is listening on.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .expect("bind")
        .local_addr()
        .expect("addr")
        .port();
    let gateway =
        Arc::new(RequestGateway::new(format!("http://127.0.0.1:{port}"), tokens).expect("gateway"));

    let interactions = PostInteractionController::new(gateway);
    let outcome = interactions.toggle_like(1).await;
    assert!(matches!(outcome, Err(ApiError::Network(_))));
}

#[tokio::test]
async fn malformed_success_body_maps_to_server_failure() {
    let client = test_client().await;
    Mock::given(method("GET"))
        .and(path("/posts/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&client.server)
        .await;

    let interactions = PostInteractionController::new(Arc::clone(&client.gateway));
    let outcome = interactions.load_post(1).await;
    assert!(matches!(outcome, Err(ApiError::Server { status: 200, .. })));
}

#[tokio::test]
async fn structured_rejection_maps_to_field_errors() {
    let client = test_client().await;
    client.tokens.set(&seeded_session("tok-1")).expect("seed");
    Mock::given(method("POST"))
        .and(path("/posts/42/comments"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({"content": ["contains forbidden words"]})),
        )
        .mount(&client.server)
        .await;

    let interactions = PostInteractionController::new(Arc::clone(&client.gateway));
    let outcome = interactions.add_comment(42, "spam spam").await;
    let Err(ApiError::Validation(errors)) = outcome else {
        panic!("expected validation failure");
    };
    assert_eq!(errors.get("content"), ["contains forbidden words"]);
}
