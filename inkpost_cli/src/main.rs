mod output;

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use inkpost_client::{
    ApiError, ClientConfig, Credentials, NewPost, PostCatalog, PostInteractionController,
    Registration, RequestGateway, SessionController, SessionEvent, TokenStore,
};

#[derive(Parser)]
#[command(name = "inkpost", about = "Terminal client for the Inkpost blog platform")]
struct Cli {
    /// Override the configured API base URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and store the session
    Login {
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account (confirmation arrives by email)
    Register {
        username: String,
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Drop the stored session
    Logout,
    /// Show the stored identity, refreshed from the server when possible
    Whoami,
    #[command(subcommand)]
    Posts(PostsCommand),
    /// Toggle your like on a post
    Like { post: u64 },
    /// Toggle your bookmark on a post
    Bookmark { post: u64 },
    #[command(subcommand)]
    Comment(CommentCommand),
}

#[derive(Subcommand)]
enum PostsCommand {
    /// List recent posts
    List,
    /// Search posts
    Search { query: String },
    /// Show one post with its comments and interaction state
    Show { post: u64 },
    /// Publish a new post
    Create {
        title: String,
        #[arg(long)]
        content: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        tag: Vec<String>,
    },
    /// Delete one of your posts
    Delete { post: u64 },
}

#[derive(Subcommand)]
enum CommentCommand {
    /// Comment on a post
    Add {
        post: u64,
        content: String,
    },
    /// Edit one of your comments on a post
    Edit {
        post: u64,
        comment: u64,
        content: String,
    },
    /// Delete one of your comments on a post
    Delete { post: u64, comment: u64 },
}

struct App {
    sessions: SessionController,
    interactions: PostInteractionController,
    catalog: PostCatalog,
    events: flume::Receiver<SessionEvent>,
}

fn build_app(api_url: Option<String>) -> Result<App> {
    let config = ClientConfig::load().context("failed to load configuration")?;
    let base_url = api_url.unwrap_or_else(|| config.api_base_url.clone());
    tracing::debug!("using API at {base_url}");

    let tokens = Arc::new(match &config.session_file {
        Some(path) => TokenStore::open(path)?,
        None => TokenStore::open_default()?,
    });
    let gateway = Arc::new(RequestGateway::new(base_url, Arc::clone(&tokens))?);

    let sessions = SessionController::new(Arc::clone(&gateway), tokens);
    let events = sessions.events();
    Ok(App {
        sessions,
        interactions: PostInteractionController::new(Arc::clone(&gateway)),
        catalog: PostCatalog::new(gateway),
        events,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let app = build_app(cli.api_url)?;

    let result = run(&app, cli.command).await;

    // Any 401 during the command has already torn the session down; tell the
    // user once.
    if matches!(app.events.try_recv(), Ok(SessionEvent::Expired)) {
        eprintln!("session expired; please log in again");
    }

    result
}

async fn run(app: &App, command: Command) -> Result<()> {
    match command {
        Command::Login { username, password } => {
            let outcome = app
                .sessions
                .login(&Credentials { username, password })
                .await;
            match outcome {
                Ok(session) => {
                    println!("logged in as {}", session.identity.username);
                    Ok(())
                }
                Err(err) => output::fail(err),
            }
        }
        Command::Register {
            username,
            email,
            password,
        } => {
            let outcome = app
                .sessions
                .register(&Registration {
                    username,
                    email,
                    password,
                })
                .await;
            match outcome {
                Ok(()) => {
                    println!("account created; check your email to confirm it");
                    Ok(())
                }
                Err(err) => output::fail(err),
            }
        }
        Command::Logout => {
            app.sessions.logout();
            println!("logged out");
            Ok(())
        }
        Command::Whoami => match app.catalog.profile().await {
            Ok(identity) => {
                println!("{} <{}>", identity.username, identity.email);
                Ok(())
            }
            Err(ApiError::AuthExpired) => {
                match app.sessions.last_username() {
                    Some(username) => println!("not logged in (last login: {username})"),
                    None => println!("not logged in"),
                }
                Ok(())
            }
            Err(err) => output::fail(err),
        },
        Command::Posts(command) => run_posts(app, command).await,
        Command::Like { post } => match app.interactions.toggle_like(post).await {
            Ok(status) => {
                println!(
                    "{} ({} likes)",
                    if status.is_liked { "liked" } else { "unliked" },
                    status.likes_count
                );
                Ok(())
            }
            Err(err) => output::fail(err),
        },
        Command::Bookmark { post } => match app.interactions.toggle_bookmark(post).await {
            Ok(status) => {
                println!(
                    "{} ({} bookmarks)",
                    if status.is_bookmarked {
                        "bookmarked"
                    } else {
                        "bookmark removed"
                    },
                    status.bookmarks_count
                );
                Ok(())
            }
            Err(err) => output::fail(err),
        },
        Command::Comment(command) => run_comments(app, command).await,
    }
}

async fn run_posts(app: &App, command: PostsCommand) -> Result<()> {
    match command {
        PostsCommand::List => match app.catalog.list().await {
            Ok(posts) => {
                output::post_table(&posts);
                Ok(())
            }
            Err(err) => output::fail(err),
        },
        PostsCommand::Search { query } => match app.catalog.search(&query).await {
            Ok(posts) => {
                output::post_table(&posts);
                Ok(())
            }
            Err(err) => output::fail(err),
        },
        PostsCommand::Show { post } => {
            let loaded = match app.interactions.load_post(post).await {
                Ok(loaded) => loaded,
                Err(err) => return output::fail(err),
            };
            if let Err(err) = app.interactions.load_comments(post).await {
                return output::fail(err);
            }
            let state = app.interactions.snapshot(post).unwrap_or_default();
            output::post_detail(&loaded, &state);
            Ok(())
        }
        PostsCommand::Create {
            title,
            content,
            category,
            tag,
        } => {
            let draft = NewPost {
                title,
                content,
                category,
                tags: tag.into_iter().collect::<BTreeSet<_>>(),
            };
            match app.catalog.create(&draft).await {
                Ok(post) => {
                    println!("published post {} ({})", post.id, post.slug);
                    Ok(())
                }
                Err(err) => output::fail(err),
            }
        }
        PostsCommand::Delete { post } => match app.interactions.delete_post(post).await {
            Ok(()) => {
                println!("post {post} deleted");
                Ok(())
            }
            Err(err) => output::fail(err),
        },
    }
}

async fn run_comments(app: &App, command: CommentCommand) -> Result<()> {
    match command {
        CommentCommand::Add { post, content } => {
            match app.interactions.add_comment(post, &content).await {
                Ok(comment) => {
                    println!("comment {} added", comment.id);
                    Ok(())
                }
                // The draft is still in `content`; surface the reason and let
                // the user retry.
                Err(err) => output::fail(err),
            }
        }
        CommentCommand::Edit {
            post,
            comment,
            content,
        } => {
            // Load the view first so the edit lands in local state too.
            if let Err(err) = app.interactions.load_comments(post).await {
                return output::fail(err);
            }
            match app.interactions.edit_comment(comment, &content).await {
                Ok(updated) => {
                    println!("comment {} updated", updated.id);
                    Ok(())
                }
                Err(err) => output::fail(err),
            }
        }
        CommentCommand::Delete { post, comment } => {
            if let Err(err) = app.interactions.load_comments(post).await {
                return output::fail(err);
            }
            match app.interactions.delete_comment(comment).await {
                Ok(()) => {
                    println!("comment {comment} deleted");
                    Ok(())
                }
                Err(err) => output::fail(err),
            }
        }
    }
}
