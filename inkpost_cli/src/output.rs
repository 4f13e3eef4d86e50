use anyhow::Result;
use chrono::{DateTime, Utc};

use inkpost_client::{ApiError, InteractionState, Post};

/// Prints a classified failure and converts it into a nonzero exit.
pub fn fail(err: ApiError) -> Result<()> {
    match &err {
        ApiError::AuthExpired => eprintln!("not logged in, or the session expired"),
        ApiError::Validation(errors) => {
            for (field, messages) in errors.iter() {
                for message in messages {
                    eprintln!("{field}: {message}");
                }
            }
        }
        ApiError::Network(reason) => eprintln!("could not reach the server: {reason}"),
        ApiError::Server { status, .. } => {
            eprintln!("the server could not handle the request (HTTP {status})");
        }
    }
    Err(err.into())
}

pub fn post_table(posts: &[Post]) {
    if posts.is_empty() {
        println!("no posts");
        return;
    }
    for post in posts {
        println!(
            "{:>6}  {}  {} by {}",
            post.id,
            display_time(&post.created_at),
            post.title,
            post.author
        );
    }
}

pub fn post_detail(post: &Post, state: &InteractionState) {
    println!("# {} (post {})", post.title, post.id);
    print!("by {} on {}", post.author, display_time(&post.created_at));
    if let Some(category) = &post.category {
        print!(" in {category}");
    }
    println!();
    if !post.tags.is_empty() {
        println!(
            "tags: {}",
            post.tags.iter().cloned().collect::<Vec<_>>().join(", ")
        );
    }
    println!();
    println!("{}", post.content);
    println!();
    println!(
        "{} likes{}  |  {} bookmarks{}",
        state.likes_count,
        if state.is_liked { " (yours)" } else { "" },
        state.bookmarks_count,
        if state.is_bookmarked { " (yours)" } else { "" },
    );
    if state.comments.is_empty() {
        println!("no comments");
    } else {
        println!("comments:");
        for comment in &state.comments {
            println!(
                "  [{}] {} ({}): {}",
                comment.id,
                comment.author,
                display_time(&comment.created_at),
                comment.content
            );
        }
    }
}

/// The wire carries timestamps as strings; render RFC 3339 ones as a short
/// date and pass anything else through untouched.
fn display_time(raw: &str) -> String {
    match raw.parse::<DateTime<Utc>>() {
        Ok(parsed) => parsed.format("%Y-%m-%d %H:%M").to_string(),
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc3339_timestamps_are_shortened() {
        assert_eq!(display_time("2024-01-01T12:30:00Z"), "2024-01-01 12:30");
    }

    #[test]
    fn non_rfc3339_strings_pass_through() {
        assert_eq!(display_time("2024-01-01"), "2024-01-01");
    }
}
