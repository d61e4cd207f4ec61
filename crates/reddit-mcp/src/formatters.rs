//! Markdown rendering of Reddit content for tool output.

use crate::models::{Comment, Post, PostDetail, UserAbout};

/// Render a list of posts as a markdown digest.
#[must_use]
pub fn format_posts_markdown(posts: &[Post]) -> String {
    if posts.is_empty() {
        return "No posts found.".to_string();
    }

    let mut out = String::new();
    for post in posts {
        out.push_str(&format!(
            "## {}\n- r/{} · u/{} · {} points · {} comments\n",
            post.title, post.subreddit, post.author, post.score, post.num_comments
        ));
        if let Some(ref url) = post.url {
            out.push_str(&format!("- {url}\n"));
        }
        if !post.selftext.is_empty() {
            out.push_str(&format!("\n{}\n", truncate(&post.selftext, 500)));
        }
        out.push('\n');
    }
    out
}

/// Render a post with its top-level comments.
#[must_use]
pub fn format_post_detail_markdown(detail: &PostDetail) -> String {
    let mut out = format_posts_markdown(std::slice::from_ref(&detail.post));
    if detail.comments.is_empty() {
        out.push_str("*No comments.*\n");
        return out;
    }

    out.push_str("### Comments\n\n");
    for comment in &detail.comments {
        out.push_str(&format_comment(comment));
    }
    out
}

fn format_comment(comment: &Comment) -> String {
    format!(
        "**u/{}** ({} points)\n{}\n\n",
        comment.author,
        comment.score,
        truncate(&comment.body, 800)
    )
}

/// Render a user profile.
#[must_use]
pub fn format_user_markdown(user: &UserAbout) -> String {
    let mut out = format!("## u/{}\n", user.name);
    if let Some(karma) = user.total_karma {
        out.push_str(&format!("- total karma: {karma}\n"));
    }
    if let (Some(link), Some(comment)) = (user.link_karma, user.comment_karma) {
        out.push_str(&format!("- link karma: {link}, comment karma: {comment}\n"));
    }
    out
}

/// Truncate at a char boundary, appending an ellipsis when cut.
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let cut: String = s.chars().take(max_chars).collect();
    format!("{cut}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post() -> Post {
        Post {
            id: "x1".into(),
            title: "Interesting".into(),
            author: "alice".into(),
            subreddit: "rust".into(),
            selftext: String::new(),
            url: Some("https://example.com".into()),
            score: 42,
            num_comments: 7,
            permalink: "/r/rust/comments/x1/interesting/".into(),
            created_utc: 0.0,
            over_18: false,
        }
    }

    #[test]
    fn test_posts_markdown() {
        let md = format_posts_markdown(&[post()]);
        assert!(md.contains("## Interesting"));
        assert!(md.contains("r/rust"));
        assert!(md.contains("42 points"));
    }

    #[test]
    fn test_empty_posts() {
        assert_eq!(format_posts_markdown(&[]), "No posts found.");
    }

    #[test]
    fn test_truncate_multibyte() {
        let s = "héllo wörld".repeat(100);
        let out = truncate(&s, 10);
        assert_eq!(out.chars().count(), 11); // 10 + ellipsis
    }

    #[test]
    fn test_post_detail_with_comments() {
        let detail = PostDetail {
            post: post(),
            comments: vec![Comment {
                id: "c1".into(),
                author: "bob".into(),
                body: "Nice".into(),
                score: 3,
                created_utc: 0.0,
            }],
        };
        let md = format_post_detail_markdown(&detail);
        assert!(md.contains("### Comments"));
        assert!(md.contains("u/bob"));
    }
}
