use super::reddit::PostSource;
use super::{epoch_to_utc, Comment, DataError, DataResult, Post};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_FIXTURE_PATH: &str = "tests/fixtures/sample_posts.json";

/// Timestamps in fixtures are either RFC 3339 strings or epoch seconds
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Epoch(f64),
    Text(String),
}

impl RawTimestamp {
    /// `None` for strings without an offset, which carry no timezone
    fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            RawTimestamp::Epoch(seconds) => epoch_to_utc(*seconds),
            RawTimestamp::Text(text) => DateTime::parse_from_rfc3339(text)
                .map(|dt| dt.with_timezone(&Utc))
                .ok(),
        }
    }
}

fn resolve_timestamp(raw: &Option<RawTimestamp>, loaded_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match raw {
        Some(ts) => ts.to_utc(),
        None => Some(loaded_at),
    }
}

#[derive(Debug, Deserialize)]
struct RawPost {
    id: String,
    title: String,
    #[serde(default)]
    body: String,
    #[serde(default = "default_post_score")]
    score: i64,
    #[serde(default = "default_upvote_ratio")]
    upvote_ratio: f64,
    #[serde(default)]
    num_comments: u64,
    created_utc: Option<RawTimestamp>,
    author: Option<String>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    permalink: String,
}

#[derive(Debug, Deserialize)]
struct RawComment {
    id: String,
    body: String,
    #[serde(default = "default_comment_score")]
    score: i64,
    created_utc: Option<RawTimestamp>,
    post_id: String,
    author: Option<String>,
    parent_id: Option<String>,
}

fn default_post_score() -> i64 {
    100
}

fn default_comment_score() -> i64 {
    10
}

fn default_upvote_ratio() -> f64 {
    0.9
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawFixture {
    Batch {
        #[serde(default)]
        posts: Vec<RawPost>,
        #[serde(default)]
        comments: Vec<RawComment>,
    },
    Posts(Vec<RawPost>),
}

/// Serves posts and comments from a local JSON fixture
pub struct MockIngester {
    path: PathBuf,
    batch_size: u32,
}

impl MockIngester {
    pub fn new(path: impl Into<PathBuf>, batch_size: u32) -> Self {
        Self {
            path: path.into(),
            batch_size,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self, limit: usize) -> DataResult<(Vec<Post>, Vec<Comment>)> {
        let raw = std::fs::read_to_string(&self.path)?;
        let fixture: RawFixture = serde_json::from_str(&raw)?;
        let (raw_posts, raw_comments) = match fixture {
            RawFixture::Batch { posts, comments } => (posts, comments),
            RawFixture::Posts(posts) => (posts, Vec::new()),
        };

        let loaded_at = Utc::now();

        let posts = raw_posts
            .into_iter()
            .take(limit)
            .map(|p| Post {
                created_utc: resolve_timestamp(&p.created_utc, loaded_at),
                id: p.id,
                title: p.title,
                body: p.body,
                score: p.score,
                upvote_ratio: p.upvote_ratio,
                num_comments: p.num_comments,
                author: p.author,
                url: p.url,
                permalink: p.permalink,
            })
            .collect();

        let comments = raw_comments
            .into_iter()
            .map(|c| Comment {
                created_utc: resolve_timestamp(&c.created_utc, loaded_at),
                id: c.id,
                body: c.body,
                score: c.score,
                post_id: c.post_id,
                author: c.author,
                parent_id: c.parent_id,
            })
            .collect();

        Ok((posts, comments))
    }
}

#[async_trait]
impl PostSource for MockIngester {
    async fn fetch_all(&self, limit: Option<u32>) -> DataResult<(Vec<Post>, Vec<Comment>)> {
        let limit = limit.unwrap_or(self.batch_size) as usize;
        tracing::info!("MOCK: Loading up to {} posts from {}", limit, self.path.display());

        if !self.path.exists() {
            tracing::error!("Mock data file not found at {}", self.path.display());
            return Ok((Vec::new(), Vec::new()));
        }

        match self.load(limit) {
            Ok((posts, comments)) => {
                tracing::info!("MOCK: Loaded {} posts and {} comments", posts.len(), comments.len());
                Ok((posts, comments))
            }
            Err(e @ (DataError::Serialization(_) | DataError::Io(_))) => {
                tracing::error!("MOCK: Failed to load mock data: {}", e);
                Ok((Vec::new(), Vec::new()))
            }
            Err(e) => Err(e),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_loads_posts_and_comments() {
        let file = fixture(
            r#"{
                "posts": [
                    {"id": "p1", "title": "$GME squeeze", "score": 420, "created_utc": "2024-03-01T12:00:00Z"},
                    {"id": "p2", "title": "TSLA calls", "created_utc": 1709294400}
                ],
                "comments": [
                    {"id": "c1", "body": "GME to the moon", "post_id": "p1"}
                ]
            }"#,
        );

        let ingester = MockIngester::new(file.path(), 25);
        let (posts, comments) = ingester.fetch_all(None).await.unwrap();

        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].score, 420);
        assert_eq!(posts[1].score, 100);
        assert_eq!(posts[1].created_utc.unwrap().timestamp(), 1_709_294_400);
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].score, 10);
        assert!(comments[0].created_utc.is_some());
    }

    #[tokio::test]
    async fn test_bare_post_array_and_limit() {
        let file = fixture(r#"[{"id": "a", "title": "one"}, {"id": "b", "title": "two"}, {"id": "c", "title": "three"}]"#);

        let ingester = MockIngester::new(file.path(), 25);
        let (posts, comments) = ingester.fetch_all(Some(2)).await.unwrap();

        assert_eq!(posts.len(), 2);
        assert!(comments.is_empty());
    }

    #[tokio::test]
    async fn test_naive_timestamp_is_unknown() {
        let file = fixture(r#"[{"id": "a", "title": "one", "created_utc": "2024-03-01T12:00:00"}]"#);

        let (posts, _) = MockIngester::new(file.path(), 25).fetch_all(None).await.unwrap();
        assert!(posts[0].created_utc.is_none());
    }

    #[tokio::test]
    async fn test_missing_or_invalid_file_yields_empty_batch() {
        let missing = MockIngester::new("/nonexistent/sample_posts.json", 25);
        let (posts, comments) = missing.fetch_all(None).await.unwrap();
        assert!(posts.is_empty() && comments.is_empty());

        let file = fixture("not json");
        let (posts, _) = MockIngester::new(file.path(), 25).fetch_all(None).await.unwrap();
        assert!(posts.is_empty());
    }
}
