use super::retry::retry_with_backoff;
use super::{epoch_to_utc, Comment, DataError, DataResult, Post};
use crate::config::RedditConfig;
use async_trait::async_trait;
use roux::{Reddit, Subreddit};
use std::collections::HashSet;
use std::time::Duration;

/// Anything that can supply a batch of posts and comments for one pipeline run
#[async_trait]
pub trait PostSource: Send + Sync {
    /// Fetch posts (up to `limit` per listing) and the comments of the top posts
    async fn fetch_all(&self, limit: Option<u32>) -> DataResult<(Vec<Post>, Vec<Comment>)>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy)]
enum Listing {
    Hot,
    New,
}

/// Reads r/WallStreetBets listings through Reddit's OAuth API
pub struct RedditIngester {
    config: RedditConfig,
    subreddit: Subreddit,
    comment_pause: Duration,
}

impl RedditIngester {
    /// Authenticate with the app's client credentials and bind the configured subreddit
    pub async fn connect(config: RedditConfig) -> DataResult<Self> {
        let (client_id, client_secret) = credentials(&config)?;

        let subreddit = retry_with_backoff(
            || async {
                Reddit::new(&config.user_agent, client_id, client_secret)
                    .subreddit(&config.subreddit)
                    .await
                    .map_err(|e| DataError::Reddit(format!("authentication failed: {}", e)))
            },
            3,
        )
        .await?;
        tracing::info!("Initialized Reddit ingester for r/{}", config.subreddit);

        Ok(Self {
            config,
            subreddit,
            comment_pause: Duration::from_millis(500),
        })
    }

    pub async fn fetch_hot_posts(&self, limit: u32) -> DataResult<Vec<Post>> {
        tracing::info!("Fetching up to {} hot posts from r/{}", limit, self.config.subreddit);
        self.fetch_listing(Listing::Hot, limit).await
    }

    pub async fn fetch_new_posts(&self, limit: u32) -> DataResult<Vec<Post>> {
        tracing::info!("Fetching up to {} new posts from r/{}", limit, self.config.subreddit);
        self.fetch_listing(Listing::New, limit).await
    }

    async fn fetch_listing(&self, kind: Listing, limit: u32) -> DataResult<Vec<Post>> {
        let listing = retry_with_backoff(
            || async {
                let result = match kind {
                    Listing::Hot => self.subreddit.hot(limit, None).await,
                    Listing::New => self.subreddit.latest(limit, None).await,
                };
                result.map_err(|e| DataError::Reddit(e.to_string()))
            },
            3,
        )
        .await?;

        let posts: Vec<Post> = listing
            .data
            .children
            .into_iter()
            .filter_map(|thing| {
                let submission = thing.data;
                if submission.id.is_empty() {
                    tracing::warn!("Skipping submission without id: {}", submission.title);
                    return None;
                }
                Some(Post {
                    author: normalize_author(Some(submission.author.clone())),
                    id: submission.id,
                    title: submission.title,
                    body: submission.selftext,
                    score: submission.score as i64,
                    upvote_ratio: submission.upvote_ratio as f64,
                    num_comments: submission.num_comments as u64,
                    created_utc: epoch_to_utc(submission.created_utc),
                    url: submission.url.unwrap_or_default(),
                    permalink: format!("https://reddit.com{}", submission.permalink),
                })
            })
            .collect();

        tracing::debug!("Parsed {} posts", posts.len());
        Ok(posts)
    }

    /// Comments for one post; failures are logged and yield an empty list
    pub async fn fetch_comments(&self, post_id: &str) -> Vec<Comment> {
        let limit = self.config.max_comments_per_post;
        tracing::info!("Fetching up to {} comments for post {}", limit, post_id);

        let listing = retry_with_backoff(
            || async {
                self.subreddit
                    .article_comments(post_id, Some(1), Some(limit))
                    .await
                    .map_err(|e| DataError::Reddit(e.to_string()))
            },
            3,
        )
        .await;

        match listing {
            Ok(listing) => {
                let comments: Vec<Comment> = listing
                    .data
                    .children
                    .into_iter()
                    .take(limit as usize)
                    .filter_map(|thing| {
                        let data = thing.data;
                        // "more" stubs carry no id or body
                        match (data.id, data.body) {
                            (Some(id), Some(body)) => Some(Comment {
                                id,
                                body,
                                score: i64::from(data.score.unwrap_or(0)),
                                created_utc: data.created_utc.and_then(epoch_to_utc),
                                post_id: post_id.to_string(),
                                author: normalize_author(data.author),
                                parent_id: data.parent_id,
                            }),
                            (id, _) => {
                                tracing::warn!("Error parsing comment {:?}: missing body", id);
                                None
                            }
                        }
                    })
                    .collect();
                tracing::info!("Fetched {} comments for post {}", comments.len(), post_id);
                comments
            }
            Err(e) => {
                tracing::error!("Error fetching comments for post {}: {}", post_id, e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl PostSource for RedditIngester {
    async fn fetch_all(&self, limit: Option<u32>) -> DataResult<(Vec<Post>, Vec<Comment>)> {
        let limit = limit.unwrap_or(self.config.batch_size);

        let hot_posts = self.fetch_hot_posts(limit).await?;
        let new_posts = self.fetch_new_posts(limit).await?;
        let fetched = hot_posts.len() + new_posts.len();

        let all_posts = dedup_posts(hot_posts.into_iter().chain(new_posts));
        tracing::info!(
            "Total unique posts: {} (duplicates removed: {})",
            all_posts.len(),
            fetched - all_posts.len()
        );

        let top_ids = top_post_ids(&all_posts, self.config.top_posts_for_comments);
        let mut all_comments = Vec::new();
        for post_id in &top_ids {
            all_comments.extend(self.fetch_comments(post_id).await);
            tokio::time::sleep(self.comment_pause).await;
        }

        tracing::info!(
            "Fetched {} total comments from top {} posts",
            all_comments.len(),
            top_ids.len()
        );
        Ok((all_posts, all_comments))
    }

    fn name(&self) -> &'static str {
        "reddit"
    }
}

/// Client id and secret, both required; Reddit rejects unauthenticated listing requests
fn credentials(config: &RedditConfig) -> DataResult<(&str, &str)> {
    let id = config.client_id.as_deref().filter(|s| !s.trim().is_empty());
    let secret = config.client_secret.as_deref().filter(|s| !s.trim().is_empty());
    match (id, secret) {
        (Some(id), Some(secret)) => Ok((id, secret)),
        _ => Err(DataError::Config(
            "REDDIT_CLIENT_ID and REDDIT_CLIENT_SECRET must be set for live ingestion (use --mock for fixtures)"
                .to_string(),
        )),
    }
}

fn normalize_author(author: Option<String>) -> Option<String> {
    author.filter(|name| !name.is_empty() && name != "[deleted]")
}

/// Keep the first occurrence of every post id
pub fn dedup_posts(posts: impl IntoIterator<Item = Post>) -> Vec<Post> {
    let mut seen = HashSet::new();
    posts
        .into_iter()
        .filter(|post| seen.insert(post.id.clone()))
        .collect()
}

/// Ids of the `n` highest-scoring posts
pub fn top_post_ids(posts: &[Post], n: usize) -> Vec<String> {
    let mut ranked: Vec<&Post> = posts.iter().collect();
    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked.into_iter().take(n).map(|post| post.id.clone()).collect()
}
