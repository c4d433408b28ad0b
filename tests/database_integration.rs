//! Postgres round trips; skipped unless DATABASE_URL points at a scratch database

use chrono::Utc;
use wsb_agent::{
    data::Post,
    db::{Database, RunCounts, RunStatus},
    signals::{Action, Signal, SignalComponents},
};

async fn connect() -> Option<Database> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) if !url.is_empty() => url,
        _ => {
            eprintln!("DATABASE_URL not set, skipping database test");
            return None;
        }
    };
    let db = Database::new(&url).await.expect("Failed to connect to test database");
    db.run_migrations().await.expect("Failed to run migrations");
    Some(db)
}

fn signal(ticker: &str, score: f64) -> Signal {
    Signal {
        ticker: ticker.to_string(),
        composite_score: score,
        action: if score > 0.6 { Action::Buy } else { Action::Hold },
        confidence: 0.9,
        components: SignalComponents {
            sentiment: 0.8,
            velocity: 0.5,
            volume: 0.2,
            momentum: 0.1,
        },
        reasoning: "integration".to_string(),
        metadata: serde_json::Map::new(),
        timestamp: Utc::now(),
    }
}

#[tokio::test]
async fn test_signals_round_trip() {
    let Some(db) = connect().await else {
        return;
    };
    db.health_check().await.unwrap();

    let ticker = format!("ZZ{}", Utc::now().timestamp_subsec_micros() % 1000);
    db.insert_signals(&[signal(&ticker, 0.75), signal(&ticker, 0.2)])
        .await
        .unwrap();

    let stored = db.ticker_signals(&ticker.to_lowercase(), 10).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|s| s.ticker == ticker));
    assert!(stored.iter().any(|s| s.action == Action::Buy));
    assert_eq!(stored[0].components.sentiment, 0.8);

    db.close().await;
}

#[tokio::test]
async fn test_duplicate_posts_ignored() {
    let Some(db) = connect().await else {
        return;
    };

    let post = Post {
        id: format!("it_{}", uuid::Uuid::new_v4()),
        title: "$GME integration".to_string(),
        body: String::new(),
        score: 1,
        upvote_ratio: 1.0,
        num_comments: 0,
        created_utc: Some(Utc::now()),
        author: None,
        url: String::new(),
        permalink: String::new(),
    };

    assert_eq!(db.insert_posts(&[post.clone()]).await.unwrap(), 1);
    assert_eq!(db.insert_posts(&[post]).await.unwrap(), 0);

    db.close().await;
}

#[tokio::test]
async fn test_pipeline_run_lifecycle() {
    let Some(db) = connect().await else {
        return;
    };

    let run_id = db.start_pipeline_run().await.unwrap();
    let counts = RunCounts {
        posts_ingested: 3,
        comments_ingested: 2,
        tickers_found: 1,
        signals_generated: 1,
    };
    db.complete_pipeline_run(run_id, counts, RunStatus::Completed, None)
        .await
        .unwrap();

    db.insert_portfolio_snapshot(100_000.0, 100_000.0).await.unwrap();
    assert!(!db.portfolio_history(5).await.unwrap().is_empty());

    db.close().await;
}
