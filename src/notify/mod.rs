//! Discord webhook alerts for actionable signals

use crate::signals::{Action, Signal};
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::time::Duration;

/// Discord accepts at most 10 embeds per message
const MAX_EMBEDS: usize = 10;
const BUY_COLOR: u32 = 0x00FF00;
const SELL_COLOR: u32 = 0xFF0000;
const REQUEST_TIMEOUT_SECS: u64 = 10;

pub struct DiscordNotifier {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl DiscordNotifier {
    pub fn new(webhook_url: Option<String>) -> Result<Self> {
        let webhook_url = webhook_url.filter(|url| !url.trim().is_empty());
        if webhook_url.is_none() {
            tracing::warn!("No Discord webhook URL configured. Alerts will be disabled.");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build Discord HTTP client")?;

        Ok(Self { webhook_url, client })
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// Post BUY/SELL signals to the webhook
    ///
    /// Returns `true` when the message was delivered or there was nothing to
    /// send, `false` when delivery failed.
    pub async fn send_signals(&self, signals: &[Signal]) -> bool {
        let url = match &self.webhook_url {
            Some(url) => url,
            None => return true,
        };
        let payload = match build_payload(signals) {
            Some(payload) => payload,
            None => return true,
        };

        tracing::info!(
            "Sending Discord notification for {} signals",
            signals.iter().filter(|s| s.action.is_actionable()).count()
        );

        let result = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .and_then(|response| response.error_for_status());

        match result {
            Ok(_) => {
                tracing::info!("Discord notification sent successfully");
                true
            }
            Err(e) => {
                tracing::error!("Failed to send Discord notification: {}", e);
                false
            }
        }
    }
}

/// Webhook body for the actionable subset of `signals`, or `None` if there is none
pub fn build_payload(signals: &[Signal]) -> Option<Value> {
    let actionable: Vec<&Signal> = signals.iter().filter(|s| s.action.is_actionable()).collect();
    if actionable.is_empty() {
        return None;
    }

    let buys = actionable.iter().filter(|s| s.action == Action::Buy).count();
    let sells = actionable.len() - buys;
    let embeds: Vec<Value> = actionable.iter().take(MAX_EMBEDS).map(|s| create_embed(s)).collect();

    Some(json!({
        "username": "WSB Agent Alpha",
        "content": format!(
            "🚨 **{} Actionable Signals** ({} BUY / {} SELL) 🚨",
            actionable.len(),
            buys,
            sells
        ),
        "embeds": embeds,
    }))
}

fn create_embed(signal: &Signal) -> Value {
    let color = if signal.action == Action::Buy { BUY_COLOR } else { SELL_COLOR };
    let c = &signal.components;
    let component_text = format!(
        "**Sentiment:** {:.2}\n**Velocity:** {:.2}\n**Volume:** {:.2}\n**Momentum:** {:.2}",
        c.sentiment, c.velocity, c.volume, c.momentum
    );

    json!({
        "title": format!("[{}] ${}", signal.action, signal.ticker),
        "description": signal.reasoning,
        "color": color,
        "fields": [
            {
                "name": "Composite Score",
                "value": format!(
                    "{:.2} \n*(Confidence: {:.0}%)*",
                    signal.composite_score,
                    signal.confidence * 100.0
                ),
                "inline": true,
            },
            {
                "name": "Component Scores (-1 to 1)",
                "value": component_text,
                "inline": true,
            },
        ],
        "footer": {
            "text": format!("WSB Agent V1 • {}", signal.timestamp.format("%Y-%m-%d %H:%M UTC")),
        },
    })
}
