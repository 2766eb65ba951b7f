// tests/inference_gate.rs
//
// Classification gating with a scripted reasoner (no network).

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::json;

use market_trust_score::classify::inference::{InferenceConfig, InferenceEngine};
use market_trust_score::classify::reasoner::Reasoner;
use market_trust_score::classify::SocialPost;
use market_trust_score::event::DirectionHint;

/// Replies with a fixed string, or fails.
struct Scripted(Option<String>);

#[async_trait]
impl Reasoner for Scripted {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn classify(&self, _prompt: &str, _post: &SocialPost) -> Result<Option<String>> {
        match &self.0 {
            Some(reply) => Ok(Some(reply.clone())),
            None => Err(anyhow!("upstream timeout")),
        }
    }
}

fn engine(reply: Option<serde_json::Value>) -> InferenceEngine {
    let reasoner = Scripted(reply.map(|v| v.to_string()));
    InferenceEngine::with_prompt(Arc::new(reasoner), InferenceConfig::default(), "classify".into())
}

fn post() -> SocialPost {
    SocialPost::new("Twitter", "exchange_ops", "Deposits &amp; withdrawals <b>suspended</b> on Kraken")
}

fn relevant() -> serde_json::Value {
    json!({
        "is_relevant_now": true,
        "category": "EXCHANGE_OUTAGE",
        "urgency": 80,
        "credibility": 60,
        "direction_hint": "bearish",
        "immediacy_minutes": 5,
        "impacted_assets": ["BTC", "ETH"],
        "evidence_urls": ["https://status.kraken.com"],
        "explanation": "exchange halted transfers"
    })
}

#[tokio::test]
async fn relevant_post_becomes_event() {
    let e = engine(Some(relevant()));
    let ev = e
        .analyze_social_post(&post(), Some(40), BTreeMap::new())
        .await
        .expect("event");

    // 40 + 30*0.4 + 10*0.3 + 5 = 60
    assert_eq!(ev.severity, 60);
    assert_eq!(ev.category, "EXCHANGE_OUTAGE");
    assert_eq!(ev.source, "Twitter");
    assert_eq!(ev.title, "Deposits & withdrawals suspended on Kraken");
    assert_eq!(ev.meta.currencies, vec!["BTC".to_string(), "ETH".to_string()]);
    assert_eq!(ev.meta.direction_hint, Some(DirectionHint::Bearish));
    assert_eq!(ev.meta.urgency, Some(80.0));
    assert_eq!(ev.meta.extra["immediacy_minutes"], 5.0);
    assert_eq!(ev.meta.extra["evidence_urls"][0], "https://status.kraken.com");
}

#[tokio::test]
async fn irrelevant_category_dropped() {
    let mut v = relevant();
    v["category"] = json!("IRRELEVANT");
    assert!(engine(Some(v))
        .analyze_social_post(&post(), None, BTreeMap::new())
        .await
        .is_none());
}

#[tokio::test]
async fn not_relevant_now_dropped() {
    let mut v = relevant();
    v["is_relevant_now"] = json!(false);
    assert!(engine(Some(v))
        .analyze_social_post(&post(), None, BTreeMap::new())
        .await
        .is_none());
}

#[tokio::test]
async fn far_immediacy_dropped_boundary_kept() {
    let mut v = relevant();
    v["immediacy_minutes"] = json!(61);
    assert!(engine(Some(v.clone()))
        .analyze_social_post(&post(), None, BTreeMap::new())
        .await
        .is_none());

    v["immediacy_minutes"] = json!(60);
    assert!(engine(Some(v))
        .analyze_social_post(&post(), None, BTreeMap::new())
        .await
        .is_some());
}

#[tokio::test]
async fn malformed_or_failed_reply_is_no_event() {
    let garbage = InferenceEngine::with_prompt(
        Arc::new(Scripted(Some("sorry, I cannot help".into()))),
        InferenceConfig::default(),
        "classify".into(),
    );
    assert!(garbage
        .analyze_social_post(&post(), None, BTreeMap::new())
        .await
        .is_none());

    assert!(engine(None)
        .analyze_social_post(&post(), None, BTreeMap::new())
        .await
        .is_none());
}

#[tokio::test]
async fn fenced_reply_and_source_override() {
    let mut v = relevant();
    v["source"] = json!("KrakenStatus");
    let fenced = format!("```json\n{v}\n```");
    let e = InferenceEngine::with_prompt(
        Arc::new(Scripted(Some(fenced))),
        InferenceConfig::default(),
        "classify".into(),
    );
    let ev = e
        .analyze_social_post(&post(), None, BTreeMap::new())
        .await
        .expect("event");
    assert_eq!(ev.source, "KrakenStatus");
}
