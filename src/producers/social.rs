// src/producers/social.rs
//! Social-stream producer. Posts arrive on a bounded inbox (from a stream
//! client or `POST /api/social`) and are classified before emission.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use metrics::counter;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::classify::inference::InferenceEngine;
use crate::classify::SocialPost;
use crate::intake::EventRouter;
use crate::producers::{Backoff, Producer};

pub const DEFAULT_INBOX_CAPACITY: usize = 256;
const MAX_POSTS_PER_POLL: usize = 32;

/// Sending half of the social inbox. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SocialInbox {
    tx: mpsc::Sender<SocialPost>,
}

impl SocialInbox {
    /// Queue a post without waiting. Returns `false` when the inbox is full
    /// or the producer is gone.
    pub fn submit(&self, post: SocialPost) -> bool {
        match self.tx.try_send(post) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                counter!("social_inbox_full_total").increment(1);
                warn!(target: "producer", "social inbox full, post dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

pub struct SocialProducer {
    rx: Mutex<mpsc::Receiver<SocialPost>>,
    inference: InferenceEngine,
}

impl SocialProducer {
    pub fn new(inference: InferenceEngine, capacity: usize) -> (Self, SocialInbox) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let producer = Self {
            rx: Mutex::new(rx),
            inference,
        };
        (producer, SocialInbox { tx })
    }

    /// Classify and emit one post. Returns whether an event was accepted.
    pub async fn handle_post(&self, router: &EventRouter, post: &SocialPost) -> bool {
        let mut extra = BTreeMap::new();
        extra.insert("author".to_string(), Value::from(post.author.clone()));
        match self.inference.analyze_social_post(post, None, extra).await {
            Some(event) => router.emit_event(event),
            None => {
                debug!(target: "producer", source = %post.source, "post not actionable");
                false
            }
        }
    }
}

#[async_trait::async_trait]
impl Producer for SocialProducer {
    fn name(&self) -> &'static str {
        "social"
    }

    async fn poll(&self, router: &EventRouter) -> Result<usize> {
        let mut batch = Vec::new();
        {
            let mut rx = self.rx.lock().await;
            while batch.len() < MAX_POSTS_PER_POLL {
                match rx.try_recv() {
                    Ok(post) => batch.push(post),
                    Err(_) => break,
                }
            }
        }

        let mut accepted = 0;
        for post in &batch {
            if self.handle_post(router, post).await {
                accepted += 1;
            }
        }
        Ok(accepted)
    }

    fn backoff(&self) -> Backoff {
        Backoff::new(Duration::from_secs(1), 2.0, Duration::from_secs(600))
    }
}
