//! In-memory relay for tests: one hub shared by every participant's
//! transport handle, the moral equivalent of a relay set with a perfect,
//! totally-ordered view.

use crate::domain::RawEvent;
use crate::foundation::{Result, VaultError};
use crate::infrastructure::transport::{Filter, Transport, TransportSubscription};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

pub struct MockRelayHub {
    events: Mutex<Vec<RawEvent>>,
    feed: broadcast::Sender<RawEvent>,
    fail_publishes: AtomicBool,
    publish_count: AtomicUsize,
}

impl MockRelayHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            feed: broadcast::channel(256).0,
            fail_publishes: AtomicBool::new(false),
            publish_count: AtomicUsize::new(0),
        })
    }

    /// Makes every subsequent publish fail as if all relays rejected it.
    pub fn set_fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }

    pub fn publish_count(&self) -> usize {
        self.publish_count.load(Ordering::SeqCst)
    }

    pub async fn stored_events(&self) -> Vec<RawEvent> {
        self.events.lock().await.clone()
    }
}

pub struct MockTransport {
    hub: Arc<MockRelayHub>,
}

impl MockTransport {
    pub fn new(hub: Arc<MockRelayHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn list(&self, filter: Filter) -> Result<Vec<RawEvent>> {
        let events = self.hub.events.lock().await;
        let mut matched: Vec<RawEvent> = events.iter().filter(|event| filter.matches(event)).cloned().collect();
        matched.sort_by_key(|event| (event.created_at, event.id));
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn get(&self, filter: Filter) -> Result<Option<RawEvent>> {
        Ok(self.list(filter).await?.into_iter().next())
    }

    async fn publish(&self, event: RawEvent) -> Result<()> {
        if self.hub.fail_publishes.load(Ordering::SeqCst) {
            return Err(VaultError::PublishFailure { details: "all mock relays rejected the event".to_string() });
        }
        self.hub.publish_count.fetch_add(1, Ordering::SeqCst);
        let mut events = self.hub.events.lock().await;
        // Relays dedup by content address; a republished event is an ack.
        if !events.iter().any(|existing| existing.id == event.id) {
            events.push(event.clone());
            // No active receivers is not an error: publishing to an empty
            // topic succeeds on real relays too.
            let _ = self.hub.feed.send(event);
        }
        Ok(())
    }

    async fn subscribe(&self, filter: Filter) -> Result<TransportSubscription> {
        let mut receiver = self.hub.feed.subscribe();
        let stream = async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        if filter.matches(&event) {
                            yield Ok(event);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        yield Err(VaultError::TransportError {
                            operation: "subscribe",
                            details: "mock relay feed lagged".to_string(),
                        });
                    }
                }
            }
        };
        Ok(TransportSubscription::new(Box::pin(stream)))
    }
}
