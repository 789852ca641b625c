//! Relay transport boundary.
//!
//! Connection management, retry fan-out, and relay bookkeeping live behind
//! this trait; the engine only sees list/get/publish/subscribe. A publish
//! resolves on the first relay acknowledgment or on total failure across
//! all configured relays; stronger delivery guarantees are a caller
//! concern.

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

use crate::domain::{EventKind, RawEvent};
use crate::foundation::{EventId, PublicKey, Result, VaultError};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;

/// Relay-side event selector. Empty vectors mean "no constraint on this
/// dimension"; populated ones are OR-matched within the dimension and
/// AND-matched across dimensions.
#[derive(Clone, Debug, Default)]
pub struct Filter {
    pub ids: Vec<EventId>,
    pub kinds: Vec<EventKind>,
    pub authors: Vec<PublicKey>,
    /// Matches the event-reference (`e`) tags.
    pub event_refs: Vec<EventId>,
    /// Matches the recipient-pubkey (`p`) tags.
    pub recipients: Vec<PublicKey>,
    /// Matches the identifier (`d`) tags.
    pub identifiers: Vec<String>,
    pub since: Option<u64>,
    pub until: Option<u64>,
    pub limit: Option<usize>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: EventId) -> Self {
        self.ids.push(id);
        self
    }

    pub fn ids(mut self, ids: impl IntoIterator<Item = EventId>) -> Self {
        self.ids.extend(ids);
        self
    }

    pub fn kind(mut self, kind: EventKind) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn author(mut self, author: PublicKey) -> Self {
        self.authors.push(author);
        self
    }

    pub fn event_ref(mut self, id: EventId) -> Self {
        self.event_refs.push(id);
        self
    }

    pub fn event_refs(mut self, ids: impl IntoIterator<Item = EventId>) -> Self {
        self.event_refs.extend(ids);
        self
    }

    pub fn recipient(mut self, pubkey: PublicKey) -> Self {
        self.recipients.push(pubkey);
        self
    }

    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifiers.push(identifier.into());
        self
    }

    pub fn since(mut self, at: u64) -> Self {
        self.since = Some(at);
        self
    }

    pub fn until(mut self, at: u64) -> Self {
        self.until = Some(at);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, event: &RawEvent) -> bool {
        if !self.ids.is_empty() && !self.ids.contains(&event.id) {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }
        if !self.authors.is_empty() && !self.authors.contains(&event.author) {
            return false;
        }
        if !self.event_refs.is_empty() && !event.event_refs().iter().any(|id| self.event_refs.contains(id)) {
            return false;
        }
        if !self.recipients.is_empty() && !event.recipients().iter().any(|pk| self.recipients.contains(pk)) {
            return false;
        }
        if !self.identifiers.is_empty() {
            match event.identifier() {
                Some(identifier) if self.identifiers.iter().any(|want| want == identifier) => {}
                _ => return false,
            }
        }
        if let Some(since) = self.since {
            if event.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.created_at > until {
                return false;
            }
        }
        true
    }
}

/// Live event feed. Dropping the subscription (or the returned stream)
/// stops further delivery; work already issued on received events runs to
/// completion.
pub struct TransportSubscription {
    inner: BoxStream<'static, Result<RawEvent>>,
    _keepalive: Option<Box<dyn std::any::Any + Send>>,
}

impl TransportSubscription {
    pub fn new(inner: BoxStream<'static, Result<RawEvent>>) -> Self {
        Self { inner, _keepalive: None }
    }

    pub fn new_with_keepalive(inner: BoxStream<'static, Result<RawEvent>>, keepalive: Box<dyn std::any::Any + Send>) -> Self {
        Self { inner, _keepalive: Some(keepalive) }
    }

    pub async fn next(&mut self) -> Option<Result<RawEvent>> {
        self.inner.next().await
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Every stored event matching the filter, oldest first. Relays may
    /// hold duplicates and partial views; the caller dedups by id.
    async fn list(&self, filter: Filter) -> Result<Vec<RawEvent>>;

    /// First match, if any.
    async fn get(&self, filter: Filter) -> Result<Option<RawEvent>>;

    /// Settles on first relay acknowledgment; `PublishFailure` when every
    /// configured relay rejected or timed out.
    async fn publish(&self, event: RawEvent) -> Result<()>;

    async fn subscribe(&self, filter: Filter) -> Result<TransportSubscription>;
}

/// Publishes a batch, surfacing the first failure.
///
/// Callers sequence this *before* any local mutation so a failed publish
/// leaves local state unchanged.
pub async fn publish_all(transport: &dyn Transport, events: impl IntoIterator<Item = RawEvent> + Send) -> Result<()> {
    for event in events {
        let id = event.id;
        transport.publish(event).await.map_err(|err| match err {
            VaultError::PublishFailure { details } => VaultError::PublishFailure { details: format!("event {id}: {details}") },
            other => other,
        })?;
    }
    Ok(())
}
