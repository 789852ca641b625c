use crate::application::context::SessionContext;
use crate::application::handlers::{split_cached, KindHandler};
use crate::domain::{verify_event, DomainObject, EventKind, RawEvent};
use crate::foundation::{EventId, PolicyId, Result, VaultError};
use crate::infrastructure::store::IndexName;
use async_trait::async_trait;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Consumes cooperative deletion events and applies authorized removals
/// across every per-kind store.
pub struct TombstoneHandler {
    ctx: Arc<SessionContext>,
}

impl TombstoneHandler {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    /// Applies already-verified tombstones and reports what was removed,
    /// grouped by kind. Unauthorized or unknown ids are skipped silently;
    /// nothing here errors the batch.
    pub fn apply(&self, tombstones: &[RawEvent]) -> BTreeMap<EventKind, Vec<EventId>> {
        let mut removed: BTreeMap<EventKind, Vec<EventId>> = BTreeMap::new();
        for tombstone in tombstones {
            for id in tombstone.event_refs() {
                let original = self.ctx.stores.events.read().get(id, IndexName::EventId).ok().flatten();
                let Some(original) = original else {
                    debug!("tombstone references unknown event event_id={}", id);
                    continue;
                };
                // A participant retracts only their own contributions.
                if original.author != tombstone.author {
                    debug!(
                        "skipping unauthorized tombstone event_id={} tombstone_author={} original_author={}",
                        id, tombstone.author, original.author
                    );
                    continue;
                }
                match original.kind {
                    EventKind::Policy => {
                        let policy_id = PolicyId::from(id);
                        self.ctx.stores.remove_policy_locally(policy_id);
                        self.ctx.shared_keys.remove(&policy_id);
                    }
                    EventKind::Proposal => {
                        self.ctx.stores.remove_proposal_locally(id);
                    }
                    EventKind::Approval => {
                        self.ctx.stores.approvals.write().remove_by_key(id);
                        self.ctx.stores.events.write().remove_by_key(id);
                    }
                    EventKind::CompletedProposal => {
                        self.ctx.stores.completed.write().remove_by_key(id);
                        self.ctx.stores.events.write().remove_by_key(id);
                    }
                    EventKind::OwnedSigner | EventKind::SharedSigner => {
                        self.ctx.stores.signers.write().remove_by_key(id);
                        self.ctx.stores.events.write().remove_by_key(id);
                    }
                    EventKind::Label => {
                        self.ctx.stores.labels.write().remove_by_key(id);
                        self.ctx.stores.events.write().remove_by_key(id);
                    }
                    EventKind::SharedKey => {
                        self.ctx.stores.events.write().remove_by_key(id);
                    }
                    // A tombstone of a tombstone has nothing to retract.
                    EventKind::Deletion => continue,
                }
                removed.entry(original.kind).or_default().push(id);
            }
        }
        removed
    }

    /// Verifies, dedups, applies, and records a batch of tombstone events,
    /// returning the removals grouped by kind for downstream subscribers.
    pub fn process(&self, events: Vec<RawEvent>) -> Result<BTreeMap<EventKind, Vec<EventId>>> {
        let (_cached, fresh) = split_cached(&self.ctx, events)?;
        let mut verified = Vec::with_capacity(fresh.len());
        for event in fresh {
            match verify_event(&event) {
                Ok(()) => verified.push(event),
                Err(err) => warn!("dropping forged tombstone event_id={} err={}", event.id, err),
            }
        }
        let removed = self.apply(&verified);
        let mut event_store = self.ctx.stores.events.write();
        for tombstone in verified {
            event_store.store(tombstone);
        }
        Ok(removed)
    }
}

#[async_trait]
impl KindHandler for TombstoneHandler {
    fn kind(&self) -> EventKind {
        EventKind::Deletion
    }

    async fn handle(&self, events: Vec<RawEvent>) -> Result<Vec<DomainObject>> {
        // Removals carry no materialization; subscribers wanting the
        // grouped report call `process` through the session.
        self.process(events)?;
        Ok(Vec::new())
    }

    async fn delete(&self, _ids: Vec<EventId>) -> Result<()> {
        Err(VaultError::invariant("tombstones are not retractable"))
    }
}
