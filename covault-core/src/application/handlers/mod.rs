//! Per-kind event handler pipeline.
//!
//! Every handler follows the same shape: dedup against the raw-event
//! cache, batch-resolve shared keys, materialize fresh events
//! concurrently with settle-all-then-filter isolation, then store raw
//! event and domain object in one synchronous pass. Deletion publishes
//! the cooperative tombstone before touching local state.

pub mod approval;
pub mod completed;
pub mod label;
pub mod policy;
pub mod proposal;
pub mod shared_key;
pub mod signer;
pub mod tombstone;

pub use approval::ApprovalHandler;
pub use completed::CompletedProposalHandler;
pub use label::LabelHandler;
pub use policy::PolicyHandler;
pub use proposal::ProposalHandler;
pub use shared_key::SharedKeyHandler;
pub use signer::SignerHandler;
pub use tombstone::TombstoneHandler;

use crate::application::context::SessionContext;
use crate::domain::{DomainObject, EventDraft, EventKind, RawEvent, SignerSharing, Tag};
use crate::foundation::{EventId, PolicyId, PublicKey, Result, VaultError};
use crate::infrastructure::auth::Authenticator;
use crate::infrastructure::store::IndexName;
use async_trait::async_trait;
use log::{debug, warn};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// One strategy per event kind: materialize raw events into domain
/// objects, and perform authorized cooperative deletion.
#[async_trait]
pub trait KindHandler: Send + Sync {
    fn kind(&self) -> EventKind;

    /// Turns raw events of this kind into domain objects. Cached ids are
    /// served without decryption; per-event failures are logged and
    /// dropped, never failing the batch.
    async fn handle(&self, events: Vec<RawEvent>) -> Result<Vec<DomainObject>>;

    /// Authorizes, publishes the tombstone, then (and only then) mutates
    /// local state.
    async fn delete(&self, ids: Vec<EventId>) -> Result<()>;
}

/// Closed registry of strategies, keyed by the kind enum.
pub struct HandlerRegistry {
    handlers: HashMap<EventKind, Arc<dyn KindHandler>>,
}

impl HandlerRegistry {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        let handlers: Vec<Arc<dyn KindHandler>> = vec![
            Arc::new(SharedKeyHandler::new(ctx.clone())),
            Arc::new(PolicyHandler::new(ctx.clone())),
            Arc::new(ProposalHandler::new(ctx.clone())),
            Arc::new(ApprovalHandler::new(ctx.clone())),
            Arc::new(CompletedProposalHandler::new(ctx.clone())),
            Arc::new(SignerHandler::new(ctx.clone(), SignerSharing::Owned)),
            Arc::new(SignerHandler::new(ctx.clone(), SignerSharing::Shared)),
            Arc::new(LabelHandler::new(ctx.clone())),
            Arc::new(TombstoneHandler::new(ctx)),
        ];
        Self { handlers: handlers.into_iter().map(|handler| (handler.kind(), handler)).collect() }
    }

    pub fn get(&self, kind: EventKind) -> Option<Arc<dyn KindHandler>> {
        self.handlers.get(&kind).cloned()
    }
}

/// Splits a batch into already-cached ids and fresh events, deduplicating
/// relay-side repeats by id along the way.
pub(crate) fn split_cached(ctx: &SessionContext, events: Vec<RawEvent>) -> Result<(Vec<EventId>, Vec<RawEvent>)> {
    let mut seen: BTreeSet<EventId> = BTreeSet::new();
    let mut deduped: Vec<RawEvent> = Vec::with_capacity(events.len());
    for event in events {
        if seen.insert(event.id) {
            deduped.push(event);
        }
    }
    let ids: Vec<EventId> = deduped.iter().map(|event| event.id).collect();
    let fresh_ids: BTreeSet<EventId> =
        ctx.stores.events.read().missing(&ids, IndexName::EventId)?.into_iter().collect();
    let mut cached = Vec::new();
    let mut fresh = Vec::new();
    for event in deduped {
        if fresh_ids.contains(&event.id) {
            fresh.push(event);
        } else {
            cached.push(event.id);
        }
    }
    Ok((cached, fresh))
}

/// The deduplicated set of group ids referenced by a batch; resolved once
/// per batch so repeated objects of one group cost one resolution.
pub(crate) fn group_refs(events: &[RawEvent]) -> BTreeSet<PolicyId> {
    events.iter().filter_map(|event| event.last_event_ref().map(PolicyId::from)).collect()
}

/// Settle-all-then-filter: keeps successful materializations, logs and
/// drops the rest so one hostile or malformed event cannot deny service
/// to its siblings.
pub(crate) fn filter_settled<T>(kind: EventKind, results: Vec<(EventId, Result<T>)>) -> Vec<T> {
    results
        .into_iter()
        .filter_map(|(event_id, result)| match result {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("dropping event from batch kind={} event_id={} err={}", kind, event_id, err);
                None
            }
        })
        .collect()
}

/// Explicit merge of the created and tombstoned streams: an event is live
/// iff it was created and no authorized tombstone retracts it.
pub fn live_events(created: Vec<RawEvent>, tombstones: &[RawEvent]) -> Vec<RawEvent> {
    created
        .into_iter()
        .filter(|event| {
            !tombstones
                .iter()
                .any(|tombstone| tombstone.author == event.author && tombstone.event_refs().contains(&event.id))
        })
        .collect()
}

/// Builds the cooperative deletion event: one event-reference tag per
/// retracted id, one recipient tag per participant to notify.
pub(crate) fn deletion_draft(ids: &[EventId], recipients: &[PublicKey]) -> EventDraft {
    EventDraft::new(EventKind::Deletion, "")
        .tags(ids.iter().copied().map(Tag::Event))
        .tags(recipients.iter().copied().map(Tag::PubKey))
}

/// Signs and publishes a tombstone; callers mutate local state only after
/// this returns Ok, so a publish failure leaves local state unchanged.
pub(crate) async fn publish_tombstone(
    ctx: &SessionContext,
    signer: &dyn Authenticator,
    ids: &[EventId],
    recipients: &[PublicKey],
) -> Result<RawEvent> {
    let event = signer.sign(deletion_draft(ids, recipients))?;
    ctx.transport.publish(event.clone()).await?;
    debug!("tombstone published event_id={} retracted_count={}", event.id, ids.len());
    Ok(event)
}

/// Looks up the policy a group object belongs to and checks that the
/// acting identity is a current participant.
pub(crate) fn require_participant(ctx: &SessionContext, policy_id: PolicyId, action: &'static str) -> Result<crate::domain::Policy> {
    let policy = ctx
        .stores
        .policies
        .read()
        .get(policy_id, IndexName::EventId)?
        .ok_or_else(|| VaultError::not_found("policy", policy_id))?;
    let me = ctx.public_key();
    if !policy.is_participant(&me) {
        return Err(VaultError::unauthorized(action, me));
    }
    Ok(policy)
}
