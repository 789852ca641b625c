//! Per-identity orchestration.
//!
//! A `Session` owns every per-kind store, the shared-key cache, and the
//! handler registry for one authenticated identity. Switching identity
//! constructs a fresh `Session`: cached plaintext decrypted under the old
//! capability is meaningless, and a confidentiality risk, under a new one,
//! so nothing is ever re-keyed in place.

use crate::application::context::SessionContext;
use crate::application::handlers::{live_events, HandlerRegistry, KindHandler, TombstoneHandler};
use crate::application::lifecycle;
use crate::domain::{
    verify_event, ApprovedProposal, CompletedProposal, DomainObject, EventKind, Label, Policy, Proposal,
    ProposalPayload, ProposalStatus, RawEvent, SignerGrant,
};
use crate::foundation::util::now_secs;
use crate::foundation::{EventId, PolicyId, PublicKey, Result, VaultError};
use crate::infrastructure::auth::Authenticator;
use crate::infrastructure::store::IndexName;
use crate::infrastructure::transport::{Filter, Transport, TransportSubscription};
use crate::infrastructure::wallet::WalletBackend;
use log::debug;
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct Session {
    ctx: Arc<SessionContext>,
    registry: HandlerRegistry,
    tombstones: Arc<TombstoneHandler>,
}

impl Session {
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        transport: Arc<dyn Transport>,
        wallet: Arc<dyn WalletBackend>,
    ) -> Self {
        Self::from_context(Arc::new(SessionContext::new(authenticator, transport, wallet)))
    }

    pub fn from_context(ctx: Arc<SessionContext>) -> Self {
        let registry = HandlerRegistry::new(ctx.clone());
        let tombstones = Arc::new(TombstoneHandler::new(ctx.clone()));
        Self { ctx, registry, tombstones }
    }

    /// Builds a fresh session for a different identity over the same
    /// collaborators. All caches start empty; nothing is carried over.
    pub fn switch_identity(&self, authenticator: Arc<dyn Authenticator>) -> Self {
        Self::new(authenticator, self.ctx.transport.clone(), self.ctx.wallet.clone())
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.ctx
    }

    pub fn public_key(&self) -> PublicKey {
        self.ctx.public_key()
    }

    fn handler(&self, kind: EventKind) -> Arc<dyn KindHandler> {
        self.registry.get(kind).expect("registry is closed over EventKind")
    }

    /// Dispatches a mixed batch to the per-kind handlers. Deletions are
    /// applied last so a tombstone arriving with its target in one batch
    /// still lands on materialized state.
    pub async fn ingest(&self, events: Vec<RawEvent>) -> Result<Vec<DomainObject>> {
        let mut by_kind: BTreeMap<EventKind, Vec<RawEvent>> = BTreeMap::new();
        for event in events {
            by_kind.entry(event.kind).or_default().push(event);
        }
        let deletions = by_kind.remove(&EventKind::Deletion);
        let mut objects = Vec::new();
        for (kind, batch) in by_kind {
            objects.extend(self.handler(kind).handle(batch).await?);
        }
        if let Some(batch) = deletions {
            self.tombstones.process(batch)?;
        }
        Ok(objects)
    }

    /// Applies tombstone events and reports removals grouped by kind.
    pub fn process_deletions(&self, events: Vec<RawEvent>) -> Result<BTreeMap<EventKind, Vec<EventId>>> {
        self.tombstones.process(events)
    }

    /// Lists creations and their tombstones in one sweep, merges them into
    /// the live set, and keeps local state in step with the retractions.
    async fn fetch_live(&self, created_filter: Filter) -> Result<Vec<RawEvent>> {
        let created = self.ctx.transport.list(created_filter).await?;
        if created.is_empty() {
            return Ok(created);
        }
        let ids: Vec<EventId> = created.iter().map(|event| event.id).collect();
        let tombstones: Vec<RawEvent> = self
            .ctx
            .transport
            .list(Filter::new().kind(EventKind::Deletion).event_refs(ids))
            .await?
            .into_iter()
            .filter(|tombstone| verify_event(tombstone).is_ok())
            .collect();
        if !tombstones.is_empty() {
            self.tombstones.process(tombstones.clone())?;
        }
        Ok(live_events(created, &tombstones))
    }

    pub async fn sync_policies(&self) -> Result<Vec<Policy>> {
        let live = self.fetch_live(Filter::new().kind(EventKind::Policy).recipient(self.public_key())).await?;
        let objects = self.handler(EventKind::Policy).handle(live).await?;
        Ok(objects
            .into_iter()
            .filter_map(|object| match object {
                DomainObject::Policy(policy) => Some(policy),
                _ => None,
            })
            .collect())
    }

    /// Active proposals of a policy, reconstructed from the relay view.
    /// A proposal already referenced by a stored completion is retired
    /// even if its tombstone has not propagated yet.
    pub async fn proposals_for(&self, policy_id: PolicyId) -> Result<Vec<Proposal>> {
        let live = self
            .fetch_live(Filter::new().kind(EventKind::Proposal).event_ref(EventId::from(policy_id)))
            .await?;
        let objects = self.handler(EventKind::Proposal).handle(live).await?;
        let completed = self.ctx.stores.completed.read();
        Ok(objects
            .into_iter()
            .filter_map(|object| match object {
                DomainObject::Proposal(proposal) => Some(proposal),
                _ => None,
            })
            .filter(|proposal| !completed.has(proposal.id, IndexName::Proposal).unwrap_or(false))
            .collect())
    }

    pub async fn approvals_for(&self, proposal_id: EventId) -> Result<Vec<ApprovedProposal>> {
        let live = self.fetch_live(Filter::new().kind(EventKind::Approval).event_ref(proposal_id)).await?;
        let objects = self.handler(EventKind::Approval).handle(live).await?;
        Ok(objects
            .into_iter()
            .filter_map(|object| match object {
                DomainObject::Approval(approval) => Some(approval),
                _ => None,
            })
            .collect())
    }

    pub async fn completed_for(&self, policy_id: PolicyId) -> Result<Vec<CompletedProposal>> {
        let live = self
            .fetch_live(Filter::new().kind(EventKind::CompletedProposal).event_ref(EventId::from(policy_id)))
            .await?;
        let objects = self.handler(EventKind::CompletedProposal).handle(live).await?;
        Ok(objects
            .into_iter()
            .filter_map(|object| match object {
                DomainObject::Completed(completed) => Some(completed),
                _ => None,
            })
            .collect())
    }

    pub async fn labels_for(&self, policy_id: PolicyId) -> Result<Vec<Label>> {
        let live = self.fetch_live(Filter::new().kind(EventKind::Label).event_ref(EventId::from(policy_id))).await?;
        let objects = self.handler(EventKind::Label).handle(live).await?;
        Ok(objects
            .into_iter()
            .filter_map(|object| match object {
                DomainObject::Label(label) => Some(label),
                _ => None,
            })
            .collect())
    }

    /// Signer grants visible to this identity: own metadata plus grants
    /// shared with it.
    pub async fn sync_signers(&self) -> Result<Vec<SignerGrant>> {
        let me = self.public_key();
        let owned = self.fetch_live(Filter::new().kind(EventKind::OwnedSigner).author(me)).await?;
        let shared = self.fetch_live(Filter::new().kind(EventKind::SharedSigner).recipient(me)).await?;
        let mut grants = Vec::new();
        for (kind, batch) in [(EventKind::OwnedSigner, owned), (EventKind::SharedSigner, shared)] {
            let objects = self.handler(kind).handle(batch).await?;
            grants.extend(objects.into_iter().filter_map(|object| match object {
                DomainObject::Signer(grant) => Some(grant),
                _ => None,
            }));
        }
        Ok(grants)
    }

    /// Local-only view of the still-active proposals of a policy.
    pub fn active_proposals(&self, policy_id: PolicyId) -> Result<Vec<Proposal>> {
        let completed = self.ctx.stores.completed.read();
        Ok(self
            .ctx
            .stores
            .proposals
            .read()
            .by_index(policy_id, IndexName::Policy)?
            .into_iter()
            .filter(|proposal| !completed.has(proposal.id, IndexName::Proposal).unwrap_or(false))
            .collect())
    }

    /// Live feed of everything concerning one policy.
    pub async fn subscribe_policy(&self, policy_id: PolicyId) -> Result<TransportSubscription> {
        let filter = Filter::new()
            .kind(EventKind::Proposal)
            .kind(EventKind::Approval)
            .kind(EventKind::CompletedProposal)
            .kind(EventKind::Label)
            .kind(EventKind::Deletion)
            .event_ref(EventId::from(policy_id));
        debug!("subscribing to policy feed policy_id={}", policy_id);
        self.ctx.transport.subscribe(filter).await
    }

    // === Lifecycle ===

    pub async fn create_policy(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        descriptor_template: &str,
        participants: Vec<PublicKey>,
    ) -> Result<Policy> {
        lifecycle::create_policy(&self.ctx, name, description, descriptor_template, participants).await
    }

    pub async fn create_proposal(&self, policy_id: PolicyId, payload: ProposalPayload) -> Result<Proposal> {
        lifecycle::create_proposal(&self.ctx, policy_id, payload).await
    }

    pub async fn approve_proposal(&self, proposal_id: EventId, signed_psbt: String) -> Result<ApprovedProposal> {
        lifecycle::approve_proposal(&self.ctx, proposal_id, signed_psbt).await
    }

    pub async fn proposal_status(&self, proposal_id: EventId) -> Result<ProposalStatus> {
        lifecycle::proposal_status(&self.ctx, proposal_id, now_secs()).await
    }

    pub async fn proposal_status_at(&self, proposal_id: EventId, now: u64) -> Result<ProposalStatus> {
        lifecycle::proposal_status(&self.ctx, proposal_id, now).await
    }

    pub async fn finalize_proposal(&self, proposal_id: EventId, broadcast: bool) -> Result<CompletedProposal> {
        lifecycle::finalize_proposal(&self.ctx, proposal_id, broadcast).await
    }

    pub async fn save_signer(&self, payload: crate::domain::SignerPayload) -> Result<SignerGrant> {
        lifecycle::save_signer(&self.ctx, payload).await
    }

    pub async fn share_signer(&self, payload: crate::domain::SignerPayload, recipient: PublicKey) -> Result<SignerGrant> {
        lifecycle::share_signer(&self.ctx, payload, recipient).await
    }

    pub async fn save_label(
        &self,
        policy_id: PolicyId,
        identifier: impl Into<String>,
        payload: crate::domain::LabelPayload,
    ) -> Result<Label> {
        lifecycle::save_label(&self.ctx, policy_id, identifier, payload).await
    }

    // === Cooperative deletion ===

    pub async fn delete_proposal(&self, proposal_id: EventId) -> Result<()> {
        self.handler(EventKind::Proposal).delete(vec![proposal_id]).await
    }

    pub async fn delete_policy(&self, policy_id: PolicyId) -> Result<()> {
        self.handler(EventKind::Policy).delete(vec![EventId::from(policy_id)]).await
    }

    pub async fn withdraw_approval(&self, approval_id: EventId) -> Result<()> {
        self.handler(EventKind::Approval).delete(vec![approval_id]).await
    }

    pub async fn revoke_signer(&self, grant_id: EventId) -> Result<()> {
        let grant = self
            .ctx
            .stores
            .signers
            .read()
            .get(grant_id, IndexName::EventId)?
            .ok_or_else(|| VaultError::not_found("signer grant", grant_id))?;
        let kind = match grant.sharing {
            crate::domain::SignerSharing::Owned => EventKind::OwnedSigner,
            crate::domain::SignerSharing::Shared => EventKind::SharedSigner,
        };
        self.handler(kind).delete(vec![grant_id]).await
    }

    pub async fn delete_label(&self, label_id: EventId) -> Result<()> {
        self.handler(EventKind::Label).delete(vec![label_id]).await
    }
}
