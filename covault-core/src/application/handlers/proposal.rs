use crate::application::context::SessionContext;
use crate::application::handlers::{
    filter_settled, group_refs, publish_tombstone, require_participant, split_cached, KindHandler,
};
use crate::domain::{verify_event, DomainObject, EventKind, Proposal, ProposalPayload, RawEvent};
use crate::foundation::{EventId, PolicyId, Result, VaultError};
use crate::infrastructure::auth::{decrypt_obj, SharedKeyAuthenticator};
use crate::infrastructure::store::IndexName;
use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

pub struct ProposalHandler {
    ctx: Arc<SessionContext>,
}

impl ProposalHandler {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    async fn materialize(
        &self,
        event: RawEvent,
        keys: &HashMap<PolicyId, Arc<SharedKeyAuthenticator>>,
    ) -> Result<(RawEvent, Proposal)> {
        verify_event(&event)?;
        let policy_id = event
            .last_event_ref()
            .map(PolicyId::from)
            .ok_or_else(|| VaultError::invariant("proposal missing policy reference"))?;
        let shared = keys
            .get(&policy_id)
            .ok_or_else(|| VaultError::SharedKeyUnresolved { policy_id: policy_id.to_string() })?;
        let payload: ProposalPayload = decrypt_obj(shared.as_ref(), &event.author, &event.content)?;
        let proposal = Proposal { id: event.id, policy_id, author: event.author, created_at: event.created_at, payload };
        Ok((event, proposal))
    }
}

#[async_trait]
impl KindHandler for ProposalHandler {
    fn kind(&self) -> EventKind {
        EventKind::Proposal
    }

    async fn handle(&self, events: Vec<RawEvent>) -> Result<Vec<DomainObject>> {
        let (cached_ids, fresh) = split_cached(&self.ctx, events)?;
        let mut proposals: Vec<Proposal> = self.ctx.stores.proposals.read().get_many(cached_ids, IndexName::EventId)?;

        if !fresh.is_empty() {
            let keys = self.ctx.shared_keys.resolve(&group_refs(&fresh)).await?;
            let futures: Vec<_> = fresh
                .into_iter()
                .map(|event| {
                    let keys = &keys;
                    let id = event.id;
                    async move { (id, self.materialize(event, keys).await) }
                })
                .collect();
            let settled = futures_util::future::join_all(futures).await;
            let materialized = filter_settled(self.kind(), settled);

            let mut event_store = self.ctx.stores.events.write();
            let mut proposal_store = self.ctx.stores.proposals.write();
            for (raw, proposal) in materialized {
                event_store.store(raw);
                proposal_store.store(proposal.clone());
                proposals.push(proposal);
            }
        }
        Ok(proposals.into_iter().map(DomainObject::Proposal).collect())
    }

    async fn delete(&self, ids: Vec<EventId>) -> Result<()> {
        for id in ids {
            let proposal = self
                .ctx
                .stores
                .proposals
                .read()
                .get(id, IndexName::EventId)?
                .ok_or_else(|| VaultError::not_found("proposal", id))?;
            let policy = require_participant(&self.ctx, proposal.policy_id, "delete proposal")?;
            let shared = self
                .ctx
                .shared_keys
                .cached(&proposal.policy_id)
                .ok_or_else(|| VaultError::SharedKeyUnresolved { policy_id: proposal.policy_id.to_string() })?;

            let tombstone = publish_tombstone(&self.ctx, shared.as_ref(), &[id], policy.participants()).await?;
            self.ctx.stores.remove_proposal_locally(id);
            self.ctx.stores.events.write().store(tombstone);
            debug!("proposal deleted proposal_id={} policy_id={}", id, proposal.policy_id);
        }
        Ok(())
    }
}
