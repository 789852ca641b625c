use crate::application::context::SessionContext;
use crate::application::handlers::{
    filter_settled, group_refs, publish_tombstone, require_participant, split_cached, KindHandler,
};
use crate::domain::{verify_event, CompletedPayload, CompletedProposal, DomainObject, EventKind, RawEvent};
use crate::foundation::{EventId, PolicyId, Result, VaultError};
use crate::infrastructure::auth::{decrypt_obj, SharedKeyAuthenticator};
use crate::infrastructure::store::IndexName;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

pub struct CompletedProposalHandler {
    ctx: Arc<SessionContext>,
}

impl CompletedProposalHandler {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    async fn materialize(
        &self,
        event: RawEvent,
        keys: &HashMap<PolicyId, Arc<SharedKeyAuthenticator>>,
    ) -> Result<(RawEvent, CompletedProposal)> {
        verify_event(&event)?;
        let refs = event.event_refs();
        if refs.len() < 2 {
            return Err(VaultError::invariant("completed proposal missing proposal or policy reference"));
        }
        let proposal_id = refs[0];
        let policy_id = PolicyId::from(*refs.last().expect("checked len"));
        let shared = keys
            .get(&policy_id)
            .ok_or_else(|| VaultError::SharedKeyUnresolved { policy_id: policy_id.to_string() })?;
        let payload: CompletedPayload = decrypt_obj(shared.as_ref(), &event.author, &event.content)?;
        let completed = CompletedProposal {
            id: event.id,
            proposal_id,
            policy_id,
            author: event.author,
            created_at: event.created_at,
            payload,
        };
        Ok((event, completed))
    }
}

#[async_trait]
impl KindHandler for CompletedProposalHandler {
    fn kind(&self) -> EventKind {
        EventKind::CompletedProposal
    }

    async fn handle(&self, events: Vec<RawEvent>) -> Result<Vec<DomainObject>> {
        let (cached_ids, fresh) = split_cached(&self.ctx, events)?;
        let mut completed: Vec<CompletedProposal> = self.ctx.stores.completed.read().get_many(cached_ids, IndexName::EventId)?;

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
            let mut completed_store = self.ctx.stores.completed.write();
            for (raw, item) in materialized {
                event_store.store(raw);
                completed_store.store(item.clone());
                completed.push(item);
            }
        }
        Ok(completed.into_iter().map(DomainObject::Completed).collect())
    }

    async fn delete(&self, ids: Vec<EventId>) -> Result<()> {
        for id in ids {
            let completed = self
                .ctx
                .stores
                .completed
                .read()
                .get(id, IndexName::EventId)?
                .ok_or_else(|| VaultError::not_found("completed proposal", id))?;
            let policy = require_participant(&self.ctx, completed.policy_id, "delete completed proposal")?;
            let shared = self
                .ctx
                .shared_keys
                .cached(&completed.policy_id)
                .ok_or_else(|| VaultError::SharedKeyUnresolved { policy_id: completed.policy_id.to_string() })?;

            let tombstone = publish_tombstone(&self.ctx, shared.as_ref(), &[id], policy.participants()).await?;
            {
                let mut completed_store = self.ctx.stores.completed.write();
                let mut event_store = self.ctx.stores.events.write();
                completed_store.remove_by_key(id);
                event_store.remove_by_key(id);
                event_store.store(tombstone);
            }
        }
        Ok(())
    }
}
