use crate::application::context::SessionContext;
use crate::application::handlers::{filter_settled, publish_tombstone, require_participant, split_cached, KindHandler};
use crate::domain::{verify_event, DomainObject, EventKind, Policy, PolicyPayload, RawEvent};
use crate::foundation::{EventId, PolicyId, Result, VaultError};
use crate::infrastructure::auth::{decrypt_obj, SharedKeyAuthenticator};
use crate::infrastructure::store::IndexName;
use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

pub struct PolicyHandler {
    ctx: Arc<SessionContext>,
}

impl PolicyHandler {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    async fn materialize(
        &self,
        event: RawEvent,
        keys: &HashMap<PolicyId, Arc<SharedKeyAuthenticator>>,
    ) -> Result<(RawEvent, Policy)> {
        verify_event(&event)?;
        // A policy is its own group object: the founding event id is the
        // policy id.
        let policy_id = PolicyId::from(event.id);
        let shared = keys
            .get(&policy_id)
            .ok_or_else(|| VaultError::SharedKeyUnresolved { policy_id: policy_id.to_string() })?;
        let payload: PolicyPayload = decrypt_obj(shared.as_ref(), &event.author, &event.content)?;
        if payload.participants.is_empty() {
            return Err(VaultError::invariant("policy has no participants"));
        }
        let policy = Policy { id: policy_id, author: event.author, created_at: event.created_at, payload };
        Ok((event, policy))
    }
}

#[async_trait]
impl KindHandler for PolicyHandler {
    fn kind(&self) -> EventKind {
        EventKind::Policy
    }

    async fn handle(&self, events: Vec<RawEvent>) -> Result<Vec<DomainObject>> {
        let (cached_ids, fresh) = split_cached(&self.ctx, events)?;
        let mut policies: Vec<Policy> = self.ctx.stores.policies.read().get_many(cached_ids, IndexName::EventId)?;

        if !fresh.is_empty() {
            let group_ids = fresh.iter().map(|event| PolicyId::from(event.id)).collect();
            let keys = self.ctx.shared_keys.resolve(&group_ids).await?;
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
            let mut policy_store = self.ctx.stores.policies.write();
            for (raw, policy) in materialized {
                event_store.store(raw);
                policy_store.store(policy.clone());
                policies.push(policy);
            }
        }
        Ok(policies.into_iter().map(DomainObject::Policy).collect())
    }

    /// Deleting a policy retracts the group object; dependents are dropped
    /// from the local caches with it.
    async fn delete(&self, ids: Vec<EventId>) -> Result<()> {
        for id in ids {
            let policy_id = PolicyId::from(id);
            let policy = require_participant(&self.ctx, policy_id, "delete policy")?;
            let shared = self
                .ctx
                .shared_keys
                .cached(&policy_id)
                .ok_or_else(|| VaultError::SharedKeyUnresolved { policy_id: policy_id.to_string() })?;

            let tombstone = publish_tombstone(&self.ctx, shared.as_ref(), &[id], policy.participants()).await?;
            self.ctx.stores.remove_policy_locally(policy_id);
            self.ctx.shared_keys.remove(&policy_id);
            self.ctx.stores.events.write().store(tombstone);
            debug!("policy deleted policy_id={}", policy_id);
        }
        Ok(())
    }
}
