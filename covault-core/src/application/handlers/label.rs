use crate::application::context::SessionContext;
use crate::application::handlers::{
    filter_settled, group_refs, publish_tombstone, require_participant, split_cached, KindHandler,
};
use crate::domain::{verify_event, DomainObject, EventKind, Label, LabelPayload, RawEvent};
use crate::foundation::{EventId, PolicyId, Result, VaultError};
use crate::infrastructure::auth::{decrypt_obj, SharedKeyAuthenticator};
use crate::infrastructure::store::{IndexName, IndexValue};
use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

pub struct LabelHandler {
    ctx: Arc<SessionContext>,
}

impl LabelHandler {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    async fn materialize(
        &self,
        event: RawEvent,
        keys: &HashMap<PolicyId, Arc<SharedKeyAuthenticator>>,
    ) -> Result<(RawEvent, Label)> {
        verify_event(&event)?;
        let policy_id = event
            .last_event_ref()
            .map(PolicyId::from)
            .ok_or_else(|| VaultError::invariant("label missing policy reference"))?;
        let identifier = event
            .identifier()
            .map(str::to_string)
            .ok_or_else(|| VaultError::invariant("label missing identifier tag"))?;
        let shared = keys
            .get(&policy_id)
            .ok_or_else(|| VaultError::SharedKeyUnresolved { policy_id: policy_id.to_string() })?;
        let payload: LabelPayload = decrypt_obj(shared.as_ref(), &event.author, &event.content)?;
        let label = Label { id: event.id, policy_id, identifier, author: event.author, created_at: event.created_at, payload };
        Ok((event, label))
    }
}

#[async_trait]
impl KindHandler for LabelHandler {
    fn kind(&self) -> EventKind {
        EventKind::Label
    }

    async fn handle(&self, events: Vec<RawEvent>) -> Result<Vec<DomainObject>> {
        let (cached_ids, fresh) = split_cached(&self.ctx, events)?;
        let mut labels: Vec<Label> = self.ctx.stores.labels.read().get_many(cached_ids, IndexName::EventId)?;

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
            let mut label_store = self.ctx.stores.labels.write();
            for (raw, label) in materialized {
                // Replace-by-identifier: the newest event under one logical
                // id supersedes the stored one; stale arrivals are kept only
                // in the raw cache for dedup.
                let logical = IndexValue::composite(&[label.policy_id.as_ref(), label.identifier.as_bytes()]);
                if let Some(existing) = label_store.get(logical, IndexName::Identifier)? {
                    if existing.created_at >= label.created_at {
                        event_store.store(raw);
                        labels.push(existing);
                        continue;
                    }
                    label_store.remove(&existing);
                    debug!(
                        "label superseded identifier={} old_event_id={} new_event_id={}",
                        label.identifier, existing.id, label.id
                    );
                }
                event_store.store(raw);
                label_store.store(label.clone());
                labels.push(label);
            }
        }
        Ok(labels.into_iter().map(DomainObject::Label).collect())
    }

    async fn delete(&self, ids: Vec<EventId>) -> Result<()> {
        for id in ids {
            let label = self
                .ctx
                .stores
                .labels
                .read()
                .get(id, IndexName::EventId)?
                .ok_or_else(|| VaultError::not_found("label", id))?;
            let policy = require_participant(&self.ctx, label.policy_id, "delete label")?;
            let shared = self
                .ctx
                .shared_keys
                .cached(&label.policy_id)
                .ok_or_else(|| VaultError::SharedKeyUnresolved { policy_id: label.policy_id.to_string() })?;

            let tombstone = publish_tombstone(&self.ctx, shared.as_ref(), &[id], policy.participants()).await?;
            {
                let mut label_store = self.ctx.stores.labels.write();
                let mut event_store = self.ctx.stores.events.write();
                label_store.remove_by_key(id);
                event_store.remove_by_key(id);
                event_store.store(tombstone);
            }
        }
        Ok(())
    }
}
