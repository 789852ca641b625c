use crate::application::context::SessionContext;
use crate::application::handlers::{filter_settled, publish_tombstone, split_cached, KindHandler};
use crate::domain::{verify_event, DomainObject, EventKind, RawEvent};
use crate::foundation::{EventId, PolicyId, Result, VaultError};
use crate::infrastructure::auth::SharedKeyAuthenticator;
use crate::infrastructure::store::IndexName;
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;

/// Materializes shared-key distribution envelopes addressed to the active
/// identity, seeding the registry cache as a side effect.
pub struct SharedKeyHandler {
    ctx: Arc<SessionContext>,
}

impl SharedKeyHandler {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    async fn materialize(&self, event: RawEvent) -> Result<(RawEvent, PolicyId)> {
        verify_event(&event)?;
        let me = self.ctx.public_key();
        if !event.is_addressed_to(&me) {
            return Err(VaultError::decryption("shared key envelope addressed to another participant"));
        }
        let policy_id = event
            .first_event_ref()
            .map(PolicyId::from)
            .ok_or_else(|| VaultError::invariant("shared key envelope missing policy reference"))?;
        let plaintext = self.ctx.authenticator.decrypt(&event.author, &event.content)?;
        let secret_hex =
            String::from_utf8(plaintext).map_err(|_| VaultError::decryption("shared key envelope is not utf-8"))?;
        let authenticator = SharedKeyAuthenticator::from_secret_hex(&secret_hex)?;
        self.ctx.shared_keys.insert(policy_id, Arc::new(authenticator));
        Ok((event, policy_id))
    }
}

#[async_trait]
impl KindHandler for SharedKeyHandler {
    fn kind(&self) -> EventKind {
        EventKind::SharedKey
    }

    async fn handle(&self, events: Vec<RawEvent>) -> Result<Vec<DomainObject>> {
        let (cached_ids, fresh) = split_cached(&self.ctx, events)?;
        let mut resolved: Vec<PolicyId> = self
            .ctx
            .stores
            .events
            .read()
            .get_many(cached_ids, IndexName::EventId)?
            .into_iter()
            .filter_map(|event| event.first_event_ref().map(PolicyId::from))
            .collect();

        if !fresh.is_empty() {
            let futures: Vec<_> = fresh
                .into_iter()
                .map(|event| {
                    let id = event.id;
                    async move { (id, self.materialize(event).await) }
                })
                .collect();
            let settled = futures_util::future::join_all(futures).await;
            let materialized = filter_settled(self.kind(), settled);

            let mut event_store = self.ctx.stores.events.write();
            for (raw, policy_id) in materialized {
                event_store.store(raw);
                resolved.push(policy_id);
                debug!("shared key resolved from envelope policy_id={}", policy_id);
            }
        }
        Ok(resolved.into_iter().map(|policy_id| DomainObject::SharedKey { policy_id }).collect())
    }

    /// A distribution envelope is retractable only by the participant who
    /// sent it.
    async fn delete(&self, ids: Vec<EventId>) -> Result<()> {
        let me = self.ctx.public_key();
        for id in ids {
            let envelope = self
                .ctx
                .stores
                .events
                .read()
                .get(id, IndexName::EventId)?
                .ok_or_else(|| VaultError::not_found("shared key envelope", id))?;
            if envelope.author != me {
                return Err(VaultError::unauthorized("delete shared key envelope", me));
            }
            let tombstone = publish_tombstone(&self.ctx, self.ctx.authenticator.as_ref(), &[id], &envelope.recipients()).await?;
            let mut event_store = self.ctx.stores.events.write();
            event_store.remove_by_key(id);
            event_store.store(tombstone);
        }
        Ok(())
    }
}
