use crate::application::context::SessionContext;
use crate::application::handlers::{filter_settled, publish_tombstone, split_cached, KindHandler};
use crate::domain::{verify_event, DomainObject, EventKind, RawEvent, SignerGrant, SignerPayload, SignerSharing};
use crate::foundation::{EventId, Result, VaultError};
use crate::infrastructure::auth::decrypt_obj;
use crate::infrastructure::store::IndexName;
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;

/// Handles signer grants; one instance per sharing mode, registered under
/// its own kind.
pub struct SignerHandler {
    ctx: Arc<SessionContext>,
    sharing: SignerSharing,
}

impl SignerHandler {
    pub fn new(ctx: Arc<SessionContext>, sharing: SignerSharing) -> Self {
        Self { ctx, sharing }
    }

    async fn materialize(&self, event: RawEvent) -> Result<(RawEvent, SignerGrant)> {
        verify_event(&event)?;
        let me = self.ctx.public_key();
        let (recipient, counterparty) = match self.sharing {
            // Owned grants are self-encrypted by their author.
            SignerSharing::Owned => (None, event.author),
            SignerSharing::Shared => {
                let recipient = event
                    .recipients()
                    .first()
                    .copied()
                    .ok_or_else(|| VaultError::invariant("shared signer grant missing recipient"))?;
                // The envelope is symmetric between author and recipient;
                // decrypt against whichever side we are not.
                let counterparty = if event.author == me { recipient } else { event.author };
                (Some(recipient), counterparty)
            }
        };
        let payload: SignerPayload = decrypt_obj(self.ctx.authenticator.as_ref(), &counterparty, &event.content)?;
        let grant = SignerGrant {
            id: event.id,
            author: event.author,
            recipient,
            created_at: event.created_at,
            sharing: self.sharing,
            payload,
        };
        Ok((event, grant))
    }
}

#[async_trait]
impl KindHandler for SignerHandler {
    fn kind(&self) -> EventKind {
        match self.sharing {
            SignerSharing::Owned => EventKind::OwnedSigner,
            SignerSharing::Shared => EventKind::SharedSigner,
        }
    }

    async fn handle(&self, events: Vec<RawEvent>) -> Result<Vec<DomainObject>> {
        let (cached_ids, fresh) = split_cached(&self.ctx, events)?;
        let mut grants: Vec<SignerGrant> = self.ctx.stores.signers.read().get_many(cached_ids, IndexName::EventId)?;

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
            let mut signer_store = self.ctx.stores.signers.write();
            for (raw, grant) in materialized {
                event_store.store(raw);
                signer_store.store(grant.clone());
                grants.push(grant);
            }
        }
        Ok(grants.into_iter().map(DomainObject::Signer).collect())
    }

    /// Revoking a grant is the standard tombstone path, restricted to the
    /// grant's author.
    async fn delete(&self, ids: Vec<EventId>) -> Result<()> {
        let me = self.ctx.public_key();
        for id in ids {
            let grant = self
                .ctx
                .stores
                .signers
                .read()
                .get(id, IndexName::EventId)?
                .ok_or_else(|| VaultError::not_found("signer grant", id))?;
            if grant.author != me {
                return Err(VaultError::unauthorized("revoke signer grant", me));
            }
            let recipients: Vec<_> = grant.recipient.into_iter().collect();
            let tombstone = publish_tombstone(&self.ctx, self.ctx.authenticator.as_ref(), &[id], &recipients).await?;
            {
                let mut signer_store = self.ctx.stores.signers.write();
                let mut event_store = self.ctx.stores.events.write();
                signer_store.remove_by_key(id);
                event_store.remove_by_key(id);
                event_store.store(tombstone);
            }
            debug!("signer grant revoked grant_id={} sharing={:?}", id, grant.sharing);
        }
        Ok(())
    }
}
