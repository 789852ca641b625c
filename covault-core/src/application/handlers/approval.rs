use crate::application::context::SessionContext;
use crate::application::handlers::{filter_settled, group_refs, publish_tombstone, split_cached, KindHandler};
use crate::domain::{verify_event, ApprovalPayload, ApprovedProposal, DomainObject, EventKind, RawEvent};
use crate::foundation::{EventId, PolicyId, Result, VaultError};
use crate::infrastructure::auth::{decrypt_obj, SharedKeyAuthenticator};
use crate::infrastructure::store::IndexName;
use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

pub struct ApprovalHandler {
    ctx: Arc<SessionContext>,
}

impl ApprovalHandler {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    async fn materialize(
        &self,
        event: RawEvent,
        keys: &HashMap<PolicyId, Arc<SharedKeyAuthenticator>>,
    ) -> Result<(RawEvent, ApprovedProposal)> {
        verify_event(&event)?;
        let refs = event.event_refs();
        if refs.len() < 2 {
            return Err(VaultError::invariant("approval missing proposal or policy reference"));
        }
        let proposal_id = refs[0];
        let policy_id = PolicyId::from(*refs.last().expect("checked len"));
        let expires_at = event.expiration().ok_or_else(|| VaultError::invariant("approval missing expiration tag"))?;
        let shared = keys
            .get(&policy_id)
            .ok_or_else(|| VaultError::SharedKeyUnresolved { policy_id: policy_id.to_string() })?;
        // An empty fragment is stored as-is; it just never counts toward
        // finalizability.
        let payload: ApprovalPayload = decrypt_obj(shared.as_ref(), &event.author, &event.content)?;
        let approval = ApprovedProposal {
            id: event.id,
            proposal_id,
            policy_id,
            author: event.author,
            created_at: event.created_at,
            expires_at,
            payload,
        };
        Ok((event, approval))
    }
}

#[async_trait]
impl KindHandler for ApprovalHandler {
    fn kind(&self) -> EventKind {
        EventKind::Approval
    }

    async fn handle(&self, events: Vec<RawEvent>) -> Result<Vec<DomainObject>> {
        let (cached_ids, fresh) = split_cached(&self.ctx, events)?;
        let mut approvals: Vec<ApprovedProposal> = self.ctx.stores.approvals.read().get_many(cached_ids, IndexName::EventId)?;

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
            let mut approval_store = self.ctx.stores.approvals.write();
            for (raw, approval) in materialized {
                event_store.store(raw);
                approval_store.store(approval.clone());
                approvals.push(approval);
            }
        }
        Ok(approvals.into_iter().map(DomainObject::Approval).collect())
    }

    /// An approval may be withdrawn only by its own author.
    async fn delete(&self, ids: Vec<EventId>) -> Result<()> {
        let me = self.ctx.public_key();
        for id in ids {
            let approval = self
                .ctx
                .stores
                .approvals
                .read()
                .get(id, IndexName::EventId)?
                .ok_or_else(|| VaultError::not_found("approval", id))?;
            if approval.author != me {
                return Err(VaultError::unauthorized("withdraw approval", me));
            }
            let recipients = self
                .ctx
                .stores
                .policies
                .read()
                .get(approval.policy_id, IndexName::EventId)?
                .map(|policy| policy.participants().to_vec())
                .unwrap_or_default();

            let tombstone = publish_tombstone(&self.ctx, self.ctx.authenticator.as_ref(), &[id], &recipients).await?;
            {
                let mut approval_store = self.ctx.stores.approvals.write();
                let mut event_store = self.ctx.stores.events.write();
                approval_store.remove_by_key(id);
                event_store.remove_by_key(id);
                event_store.store(tombstone);
            }
            debug!("approval withdrawn approval_id={} proposal_id={}", id, approval.proposal_id);
        }
        Ok(())
    }
}
