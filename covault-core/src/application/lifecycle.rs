//! Proposal lifecycle operations: create, approve, derive status, finalize.
//!
//! Status is never stored; every read recomputes it from the currently
//! Active approvals through the wallet collaborator's finalizability
//! predicate. Publishes always precede local mutation so a failed publish
//! leaves local state unchanged.

use crate::application::context::SessionContext;
use crate::application::handlers::{publish_tombstone, require_participant};
use crate::domain::{
    signing_fragments, ApprovalPayload, ApprovedProposal, CompletedPayload, CompletedProposal, EventDraft, EventKind,
    Label, LabelPayload, Policy, PolicyPayload, Proposal, ProposalPayload, ProposalStatus, SignerGrant, SignerPayload,
    SignerSharing, Tag,
};
use crate::foundation::util::now_secs;
use crate::foundation::{EventId, PolicyId, PublicKey, Result, VaultError};
use crate::infrastructure::auth::{encrypt_obj, Authenticator, SharedKeyAuthenticator};
use crate::infrastructure::store::IndexName;
use crate::infrastructure::transport::publish_all;
use crate::infrastructure::wallet::OutPoint;
use log::{debug, info};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

async fn resolve_shared_key(ctx: &SessionContext, policy_id: PolicyId) -> Result<Arc<SharedKeyAuthenticator>> {
    let wanted: BTreeSet<PolicyId> = [policy_id].into_iter().collect();
    ctx.shared_keys
        .resolve(&wanted)
        .await?
        .remove(&policy_id)
        .ok_or_else(|| VaultError::SharedKeyUnresolved { policy_id: policy_id.to_string() })
}

/// Mints the group object: one shared capability, one founding event
/// authored by it, and one envelope per participant.
pub async fn create_policy(
    ctx: &SessionContext,
    name: impl Into<String>,
    description: impl Into<String>,
    descriptor_template: &str,
    participants: Vec<PublicKey>,
) -> Result<Policy> {
    if participants.is_empty() {
        return Err(VaultError::invariant("policy has no participants"));
    }
    let me = ctx.public_key();
    if !participants.contains(&me) {
        return Err(VaultError::invariant("policy creator must be a participant"));
    }

    let shared = SharedKeyAuthenticator::generate();
    let descriptor = ctx.wallet.to_descriptor(descriptor_template)?;
    let payload =
        PolicyPayload { name: name.into(), description: description.into(), descriptor: descriptor.clone(), participants };
    let content = encrypt_obj(&shared, &shared.public_key(), &payload)?;
    let policy_event = shared.sign(
        EventDraft::new(EventKind::Policy, content).tags(payload.participants.iter().copied().map(Tag::PubKey)),
    )?;
    let policy_id = PolicyId::from(policy_event.id);

    let secret_hex = shared.secret_hex();
    let mut to_publish = vec![policy_event.clone()];
    for participant in &payload.participants {
        let envelope_content = ctx.authenticator.encrypt(participant, secret_hex.as_bytes())?;
        let envelope = ctx.authenticator.sign(
            EventDraft::new(EventKind::SharedKey, envelope_content)
                .tag(Tag::Event(policy_event.id))
                .tag(Tag::PubKey(*participant)),
        )?;
        to_publish.push(envelope);
    }

    ctx.wallet.create_wallet(&descriptor).await?;
    publish_all(ctx.transport.as_ref(), to_publish.clone()).await?;

    let policy = Policy { id: policy_id, author: policy_event.author, created_at: policy_event.created_at, payload };
    ctx.shared_keys.insert(policy_id, Arc::new(shared));
    ctx.stores.events.write().store_many(to_publish);
    ctx.stores.policies.write().store(policy.clone());
    info!("policy created policy_id={} participant_count={}", policy_id, policy.participants().len());
    Ok(policy)
}

/// Publishes an encrypted spending intent against a policy; initial status
/// is Unsigned.
pub async fn create_proposal(ctx: &SessionContext, policy_id: PolicyId, payload: ProposalPayload) -> Result<Proposal> {
    let policy = require_participant(ctx, policy_id, "create proposal")?;
    let shared = resolve_shared_key(ctx, policy_id).await?;

    let content = encrypt_obj(shared.as_ref(), &shared.public_key(), &payload)?;
    let event = shared.sign(
        EventDraft::new(EventKind::Proposal, content)
            .tag(Tag::Event(EventId::from(policy_id)))
            .tags(policy.participants().iter().copied().map(Tag::PubKey)),
    )?;
    ctx.transport.publish(event.clone()).await?;

    let proposal = Proposal { id: event.id, policy_id, author: event.author, created_at: event.created_at, payload };
    ctx.stores.events.write().store(event);
    ctx.stores.proposals.write().store(proposal.clone());
    info!("proposal created proposal_id={} policy_id={}", proposal.id, policy_id);
    Ok(proposal)
}

/// Publishes this identity's approval with an absolute expiration at a
/// fixed offset from now.
pub async fn approve_proposal(ctx: &SessionContext, proposal_id: EventId, signed_psbt: String) -> Result<ApprovedProposal> {
    if signed_psbt.trim().is_empty() {
        return Err(VaultError::invariant("approval missing signed fragment"));
    }
    let proposal = ctx
        .stores
        .proposals
        .read()
        .get(proposal_id, IndexName::EventId)?
        .ok_or_else(|| VaultError::not_found("proposal", proposal_id))?;
    let policy = require_participant(ctx, proposal.policy_id, "approve proposal")?;
    let shared = resolve_shared_key(ctx, proposal.policy_id).await?;

    let payload = match proposal.payload {
        ProposalPayload::Spending { .. } => ApprovalPayload::Spending { psbt: signed_psbt },
        ProposalPayload::ProofOfReserve { .. } => ApprovalPayload::ProofOfReserve { psbt: signed_psbt },
    };
    let now = now_secs();
    let expires_at = now.saturating_add(ctx.approval_ttl_secs);
    let content = encrypt_obj(shared.as_ref(), &shared.public_key(), &payload)?;
    let event = ctx.authenticator.sign(
        EventDraft::new(EventKind::Approval, content)
            .tag(Tag::Event(proposal_id))
            .tag(Tag::Event(EventId::from(proposal.policy_id)))
            .tags(policy.participants().iter().copied().map(Tag::PubKey))
            .tag(Tag::Expiration(expires_at))
            .created_at(now),
    )?;
    ctx.transport.publish(event.clone()).await?;

    let approval = ApprovedProposal {
        id: event.id,
        proposal_id,
        policy_id: proposal.policy_id,
        author: event.author,
        created_at: event.created_at,
        expires_at,
        payload,
    };
    ctx.stores.events.write().store(event);
    ctx.stores.approvals.write().store(approval.clone());
    info!("proposal approved proposal_id={} approval_id={} expires_at={}", proposal_id, approval.id, expires_at);
    Ok(approval)
}

/// Recomputes Unsigned/Signed from the Active approvals at `now`.
pub async fn proposal_status(ctx: &SessionContext, proposal_id: EventId, now: u64) -> Result<ProposalStatus> {
    let proposal = ctx
        .stores
        .proposals
        .read()
        .get(proposal_id, IndexName::EventId)?
        .ok_or_else(|| VaultError::not_found("proposal", proposal_id))?;
    let approvals = ctx.stores.approvals.read().by_index(proposal_id, IndexName::Proposal)?;
    let fragments = signing_fragments(&approvals, now);
    if fragments.is_empty() {
        return Ok(ProposalStatus::Unsigned);
    }
    let mut psbts = vec![proposal.payload.psbt().to_string()];
    psbts.extend(fragments);
    if ctx.wallet.can_finalize_psbt(&psbts).await? {
        Ok(ProposalStatus::Signed)
    } else {
        Ok(ProposalStatus::Unsigned)
    }
}

/// Finalizes a Signed proposal: obtains the broadcastable transaction,
/// publishes the completion, then tombstones the original proposal and
/// every still-active sibling sharing at least one unspent output.
pub async fn finalize_proposal(ctx: &SessionContext, proposal_id: EventId, broadcast: bool) -> Result<CompletedProposal> {
    let proposal = ctx
        .stores
        .proposals
        .read()
        .get(proposal_id, IndexName::EventId)?
        .ok_or_else(|| VaultError::not_found("proposal", proposal_id))?;
    let policy = require_participant(ctx, proposal.policy_id, "finalize proposal")?;
    let shared = resolve_shared_key(ctx, proposal.policy_id).await?;

    let now = now_secs();
    let approvals = ctx.stores.approvals.read().by_index(proposal_id, IndexName::Proposal)?;
    let fragments = signing_fragments(&approvals, now);
    if fragments.is_empty() {
        return Err(VaultError::invariant("proposal has no active approvals"));
    }
    let mut psbts = vec![proposal.payload.psbt().to_string()];
    psbts.extend(fragments);
    if !ctx.wallet.can_finalize_psbt(&psbts).await? {
        return Err(VaultError::invariant("active approvals are not jointly finalizable"));
    }

    let finalized = ctx.wallet.finalize(&psbts, broadcast).await?;
    let payload = match &proposal.payload {
        ProposalPayload::Spending { description, .. } => {
            CompletedPayload::Spending { tx_id: finalized.txid.clone(), description: description.clone() }
        }
        ProposalPayload::ProofOfReserve { descriptor, message, psbt } => CompletedPayload::ProofOfReserve {
            descriptor: descriptor.clone(),
            message: message.clone(),
            psbt: psbt.clone(),
        },
    };
    let content = encrypt_obj(shared.as_ref(), &shared.public_key(), &payload)?;
    let completed_event = shared.sign(
        EventDraft::new(EventKind::CompletedProposal, content)
            .tag(Tag::Event(proposal_id))
            .tag(Tag::Event(EventId::from(proposal.policy_id)))
            .tags(policy.participants().iter().copied().map(Tag::PubKey)),
    )?;

    // Once this spend broadcasts, siblings sharing any of its inputs can
    // never validly finalize; retire them with the original.
    let conflicts = conflicting_siblings(ctx, &proposal).await?;
    let mut retired: Vec<EventId> = vec![proposal_id];
    retired.extend(conflicts.iter().copied());

    ctx.transport.publish(completed_event.clone()).await?;
    let tombstone = publish_tombstone(ctx, shared.as_ref(), &retired, policy.participants()).await?;

    let completed = CompletedProposal {
        id: completed_event.id,
        proposal_id,
        policy_id: proposal.policy_id,
        author: completed_event.author,
        created_at: completed_event.created_at,
        payload,
    };
    ctx.stores.events.write().store(completed_event);
    ctx.stores.completed.write().store(completed.clone());
    for id in &retired {
        ctx.stores.remove_proposal_locally(*id);
    }
    ctx.stores.events.write().store(tombstone);
    info!(
        "proposal finalized proposal_id={} completed_id={} tx_id={} retired_sibling_count={}",
        proposal_id,
        completed.id,
        finalized.txid,
        retired.len() - 1
    );
    Ok(completed)
}

/// Stores this identity's signer metadata, self-encrypted.
pub async fn save_signer(ctx: &SessionContext, payload: SignerPayload) -> Result<SignerGrant> {
    let me = ctx.public_key();
    let content = encrypt_obj(ctx.authenticator.as_ref(), &me, &payload)?;
    let event = ctx.authenticator.sign(EventDraft::new(EventKind::OwnedSigner, content))?;
    ctx.transport.publish(event.clone()).await?;

    let grant = SignerGrant {
        id: event.id,
        author: me,
        recipient: None,
        created_at: event.created_at,
        sharing: SignerSharing::Owned,
        payload,
    };
    ctx.stores.events.write().store(event);
    ctx.stores.signers.write().store(grant.clone());
    Ok(grant)
}

/// Grants signer metadata to one recipient; revocation is the standard
/// tombstone path.
pub async fn share_signer(ctx: &SessionContext, payload: SignerPayload, recipient: PublicKey) -> Result<SignerGrant> {
    let me = ctx.public_key();
    let content = encrypt_obj(ctx.authenticator.as_ref(), &recipient, &payload)?;
    let event =
        ctx.authenticator.sign(EventDraft::new(EventKind::SharedSigner, content).tag(Tag::PubKey(recipient)))?;
    ctx.transport.publish(event.clone()).await?;

    let grant = SignerGrant {
        id: event.id,
        author: me,
        recipient: Some(recipient),
        created_at: event.created_at,
        sharing: SignerSharing::Shared,
        payload,
    };
    ctx.stores.events.write().store(event);
    ctx.stores.signers.write().store(grant.clone());
    info!("signer grant shared grant_id={} recipient={}", grant.id, recipient);
    Ok(grant)
}

/// Writes a label on an address or UTXO of a policy, superseding any
/// stored label carrying the same identifier.
pub async fn save_label(
    ctx: &SessionContext,
    policy_id: PolicyId,
    identifier: impl Into<String>,
    payload: LabelPayload,
) -> Result<Label> {
    let identifier = identifier.into();
    let policy = require_participant(ctx, policy_id, "save label")?;
    let shared = resolve_shared_key(ctx, policy_id).await?;

    let content = encrypt_obj(shared.as_ref(), &shared.public_key(), &payload)?;
    let event = shared.sign(
        EventDraft::new(EventKind::Label, content)
            .tag(Tag::Event(EventId::from(policy_id)))
            .tag(Tag::Identifier(identifier.clone()))
            .tags(policy.participants().iter().copied().map(Tag::PubKey)),
    )?;
    ctx.transport.publish(event.clone()).await?;

    let label =
        Label { id: event.id, policy_id, identifier, author: event.author, created_at: event.created_at, payload };
    {
        use crate::infrastructure::store::IndexValue;
        let mut label_store = ctx.stores.labels.write();
        let mut event_store = ctx.stores.events.write();
        let logical = IndexValue::composite(&[label.policy_id.as_ref(), label.identifier.as_bytes()]);
        if let Some(existing) = label_store.get(logical, IndexName::Identifier)? {
            if existing.created_at < label.created_at {
                label_store.remove(&existing);
            }
        }
        event_store.store(event);
        label_store.store(label.clone());
    }
    Ok(label)
}

/// Still-active proposals of the same policy referencing at least one of
/// the given proposal's unspent outputs.
async fn conflicting_siblings(ctx: &SessionContext, proposal: &Proposal) -> Result<Vec<EventId>> {
    let own_utxos: HashSet<OutPoint> = ctx.wallet.get_utxos(proposal.payload.psbt()).await?.into_iter().collect();
    if own_utxos.is_empty() {
        return Ok(Vec::new());
    }
    let siblings = ctx.stores.proposals.read().by_index(proposal.policy_id, IndexName::Policy)?;
    let mut conflicts = Vec::new();
    for sibling in siblings {
        if sibling.id == proposal.id {
            continue;
        }
        let sibling_utxos = ctx.wallet.get_utxos(sibling.payload.psbt()).await?;
        if sibling_utxos.iter().any(|utxo| own_utxos.contains(utxo)) {
            debug!("conflicting sibling found proposal_id={} sibling_id={}", proposal.id, sibling.id);
            conflicts.push(sibling.id);
        }
    }
    Ok(conflicts)
}
