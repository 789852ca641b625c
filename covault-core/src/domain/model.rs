use crate::foundation::{EventId, PolicyId, PublicKey};
use serde::{Deserialize, Serialize};

/// Decrypted payload of a policy founding event.
///
/// This struct is what actually travels (encrypted) in the event content and
/// must remain stable; the participant set is authoritative here, not in the
/// event's recipient tags.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct PolicyPayload {
    pub name: String,
    pub description: String,
    /// Wallet descriptor template; compilation is the wallet collaborator's
    /// concern.
    pub descriptor: String,
    pub participants: Vec<PublicKey>,
}

/// Materialized policy (group object).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Policy {
    pub id: PolicyId,
    /// The policy's shared key pair; all group-authored events carry it.
    pub author: PublicKey,
    pub created_at: u64,
    pub payload: PolicyPayload,
}

impl Policy {
    pub fn participants(&self) -> &[PublicKey] {
        &self.payload.participants
    }

    pub fn is_participant(&self, pubkey: &PublicKey) -> bool {
        self.payload.participants.contains(pubkey)
    }
}

/// Decrypted payload of a spending proposal.
///
/// Internally tagged: a payload matching no recognized sub-type is rejected
/// as an invariant violation before any store mutation.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProposalPayload {
    Spending { descriptor: String, to_address: String, amount: u64, description: String, psbt: String },
    ProofOfReserve { descriptor: String, message: String, psbt: String },
}

impl ProposalPayload {
    pub fn psbt(&self) -> &str {
        match self {
            ProposalPayload::Spending { psbt, .. } => psbt,
            ProposalPayload::ProofOfReserve { psbt, .. } => psbt,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            ProposalPayload::Spending { description, .. } => description,
            ProposalPayload::ProofOfReserve { message, .. } => message,
        }
    }
}

/// Materialized active proposal.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Proposal {
    pub id: EventId,
    pub policy_id: PolicyId,
    pub author: PublicKey,
    pub created_at: u64,
    pub payload: ProposalPayload,
}

/// Derived signing state of an active proposal; recomputed on every read,
/// never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProposalStatus {
    Unsigned,
    Signed,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApprovalPayload {
    Spending { psbt: String },
    ProofOfReserve { psbt: String },
}

impl ApprovalPayload {
    pub fn psbt(&self) -> &str {
        match self {
            ApprovalPayload::Spending { psbt } => psbt,
            ApprovalPayload::ProofOfReserve { psbt } => psbt,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApprovalStatus {
    Active,
    Expired,
}

/// Materialized co-signer approval.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ApprovedProposal {
    pub id: EventId,
    pub proposal_id: EventId,
    pub policy_id: PolicyId,
    /// The approving participant (personal key, not the shared key).
    pub author: PublicKey,
    pub created_at: u64,
    /// Absolute unix-seconds deadline from the event's expiration tag.
    pub expires_at: u64,
    pub payload: ApprovalPayload,
}

impl ApprovedProposal {
    pub fn status(&self, now: u64) -> ApprovalStatus {
        if now < self.expires_at {
            ApprovalStatus::Active
        } else {
            ApprovalStatus::Expired
        }
    }

    pub fn is_active(&self, now: u64) -> bool {
        self.status(now) == ApprovalStatus::Active
    }
}

/// Collects the signed fragments that may count toward finalizability:
/// Active at `now` and carrying a non-empty fragment.
pub fn signing_fragments(approvals: &[ApprovedProposal], now: u64) -> Vec<String> {
    approvals
        .iter()
        .filter(|approval| approval.is_active(now))
        .map(|approval| approval.payload.psbt())
        .filter(|psbt| !psbt.trim().is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompletedPayload {
    Spending { tx_id: String, description: String },
    ProofOfReserve { descriptor: String, message: String, psbt: String },
}

/// Materialized finalized proposal; terminal stage of a spending intent.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct CompletedProposal {
    pub id: EventId,
    /// The retired active proposal this completion refers to.
    pub proposal_id: EventId,
    pub policy_id: PolicyId,
    pub author: PublicKey,
    pub created_at: u64,
    pub payload: CompletedPayload,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SignerSharing {
    Owned,
    Shared,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct SignerPayload {
    pub fingerprint: String,
    pub descriptor: String,
    pub name: String,
}

/// Materialized signer grant: self-owned metadata, or a revocable grant of
/// that metadata to one recipient.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct SignerGrant {
    pub id: EventId,
    pub author: PublicKey,
    /// Present for shared grants only.
    pub recipient: Option<PublicKey>,
    pub created_at: u64,
    pub sharing: SignerSharing,
    pub payload: SignerPayload,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LabelKind {
    Address,
    Utxo,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct LabelPayload {
    pub kind: LabelKind,
    pub text: String,
}

/// Materialized label: a shared annotation on an address or UTXO of a
/// policy. Replace-by-identifier: a newer event with the same identifier
/// supersedes the stored one.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Label {
    pub id: EventId,
    pub policy_id: PolicyId,
    pub identifier: String,
    pub author: PublicKey,
    pub created_at: u64,
    pub payload: LabelPayload,
}

/// Closed union of every materialization the handler pipeline produces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DomainObject {
    Policy(Policy),
    Proposal(Proposal),
    Approval(ApprovedProposal),
    Completed(CompletedProposal),
    Signer(SignerGrant),
    Label(Label),
    /// A resolved shared-key distribution; the secret itself stays in the
    /// registry cache, only the policy linkage is surfaced.
    SharedKey { policy_id: PolicyId },
}
