//! Shared per-identity state: every per-kind store plus the collaborator
//! handles the handlers and lifecycle operations work against.

use crate::domain::{ApprovedProposal, CompletedProposal, Label, Policy, Proposal, RawEvent};
use crate::foundation::constants::APPROVAL_TTL_SECS;
use crate::foundation::{EventId, PolicyId, PublicKey};
use crate::infrastructure::auth::Authenticator;
use crate::infrastructure::keys::SharedKeyRegistry;
use crate::infrastructure::store::{
    IndexName, ObjectStore, APPROVAL_INDEXES, COMPLETED_INDEXES, LABEL_INDEXES, POLICY_INDEXES, PROPOSAL_INDEXES,
    RAW_EVENT_INDEXES, SIGNER_INDEXES,
};
use crate::infrastructure::transport::Transport;
use crate::infrastructure::wallet::WalletBackend;
use log::debug;
use parking_lot::RwLock;
use std::sync::Arc;

/// Every in-process cache of one identity. Dropped wholesale on identity
/// switch: plaintext decrypted under one capability is meaningless, and a
/// confidentiality risk, under another.
pub struct Stores {
    /// Kind-agnostic raw-event cache; the dedup primitive and the
    /// tombstone authorization source.
    pub events: RwLock<ObjectStore<RawEvent>>,
    pub policies: RwLock<ObjectStore<Policy>>,
    pub proposals: RwLock<ObjectStore<Proposal>>,
    pub approvals: RwLock<ObjectStore<ApprovedProposal>>,
    pub completed: RwLock<ObjectStore<CompletedProposal>>,
    pub signers: RwLock<ObjectStore<crate::domain::SignerGrant>>,
    pub labels: RwLock<ObjectStore<Label>>,
}

impl Stores {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(ObjectStore::new(RAW_EVENT_INDEXES)),
            policies: RwLock::new(ObjectStore::new(POLICY_INDEXES)),
            proposals: RwLock::new(ObjectStore::new(PROPOSAL_INDEXES)),
            approvals: RwLock::new(ObjectStore::new(APPROVAL_INDEXES)),
            completed: RwLock::new(ObjectStore::new(COMPLETED_INDEXES)),
            signers: RwLock::new(ObjectStore::new(SIGNER_INDEXES)),
            labels: RwLock::new(ObjectStore::new(LABEL_INDEXES)),
        }
    }

    /// Drops a proposal and its now-dangling approvals from the local
    /// caches. Approvals by other participants are never tombstoned on
    /// their behalf; they just stop being meaningful here.
    pub fn remove_proposal_locally(&self, proposal_id: EventId) {
        let removed_approvals: Vec<ApprovedProposal> =
            self.approvals.read().by_index(proposal_id, IndexName::Proposal).unwrap_or_default();
        {
            let mut approvals = self.approvals.write();
            let mut events = self.events.write();
            for approval in &removed_approvals {
                approvals.remove(approval);
                events.remove_by_key(approval.id);
            }
        }
        self.proposals.write().remove_by_key(proposal_id);
        self.events.write().remove_by_key(proposal_id);
        debug!("proposal removed locally proposal_id={} cascaded_approvals={}", proposal_id, removed_approvals.len());
    }

    /// Drops a policy and every dependent object of it.
    pub fn remove_policy_locally(&self, policy_id: PolicyId) {
        let proposals: Vec<Proposal> = self.proposals.read().by_index(policy_id, IndexName::Policy).unwrap_or_default();
        for proposal in proposals {
            self.remove_proposal_locally(proposal.id);
        }
        let completed: Vec<CompletedProposal> = self.completed.read().by_index(policy_id, IndexName::Policy).unwrap_or_default();
        {
            let mut completed_store = self.completed.write();
            let mut events = self.events.write();
            for item in completed {
                completed_store.remove(&item);
                events.remove_by_key(item.id);
            }
        }
        let labels: Vec<Label> = self.labels.read().by_index(policy_id, IndexName::Policy).unwrap_or_default();
        {
            let mut label_store = self.labels.write();
            let mut events = self.events.write();
            for label in labels {
                label_store.remove(&label);
                events.remove_by_key(label.id);
            }
        }
        self.policies.write().remove_by_key(policy_id);
        self.events.write().remove_by_key(EventId::from(policy_id));
    }
}

impl Default for Stores {
    fn default() -> Self {
        Self::new()
    }
}

/// Arc'd collaborator bundle threaded through handlers and lifecycle
/// operations, the way a request context travels through a pipeline.
#[derive(Clone)]
pub struct SessionContext {
    pub authenticator: Arc<dyn Authenticator>,
    pub transport: Arc<dyn Transport>,
    pub wallet: Arc<dyn WalletBackend>,
    pub shared_keys: Arc<SharedKeyRegistry>,
    pub stores: Arc<Stores>,
    /// Offset added to an approval's creation time to produce its absolute
    /// expiration.
    pub approval_ttl_secs: u64,
}

impl SessionContext {
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        transport: Arc<dyn Transport>,
        wallet: Arc<dyn WalletBackend>,
    ) -> Self {
        let shared_keys = Arc::new(SharedKeyRegistry::new(authenticator.clone(), transport.clone()));
        Self {
            authenticator,
            transport,
            wallet,
            shared_keys,
            stores: Arc::new(Stores::new()),
            approval_ttl_secs: APPROVAL_TTL_SECS,
        }
    }

    pub fn with_approval_ttl(mut self, ttl_secs: u64) -> Self {
        self.approval_ttl_secs = ttl_secs;
        self
    }

    pub fn public_key(&self) -> PublicKey {
        self.authenticator.public_key()
    }
}
