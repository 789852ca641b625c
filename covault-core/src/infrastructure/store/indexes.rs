//! `Indexed` wiring for the raw-event cache and every per-kind store.

use crate::domain::{ApprovedProposal, CompletedProposal, Label, Policy, Proposal, RawEvent, SignerGrant};
use crate::infrastructure::store::{IndexName, IndexValue, Indexed};

/// Index set of the kind-agnostic all-events cache.
pub const RAW_EVENT_INDEXES: &[IndexName] = &[IndexName::EventId, IndexName::Kind, IndexName::Author];

pub const POLICY_INDEXES: &[IndexName] = &[IndexName::EventId, IndexName::Author];

pub const PROPOSAL_INDEXES: &[IndexName] = &[IndexName::EventId, IndexName::Policy, IndexName::Author];

pub const APPROVAL_INDEXES: &[IndexName] = &[IndexName::EventId, IndexName::Proposal, IndexName::Policy, IndexName::Author];

pub const COMPLETED_INDEXES: &[IndexName] = &[IndexName::EventId, IndexName::Proposal, IndexName::Policy];

pub const SIGNER_INDEXES: &[IndexName] = &[IndexName::EventId, IndexName::Author, IndexName::Recipient];

pub const LABEL_INDEXES: &[IndexName] = &[IndexName::EventId, IndexName::Policy, IndexName::Identifier];

impl Indexed for RawEvent {
    fn primary_key(&self) -> IndexValue {
        self.id.into()
    }

    fn index_values(&self, index: IndexName) -> Vec<IndexValue> {
        match index {
            IndexName::EventId => vec![self.id.into()],
            IndexName::Kind => vec![self.kind.into()],
            IndexName::Author => vec![self.author.into()],
            _ => Vec::new(),
        }
    }
}

impl Indexed for Policy {
    fn primary_key(&self) -> IndexValue {
        self.id.into()
    }

    fn index_values(&self, index: IndexName) -> Vec<IndexValue> {
        match index {
            IndexName::EventId => vec![self.id.into()],
            IndexName::Author => vec![self.author.into()],
            _ => Vec::new(),
        }
    }
}

impl Indexed for Proposal {
    fn primary_key(&self) -> IndexValue {
        self.id.into()
    }

    fn index_values(&self, index: IndexName) -> Vec<IndexValue> {
        match index {
            IndexName::EventId => vec![self.id.into()],
            IndexName::Policy => vec![self.policy_id.into()],
            IndexName::Author => vec![self.author.into()],
            _ => Vec::new(),
        }
    }
}

impl Indexed for ApprovedProposal {
    fn primary_key(&self) -> IndexValue {
        self.id.into()
    }

    fn index_values(&self, index: IndexName) -> Vec<IndexValue> {
        match index {
            IndexName::EventId => vec![self.id.into()],
            IndexName::Proposal => vec![self.proposal_id.into()],
            IndexName::Policy => vec![self.policy_id.into()],
            IndexName::Author => vec![self.author.into()],
            _ => Vec::new(),
        }
    }
}

impl Indexed for CompletedProposal {
    fn primary_key(&self) -> IndexValue {
        self.id.into()
    }

    fn index_values(&self, index: IndexName) -> Vec<IndexValue> {
        match index {
            IndexName::EventId => vec![self.id.into()],
            IndexName::Proposal => vec![self.proposal_id.into()],
            IndexName::Policy => vec![self.policy_id.into()],
            _ => Vec::new(),
        }
    }
}

impl Indexed for SignerGrant {
    fn primary_key(&self) -> IndexValue {
        self.id.into()
    }

    fn index_values(&self, index: IndexName) -> Vec<IndexValue> {
        match index {
            IndexName::EventId => vec![self.id.into()],
            IndexName::Author => vec![self.author.into()],
            IndexName::Recipient => self.recipient.map(IndexValue::from).into_iter().collect(),
            _ => Vec::new(),
        }
    }
}

impl Indexed for Label {
    fn primary_key(&self) -> IndexValue {
        self.id.into()
    }

    fn index_values(&self, index: IndexName) -> Vec<IndexValue> {
        match index {
            IndexName::EventId => vec![self.id.into()],
            IndexName::Policy => vec![self.policy_id.into()],
            // Identifiers are only stable within one policy.
            IndexName::Identifier => vec![IndexValue::composite(&[self.policy_id.as_ref(), self.identifier.as_bytes()])],
            _ => Vec::new(),
        }
    }
}
