use crate::foundation::constants::{
    KIND_APPROVAL, KIND_COMPLETED_PROPOSAL, KIND_DELETION, KIND_LABEL, KIND_OWNED_SIGNER, KIND_POLICY, KIND_PROPOSAL,
    KIND_SHARED_KEY, KIND_SHARED_SIGNER,
};
use crate::foundation::{EventId, PublicKey, VaultError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Closed set of event kinds this engine materializes.
///
/// Discriminants are wire-stable; adding a kind is append-only.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum EventKind {
    SharedKey,
    Policy,
    Proposal,
    Approval,
    CompletedProposal,
    OwnedSigner,
    SharedSigner,
    Label,
    Deletion,
}

impl EventKind {
    pub const ALL: [EventKind; 9] = [
        EventKind::SharedKey,
        EventKind::Policy,
        EventKind::Proposal,
        EventKind::Approval,
        EventKind::CompletedProposal,
        EventKind::OwnedSigner,
        EventKind::SharedSigner,
        EventKind::Label,
        EventKind::Deletion,
    ];

    pub const fn as_u16(&self) -> u16 {
        match self {
            EventKind::SharedKey => KIND_SHARED_KEY,
            EventKind::Policy => KIND_POLICY,
            EventKind::Proposal => KIND_PROPOSAL,
            EventKind::Approval => KIND_APPROVAL,
            EventKind::CompletedProposal => KIND_COMPLETED_PROPOSAL,
            EventKind::OwnedSigner => KIND_OWNED_SIGNER,
            EventKind::SharedSigner => KIND_SHARED_SIGNER,
            EventKind::Label => KIND_LABEL,
            EventKind::Deletion => KIND_DELETION,
        }
    }
}

impl TryFrom<u16> for EventKind {
    type Error = VaultError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            KIND_SHARED_KEY => Ok(EventKind::SharedKey),
            KIND_POLICY => Ok(EventKind::Policy),
            KIND_PROPOSAL => Ok(EventKind::Proposal),
            KIND_APPROVAL => Ok(EventKind::Approval),
            KIND_COMPLETED_PROPOSAL => Ok(EventKind::CompletedProposal),
            KIND_OWNED_SIGNER => Ok(EventKind::OwnedSigner),
            KIND_SHARED_SIGNER => Ok(EventKind::SharedSigner),
            KIND_LABEL => Ok(EventKind::Label),
            KIND_DELETION => Ok(EventKind::Deletion),
            other => Err(VaultError::Message(format!("unknown event kind {other}"))),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

impl Serialize for EventKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u16(self.as_u16())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u16::deserialize(deserializer)?;
        EventKind::try_from(value).map_err(serde::de::Error::custom)
    }
}

/// Tag roles carried by events.
///
/// `Event` links a child to its parent or group object, `PubKey` addresses a
/// recipient, `Identifier` is the stable logical id of replace-by-identifier
/// kinds, `Expiration` is an absolute unix-seconds deadline.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    Event(EventId),
    PubKey(PublicKey),
    Identifier(String),
    Expiration(u64),
}

/// Immutable, content-addressed unit of the relay log.
///
/// Never mutated once authored; a logical update is a new event carrying the
/// same `Identifier` tag.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct RawEvent {
    pub id: EventId,
    pub author: PublicKey,
    pub created_at: u64,
    pub kind: EventKind,
    pub tags: Vec<Tag>,
    pub content: String,
    /// 64-byte Schnorr signature by `author` over `id`.
    pub signature: Vec<u8>,
}

impl RawEvent {
    pub fn event_refs(&self) -> Vec<EventId> {
        self.tags
            .iter()
            .filter_map(|tag| match tag {
                Tag::Event(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// First event reference; by convention the direct parent (the
    /// proposal for approvals and completions, the policy otherwise).
    pub fn first_event_ref(&self) -> Option<EventId> {
        self.tags.iter().find_map(|tag| match tag {
            Tag::Event(id) => Some(*id),
            _ => None,
        })
    }

    /// Last event reference; by convention the group object.
    pub fn last_event_ref(&self) -> Option<EventId> {
        self.tags.iter().rev().find_map(|tag| match tag {
            Tag::Event(id) => Some(*id),
            _ => None,
        })
    }

    pub fn recipients(&self) -> Vec<PublicKey> {
        self.tags
            .iter()
            .filter_map(|tag| match tag {
                Tag::PubKey(pk) => Some(*pk),
                _ => None,
            })
            .collect()
    }

    pub fn identifier(&self) -> Option<&str> {
        self.tags.iter().find_map(|tag| match tag {
            Tag::Identifier(value) => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn expiration(&self) -> Option<u64> {
        self.tags.iter().find_map(|tag| match tag {
            Tag::Expiration(at) => Some(*at),
            _ => None,
        })
    }

    pub fn is_addressed_to(&self, pubkey: &PublicKey) -> bool {
        self.tags.iter().any(|tag| matches!(tag, Tag::PubKey(pk) if pk == pubkey))
    }
}

/// Unsigned event material; an authenticator turns a draft into a `RawEvent`.
#[derive(Clone, Debug)]
pub struct EventDraft {
    pub kind: EventKind,
    pub tags: Vec<Tag>,
    pub content: String,
    /// Creation timestamp override; `now_secs()` when absent.
    pub created_at: Option<u64>,
}

impl EventDraft {
    pub fn new(kind: EventKind, content: impl Into<String>) -> Self {
        Self { kind, tags: Vec::new(), content: content.into(), created_at: None }
    }

    pub fn tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }

    pub fn tags(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.tags.extend(tags);
        self
    }

    pub fn created_at(mut self, at: u64) -> Self {
        self.created_at = Some(at);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_wire_discriminant() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::try_from(kind.as_u16()).expect("kind"), kind);
        }
        assert!(EventKind::try_from(1).is_err());
    }

    #[test]
    fn tag_accessors_pick_the_right_roles() {
        let policy = EventId::new([1u8; 32]);
        let proposal = EventId::new([2u8; 32]);
        let alice = PublicKey::new([3u8; 32]);
        let event = RawEvent {
            id: EventId::new([9u8; 32]),
            author: alice,
            created_at: 100,
            kind: EventKind::Approval,
            tags: vec![
                Tag::Event(proposal),
                Tag::Event(policy),
                Tag::PubKey(alice),
                Tag::Expiration(7_000),
                Tag::Identifier("addr-label".to_string()),
            ],
            content: String::new(),
            signature: vec![],
        };

        assert_eq!(event.first_event_ref(), Some(proposal));
        assert_eq!(event.event_refs(), vec![proposal, policy]);
        assert_eq!(event.recipients(), vec![alice]);
        assert_eq!(event.identifier(), Some("addr-label"));
        assert_eq!(event.expiration(), Some(7_000));
        assert!(event.is_addressed_to(&alice));
    }
}
