use crate::domain::event::types::{EventDraft, EventKind, Tag};
use crate::foundation::{EventId, PublicKey};

const EVENT_ID_DOMAIN_V1: &[u8] = b"covault:event:v1:";

/// Computes the content address of an event.
///
/// The encoding is canonical and append-only: author, creation time, kind,
/// tags (count-prefixed), content (length-prefixed). Any change to these
/// fields yields a different id.
pub fn compute_event_id(author: &PublicKey, created_at: u64, kind: EventKind, tags: &[Tag], content: &str) -> EventId {
    let mut buf = Vec::with_capacity(128 + content.len());
    buf.extend_from_slice(EVENT_ID_DOMAIN_V1);
    buf.extend_from_slice(author.as_ref());
    buf.extend_from_slice(&created_at.to_le_bytes());
    buf.extend_from_slice(&kind.as_u16().to_le_bytes());
    buf.extend_from_slice(&(tags.len() as u32).to_le_bytes());
    for tag in tags {
        encode_tag_v1(tag, &mut buf);
    }
    buf.extend_from_slice(&(content.len() as u32).to_le_bytes());
    buf.extend_from_slice(content.as_bytes());
    EventId::new(*blake3::hash(&buf).as_bytes())
}

pub fn draft_event_id(author: &PublicKey, created_at: u64, draft: &EventDraft) -> EventId {
    compute_event_id(author, created_at, draft.kind, &draft.tags, &draft.content)
}

fn encode_tag_v1(tag: &Tag, out: &mut Vec<u8>) {
    match tag {
        Tag::Event(id) => {
            out.push(1);
            out.extend_from_slice(id.as_ref());
        }
        Tag::PubKey(pk) => {
            out.push(2);
            out.extend_from_slice(pk.as_ref());
        }
        Tag::Identifier(value) => {
            out.push(3);
            out.extend_from_slice(&(value.len() as u32).to_le_bytes());
            out.extend_from_slice(value.as_bytes());
        }
        Tag::Expiration(at) => {
            out.push(4);
            out.extend_from_slice(&at.to_le_bytes());
        }
    }
}
