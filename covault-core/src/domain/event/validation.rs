use crate::domain::event::hashes::compute_event_id;
use crate::domain::event::types::RawEvent;
use crate::foundation::constants::SCHNORR_SIGNATURE_SIZE;
use crate::foundation::{Result, VaultError};
use secp256k1::schnorr::Signature;
use secp256k1::{Message, Secp256k1};

/// Verifies an event's content address and author signature.
///
/// Handlers call this on every fresh event before decryption; a forged or
/// corrupted event is dropped from its batch like any other per-event
/// failure.
pub fn verify_event(event: &RawEvent) -> Result<()> {
    let computed = compute_event_id(&event.author, event.created_at, event.kind, &event.tags, &event.content);
    if computed != event.id {
        return Err(VaultError::EventIdMismatch { claimed: event.id.to_string(), computed: computed.to_string() });
    }

    if event.signature.len() != SCHNORR_SIGNATURE_SIZE {
        return Err(VaultError::EventSignatureInvalid { id: event.id.to_string() });
    }
    let signature =
        Signature::from_slice(&event.signature).map_err(|_| VaultError::EventSignatureInvalid { id: event.id.to_string() })?;
    let message = Message::from_digest(*event.id.as_hash());
    let secp = Secp256k1::verification_only();
    secp.verify_schnorr(&signature, &message, &event.author.x_only()?)
        .map_err(|_| VaultError::EventSignatureInvalid { id: event.id.to_string() })
}
