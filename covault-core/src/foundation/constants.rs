//! System-wide constants for the covault coordination protocol.

/// Seconds per day.
pub const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Default lifetime of a co-signer approval (7 days).
///
/// An approval carries an absolute expiration computed as a fixed offset
/// from its creation time; an expired approval never counts toward
/// finalizability.
pub const APPROVAL_TTL_SECS: u64 = 7 * SECONDS_PER_DAY;

/// Wire discriminant for shared-key distribution events.
pub const KIND_SHARED_KEY: u16 = 9288;

/// Wire discriminant for policy (group object) events.
pub const KIND_POLICY: u16 = 9289;

/// Wire discriminant for spending proposal events.
pub const KIND_PROPOSAL: u16 = 9290;

/// Wire discriminant for proposal approval events.
pub const KIND_APPROVAL: u16 = 9291;

/// Wire discriminant for completed (finalized) proposal events.
pub const KIND_COMPLETED_PROPOSAL: u16 = 9292;

/// Wire discriminant for self-owned signer grant events.
pub const KIND_OWNED_SIGNER: u16 = 9294;

/// Wire discriminant for signer grants shared with another participant.
pub const KIND_SHARED_SIGNER: u16 = 9295;

/// Wire discriminant for label events.
pub const KIND_LABEL: u16 = 32121;

/// Wire discriminant for cooperative deletion (tombstone) events.
pub const KIND_DELETION: u16 = 5;

/// Schnorr signature size in bytes (64 bytes).
pub const SCHNORR_SIGNATURE_SIZE: usize = 64;

/// Schnorr public key size in bytes (32 bytes, x-only).
pub const SCHNORR_PUBKEY_SIZE: usize = 32;

/// Blake3 hash size in bytes (32 bytes).
pub const HASH_SIZE: usize = 32;

/// ChaCha20-Poly1305 nonce size in bytes (12 bytes).
pub const AEAD_NONCE_SIZE: usize = 12;

/// Environment variable overriding the wall clock in tests.
pub const TEST_NOW_SECS_ENV_VAR: &str = "COVAULT_TEST_NOW_SECS";
