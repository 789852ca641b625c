//! Authenticator capabilities: who signs events and how content is sealed.
//!
//! Two implementations share one trait: `KeyPairAuthenticator` is a
//! participant's personal identity (Schnorr signatures, ECDH envelope
//! encryption per recipient), `SharedKeyAuthenticator` is the symmetric
//! capability bound to one group object and distributed via envelopes.

use crate::domain::{draft_event_id, EventDraft, RawEvent};
use crate::foundation::constants::AEAD_NONCE_SIZE;
use crate::foundation::util::{now_secs, parse_hex_32bytes};
use crate::foundation::{PublicKey, Result, VaultError};
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use secp256k1::ecdh::SharedSecret;
use secp256k1::{Keypair, Message, Parity, Secp256k1, SecretKey};
use serde::de::DeserializeOwned;
use serde::Serialize;
use zeroize::Zeroize;

const ENVELOPE_KEY_CONTEXT: &str = "covault:envelope:v1";
const SHARED_KEY_CONTEXT: &str = "covault:shared:v1";

/// Signing and sealing capability. Personal and group authenticators share
/// this shape; the engine only decides *which* authenticator handles
/// *which* object.
pub trait Authenticator: Send + Sync {
    fn public_key(&self) -> PublicKey;

    /// Stamps, addresses, and Schnorr-signs a draft into a `RawEvent`.
    fn sign(&self, draft: EventDraft) -> Result<RawEvent>;

    fn encrypt(&self, recipient: &PublicKey, plaintext: &[u8]) -> Result<String>;

    fn decrypt(&self, sender: &PublicKey, ciphertext: &str) -> Result<Vec<u8>>;
}

/// JSON-encodes then seals a payload object.
pub fn encrypt_obj<T: Serialize>(auth: &dyn Authenticator, recipient: &PublicKey, payload: &T) -> Result<String> {
    let plaintext = serde_json::to_vec(payload)?;
    auth.encrypt(recipient, &plaintext)
}

/// Unseals then JSON-decodes a payload object.
///
/// A payload that decrypts but matches no recognized shape is an invariant
/// violation, not a decryption failure.
pub fn decrypt_obj<T: DeserializeOwned>(auth: &dyn Authenticator, sender: &PublicKey, ciphertext: &str) -> Result<T> {
    let plaintext = auth.decrypt(sender, ciphertext)?;
    serde_json::from_slice(&plaintext).map_err(|err| VaultError::invariant(format!("unrecognized payload: {err}")))
}

fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<String> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let mut nonce = [0u8; AEAD_NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| VaultError::CryptoError { operation: "aead encrypt", details: "encryption failed".to_string() })?;
    let mut out = Vec::with_capacity(AEAD_NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(hex::encode(out))
}

fn unseal(key: &[u8; 32], ciphertext: &str) -> Result<Vec<u8>> {
    let raw = hex::decode(ciphertext).map_err(|err| VaultError::decryption(format!("malformed ciphertext hex: {err}")))?;
    if raw.len() <= AEAD_NONCE_SIZE {
        return Err(VaultError::decryption("ciphertext shorter than nonce"));
    }
    let (nonce, body) = raw.split_at(AEAD_NONCE_SIZE);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    Ok(cipher.decrypt(Nonce::from_slice(nonce), body)?)
}

fn sign_draft(secp: &Secp256k1<secp256k1::All>, keypair: &Keypair, draft: EventDraft) -> Result<RawEvent> {
    let author = PublicKey::from(keypair.x_only_public_key().0);
    let created_at = draft.created_at.unwrap_or_else(now_secs);
    let id = draft_event_id(&author, created_at, &draft);
    let signature = secp.sign_schnorr_no_aux_rand(&Message::from_digest(*id.as_hash()), keypair);
    Ok(RawEvent {
        id,
        author,
        created_at,
        kind: draft.kind,
        tags: draft.tags,
        content: draft.content,
        signature: signature.as_ref().to_vec(),
    })
}

/// Identities are published x-only; pin the secret to the even-parity
/// point so the ECDH conversation key is the same from both ends.
fn normalize_parity(secp: &Secp256k1<secp256k1::All>, keypair: Keypair) -> Keypair {
    match keypair.x_only_public_key().1 {
        Parity::Even => keypair,
        Parity::Odd => Keypair::from_secret_key(secp, &keypair.secret_key().negate()),
    }
}

/// A participant's personal identity.
pub struct KeyPairAuthenticator {
    secp: Secp256k1<secp256k1::All>,
    keypair: Keypair,
}

impl KeyPairAuthenticator {
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let keypair = Keypair::new(&secp, &mut OsRng);
        Self { keypair: normalize_parity(&secp, keypair), secp }
    }

    pub fn from_secret_key(secret: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let keypair = Keypair::from_secret_key(&secp, &secret);
        Self { keypair: normalize_parity(&secp, keypair), secp }
    }

    pub fn from_secret_hex(secret_hex: &str) -> Result<Self> {
        let mut bytes = parse_hex_32bytes(secret_hex)?;
        let secret = SecretKey::from_slice(&bytes)?;
        bytes.zeroize();
        Ok(Self::from_secret_key(secret))
    }

    /// ECDH conversation key with a counterparty; symmetric in both
    /// directions, so the same derivation serves encrypt and decrypt.
    fn conversation_key(&self, counterparty: &PublicKey) -> Result<[u8; 32]> {
        let full = secp256k1::PublicKey::from_x_only_public_key(counterparty.x_only()?, Parity::Even);
        let mut shared = SharedSecret::new(&full, &self.keypair.secret_key()).secret_bytes();
        let key = blake3::derive_key(ENVELOPE_KEY_CONTEXT, &shared);
        shared.zeroize();
        Ok(key)
    }
}

impl Authenticator for KeyPairAuthenticator {
    fn public_key(&self) -> PublicKey {
        PublicKey::from(self.keypair.x_only_public_key().0)
    }

    fn sign(&self, draft: EventDraft) -> Result<RawEvent> {
        sign_draft(&self.secp, &self.keypair, draft)
    }

    fn encrypt(&self, recipient: &PublicKey, plaintext: &[u8]) -> Result<String> {
        seal(&self.conversation_key(recipient)?, plaintext)
    }

    fn decrypt(&self, sender: &PublicKey, ciphertext: &str) -> Result<Vec<u8>> {
        unseal(&self.conversation_key(sender)?, ciphertext)
    }
}

/// The symmetric capability of one group object.
///
/// Minted once by the creator, distributed as one envelope per participant,
/// never rotated: revocation means deleting the group object and its
/// dependents.
pub struct SharedKeyAuthenticator {
    secp: Secp256k1<secp256k1::All>,
    keypair: Keypair,
    cipher_key: [u8; 32],
}

impl SharedKeyAuthenticator {
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let keypair = Keypair::new(&secp, &mut OsRng);
        Self::from_keypair(secp, keypair)
    }

    pub fn from_secret_bytes(secret: &[u8; 32]) -> Result<Self> {
        let secp = Secp256k1::new();
        let keypair = Keypair::from_secret_key(&secp, &SecretKey::from_slice(secret)?);
        Ok(Self::from_keypair(secp, keypair))
    }

    pub fn from_secret_hex(secret_hex: &str) -> Result<Self> {
        let mut bytes = parse_hex_32bytes(secret_hex)?;
        let authenticator = Self::from_secret_bytes(&bytes)?;
        bytes.zeroize();
        Ok(authenticator)
    }

    fn from_keypair(secp: Secp256k1<secp256k1::All>, keypair: Keypair) -> Self {
        let cipher_key = blake3::derive_key(SHARED_KEY_CONTEXT, &keypair.secret_bytes());
        Self { secp, keypair, cipher_key }
    }

    /// Raw secret for envelope distribution to a participant.
    pub fn secret_hex(&self) -> String {
        hex::encode(self.keypair.secret_bytes())
    }
}

impl Authenticator for SharedKeyAuthenticator {
    fn public_key(&self) -> PublicKey {
        PublicKey::from(self.keypair.x_only_public_key().0)
    }

    fn sign(&self, draft: EventDraft) -> Result<RawEvent> {
        sign_draft(&self.secp, &self.keypair, draft)
    }

    fn encrypt(&self, _recipient: &PublicKey, plaintext: &[u8]) -> Result<String> {
        seal(&self.cipher_key, plaintext)
    }

    fn decrypt(&self, _sender: &PublicKey, ciphertext: &str) -> Result<Vec<u8>> {
        unseal(&self.cipher_key, ciphertext)
    }
}
