//! Shared test harness: an in-memory relay set, a scriptable wallet, and
//! identity helpers.
#![allow(dead_code)]

use covault_core::application::Session;
use covault_core::domain::{EventDraft, ProposalPayload, RawEvent};
use covault_core::foundation::{PublicKey, Result};
use covault_core::infrastructure::auth::{Authenticator, KeyPairAuthenticator};
use covault_core::infrastructure::transport::mock::{MockRelayHub, MockTransport};
use covault_core::infrastructure::wallet::mock::MockWallet;
use covault_core::infrastructure::wallet::OutPoint;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Wraps an authenticator and counts decrypt calls, so tests can assert
/// that cached objects are never decrypted twice.
pub struct CountingAuthenticator {
    inner: KeyPairAuthenticator,
    decrypts: AtomicUsize,
}

impl CountingAuthenticator {
    pub fn generate() -> Arc<Self> {
        Arc::new(Self { inner: KeyPairAuthenticator::generate(), decrypts: AtomicUsize::new(0) })
    }

    pub fn decrypt_count(&self) -> usize {
        self.decrypts.load(Ordering::SeqCst)
    }

    pub fn public_key(&self) -> PublicKey {
        self.inner.public_key()
    }
}

impl Authenticator for CountingAuthenticator {
    fn public_key(&self) -> PublicKey {
        self.inner.public_key()
    }

    fn sign(&self, draft: EventDraft) -> Result<RawEvent> {
        self.inner.sign(draft)
    }

    fn encrypt(&self, recipient: &PublicKey, plaintext: &[u8]) -> Result<String> {
        self.inner.encrypt(recipient, plaintext)
    }

    fn decrypt(&self, sender: &PublicKey, ciphertext: &str) -> Result<Vec<u8>> {
        self.decrypts.fetch_add(1, Ordering::SeqCst);
        self.inner.decrypt(sender, ciphertext)
    }
}

/// One shared relay view plus one shared wallet backend.
pub struct TestNet {
    pub hub: Arc<MockRelayHub>,
    pub wallet: Arc<MockWallet>,
}

impl TestNet {
    pub fn new() -> Self {
        Self { hub: MockRelayHub::new(), wallet: Arc::new(MockWallet::new()) }
    }

    pub fn session_for(&self, authenticator: Arc<dyn Authenticator>) -> Session {
        Session::new(authenticator, Arc::new(MockTransport::new(self.hub.clone())), self.wallet.clone())
    }
}

pub fn spending_payload(psbt: &str, description: &str) -> ProposalPayload {
    ProposalPayload::Spending {
        descriptor: "multi(2,A,B,C)".to_string(),
        to_address: "tb1qexample".to_string(),
        amount: 50_000,
        description: description.to_string(),
        psbt: psbt.to_string(),
    }
}

pub fn out_point(marker: u8, vout: u32) -> OutPoint {
    OutPoint { txid: hex::encode([marker; 32]), vout }
}
