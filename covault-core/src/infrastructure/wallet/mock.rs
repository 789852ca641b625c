//! Scriptable wallet backend for tests.

use crate::foundation::{Result, VaultError};
use crate::infrastructure::wallet::{FinalizedTx, OutPoint, WalletBackend};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

#[derive(Default)]
struct MockWalletState {
    /// Fragments that satisfy the finalizability predicate on their own.
    sufficient_fragments: HashSet<String>,
    /// UTXOs referenced by each known PSBT.
    utxos: HashMap<String, Vec<OutPoint>>,
    broadcasts: Vec<FinalizedTx>,
}

#[derive(Default)]
pub struct MockWallet {
    state: Mutex<MockWalletState>,
}

impl MockWallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_sufficient(&self, fragment: impl Into<String>) {
        self.state.lock().sufficient_fragments.insert(fragment.into());
    }

    pub fn set_utxos(&self, psbt: impl Into<String>, utxos: Vec<OutPoint>) {
        self.state.lock().utxos.insert(psbt.into(), utxos);
    }

    pub fn broadcasts(&self) -> Vec<FinalizedTx> {
        self.state.lock().broadcasts.clone()
    }
}

#[async_trait]
impl WalletBackend for MockWallet {
    fn to_descriptor(&self, template: &str) -> Result<String> {
        Ok(format!("wsh({template})"))
    }

    async fn create_wallet(&self, _descriptor: &str) -> Result<()> {
        Ok(())
    }

    async fn can_finalize_psbt(&self, psbts: &[String]) -> Result<bool> {
        let state = self.state.lock();
        Ok(psbts.iter().any(|psbt| state.sufficient_fragments.contains(psbt)))
    }

    async fn get_fee(&self, _psbt: &str) -> Result<u64> {
        Ok(1_000)
    }

    async fn get_utxos(&self, psbt: &str) -> Result<Vec<OutPoint>> {
        Ok(self.state.lock().utxos.get(psbt).cloned().unwrap_or_default())
    }

    async fn finalize(&self, psbts: &[String], broadcast: bool) -> Result<FinalizedTx> {
        if !self.can_finalize_psbt(psbts).await? {
            return Err(VaultError::WalletError("fragments are not jointly finalizable".to_string()));
        }
        let mut hasher = blake3::Hasher::new();
        for psbt in psbts {
            hasher.update(psbt.as_bytes());
        }
        let txid = hex::encode(hasher.finalize().as_bytes());
        let finalized = FinalizedTx { txid, tx_hex: "02000000".to_string() };
        if broadcast {
            self.state.lock().broadcasts.push(finalized.clone());
        }
        Ok(finalized)
    }
}
