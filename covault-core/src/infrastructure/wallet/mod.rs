//! Wallet collaborator boundary.
//!
//! PSBT construction, signing, fee and coin selection, and descriptor
//! compilation all live behind this trait; the engine treats PSBTs as
//! opaque strings and only asks the questions the proposal lifecycle
//! needs: is this set of fragments jointly finalizable, and finalize it.

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

use crate::foundation::Result;
use async_trait::async_trait;

/// An unspent output referenced by a PSBT, used for conflict detection
/// between sibling proposals. The txid stays an opaque hex string.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct OutPoint {
    pub txid: String,
    pub vout: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinalizedTx {
    pub txid: String,
    pub tx_hex: String,
}

#[async_trait]
pub trait WalletBackend: Send + Sync {
    /// Compiles a policy template into a concrete wallet descriptor.
    fn to_descriptor(&self, template: &str) -> Result<String>;

    async fn create_wallet(&self, descriptor: &str) -> Result<()>;

    /// The finalizability predicate: true iff the given partially-signed
    /// fragments are jointly sufficient for a broadcastable transaction.
    async fn can_finalize_psbt(&self, psbts: &[String]) -> Result<bool>;

    async fn get_fee(&self, psbt: &str) -> Result<u64>;

    async fn get_utxos(&self, psbt: &str) -> Result<Vec<OutPoint>>;

    async fn finalize(&self, psbts: &[String], broadcast: bool) -> Result<FinalizedTx>;
}
