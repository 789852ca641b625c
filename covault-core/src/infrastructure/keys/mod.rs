//! Shared-key resolution and caching.
//!
//! Each group object has one symmetric capability, distributed as N
//! envelope-encrypted events (one per participant, addressed by recipient
//! tag). The registry resolves capabilities in batches, one transport
//! round trip per batch of unresolved ids, and caches by policy id.

use crate::domain::{verify_event, EventKind};
use crate::foundation::{EventId, PolicyId, Result};
use crate::infrastructure::auth::{Authenticator, SharedKeyAuthenticator};
use crate::infrastructure::transport::{Filter, Transport};
use log::{debug, warn};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

pub struct SharedKeyRegistry {
    personal: Arc<dyn Authenticator>,
    transport: Arc<dyn Transport>,
    cache: RwLock<HashMap<PolicyId, Arc<SharedKeyAuthenticator>>>,
}

impl SharedKeyRegistry {
    pub fn new(personal: Arc<dyn Authenticator>, transport: Arc<dyn Transport>) -> Self {
        Self { personal, transport, cache: RwLock::new(HashMap::new()) }
    }

    /// Seeds the cache with a freshly minted capability (policy creation
    /// path, where no distribution event round trip is needed).
    pub fn insert(&self, policy_id: PolicyId, authenticator: Arc<SharedKeyAuthenticator>) {
        self.cache.write().insert(policy_id, authenticator);
    }

    pub fn cached(&self, policy_id: &PolicyId) -> Option<Arc<SharedKeyAuthenticator>> {
        self.cache.read().get(policy_id).cloned()
    }

    /// Forgets one capability (policy deletion path).
    pub fn remove(&self, policy_id: &PolicyId) {
        self.cache.write().remove(policy_id);
    }

    pub fn clear(&self) {
        self.cache.write().clear();
    }

    /// Resolves authenticators for a deduplicated batch of policy ids.
    ///
    /// Ids with no resolvable distribution event are absent from the
    /// result, never an error: callers skip objects they cannot decrypt
    /// rather than failing the whole batch.
    pub async fn resolve(&self, policy_ids: &BTreeSet<PolicyId>) -> Result<HashMap<PolicyId, Arc<SharedKeyAuthenticator>>> {
        let mut resolved = HashMap::new();
        let mut unresolved: Vec<PolicyId> = Vec::new();
        {
            let cache = self.cache.read();
            for policy_id in policy_ids {
                match cache.get(policy_id) {
                    Some(authenticator) => {
                        resolved.insert(*policy_id, authenticator.clone());
                    }
                    None => unresolved.push(*policy_id),
                }
            }
        }
        if unresolved.is_empty() {
            return Ok(resolved);
        }

        debug!("resolving shared keys unresolved_count={} cached_count={}", unresolved.len(), resolved.len());
        let filter = Filter::new()
            .kind(EventKind::SharedKey)
            .recipient(self.personal.public_key())
            .event_refs(unresolved.iter().copied().map(EventId::from));
        let envelopes = self.transport.list(filter).await?;

        for envelope in envelopes {
            let Some(policy_id) = envelope.first_event_ref().map(PolicyId::from) else {
                debug!("shared key envelope without policy reference event_id={}", envelope.id);
                continue;
            };
            if resolved.contains_key(&policy_id) {
                continue;
            }
            if let Err(err) = verify_event(&envelope) {
                warn!("dropping forged shared key envelope event_id={} err={}", envelope.id, err);
                continue;
            }
            let authenticator = match self.decrypt_envelope(&envelope) {
                Ok(authenticator) => Arc::new(authenticator),
                Err(err) => {
                    warn!("shared key envelope undecryptable event_id={} policy_id={} err={}", envelope.id, policy_id, err);
                    continue;
                }
            };
            self.cache.write().insert(policy_id, authenticator.clone());
            resolved.insert(policy_id, authenticator);
        }
        Ok(resolved)
    }

    fn decrypt_envelope(&self, envelope: &crate::domain::RawEvent) -> Result<SharedKeyAuthenticator> {
        let plaintext = self.personal.decrypt(&envelope.author, &envelope.content)?;
        let secret_hex = String::from_utf8(plaintext)
            .map_err(|_| crate::foundation::VaultError::decryption("shared key envelope is not utf-8"))?;
        SharedKeyAuthenticator::from_secret_hex(&secret_hex)
    }
}
