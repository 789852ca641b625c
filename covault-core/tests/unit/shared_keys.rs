use crate::fixtures::{CountingAuthenticator, TestNet};
use covault_core::foundation::PolicyId;
use std::collections::BTreeSet;
use std::sync::Arc;

#[tokio::test]
async fn resolution_decrypts_one_envelope_per_policy_and_caches() {
    let net = TestNet::new();
    let alice = CountingAuthenticator::generate();
    let bob = CountingAuthenticator::generate();
    let alice_session = net.session_for(alice.clone());
    let bob_session = net.session_for(bob.clone());

    let policy = alice_session
        .create_policy("treasury", "ops wallet", "multi(2,A,B)", vec![alice.public_key(), bob.public_key()])
        .await
        .expect("create policy");

    let wanted: BTreeSet<PolicyId> = [policy.id].into_iter().collect();
    let resolved = bob_session.context().shared_keys.resolve(&wanted).await.expect("resolve");
    assert_eq!(resolved.len(), 1);
    assert_eq!(bob.decrypt_count(), 1);

    // Second resolution of the same id is served from the cache.
    let resolved_again = bob_session.context().shared_keys.resolve(&wanted).await.expect("resolve again");
    assert_eq!(resolved_again.len(), 1);
    assert_eq!(bob.decrypt_count(), 1);
}

#[tokio::test]
async fn unresolvable_ids_are_absent_not_errors() {
    let net = TestNet::new();
    let alice = CountingAuthenticator::generate();
    let carol = CountingAuthenticator::generate();
    let alice_session = net.session_for(alice.clone());
    let carol_session = net.session_for(carol.clone());

    // Carol is not a participant; no envelope is ever addressed to her.
    let policy = alice_session
        .create_policy("private", "alice only", "pk(A)", vec![alice.public_key()])
        .await
        .expect("create policy");

    let unknown = PolicyId::new([0xDD; 32]);
    let wanted: BTreeSet<PolicyId> = [policy.id, unknown].into_iter().collect();
    let resolved = carol_session.context().shared_keys.resolve(&wanted).await.expect("resolve");
    assert!(resolved.is_empty());
}

#[tokio::test]
async fn minted_keys_are_seeded_without_a_round_trip() {
    let net = TestNet::new();
    let alice = CountingAuthenticator::generate();
    let alice_session = net.session_for(alice.clone());

    let policy = alice_session
        .create_policy("solo", "self custody", "pk(A)", vec![alice.public_key()])
        .await
        .expect("create policy");

    // The creator resolves from the seeded cache: no envelope decryption.
    let wanted: BTreeSet<PolicyId> = [policy.id].into_iter().collect();
    let resolved = alice_session.context().shared_keys.resolve(&wanted).await.expect("resolve");
    assert_eq!(resolved.len(), 1);
    assert_eq!(alice.decrypt_count(), 0);
}
