use crate::fixtures::{spending_payload, CountingAuthenticator, TestNet};
use covault_core::application::handlers::live_events;
use covault_core::domain::{DomainObject, EventDraft, EventKind, LabelKind, LabelPayload, Tag};
use covault_core::infrastructure::auth::{encrypt_obj, Authenticator, KeyPairAuthenticator};
use covault_core::infrastructure::store::IndexName;

#[tokio::test]
async fn repeated_handling_decrypts_only_once() {
    let net = TestNet::new();
    let alice = CountingAuthenticator::generate();
    let bob = CountingAuthenticator::generate();
    let alice_session = net.session_for(alice.clone());
    let bob_session = net.session_for(bob.clone());

    let policy = alice_session
        .create_policy("treasury", "", "multi(2,A,B)", vec![alice.public_key(), bob.public_key()])
        .await
        .expect("create policy");
    alice_session.create_proposal(policy.id, spending_payload("psbt-p", "rent")).await.expect("create proposal");

    bob_session.sync_policies().await.expect("sync policies");
    let first = bob_session.proposals_for(policy.id).await.expect("first fetch");
    assert_eq!(first.len(), 1);
    let envelope_decrypts = bob.decrypt_count();

    // Identical raw events arrive again: everything is served from cache.
    let second = bob_session.proposals_for(policy.id).await.expect("second fetch");
    assert_eq!(second, first);
    assert_eq!(bob.decrypt_count(), envelope_decrypts);
}

#[tokio::test]
async fn undecryptable_policies_are_skipped_not_fatal() {
    let net = TestNet::new();
    let alice = CountingAuthenticator::generate();
    let bob = CountingAuthenticator::generate();
    let alice_session = net.session_for(alice.clone());
    let bob_session = net.session_for(bob.clone());

    let shared_policy = alice_session
        .create_policy("shared", "", "multi(2,A,B)", vec![alice.public_key(), bob.public_key()])
        .await
        .expect("shared policy");
    let private_policy = alice_session
        .create_policy("private", "", "pk(A)", vec![alice.public_key()])
        .await
        .expect("private policy");

    let visible = alice_session.create_proposal(shared_policy.id, spending_payload("psbt-a", "a")).await.expect("p1");
    alice_session.create_proposal(private_policy.id, spending_payload("psbt-b", "b")).await.expect("p2");

    bob_session.sync_policies().await.expect("sync policies");
    let proposal_events: Vec<_> = net
        .hub
        .stored_events()
        .await
        .into_iter()
        .filter(|event| event.kind == EventKind::Proposal)
        .collect();
    assert_eq!(proposal_events.len(), 2);

    // The batch contains a proposal whose group key Bob can never resolve;
    // it is dropped, the rest materializes, nothing throws.
    let objects = bob_session.ingest(proposal_events).await.expect("ingest");
    let ids: Vec<_> = objects
        .into_iter()
        .filter_map(|object| match object {
            DomainObject::Proposal(proposal) => Some(proposal.id),
            _ => None,
        })
        .collect();
    assert_eq!(ids, vec![visible.id]);
}

#[tokio::test]
async fn cross_author_tombstones_are_ignored() {
    let net = TestNet::new();
    let alice = CountingAuthenticator::generate();
    let alice_session = net.session_for(alice.clone());

    let policy = alice_session
        .create_policy("treasury", "", "pk(A)", vec![alice.public_key()])
        .await
        .expect("create policy");
    let proposal = alice_session.create_proposal(policy.id, spending_payload("psbt-p", "rent")).await.expect("proposal");

    // Mallory retracts someone else's contribution: silently skipped.
    let mallory = KeyPairAuthenticator::generate();
    let forged = mallory
        .sign(EventDraft::new(EventKind::Deletion, "").tag(Tag::Event(proposal.id)))
        .expect("sign tombstone");
    let removed = alice_session.process_deletions(vec![forged]).expect("process");
    assert!(removed.is_empty());
    assert_eq!(alice_session.active_proposals(policy.id).expect("active").len(), 1);

    // The shared key authored the proposal; its tombstone is authorized.
    let shared = alice_session.context().shared_keys.cached(&policy.id).expect("cached key");
    let authorized = shared
        .sign(EventDraft::new(EventKind::Deletion, "").tag(Tag::Event(proposal.id)))
        .expect("sign tombstone");
    let removed = alice_session.process_deletions(vec![authorized]).expect("process");
    assert_eq!(removed.get(&EventKind::Proposal), Some(&vec![proposal.id]));
    assert!(alice_session.active_proposals(policy.id).expect("active").is_empty());
}

#[tokio::test]
async fn newer_label_supersedes_older_one() {
    let net = TestNet::new();
    let alice = CountingAuthenticator::generate();
    let alice_session = net.session_for(alice.clone());

    let policy = alice_session
        .create_policy("treasury", "", "pk(A)", vec![alice.public_key()])
        .await
        .expect("create policy");
    let shared = alice_session.context().shared_keys.cached(&policy.id).expect("cached key");

    let old_payload = LabelPayload { kind: LabelKind::Address, text: "cold storage".to_string() };
    let new_payload = LabelPayload { kind: LabelKind::Address, text: "cold storage (rotated)".to_string() };
    let old_event = shared
        .sign(
            EventDraft::new(EventKind::Label, encrypt_obj(shared.as_ref(), &shared.public_key(), &old_payload).expect("seal"))
                .tag(Tag::Event(policy.id.into()))
                .tag(Tag::Identifier("addr-0".to_string()))
                .created_at(1_000),
        )
        .expect("sign old");
    let new_event = shared
        .sign(
            EventDraft::new(EventKind::Label, encrypt_obj(shared.as_ref(), &shared.public_key(), &new_payload).expect("seal"))
                .tag(Tag::Event(policy.id.into()))
                .tag(Tag::Identifier("addr-0".to_string()))
                .created_at(2_000),
        )
        .expect("sign new");

    alice_session.ingest(vec![old_event.clone()]).await.expect("ingest old");
    alice_session.ingest(vec![new_event.clone()]).await.expect("ingest new");
    // Replay of the superseded event does not resurrect it.
    alice_session.ingest(vec![old_event]).await.expect("replay old");

    let labels = alice_session.context().stores.labels.read().by_index(policy.id, IndexName::Policy).expect("labels");
    assert_eq!(labels.len(), 1);
    assert_eq!(labels[0].id, new_event.id);
    assert_eq!(labels[0].payload.text, "cold storage (rotated)");
}

#[test]
fn live_merge_is_author_scoped() {
    let alice = KeyPairAuthenticator::generate();
    let bob = KeyPairAuthenticator::generate();

    let created = alice.sign(EventDraft::new(EventKind::OwnedSigner, "payload")).expect("sign");
    let foreign_tombstone = bob.sign(EventDraft::new(EventKind::Deletion, "").tag(Tag::Event(created.id))).expect("sign");
    let own_tombstone = alice.sign(EventDraft::new(EventKind::Deletion, "").tag(Tag::Event(created.id))).expect("sign");

    assert_eq!(live_events(vec![created.clone()], &[foreign_tombstone]).len(), 1);
    assert!(live_events(vec![created], &[own_tombstone]).is_empty());
}
