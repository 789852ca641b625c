//! Cooperative deletion across the group: explicit deletes, approval
//! withdrawal, and the kind-grouped cascade report.

use crate::fixtures::{spending_payload, CountingAuthenticator, TestNet};
use covault_core::domain::EventKind;
use covault_core::foundation::ErrorCode;
use covault_core::infrastructure::auth::Authenticator;

#[tokio::test]
async fn explicit_proposal_delete_cascades_and_propagates() {
    let net = TestNet::new();
    let alice = CountingAuthenticator::generate();
    let bob = CountingAuthenticator::generate();
    let alice_session = net.session_for(alice.clone());
    let bob_session = net.session_for(bob.clone());

    let policy = alice_session
        .create_policy("treasury", "", "multi(2,A,B)", vec![alice.public_key(), bob.public_key()])
        .await
        .expect("create policy");
    let proposal = alice_session.create_proposal(policy.id, spending_payload("psbt-p", "p")).await.expect("proposal");

    bob_session.sync_policies().await.expect("sync policies");
    bob_session.proposals_for(policy.id).await.expect("fetch proposals");
    bob_session.approve_proposal(proposal.id, "psbt-p-signed".to_string()).await.expect("approve");

    alice_session.approvals_for(proposal.id).await.expect("fetch approvals");
    assert_eq!(alice_session.context().stores.approvals.read().len(), 1);

    alice_session.delete_proposal(proposal.id).await.expect("delete");
    assert!(alice_session.active_proposals(policy.id).expect("active").is_empty());
    // Dangling approvals go with their proposal.
    assert!(alice_session.context().stores.approvals.read().is_empty());

    // The tombstone propagates: Bob's next fetch converges on the removal.
    let bob_view = bob_session.proposals_for(policy.id).await.expect("fetch proposals");
    assert!(bob_view.is_empty());
    assert!(bob_session.active_proposals(policy.id).expect("active").is_empty());
}

#[tokio::test]
async fn approvals_can_only_be_withdrawn_by_their_author() {
    let net = TestNet::new();
    let alice = CountingAuthenticator::generate();
    let bob = CountingAuthenticator::generate();
    let alice_session = net.session_for(alice.clone());
    let bob_session = net.session_for(bob.clone());

    let policy = alice_session
        .create_policy("treasury", "", "multi(2,A,B)", vec![alice.public_key(), bob.public_key()])
        .await
        .expect("create policy");
    let proposal = alice_session.create_proposal(policy.id, spending_payload("psbt-p", "p")).await.expect("proposal");

    bob_session.sync_policies().await.expect("sync policies");
    bob_session.proposals_for(policy.id).await.expect("fetch proposals");
    let approval = bob_session.approve_proposal(proposal.id, "psbt-p-signed".to_string()).await.expect("approve");

    // Alice holds Bob's approval but cannot retract it.
    alice_session.approvals_for(proposal.id).await.expect("fetch approvals");
    let err = alice_session.withdraw_approval(approval.id).await.expect_err("not the author");
    assert_eq!(err.code(), ErrorCode::Unauthorized);
    assert_eq!(alice_session.context().stores.approvals.read().len(), 1);

    // Bob withdraws his own; Alice's next fetch honors the tombstone.
    bob_session.withdraw_approval(approval.id).await.expect("withdraw");
    let refreshed = alice_session.approvals_for(proposal.id).await.expect("fetch approvals");
    assert!(refreshed.is_empty());
}

#[tokio::test]
async fn deletion_report_groups_removals_by_kind() {
    let net = TestNet::new();
    let alice = CountingAuthenticator::generate();
    let alice_session = net.session_for(alice.clone());

    let policy = alice_session
        .create_policy("treasury", "", "pk(A)", vec![alice.public_key()])
        .await
        .expect("create policy");
    let p1 = alice_session.create_proposal(policy.id, spending_payload("psbt-1", "1")).await.expect("p1");
    let p2 = alice_session.create_proposal(policy.id, spending_payload("psbt-2", "2")).await.expect("p2");

    let shared = alice_session.context().shared_keys.cached(&policy.id).expect("cached key");
    let tombstone = shared
        .sign(
            covault_core::domain::EventDraft::new(EventKind::Deletion, "")
                .tag(covault_core::domain::Tag::Event(p1.id))
                .tag(covault_core::domain::Tag::Event(p2.id)),
        )
        .expect("sign tombstone");

    let removed = alice_session.process_deletions(vec![tombstone]).expect("process");
    let proposals = removed.get(&EventKind::Proposal).expect("proposal group");
    assert_eq!(proposals.len(), 2);
    assert!(proposals.contains(&p1.id) && proposals.contains(&p2.id));
    assert!(alice_session.active_proposals(policy.id).expect("active").is_empty());
}

#[tokio::test]
async fn policy_deletion_drops_dependents_and_the_shared_key() {
    let net = TestNet::new();
    let alice = CountingAuthenticator::generate();
    let alice_session = net.session_for(alice.clone());

    let policy = alice_session
        .create_policy("treasury", "", "pk(A)", vec![alice.public_key()])
        .await
        .expect("create policy");
    alice_session.create_proposal(policy.id, spending_payload("psbt-1", "1")).await.expect("proposal");

    alice_session.delete_policy(policy.id).await.expect("delete policy");
    assert!(alice_session.context().stores.policies.read().is_empty());
    assert!(alice_session.context().stores.proposals.read().is_empty());
    assert!(alice_session.context().shared_keys.cached(&policy.id).is_none());
}
