//! End-to-end lifecycle over a three-party group.

use crate::fixtures::{out_point, spending_payload, CountingAuthenticator, TestNet};
use covault_core::domain::{CompletedPayload, ProposalStatus};
use covault_core::foundation::ErrorCode;

#[tokio::test]
async fn three_party_create_approve_finalize() {
    let net = TestNet::new();
    let alice = CountingAuthenticator::generate();
    let bob = CountingAuthenticator::generate();
    let carol = CountingAuthenticator::generate();
    let alice_session = net.session_for(alice.clone());
    let bob_session = net.session_for(bob.clone());
    let carol_session = net.session_for(carol.clone());

    // A creates the group and a proposal spending u1.
    let policy = alice_session
        .create_policy(
            "treasury",
            "2-of-3 ops wallet",
            "multi(2,A,B,C)",
            vec![alice.public_key(), bob.public_key(), carol.public_key()],
        )
        .await
        .expect("create policy");
    let proposal = alice_session.create_proposal(policy.id, spending_payload("psbt-p", "rent")).await.expect("proposal");
    net.wallet.set_utxos("psbt-p", vec![out_point(0x01, 0)]);

    // B reconstructs the shared view from the relay alone.
    bob_session.sync_policies().await.expect("sync policies");
    let bob_view = bob_session.proposals_for(policy.id).await.expect("fetch proposals");
    assert_eq!(bob_view.len(), 1);
    assert_eq!(bob_view[0].id, proposal.id);

    // B approves with a fragment the predicate accepts on its own.
    let approval =
        bob_session.approve_proposal(proposal.id, "psbt-p-signed-by-b".to_string()).await.expect("approve");
    net.wallet.mark_sufficient("psbt-p-signed-by-b");

    // A picks up B's approval and derives Signed.
    let approvals = alice_session.approvals_for(proposal.id).await.expect("fetch approvals");
    assert_eq!(approvals.len(), 1);
    assert_eq!(approvals[0].id, approval.id);
    assert_eq!(approvals[0].author, bob.public_key());
    assert_eq!(alice_session.proposal_status(proposal.id).await.expect("status"), ProposalStatus::Signed);

    // A finalizes: exactly one completion referencing P, P retired.
    let completed = alice_session.finalize_proposal(proposal.id, true).await.expect("finalize");
    assert_eq!(completed.proposal_id, proposal.id);
    assert_eq!(completed.policy_id, policy.id);
    match &completed.payload {
        CompletedPayload::Spending { tx_id, description } => {
            assert!(!tx_id.is_empty());
            assert_eq!(description, "rent");
        }
        other => panic!("unexpected completion payload: {other:?}"),
    }
    assert_eq!(net.wallet.broadcasts().len(), 1);
    assert!(alice_session.active_proposals(policy.id).expect("active").is_empty());

    // C joins late and sees the converged state.
    carol_session.sync_policies().await.expect("sync policies");
    assert!(carol_session.proposals_for(policy.id).await.expect("fetch proposals").is_empty());
    let carol_completed = carol_session.completed_for(policy.id).await.expect("fetch completed");
    assert_eq!(carol_completed.len(), 1);
    assert_eq!(carol_completed[0].proposal_id, proposal.id);
}

#[tokio::test]
async fn publish_failure_leaves_local_state_unchanged() {
    let net = TestNet::new();
    let alice = CountingAuthenticator::generate();
    let alice_session = net.session_for(alice.clone());

    let policy = alice_session
        .create_policy("treasury", "", "pk(A)", vec![alice.public_key()])
        .await
        .expect("create policy");

    net.hub.set_fail_publishes(true);
    let err = alice_session.create_proposal(policy.id, spending_payload("psbt-p", "rent")).await.expect_err("publish fails");
    assert_eq!(err.code(), ErrorCode::PublishFailure);
    assert!(alice_session.context().stores.proposals.read().is_empty());

    // Same guarantee on the deletion path: the tombstone publish fails, so
    // nothing is removed locally.
    net.hub.set_fail_publishes(false);
    let proposal = alice_session.create_proposal(policy.id, spending_payload("psbt-p", "rent")).await.expect("proposal");
    net.hub.set_fail_publishes(true);
    let err = alice_session.delete_proposal(proposal.id).await.expect_err("tombstone publish fails");
    assert_eq!(err.code(), ErrorCode::PublishFailure);
    assert_eq!(alice_session.active_proposals(policy.id).expect("active").len(), 1);
}
