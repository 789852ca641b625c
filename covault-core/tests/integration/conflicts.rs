//! Finalization retires every still-active sibling sharing an unspent
//! output, and the retirement survives a full cache reset.

use crate::fixtures::{out_point, spending_payload, CountingAuthenticator, TestNet};

#[tokio::test]
async fn finalizing_retires_overlapping_siblings_but_not_unrelated_ones() {
    let net = TestNet::new();
    let alice = CountingAuthenticator::generate();
    let bob = CountingAuthenticator::generate();
    let alice_session = net.session_for(alice.clone());

    let policy = alice_session
        .create_policy("treasury", "", "multi(2,A,B)", vec![alice.public_key(), bob.public_key()])
        .await
        .expect("create policy");

    // P and Q both spend u1; R spends an unrelated output.
    let p = alice_session.create_proposal(policy.id, spending_payload("psbt-p", "p")).await.expect("p");
    let q = alice_session.create_proposal(policy.id, spending_payload("psbt-q", "q")).await.expect("q");
    let r = alice_session.create_proposal(policy.id, spending_payload("psbt-r", "r")).await.expect("r");
    net.wallet.set_utxos("psbt-p", vec![out_point(0x01, 0), out_point(0x02, 1)]);
    net.wallet.set_utxos("psbt-q", vec![out_point(0x01, 0)]);
    net.wallet.set_utxos("psbt-r", vec![out_point(0x03, 0)]);

    alice_session.approve_proposal(p.id, "psbt-p-signed".to_string()).await.expect("approve");
    net.wallet.mark_sufficient("psbt-p-signed");

    let completed = alice_session.finalize_proposal(p.id, true).await.expect("finalize");
    assert_eq!(completed.proposal_id, p.id);

    // Exactly one completion; P and Q retired; R untouched.
    let active: Vec<_> = alice_session.active_proposals(policy.id).expect("active");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, r.id);

    // A fresh session over the same relay contents converges to the same
    // view: the siblings were tombstoned, not merely hidden locally.
    let fresh = alice_session.switch_identity(alice.clone());
    fresh.sync_policies().await.expect("sync policies");
    let reconstructed = fresh.proposals_for(policy.id).await.expect("fetch proposals");
    assert_eq!(reconstructed.len(), 1);
    assert_eq!(reconstructed[0].id, r.id);

    let completed_view = fresh.completed_for(policy.id).await.expect("fetch completed");
    assert_eq!(completed_view.len(), 1);
    assert_eq!(completed_view[0].proposal_id, p.id);
    assert!(!reconstructed.iter().any(|proposal| proposal.id == q.id));
}

#[tokio::test]
async fn finalize_requires_a_satisfying_active_approval_set() {
    let net = TestNet::new();
    let alice = CountingAuthenticator::generate();
    let alice_session = net.session_for(alice.clone());

    let policy = alice_session
        .create_policy("treasury", "", "pk(A)", vec![alice.public_key()])
        .await
        .expect("create policy");
    let proposal = alice_session.create_proposal(policy.id, spending_payload("psbt-p", "p")).await.expect("proposal");

    // No approvals at all.
    assert!(alice_session.finalize_proposal(proposal.id, false).await.is_err());

    // An approval whose fragment the predicate rejects is not enough.
    alice_session.approve_proposal(proposal.id, "psbt-p-unhelpful".to_string()).await.expect("approve");
    assert!(alice_session.finalize_proposal(proposal.id, false).await.is_err());
    assert_eq!(alice_session.active_proposals(policy.id).expect("active").len(), 1);
}
