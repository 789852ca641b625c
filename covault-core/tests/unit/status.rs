use crate::fixtures::{spending_payload, CountingAuthenticator, TestNet};
use covault_core::domain::{ApprovalStatus, ProposalStatus};
use covault_core::foundation::constants::APPROVAL_TTL_SECS;
use covault_core::foundation::util::now_secs;

#[tokio::test]
async fn approval_is_active_now_and_expired_past_its_deadline() {
    let net = TestNet::new();
    let alice = CountingAuthenticator::generate();
    let bob = CountingAuthenticator::generate();
    let alice_session = net.session_for(alice.clone());
    let bob_session = net.session_for(bob.clone());

    let policy = alice_session
        .create_policy("treasury", "", "multi(2,A,B)", vec![alice.public_key(), bob.public_key()])
        .await
        .expect("create policy");
    let proposal = alice_session.create_proposal(policy.id, spending_payload("psbt-p", "rent")).await.expect("proposal");

    bob_session.sync_policies().await.expect("sync");
    bob_session.proposals_for(policy.id).await.expect("fetch proposals");
    let approval = bob_session.approve_proposal(proposal.id, "psbt-p-signed-by-b".to_string()).await.expect("approve");

    let now = now_secs();
    assert_eq!(approval.expires_at, approval.created_at + APPROVAL_TTL_SECS);
    assert_eq!(approval.status(now), ApprovalStatus::Active);
    assert_eq!(approval.status(approval.expires_at - 1), ApprovalStatus::Active);
    assert_eq!(approval.status(approval.expires_at), ApprovalStatus::Expired);
}

#[tokio::test]
async fn status_is_recomputed_from_active_approvals_on_every_read() {
    let net = TestNet::new();
    let alice = CountingAuthenticator::generate();
    let bob = CountingAuthenticator::generate();
    let alice_session = net.session_for(alice.clone());
    let bob_session = net.session_for(bob.clone());

    let policy = alice_session
        .create_policy("treasury", "", "multi(2,A,B)", vec![alice.public_key(), bob.public_key()])
        .await
        .expect("create policy");
    let proposal = alice_session.create_proposal(policy.id, spending_payload("psbt-p", "rent")).await.expect("proposal");

    assert_eq!(alice_session.proposal_status(proposal.id).await.expect("status"), ProposalStatus::Unsigned);

    bob_session.sync_policies().await.expect("sync");
    bob_session.proposals_for(policy.id).await.expect("fetch proposals");
    let approval = bob_session.approve_proposal(proposal.id, "psbt-p-signed-by-b".to_string()).await.expect("approve");

    // The predicate does not hold yet: the fragment alone is insufficient.
    alice_session.approvals_for(proposal.id).await.expect("fetch approvals");
    assert_eq!(alice_session.proposal_status(proposal.id).await.expect("status"), ProposalStatus::Unsigned);

    // Once the wallet reports the fragment sufficient, the same read flips.
    net.wallet.mark_sufficient("psbt-p-signed-by-b");
    assert_eq!(alice_session.proposal_status(proposal.id).await.expect("status"), ProposalStatus::Signed);

    // Past the expiration instant the approval stops counting.
    assert_eq!(
        alice_session.proposal_status_at(proposal.id, approval.expires_at).await.expect("status"),
        ProposalStatus::Unsigned
    );
}

#[tokio::test]
async fn empty_fragment_approvals_are_rejected_at_creation() {
    let net = TestNet::new();
    let alice = CountingAuthenticator::generate();
    let alice_session = net.session_for(alice.clone());

    let policy = alice_session
        .create_policy("treasury", "", "pk(A)", vec![alice.public_key()])
        .await
        .expect("create policy");
    let proposal = alice_session.create_proposal(policy.id, spending_payload("psbt-p", "rent")).await.expect("proposal");

    let before = net.hub.publish_count();
    let err = alice_session.approve_proposal(proposal.id, "   ".to_string()).await.expect_err("empty fragment");
    assert_eq!(err.code(), covault_core::foundation::ErrorCode::InvariantViolation);
    // Rejected before any network or store mutation.
    assert_eq!(net.hub.publish_count(), before);
    assert!(alice_session.context().stores.approvals.read().is_empty());
}
