use crate::fixtures::{CountingAuthenticator, TestNet};
use covault_core::domain::{SignerPayload, SignerSharing};
use covault_core::foundation::ErrorCode;

fn hardware_signer() -> SignerPayload {
    SignerPayload {
        fingerprint: "f57a6b99".to_string(),
        descriptor: "tr([f57a6b99/86'/1'/0']xpub...)".to_string(),
        name: "coldcard".to_string(),
    }
}

#[tokio::test]
async fn owned_signers_survive_a_session_rebuild() {
    let net = TestNet::new();
    let alice = CountingAuthenticator::generate();
    let alice_session = net.session_for(alice.clone());

    let grant = alice_session.save_signer(hardware_signer()).await.expect("save signer");
    assert_eq!(grant.sharing, SignerSharing::Owned);
    assert_eq!(grant.recipient, None);

    let rebuilt = alice_session.switch_identity(alice.clone());
    let grants = rebuilt.sync_signers().await.expect("sync signers");
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].id, grant.id);
    assert_eq!(grants[0].payload.name, "coldcard");
}

#[tokio::test]
async fn shared_signer_is_readable_by_its_recipient_until_revoked() {
    let net = TestNet::new();
    let alice = CountingAuthenticator::generate();
    let bob = CountingAuthenticator::generate();
    let alice_session = net.session_for(alice.clone());
    let bob_session = net.session_for(bob.clone());

    let grant = alice_session.share_signer(hardware_signer(), bob.public_key()).await.expect("share signer");
    assert_eq!(grant.sharing, SignerSharing::Shared);
    assert_eq!(grant.recipient, Some(bob.public_key()));

    let bob_view = bob_session.sync_signers().await.expect("sync signers");
    assert_eq!(bob_view.len(), 1);
    assert_eq!(bob_view[0].payload.fingerprint, "f57a6b99");

    // Only the grantor can revoke.
    let err = bob_session.revoke_signer(grant.id).await.expect_err("recipient cannot revoke");
    assert_eq!(err.code(), ErrorCode::Unauthorized);

    alice_session.revoke_signer(grant.id).await.expect("revoke");
    let fresh_bob = bob_session.switch_identity(bob.clone());
    assert!(fresh_bob.sync_signers().await.expect("sync signers").is_empty());
}
