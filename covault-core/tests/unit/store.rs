use covault_core::domain::{Proposal, ProposalPayload};
use covault_core::foundation::{ErrorCode, EventId, PolicyId, PublicKey};
use covault_core::infrastructure::store::{IndexName, ObjectStore, PROPOSAL_INDEXES};

fn proposal(id_byte: u8, policy_byte: u8) -> Proposal {
    Proposal {
        id: EventId::new([id_byte; 32]),
        policy_id: PolicyId::new([policy_byte; 32]),
        author: PublicKey::new([0xAA; 32]),
        created_at: 1_000 + id_byte as u64,
        payload: ProposalPayload::Spending {
            descriptor: "multi(2,A,B)".to_string(),
            to_address: "tb1qexample".to_string(),
            amount: 1_000,
            description: format!("proposal {id_byte}"),
            psbt: format!("psbt-{id_byte}"),
        },
    }
}

#[test]
fn storing_the_same_object_twice_is_a_no_op() {
    let mut store = ObjectStore::new(PROPOSAL_INDEXES);
    let p = proposal(1, 9);

    assert!(store.store(p.clone()));
    assert!(!store.store(p.clone()));
    assert_eq!(store.len(), 1);
    assert_eq!(store.get(p.id, IndexName::EventId).expect("get"), Some(p));
}

#[test]
fn missing_tracks_presence_exactly() {
    let mut store = ObjectStore::new(PROPOSAL_INDEXES);
    let a = proposal(1, 9);
    let b = proposal(2, 9);
    let ids = [a.id, b.id];

    assert_eq!(store.missing(&ids, IndexName::EventId).expect("missing"), vec![a.id, b.id]);

    store.store(a.clone());
    assert_eq!(store.missing(&ids, IndexName::EventId).expect("missing"), vec![b.id]);

    store.store(b);
    assert!(store.missing(&ids, IndexName::EventId).expect("missing").is_empty());
}

#[test]
fn object_is_reachable_by_every_index_and_gone_from_all_after_delete() {
    let mut store = ObjectStore::new(PROPOSAL_INDEXES);
    let p = proposal(3, 7);
    store.store(p.clone());

    assert_eq!(store.get(p.id, IndexName::EventId).expect("by id"), Some(p.clone()));
    assert_eq!(store.by_index(p.policy_id, IndexName::Policy).expect("by policy"), vec![p.clone()]);

    store.remove(&p);
    assert_eq!(store.get(p.id, IndexName::EventId).expect("by id"), None);
    assert!(store.by_index(p.policy_id, IndexName::Policy).expect("by policy").is_empty());
    // Empty buckets are pruned, not left behind.
    assert!(!store.has(p.policy_id, IndexName::Policy).expect("has"));
    assert!(store.is_empty());
}

#[test]
fn get_many_returns_a_uniform_deduplicated_list() {
    let mut store = ObjectStore::new(PROPOSAL_INDEXES);
    let a = proposal(1, 9);
    let b = proposal(2, 9);
    store.store_many([a.clone(), b.clone()]);

    let one = store.get_many([a.id], IndexName::EventId).expect("one");
    assert_eq!(one, vec![a.clone()]);

    let both = store.get_many([a.id, b.id, a.id], IndexName::EventId).expect("both");
    assert_eq!(both.len(), 2);

    let by_policy = store.get_many([a.policy_id], IndexName::Policy).expect("policy bucket");
    assert_eq!(by_policy.len(), 2);
}

#[test]
fn undeclared_index_is_an_error() {
    let store: ObjectStore<Proposal> = ObjectStore::new(PROPOSAL_INDEXES);
    let err = store.get(EventId::new([1; 32]), IndexName::Identifier).expect_err("undeclared");
    assert_eq!(err.code(), ErrorCode::UnknownIndex);
}

#[test]
fn empty_inputs_are_safe() {
    let mut store: ObjectStore<Proposal> = ObjectStore::new(PROPOSAL_INDEXES);
    assert_eq!(store.store_many(std::iter::empty::<Proposal>()), 0);
    assert!(store.missing(&[] as &[EventId], IndexName::EventId).expect("missing").is_empty());
    assert!(store.get_many(std::iter::empty::<EventId>(), IndexName::EventId).expect("get_many").is_empty());
    assert_eq!(store.remove_many(std::iter::empty::<EventId>()), 0);
}
