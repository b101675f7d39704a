use kvdoc::catalog::types::RecordId;
use kvdoc::storage::encoded_key::prefix_successor;
use kvdoc::storage::keys::{Address, record_prefix};
use proptest::prelude::*;

// Small alphabets make shared prefixes, empty fields and embedded nulls common.
fn name() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![Just('a'), Just('b'), Just('\0'), Just('é'), Just('/')],
        0..4,
    )
    .prop_map(String::from_iter)
}

fn record_id() -> impl Strategy<Value = RecordId> {
    prop_oneof![
        prop_oneof![Just(i64::MIN), Just(-1_i64), Just(0_i64), Just(i64::MAX), any::<i64>()]
            .prop_map(RecordId::Integer),
        name().prop_map(RecordId::text),
    ]
}

fn address() -> impl Strategy<Value = Address> {
    (name(), name(), name(), name(), record_id())
        .prop_map(|(tenant, ns, db, table, id)| Address::new(tenant, ns, db, table, id))
}

fn tuple(a: &Address) -> (&str, &str, &str, &str, &RecordId) {
    (a.tenant(), a.namespace(), a.database(), a.table(), a.id())
}

proptest! {
    #[test]
    fn decode_inverts_encode(a in address()) {
        let key = a.encode();
        prop_assert_eq!(Address::decode(key.as_slice()).expect("decode"), a);
    }

    #[test]
    fn distinct_addresses_have_distinct_keys(a in address(), b in address()) {
        prop_assume!(a != b);
        prop_assert_ne!(a.encode(), b.encode());
    }

    #[test]
    fn key_order_matches_field_order(a in address(), b in address()) {
        prop_assert_eq!(tuple(&a).cmp(&tuple(&b)), a.encode().cmp(&b.encode()));
    }

    #[test]
    fn records_stay_inside_their_table_range(a in address()) {
        let start = record_prefix(a.tenant(), a.namespace(), a.database(), a.table());
        let end = prefix_successor(&start).expect("successor");
        let key = a.encode();
        prop_assert!(key >= start && key < end);
    }
}
