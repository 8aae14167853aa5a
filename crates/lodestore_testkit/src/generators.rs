//! Property-based test generators using proptest.

use lodestore_core::PrimaryKey;
use proptest::prelude::*;

use crate::entities::{City, Street};

/// Strategy for primary keys of every supported kind.
pub fn primary_key_strategy() -> impl Strategy<Value = PrimaryKey> {
    prop_oneof![
        any::<i64>().prop_map(PrimaryKey::Int),
        any::<u64>().prop_map(PrimaryKey::UInt),
        any::<i64>().prop_map(PrimaryKey::Timestamp),
        ".{0,12}".prop_map(PrimaryKey::Text),
        prop::collection::vec(any::<u8>(), 0..12).prop_map(PrimaryKey::Bytes),
        any::<u128>().prop_map(|n| PrimaryKey::Uuid(uuid::Uuid::from_u128(n))),
    ]
}

/// Strategy for city names drawn from a small pool, so queries hit.
pub fn city_strategy() -> impl Strategy<Value = Option<City>> {
    prop::option::of(
        prop::sample::select(vec!["Stockholm", "Holmsund", "Malmö", "Umeå"]).prop_map(City::new),
    )
}

/// Strategy for a set of streets with distinct keys `0..len`.
pub fn streets_strategy(max_len: usize) -> impl Strategy<Value = Vec<Street>> {
    prop::collection::vec(
        (
            prop::sample::select(vec!["Storgatan", "Kungsgatan", "Ågatan", "Almvägen"]),
            -5i64..50,
            city_strategy(),
        ),
        0..max_len,
    )
    .prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (name, number, city))| {
                let street = Street::new(i as i64, name, number);
                match city {
                    Some(city) => street.with_city(city),
                    None => street,
                }
            })
            .collect()
    })
}
