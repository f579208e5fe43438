//! Property-based test generators using proptest.
//!
//! Generated people carry no associations; associations point at records
//! that must exist first, so tests attach them after creating nodes.

use crate::fixtures::Person;
use entigraph_core::{LoadStrategy, MappingPolicy, PropertyValue};
use proptest::prelude::*;

/// Strategy for generating names, including the empty name.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z][a-z ]{0,15}|").expect("Invalid regex")
}

/// Strategy for generating optional email addresses.
pub fn email_strategy() -> impl Strategy<Value = Option<String>> {
    prop::option::of(
        prop::string::string_regex("[a-z]{1,8}@[a-z]{1,8}\\.(com|org|net)").expect("Invalid regex"),
    )
}

/// Strategy for generating people without associations.
pub fn person_strategy() -> impl Strategy<Value = Person> {
    (name_strategy(), any::<i64>(), email_strategy()).prop_map(|(name, age, email)| Person {
        id: None,
        name,
        age,
        email,
        friends: Vec::new(),
        employer: None,
    })
}

/// Strategy for generating a friend count small enough to keep tests fast.
pub fn friend_count_strategy() -> impl Strategy<Value = usize> {
    0usize..5
}

/// Strategy for generating scalar property values (no references).
pub fn scalar_value_strategy() -> impl Strategy<Value = PropertyValue> {
    let leaf = prop_oneof![
        any::<bool>().prop_map(PropertyValue::Bool),
        any::<i64>().prop_map(PropertyValue::Integer),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(PropertyValue::Bytes),
        "[a-z]{0,12}".prop_map(PropertyValue::Text),
    ];
    prop_oneof![
        3 => leaf.clone(),
        1 => prop::collection::vec(leaf, 0..4).prop_map(PropertyValue::Array),
    ]
}

/// Strategy for generating mapping policies.
pub fn policy_strategy() -> impl Strategy<Value = MappingPolicy> {
    (
        prop_oneof![
            Just(LoadStrategy::Default),
            Just(LoadStrategy::Eager),
            Just(LoadStrategy::Lazy),
        ],
        any::<bool>(),
    )
        .prop_map(|(load, read_only)| MappingPolicy::new(load).read_only(read_only))
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_people_have_no_associations(person in person_strategy()) {
            prop_assert!(person.id.is_none());
            prop_assert!(person.friends.is_empty());
            prop_assert!(person.employer.is_none());
        }

        #[test]
        fn scalar_values_are_never_null(value in scalar_value_strategy()) {
            prop_assert!(!value.is_null());
            prop_assert!(value.as_reference().is_none());
        }

        #[test]
        fn lazy_policies_never_load(policy in policy_strategy()) {
            prop_assert_eq!(policy.should_load(), policy.load != LoadStrategy::Lazy);
        }
    }
}
