//! Property-based save/load round trips against the in-memory graph.

use entigraph_core::{GraphTransaction, PropertyValue, StoredRecord, Transmitter};
use entigraph_memory::{GraphStateFactory, MemoryGraph};
use entigraph_testkit::prelude::*;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn saved_people_load_back_unchanged(
        person in person_strategy(),
        friend_count in friend_count_strategy(),
        employed in any::<bool>(),
    ) {
        let graph = MemoryGraph::new();
        let transmitter = memory_transmitter();
        let node = empty_node(&graph);
        let mut person = person.with_friends(empty_nodes(&graph, friend_count));
        if employed {
            person = person.with_employer(empty_node(&graph).id());
        }

        transmitter.save_entity(&person, &node, &graph).unwrap();
        let loaded: Person = transmitter.read_entity(&node, &graph).unwrap();

        prop_assert_eq!(loaded.id, Some(node.id().as_u64() as i64));
        prop_assert_eq!(loaded.without_id(), person);
        prop_assert!(!graph.has_active_transaction());
    }

    #[test]
    fn failed_saves_leave_the_graph_untouched(
        person in person_strategy(),
        friend_count in friend_count_strategy(),
        failing in prop_oneof![Just("name"), Just("age"), Just("email"), Just("friends"), Just("employer")],
    ) {
        let graph = MemoryGraph::new();
        let node = empty_node(&graph);
        let person = person.with_friends(empty_nodes(&graph, friend_count));
        let transmitter = Transmitter::new(FaultInjector::new(
            GraphStateFactory::new(),
            failing,
            Fault::External,
        ));

        prop_assert!(transmitter.save_entity(&person, &node, &graph).is_err());
        prop_assert!(node.property_keys().unwrap().is_empty());
        prop_assert_eq!(graph.relationship_count(), 0);
    }

    #[test]
    fn rolled_back_writes_restore_previous_values(
        before in scalar_value_strategy(),
        after in scalar_value_strategy(),
    ) {
        let graph = MemoryGraph::new();
        let node = empty_node(&graph);
        graph.write(|_| node.set_property("value", before.clone())).unwrap();

        let tx = graph.begin().unwrap();
        node.set_property("value", after).unwrap();
        node.set_property("other", PropertyValue::Bool(true)).unwrap();
        drop(tx);

        prop_assert_eq!(node.property("value").unwrap(), Some(before));
        prop_assert_eq!(node.property("other").unwrap(), None);
    }

    #[test]
    fn committed_writes_are_visible(value in scalar_value_strategy()) {
        let graph = MemoryGraph::new();
        let node = empty_node(&graph);

        let mut tx = graph.begin().unwrap();
        node.set_property("value", value.clone()).unwrap();
        tx.mark_success();
        tx.close().unwrap();

        prop_assert_eq!(node.property("value").unwrap(), Some(value));
    }
}
