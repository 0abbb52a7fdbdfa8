//! Property tests for the `name[@swarm]` address grammar.

use proptest::prelude::*;

use mail::domain::models::{join_address, split_address, Address};

proptest! {
    #[test]
    fn split_then_join_is_identity(addr in "[a-z][a-z0-9_-]{0,12}(@[a-z][a-z0-9_-]{0,12})?") {
        let (name, swarm) = split_address(&addr);
        prop_assert_eq!(join_address(&name, swarm.as_deref()), addr);
    }

    #[test]
    fn join_then_split_recovers_parts(
        name in "[a-z][a-z0-9_-]{0,12}",
        swarm in proptest::option::of("[a-z][a-z0-9_-]{0,12}"),
    ) {
        let addr = join_address(&name, swarm.as_deref());
        let (split_name, split_swarm) = split_address(&addr);
        prop_assert_eq!(split_name, name);
        prop_assert_eq!(split_swarm, swarm);
    }

    #[test]
    fn agent_in_matches_grammar(
        name in "[a-z][a-z0-9_-]{0,12}",
        swarm in proptest::option::of("[a-z][a-z0-9_-]{0,12}"),
    ) {
        let address = Address::agent_in(&name, swarm.as_deref());
        prop_assert_eq!(address.name(), name);
        prop_assert_eq!(address.swarm(), swarm);
    }
}
