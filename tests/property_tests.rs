//! Property-based tests for matching, resolution and execution.
//!
//! These tests use proptest to verify properties hold across
//! many randomly generated inputs.

mod common;

use common::{parked_vehicle, registry_with, state_machine, Vehicle};
use proptest::prelude::*;
use serde_json::{json, Value};
use waypoint::core::{Branch, Guard, Matcher, Query, StateIndex};
use waypoint::runtime::{Action, Requirements};
use waypoint::Entity;

const STATES: [&str; 4] = ["parked", "idling", "first_gear", "stalled"];
const EVENTS: [&str; 3] = ["ignite", "park", "shift_up"];

struct NoMachines;

impl StateIndex<Vehicle> for NoMachines {
    fn has_state(&self, _machine: &str, _state: &str) -> Option<bool> {
        None
    }

    fn current_state(&self, _entity: &Vehicle, _machine: &str) -> Option<String> {
        None
    }
}

prop_compose! {
    fn arbitrary_state()(index in 0..STATES.len()) -> &'static str {
        STATES[index]
    }
}

prop_compose! {
    fn arbitrary_event()(index in 0..EVENTS.len()) -> &'static str {
        EVENTS[index]
    }
}

prop_compose! {
    fn arbitrary_names(pool: &'static [&'static str])(
        mask in proptest::collection::vec(any::<bool>(), pool.len())
    ) -> Vec<&'static str> {
        pool.iter()
            .zip(mask)
            .filter_map(|(name, keep)| keep.then_some(*name))
            .collect()
    }
}

fn matcher(names: Vec<&'static str>, blacklist: bool) -> Matcher {
    if blacklist {
        Matcher::except(names)
    } else {
        Matcher::only(names)
    }
}

proptest! {
    #[test]
    fn branch_matches_only_when_every_matcher_accepts(
        from_names in arbitrary_names(&STATES),
        to_names in arbitrary_names(&STATES),
        event_names in arbitrary_names(&EVENTS),
        from_blacklist in any::<bool>(),
        to_blacklist in any::<bool>(),
        from in arbitrary_state(),
        to in arbitrary_state(),
        event in arbitrary_event(),
        guard_holds in any::<bool>(),
    ) {
        let from_matcher = matcher(from_names, from_blacklist);
        let to_matcher = matcher(to_names, to_blacklist);
        let event_matcher = matcher(event_names, false);
        let branch = Branch::<Vehicle>::builder()
            .from(from_matcher.clone())
            .to(to_matcher.clone())
            .on(event_matcher.clone())
            .when(Guard::always(move || guard_holds))
            .build()
            .unwrap();

        let accepted = from_matcher.matches(from, None)
            && to_matcher.matches(to, None)
            && event_matcher.matches(event, None);
        let vehicle = Vehicle::new();
        let query = Query::new().from(from).to(to).on(event);

        prop_assert_eq!(
            branch.matches(&vehicle, &query, &NoMachines).unwrap(),
            accepted && guard_holds
        );
        prop_assert_eq!(
            branch.matches(&vehicle, &query.without_guards(), &NoMachines).unwrap(),
            accepted
        );
    }

    #[test]
    fn resolving_without_state_change_is_idempotent(
        steps in proptest::collection::vec(arbitrary_event(), 0..6),
        event in arbitrary_event(),
    ) {
        let registry = registry_with(vec![state_machine()]);
        let mut vehicle = parked_vehicle(&registry);
        for step in steps {
            registry.fire(&mut vehicle, step, vec![]).unwrap();
        }

        let first = registry.transition_for(&vehicle, event, &Requirements::default()).unwrap();
        let second = registry.transition_for(&vehicle, event, &Requirements::default()).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn firing_lands_on_to_or_stays_on_from(
        event in arbitrary_event(),
        save_result in prop_oneof![
            Just(json!(true)),
            Just(json!(false)),
            Just(Value::Null),
            Just(json!("saved")),
        ],
    ) {
        let registry = registry_with(vec![state_machine().action(Action::named("save"))]);
        let mut vehicle = parked_vehicle(&registry);
        registry.fire(&mut vehicle, "ignite", vec![]).unwrap();
        vehicle.save_result = Some(save_result);

        let before = vehicle.read("state");
        let resolved = registry.transition_for(&vehicle, event, &Requirements::default()).unwrap();
        let success = registry.fire(&mut vehicle, event, vec![]).unwrap();
        let after = vehicle.read("state");

        match resolved {
            Some(transition) if success => prop_assert_eq!(&after, transition.to()),
            Some(transition) => prop_assert_eq!(&after, transition.from()),
            None => {
                prop_assert!(!success);
                prop_assert_eq!(after, before);
            }
        }
    }
}
