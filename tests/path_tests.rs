//! Path enumeration over cyclic machines.

mod common;

use common::{parked_vehicle, registry_with, state_machine, Vehicle};
use waypoint::core::{Branch, ConfigurationError, Guard, State};
use waypoint::runtime::{Event, Machine, PathOptions};
use waypoint::Error;

fn two_state_loop() -> Machine<Vehicle> {
    Machine::new("state")
        .state(State::new("parked").initial())
        .event(
            Event::new("ignite")
                .transition(Branch::builder().from("parked").to("idling"))
                .unwrap(),
        )
        .event(
            Event::new("park")
                .transition(Branch::builder().from("idling").to("parked"))
                .unwrap(),
        )
}

#[test]
fn minimal_loop_back_to_start() {
    let registry = registry_with(vec![two_state_loop()]);
    let vehicle = parked_vehicle(&registry);

    let paths = registry
        .paths_for(&vehicle, "state", PathOptions::new().to("parked"))
        .unwrap();
    let events: Vec<Vec<&str>> = paths.iter().map(|p| p.events()).collect();
    assert_eq!(events, vec![vec!["ignite", "park"]]);
    assert_eq!(paths.from_name(), "parked");
    assert_eq!(paths.to_name(), Some("parked"));
}

#[test]
fn cyclic_graph_lists_every_path_to_target_in_depth_first_order() {
    let registry = registry_with(vec![state_machine()]);
    let vehicle = parked_vehicle(&registry);

    let paths = registry
        .paths_for(&vehicle, "state", PathOptions::new().from("parked").to("parked"))
        .unwrap();
    let events: Vec<Vec<&str>> = paths.iter().map(|p| p.events()).collect();
    assert_eq!(
        events,
        vec![vec!["ignite", "park"], vec!["ignite", "shift_up", "park"]]
    );
    assert_eq!(paths.events(), vec!["ignite", "park", "shift_up"]);
    assert_eq!(paths.from_states(), vec!["parked", "idling", "first_gear"]);
    assert_eq!(paths.to_states(), vec!["idling", "parked", "first_gear"]);
}

#[test]
fn paths_without_target_run_until_they_dead_end() {
    let registry = registry_with(vec![state_machine()]);
    let vehicle = parked_vehicle(&registry);

    let paths = registry
        .paths_for(&vehicle, "state", PathOptions::new())
        .unwrap();
    let events: Vec<Vec<&str>> = paths.iter().map(|p| p.events()).collect();
    assert_eq!(
        events,
        vec![vec!["ignite", "park"], vec!["ignite", "shift_up", "park"]]
    );
    for path in &paths {
        assert_eq!(path.from_name(), Some("parked"));
        assert_eq!(path.to_name(), Some("parked"));
    }
}

#[test]
fn intermediate_target_stops_at_first_arrival() {
    let registry = registry_with(vec![state_machine()]);
    let vehicle = parked_vehicle(&registry);

    let paths = registry
        .paths_for(&vehicle, "state", PathOptions::new().to("first_gear"))
        .unwrap();
    let events: Vec<Vec<&str>> = paths.iter().map(|p| p.events()).collect();
    assert_eq!(events, vec![vec!["ignite", "shift_up"]]);
}

#[test]
fn guards_prune_paths_unless_disabled() {
    let machine = Machine::new("state")
        .state(State::new("parked").initial())
        .event(
            Event::new("ignite")
                .transition(Branch::builder().from("parked").to("idling"))
                .unwrap(),
        )
        .event(
            Event::new("park")
                .transition(
                    Branch::builder()
                        .from("idling")
                        .to("parked")
                        .when(Guard::method("seatbelt_on")),
                )
                .unwrap(),
        );
    let registry = registry_with(vec![machine]);
    let vehicle = parked_vehicle(&registry);

    let guarded = registry
        .paths_for(&vehicle, "state", PathOptions::new().to("parked"))
        .unwrap();
    assert!(guarded.is_empty());

    let unguarded = registry
        .paths_for(
            &vehicle,
            "state",
            PathOptions::new().to("parked").without_guards(),
        )
        .unwrap();
    assert_eq!(unguarded.len(), 1);
}

#[test]
fn unknown_states_are_rejected() {
    let registry = registry_with(vec![state_machine()]);
    let vehicle = parked_vehicle(&registry);

    let error = registry
        .paths_for(&vehicle, "state", PathOptions::new().to("flying"))
        .unwrap_err();
    assert!(matches!(
        error,
        Error::Configuration(ConfigurationError::UndeclaredState { .. })
    ));
}
