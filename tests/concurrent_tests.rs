//! Concurrent firing on a shared entity.

mod common;

use common::{registry_with, Vehicle};
use serde_json::{json, Value};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use waypoint::core::{Branch, ConfigurationError, Guard, State, StateGuard};
use waypoint::runtime::{Callback, Event, Machine, MachineRegistry};
use waypoint::{Entity, Error, SharedEntity};

fn ship_registry() -> Arc<MachineRegistry<Vehicle>> {
    Arc::new(registry_with(vec![Machine::new("status")
        .state(State::new("docked").initial())
        .event(
            Event::new("launch")
                .transition(Branch::builder().from("docked").to("flying"))
                .unwrap(),
        )
        .event(
            Event::new("land")
                .transition(Branch::builder().from("flying").to("docked"))
                .unwrap(),
        )
        .event(
            Event::new("refuel")
                .transition(
                    Branch::builder()
                        .from("docked")
                        .state_guard(StateGuard::if_state("crew", "aboard")),
                )
                .unwrap(),
        )]))
}

fn docked_ship(registry: &MachineRegistry<Vehicle>) -> SharedEntity<Vehicle> {
    let mut ship = Vehicle::new();
    registry.initialize_states(&mut ship);
    SharedEntity::new(ship)
}

#[tokio::test]
async fn exactly_one_of_five_racing_launches_succeeds() {
    let registry = ship_registry();
    let ship = docked_ship(&registry);

    let results = registry
        .fire_events_async(&ship, &["launch"; 5])
        .await
        .unwrap();

    assert_eq!(results.len(), 5);
    assert_eq!(results.iter().filter(|launched| **launched).count(), 1);
    assert_eq!(ship.read(|s| s.read("status")), json!("flying"));
    assert_eq!(ship.history().get_path("status"), vec!["docked", "flying"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_launches_on_a_thread_pool_still_serialize() {
    let registry = ship_registry();
    let ship = docked_ship(&registry);

    let handles: Vec<_> = (0..5)
        .map(|_| registry.fire_async(&ship, "launch", vec![]))
        .collect();
    let mut launched = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() {
            launched += 1;
        }
    }

    assert_eq!(launched, 1);
    assert_eq!(ship.history().transitions().len(), 1);
}

#[tokio::test]
async fn strict_async_firing_surfaces_invalid_transition() {
    let registry = ship_registry();
    let ship = docked_ship(&registry);

    registry
        .fire_async_strict(&ship, "launch", vec![])
        .await
        .unwrap()
        .unwrap();
    let error = registry
        .fire_async_strict(&ship, "launch", vec![])
        .await
        .unwrap()
        .unwrap_err();

    assert!(matches!(
        error,
        Error::InvalidTransition { ref event, ref from, .. } if event == "launch" && from == "flying"
    ));
}

#[tokio::test]
async fn strict_multi_event_firing_names_each_failed_task() {
    let registry = ship_registry();
    let ship = docked_ship(&registry);

    let error = registry
        .fire_events_async_strict(&ship, &["land", "land"])
        .await
        .unwrap_err();

    assert_eq!(error.failed_events(), vec!["land", "land"]);
    assert!(error.to_string().starts_with("2 concurrent transition(s) failed"));
    assert_eq!(ship.read(|s| s.read("status")), json!("docked"));
}

#[tokio::test]
async fn state_guard_error_inside_a_task_names_the_machine() {
    let registry = ship_registry();
    let ship = docked_ship(&registry);

    let error = registry
        .fire_async(&ship, "refuel", vec![])
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(
        error,
        Error::Configuration(ConfigurationError::UnknownMachine { ref machine }) if machine == "crew"
    ));

    let aggregated = registry
        .fire_events_async(&ship, &["refuel"])
        .await
        .unwrap_err();
    assert!(matches!(aggregated, Error::Concurrency { .. }));
    assert!(aggregated.to_string().contains("crew"));
}

#[test]
fn locked_firing_works_without_a_runtime() {
    let registry = ship_registry();
    let ship = docked_ship(&registry);

    assert!(registry.fire_locked(&ship, "launch", vec![]).unwrap());
    assert!(!registry.fire_locked(&ship, "launch", vec![]).unwrap());
    assert!(registry.fire_locked_strict(&ship, "land", vec![]).is_ok());

    let history = ship.history();
    assert_eq!(history.get_path("status"), vec!["docked", "flying", "docked"]);
    let vehicle = ship.try_unwrap().unwrap_or_else(|_| panic!("ship still shared"));
    assert_eq!(vehicle.read("status"), json!("docked"));
}

/// A launch whose guard and after callback look at the ship through `view`.
fn observed_launch(view: &SharedEntity<Vehicle>) -> Machine<Vehicle> {
    let guard_view = view.clone();
    let callback_view = view.clone();
    Machine::new("status")
        .state(State::new("docked").initial())
        .event(
            Event::new("launch")
                .transition(
                    Branch::builder()
                        .from("docked")
                        .to("flying")
                        .when(Guard::always(move || {
                            guard_view.read(|s| s.read("status")) == json!("docked")
                        })),
                )
                .unwrap(),
        )
        .callback(
            Callback::after(Branch::builder())
                .unwrap()
                .invoke(move |vehicle: &mut Vehicle, _| {
                    let committed = callback_view.read(|s| s.read("status"));
                    vehicle.log.push(format!("committed {committed}"));
                    Ok(Value::Null)
                }),
        )
}

#[test]
fn guards_and_callbacks_read_the_entity_while_it_fires() {
    let ship = SharedEntity::new(Vehicle::new());
    let registry = Arc::new(registry_with(vec![observed_launch(&ship)]));
    ship.write(|s| registry.initialize_states(s));

    let (done, finished) = mpsc::channel();
    let firing = {
        let registry = Arc::clone(&registry);
        let ship = ship.clone();
        thread::spawn(move || {
            let launched = registry.fire_locked(&ship, "launch", vec![]);
            let _ = done.send(launched.map_err(|e| e.to_string()));
        })
    };

    let launched = finished
        .recv_timeout(Duration::from_secs(5))
        .expect("firing blocked on a nested read");
    firing.join().unwrap();
    assert_eq!(launched, Ok(true));
    assert_eq!(ship.read(|s| s.read("status")), json!("flying"));
    assert_eq!(ship.read(|s| s.log.clone()), vec!["committed \"docked\""]);
    assert_eq!(ship.history().get_path("status"), vec!["docked", "flying"]);
}

#[test]
#[should_panic(expected = "while this thread is firing")]
fn writing_through_the_handle_from_a_callback_panics() {
    let ship = SharedEntity::new(Vehicle::new());
    let writer = ship.clone();
    let registry = registry_with(vec![Machine::new("status")
        .state(State::new("docked").initial())
        .event(
            Event::new("launch")
                .transition(Branch::builder().from("docked").to("flying"))
                .unwrap(),
        )
        .callback(
            Callback::before(Branch::builder())
                .unwrap()
                .invoke(move |_: &mut Vehicle, _| {
                    writer.write(|s| s.seatbelt_on = true);
                    Ok(Value::Null)
                }),
        )]);
    ship.write(|s| registry.initialize_states(s));

    let _ = registry.fire_locked(&ship, "launch", vec![]);
}
