//! Shared fixtures for integration tests.

#![allow(dead_code)]

use serde_json::{json, Value};
use std::collections::HashMap;
use waypoint::core::{Branch, State};
use waypoint::integration::{Integration, Message};
use waypoint::runtime::{Event, Machine, MachineRegistry};
use waypoint::{CallbackError, Config, Entity, Transition};

/// A vehicle with a driving state machine and an alarm.
#[derive(Clone, Debug, Default)]
pub struct Vehicle {
    pub attributes: HashMap<String, Value>,
    pub log: Vec<String>,
    pub errors: Vec<String>,
    pub seatbelt_on: bool,
    pub save_result: Option<Value>,
    pub received_args: Vec<Vec<Value>>,
    pub cached: HashMap<String, Transition>,
}

impl Vehicle {
    pub fn new() -> Self {
        Vehicle {
            save_result: Some(json!(true)),
            ..Vehicle::default()
        }
    }

    pub fn state(&self) -> Value {
        self.read("state")
    }

    pub fn alarm(&self) -> Value {
        self.read("alarm_state")
    }
}

impl Entity for Vehicle {
    fn read(&self, attribute: &str) -> Value {
        self.attributes.get(attribute).cloned().unwrap_or(Value::Null)
    }

    fn write(&mut self, attribute: &str, value: Value) {
        self.attributes.insert(attribute.to_string(), value);
    }

    fn predicate(&self, name: &str) -> Option<bool> {
        match name {
            "seatbelt_on" => Some(self.seatbelt_on),
            _ => None,
        }
    }

    fn invoke(&mut self, name: &str, args: &[Value]) -> Option<Result<Value, CallbackError>> {
        match name {
            "save" => {
                self.log.push("save".into());
                Some(Ok(self.save_result.clone().unwrap_or(Value::Null)))
            }
            "record_args" => {
                self.received_args.push(args.to_vec());
                Some(Ok(Value::Null))
            }
            _ => None,
        }
    }

    fn event_transition(&self, machine: &str) -> Option<Transition> {
        self.cached.get(machine).cloned()
    }

    fn set_event_transition(&mut self, machine: &str, transition: Option<Transition>) {
        match transition {
            Some(transition) => {
                self.cached.insert(machine.to_string(), transition);
            }
            None => {
                self.cached.remove(machine);
            }
        }
    }
}

/// Records invalidations on the vehicle itself.
pub struct VehicleErrors;

impl Integration<Vehicle> for VehicleErrors {
    fn invalidate(&self, entity: &mut Vehicle, attribute: &str, message: &Message) {
        entity.errors.push(format!("{attribute} {}", message.text));
    }

    fn reset(&self, entity: &mut Vehicle) {
        entity.errors.clear();
    }

    fn errors_for(&self, entity: &Vehicle) -> String {
        entity.errors.join(". ")
    }
}

/// parked -> idling -> first_gear, with park leading back from either.
pub fn state_machine() -> Machine<Vehicle> {
    Machine::new("state")
        .state(State::new("parked").initial())
        .event(
            Event::new("ignite")
                .transition(Branch::builder().from("parked").to("idling"))
                .unwrap(),
        )
        .event(
            Event::new("park")
                .transition(Branch::builder().from(["idling", "first_gear"]).to("parked"))
                .unwrap(),
        )
        .event(
            Event::new("shift_up")
                .transition(Branch::builder().from("idling").to("first_gear"))
                .unwrap(),
        )
}

/// Namespaced alarm stored in `alarm_state`.
pub fn alarm_machine() -> Machine<Vehicle> {
    Machine::new("alarm_state")
        .namespace("alarm")
        .state(State::new("active").initial())
        .event(
            Event::new("enable")
                .transition(Branch::builder().from("off").to("active"))
                .unwrap(),
        )
        .event(
            Event::new("disable")
                .transition(Branch::builder().from("active").to("off"))
                .unwrap(),
        )
}

pub fn registry_with(machines: Vec<Machine<Vehicle>>) -> MachineRegistry<Vehicle> {
    machines
        .into_iter()
        .fold(
            MachineRegistry::new(Config::default()).with_integration(VehicleErrors),
            MachineRegistry::register,
        )
}

pub fn registry() -> MachineRegistry<Vehicle> {
    registry_with(vec![state_machine(), alarm_machine()])
}

/// A vehicle with every machine in its initial state.
pub fn parked_vehicle(registry: &MachineRegistry<Vehicle>) -> Vehicle {
    let mut vehicle = Vehicle::new();
    registry.initialize_states(&mut vehicle);
    vehicle
}
