//! Waypoint: a declarative state machine runtime
//!
//! Machines are built once as a static graph of states, events, guarded
//! branches and callbacks, then attached to any host type implementing
//! [`Entity`]. Firing an event resolves the first matching branch, runs the
//! callbacks in order, persists the new state, invokes the machine's action
//! and rolls everything back if anything halts.
//!
//! # Core Concepts
//!
//! - **Matchers and branches**: which from/to/event combinations a rule accepts
//! - **Guards**: boolean conditions and cross-machine state requirements
//! - **Callbacks**: before, around, after and failure hooks with halting
//! - **Collections**: several transitions executed atomically
//! - **Paths**: every event sequence leading between two states
//! - **Shared entities**: serialized firing from concurrent tasks
//!
//! # Example
//!
//! ```rust
//! use waypoint::core::{Branch, State};
//! use waypoint::runtime::{Callback, Event, Machine, MachineRegistry};
//! use waypoint::{Config, Entity};
//! use serde_json::{json, Value};
//! use std::collections::HashMap;
//!
//! #[derive(Default)]
//! struct Vehicle {
//!     attributes: HashMap<String, Value>,
//!     log: Vec<String>,
//! }
//!
//! impl Entity for Vehicle {
//!     fn read(&self, attribute: &str) -> Value {
//!         self.attributes.get(attribute).cloned().unwrap_or(Value::Null)
//!     }
//!
//!     fn write(&mut self, attribute: &str, value: Value) {
//!         self.attributes.insert(attribute.to_string(), value);
//!     }
//! }
//!
//! let registry = MachineRegistry::new(Config::default()).register(
//!     Machine::new("state")
//!         .state(State::new("parked").initial())
//!         .event(
//!             Event::new("ignite")
//!                 .transition(Branch::builder().from("parked").to("idling"))
//!                 .unwrap(),
//!         )
//!         .callback(
//!             Callback::after(Branch::builder().on("ignite"))
//!                 .unwrap()
//!                 .invoke(|vehicle: &mut Vehicle, transition| {
//!                     vehicle.log.push(format!("{} -> {}", transition.from_name(), transition.to_name()));
//!                     Ok(Value::Null)
//!                 }),
//!         ),
//! );
//!
//! let mut vehicle = Vehicle::default();
//! registry.initialize_states(&mut vehicle);
//! assert!(registry.fire(&mut vehicle, "ignite", vec![]).unwrap());
//! assert_eq!(vehicle.read("state"), json!("idling"));
//! assert_eq!(vehicle.log, vec!["parked -> idling"]);
//! ```

pub mod concurrent;
pub mod config;
pub mod core;
pub mod entity;
pub mod integration;
pub mod runtime;

// Re-export commonly used types
pub use concurrent::SharedEntity;
pub use config::{Config, MessageKey, Messages};
pub use entity::{truthy, Entity};
pub use integration::{Integration, Message, NoIntegration};
pub use runtime::{CallbackError, Error, MachineRegistry, Transition};
