//! Scenario events: deterministic, scheduled mutations of simulation state
//! and arrival configuration (§4.11).

pub mod handler;
pub mod types;

pub use handler::ScenarioEventHandler;
pub use types::{EventSchedule, ScenarioEvent, ScheduledEvent};
