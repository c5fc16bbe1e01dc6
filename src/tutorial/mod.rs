//! Scripted onboarding tutorial.
//!
//! A `!start` command creates (or restarts) a per-user session that sends
//! the steps of a YAML flow into the room, one timed message at a time.

pub mod flow;
pub mod registry;
pub mod service;
pub mod session;
pub mod template;

pub use flow::{FlowDefinition, Step, StepKind};
pub use registry::SessionRegistry;
pub use service::{CommandSpec, SERVICE_TYPE, TutorialService};
pub use session::{Progress, Session, SessionSnapshot};
pub use template::{Template, render};
