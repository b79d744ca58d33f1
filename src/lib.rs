//! Timed action-table scheduler for structured-illumination acquisition
//! sequences.
//!
//! This library converts a declarative description of a multi-axis,
//! multi-device acquisition (angle/phase pattern steps crossed with Z
//! slices) into a single, strictly time-ordered table of hardware commands,
//! ready for replay by an external real-time executor. Planning is a pure,
//! deterministic offline computation: heterogeneous device timing models
//! (instantaneous triggers, blocking settles, camera exposure/readout
//! pipelining, stage motion) are reconciled into one race-free timeline
//! using only configured estimates, with the guarantee that no resource is
//! commanded before it is physically ready.
//!
//! The pieces, leaf to root:
//!
//! - [`time::Time`]: exact fixed-point scheduling time.
//! - [`resource`]: resource identity and the capability traits that form the
//!   timing oracle.
//! - [`table::ActionTable`]: the append-only command ledger and its
//!   readiness query.
//! - [`plan::ExperimentPlan`]: the consumed input description.
//! - [`planner::SequencePlanner`]: the algorithm driving it all.

pub mod config;
pub mod devices;
pub mod error;
pub mod plan;
pub mod planner;
pub mod registry;
pub mod resource;
pub mod table;
pub mod time;

pub use config::PlannerSettings;
pub use error::{SeqResult, SequencerError};
pub use plan::{ExperimentPlan, PlanDescription, SimSequence};
pub use planner::{PlannedAcquisition, SequencePlanner};
pub use registry::DeviceRegistry;
pub use resource::ResourceId;
pub use table::{ActionEntry, ActionPayload, ActionTable};
pub use time::Time;
