//! Resource identity and capability traits.
//!
//! A resource is any controllable device participating in a schedule: a
//! camera, a light source, a stage axis, or an analog pattern-generator
//! client. Resources are identified by an opaque [`ResourceId`] and expose
//! their timing behaviour through a closed set of capability traits rather
//! than late-bound callback dictionaries:
//!
//! - [`Triggerable`]: accepts digital on/off commands (lights, trigger lines).
//! - [`Positionable`]: absolute/relative moves with a motion-time estimate.
//! - [`AnalogSettable`]: scalar setpoints with a settle-time estimate.
//! - [`Exposable`]: camera-like, with an exposure duration and an
//!   inter-exposure gap.
//!
//! The trait methods are the Resource Timing Oracle: pure, synchronous
//! queries against configuration or device descriptors. They perform no
//! hardware I/O, since planning is a deterministic offline computation, and
//! they are queried fresh at planning time, never cached across runs,
//! because values such as the inter-exposure gap can depend on a
//! previously-set exposure parameter.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SeqResult;
use crate::time::Time;

/// Opaque identifier for a controllable device.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Creates an identifier from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        ResourceId(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        ResourceId::new(value)
    }
}

/// Motion estimate for a [`Positionable`] resource: how long the travel
/// takes, and how long the axis needs to settle afterwards before its
/// position can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MotionEstimate {
    /// Time spent travelling between the two positions.
    pub travel: Time,
    /// Settling time after the travel completes.
    pub settle: Time,
}

impl MotionEstimate {
    /// Travel plus settle: the full busy window opened by the move.
    pub fn total(self) -> Time {
        self.travel + self.settle
    }
}

/// Capability: accepts digital on/off commands.
///
/// Triggerable resources carry no timing queries of their own; pulse widths
/// are the executor's concern. The trait marks which devices may legally be
/// targeted by `SetDigital` actions.
pub trait Triggerable: Send + Sync {}

/// Capability: absolute or relative motion with an offline time estimate.
pub trait Positionable: Send + Sync {
    /// Estimated (travel, settle) times for a move between two absolute
    /// positions. Pure function of configured velocity and settling
    /// parameters; no side effects, no hardware call.
    fn motion_time(&self, from: f64, to: f64) -> SeqResult<MotionEstimate>;
}

/// Capability: scalar analog setpoints with a settle-time estimate.
pub trait AnalogSettable: Send + Sync {
    /// Minimum wait after a setpoint change before the output has latched.
    fn settle_time(&self) -> SeqResult<Time>;
}

/// Capability: camera-like exposure pipeline.
pub trait Exposable: Send + Sync + fmt::Debug {
    /// Duration of a single exposure.
    fn exposure_time(&self) -> SeqResult<Time>;

    /// Dead time between consecutive exposures (readout, re-arm). Read fresh
    /// at planning time: it may depend on the exposure set for this run.
    fn inter_exposure_gap(&self) -> SeqResult<Time>;

    /// Time a reset/arm command keeps the camera busy.
    fn reset_time(&self) -> SeqResult<Time>;
}
