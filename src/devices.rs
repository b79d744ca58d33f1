//! Configuration-backed device timing profiles.
//!
//! A profile is the offline stand-in for a hardware descriptor: a bundle of
//! configured timing parameters implementing the capability traits from
//! [`crate::resource`]. Profiles are what the Resource Timing Oracle queries
//! during planning: pure data, no hardware connection.
//!
//! Timing fields are optional in the serialized form. A query against an
//! unset field answers [`SequencerError::UnavailableTiming`], which the
//! planner surfaces as a configuration error: a schedule built on a missing
//! parameter is unsafe to execute.

use serde::{Deserialize, Serialize};

use crate::error::{SeqResult, SequencerError};
use crate::registry::DeviceRegistry;
use crate::resource::{
    AnalogSettable, Exposable, MotionEstimate, Positionable, ResourceId, Triggerable,
};
use crate::time::Time;

/// Camera timing profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraProfile {
    /// Resource id the profile answers for.
    pub id: ResourceId,
    /// Exposure duration. Set per run; unset means the camera was never
    /// configured for this acquisition.
    #[serde(default)]
    pub exposure: Option<Time>,
    /// Dead time between exposures (readout and re-arm).
    #[serde(default)]
    pub inter_exposure_gap: Option<Time>,
    /// Busy window opened by a reset/arm command.
    #[serde(default)]
    pub reset: Option<Time>,
}

impl CameraProfile {
    /// Creates a profile with no timings configured.
    pub fn new(id: impl Into<ResourceId>) -> Self {
        Self {
            id: id.into(),
            exposure: None,
            inter_exposure_gap: None,
            reset: None,
        }
    }

    /// Sets the exposure duration.
    pub fn with_exposure(mut self, exposure: Time) -> Self {
        self.exposure = Some(exposure);
        self
    }

    /// Sets the inter-exposure gap.
    pub fn with_inter_exposure_gap(mut self, gap: Time) -> Self {
        self.inter_exposure_gap = Some(gap);
        self
    }

    /// Sets the reset busy window.
    pub fn with_reset(mut self, reset: Time) -> Self {
        self.reset = Some(reset);
        self
    }

    fn require(&self, value: Option<Time>, quantity: &'static str) -> SeqResult<Time> {
        value.ok_or_else(|| SequencerError::UnavailableTiming {
            resource: self.id.clone(),
            quantity,
        })
    }
}

impl Exposable for CameraProfile {
    fn exposure_time(&self) -> SeqResult<Time> {
        self.require(self.exposure, "exposure_time")
    }

    fn inter_exposure_gap(&self) -> SeqResult<Time> {
        self.require(self.inter_exposure_gap, "inter_exposure_gap")
    }

    fn reset_time(&self) -> SeqResult<Time> {
        self.require(self.reset, "reset_time")
    }
}

/// Digital light source profile. Carries no timing parameters; pulse widths
/// are the executor's concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightProfile {
    /// Resource id the profile answers for.
    pub id: ResourceId,
}

impl LightProfile {
    /// Creates a light profile.
    pub fn new(id: impl Into<ResourceId>) -> Self {
        Self { id: id.into() }
    }
}

impl Triggerable for LightProfile {}

/// Stage axis timing profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageProfile {
    /// Resource id the profile answers for.
    pub id: ResourceId,
    /// Axis velocity in stage units per millisecond.
    #[serde(default)]
    pub velocity: Option<f64>,
    /// Settling time after a move completes.
    #[serde(default)]
    pub settle: Option<Time>,
}

impl StageProfile {
    /// Creates a profile with no timings configured.
    pub fn new(id: impl Into<ResourceId>) -> Self {
        Self {
            id: id.into(),
            velocity: None,
            settle: None,
        }
    }

    /// Sets the axis velocity (stage units per millisecond).
    pub fn with_velocity(mut self, velocity: f64) -> Self {
        self.velocity = Some(velocity);
        self
    }

    /// Sets the settling time.
    pub fn with_settle(mut self, settle: Time) -> Self {
        self.settle = Some(settle);
        self
    }
}

impl Positionable for StageProfile {
    fn motion_time(&self, from: f64, to: f64) -> SeqResult<MotionEstimate> {
        let velocity = self
            .velocity
            .ok_or_else(|| SequencerError::UnavailableTiming {
                resource: self.id.clone(),
                quantity: "velocity",
            })?;
        if !velocity.is_finite() || velocity <= 0.0 {
            return Err(SequencerError::Configuration(format!(
                "stage '{}' velocity must be positive, got {velocity}",
                self.id
            )));
        }
        let settle = self.settle.ok_or_else(|| SequencerError::UnavailableTiming {
            resource: self.id.clone(),
            quantity: "settle_time",
        })?;
        let travel = Time::from_ms_f64((to - from).abs() / velocity)?;
        Ok(MotionEstimate { travel, settle })
    }
}

/// Analog pattern-generator client profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalogProfile {
    /// Resource id the profile answers for.
    pub id: ResourceId,
    /// Time the output needs to latch after a setpoint change.
    #[serde(default)]
    pub settle: Option<Time>,
}

impl AnalogProfile {
    /// Creates a profile with no settle time configured.
    pub fn new(id: impl Into<ResourceId>) -> Self {
        Self {
            id: id.into(),
            settle: None,
        }
    }

    /// Sets the latch/settle time.
    pub fn with_settle(mut self, settle: Time) -> Self {
        self.settle = Some(settle);
        self
    }
}

impl AnalogSettable for AnalogProfile {
    fn settle_time(&self) -> SeqResult<Time> {
        self.settle.ok_or_else(|| SequencerError::UnavailableTiming {
            resource: self.id.clone(),
            quantity: "settle_time",
        })
    }
}

/// Serialized set of device profiles, typically loaded from a TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceFile {
    /// Camera profiles.
    #[serde(default)]
    pub cameras: Vec<CameraProfile>,
    /// Light source profiles.
    #[serde(default)]
    pub lights: Vec<LightProfile>,
    /// Stage axis profiles.
    #[serde(default)]
    pub stages: Vec<StageProfile>,
    /// Analog pattern-generator client profiles.
    #[serde(default)]
    pub analog_clients: Vec<AnalogProfile>,
}

impl DeviceFile {
    /// Parses a device file from TOML text.
    pub fn from_toml_str(text: &str) -> SeqResult<Self> {
        toml::from_str(text)
            .map_err(|err| SequencerError::Configuration(format!("device file: {err}")))
    }

    /// Builds a run-scoped registry from the profiles.
    pub fn into_registry(self) -> DeviceRegistry {
        let mut registry = DeviceRegistry::new();
        for camera in self.cameras {
            tracing::debug!(id = %camera.id, "registering camera profile");
            registry.register_camera(camera.id.clone(), std::sync::Arc::new(camera));
        }
        for light in self.lights {
            registry.register_light(light.id.clone(), std::sync::Arc::new(light));
        }
        for stage in self.stages {
            registry.register_stage(stage.id.clone(), std::sync::Arc::new(stage));
        }
        for client in self.analog_clients {
            registry.register_analog(client.id.clone(), std::sync::Arc::new(client));
        }
        registry
    }
}
