//! Experiment plan: the input description consumed by the sequence planner.
//!
//! A plan pairs the geometric description of a structured-illumination
//! acquisition (the ordered angle/phase step sequence and the Z stack
//! parameters) with typed references to the resources that will execute it.
//! Resource references are resolved against a [`DeviceRegistry`] once, at
//! plan construction; the planner never performs name lookups.
//!
//! A plan is constructed once from configuration, consumed once by
//! [`crate::planner::SequencePlanner::generate`], and discarded.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{SeqResult, SequencerError};
use crate::registry::DeviceRegistry;
use crate::resource::{AnalogSettable, Exposable, Positionable, ResourceId, Triggerable};

/// Angular sweep covered by the illumination pattern, in degrees.
const ANGLE_RANGE_DEG: f64 = 180.0;
/// Phase sweep covered by the illumination pattern, in degrees.
const PHASE_RANGE_DEG: f64 = 360.0;

fn default_wavelength() -> f64 {
    488e-9
}

fn default_num_reps() -> u32 {
    1
}

/// One illumination step: a pattern angle and phase, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimStep {
    /// Pattern angle in degrees.
    pub angle: f64,
    /// Pattern phase in degrees.
    pub phase: f64,
}

/// Ordered angle/phase sequence visited at every Z slice.
///
/// Angles divide the 180° angular range and phases the 360° phase range
/// evenly, phases innermost, exactly as the pattern generator expects its
/// sequence indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimSequence {
    steps: Vec<SimStep>,
    wavelength: f64,
}

impl SimSequence {
    /// Generates the full angle/phase grid for `num_angles` × `num_phases`
    /// steps at the given illumination wavelength (meters).
    pub fn generate(num_angles: usize, num_phases: usize, wavelength: f64) -> SeqResult<Self> {
        if num_angles == 0 || num_phases == 0 {
            return Err(SequencerError::Configuration(format!(
                "sequence requires at least one angle and one phase \
                 (got {num_angles} angles, {num_phases} phases)"
            )));
        }
        let mut steps = Vec::with_capacity(num_angles * num_phases);
        for i in 0..num_angles {
            for j in 0..num_phases {
                steps.push(SimStep {
                    angle: i as f64 * ANGLE_RANGE_DEG / num_angles as f64,
                    phase: j as f64 * PHASE_RANGE_DEG / num_phases as f64,
                });
            }
        }
        Ok(Self { steps, wavelength })
    }

    /// The ordered steps.
    pub fn steps(&self) -> &[SimStep] {
        &self.steps
    }

    /// Number of steps per Z slice.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the sequence is empty (never true for a generated sequence).
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Illumination wavelength in meters (recorded for metadata).
    pub fn wavelength(&self) -> f64 {
        self.wavelength
    }
}

/// Number of Z slices a plan visits.
///
/// `ceil(z_height / slice_height)` slices cover the volume, with a floor of
/// one slice for flat (2D) acquisitions, plus one extra slice when the
/// requested height exceeds `extra_slice_threshold` so the top of the volume
/// is captured.
pub fn slice_count(z_height: f64, slice_height: f64, extra_slice_threshold: f64) -> SeqResult<usize> {
    if !z_height.is_finite() || z_height < 0.0 {
        return Err(SequencerError::Configuration(format!(
            "z height must be finite and non-negative, got {z_height}"
        )));
    }
    if z_height <= extra_slice_threshold {
        return Ok(1);
    }
    if !slice_height.is_finite() || slice_height <= 0.0 {
        return Err(SequencerError::Configuration(format!(
            "slice height must be positive for a {z_height} unit volume, got {slice_height}"
        )));
    }
    Ok((z_height / slice_height).ceil() as usize + 1)
}

/// A camera participating in the plan.
#[derive(Clone)]
pub struct CameraRef {
    /// Resource id used in table entries.
    pub id: ResourceId,
    /// Timing oracle for this camera.
    pub device: Arc<dyn Exposable>,
    /// Whether the camera is already in a known-ready state. Cameras that
    /// are not get a re-arm entry at the start of the schedule.
    pub ready: bool,
}

impl CameraRef {
    /// Creates a reference to a camera that is not yet known-ready.
    pub fn new(id: impl Into<ResourceId>, device: Arc<dyn Exposable>) -> Self {
        Self {
            id: id.into(),
            device,
            ready: false,
        }
    }

    /// Marks the camera as already armed and ready.
    pub fn ready(mut self) -> Self {
        self.ready = true;
        self
    }
}

/// A digital light source participating in the plan.
#[derive(Clone)]
pub struct LightRef {
    /// Resource id used in table entries.
    pub id: ResourceId,
    /// Capability handle (no timing queries).
    pub device: Arc<dyn Triggerable>,
}

impl LightRef {
    /// Creates a light reference.
    pub fn new(id: impl Into<ResourceId>, device: Arc<dyn Triggerable>) -> Self {
        Self {
            id: id.into(),
            device,
        }
    }
}

/// The Z stage axis, when the plan moves in Z.
#[derive(Clone)]
pub struct StageRef {
    /// Resource id used in table entries.
    pub id: ResourceId,
    /// Timing oracle for axis moves.
    pub device: Arc<dyn Positionable>,
}

impl StageRef {
    /// Creates a stage reference.
    pub fn new(id: impl Into<ResourceId>, device: Arc<dyn Positionable>) -> Self {
        Self {
            id: id.into(),
            device,
        }
    }
}

/// An analog pattern-generator client driven once per sequence step.
#[derive(Clone)]
pub struct AnalogRef {
    /// Resource id used in table entries.
    pub id: ResourceId,
    /// Timing oracle for setpoint latching.
    pub device: Arc<dyn AnalogSettable>,
}

impl AnalogRef {
    /// Creates an analog client reference.
    pub fn new(id: impl Into<ResourceId>, device: Arc<dyn AnalogSettable>) -> Self {
        Self {
            id: id.into(),
            device,
        }
    }
}

/// Fully resolved experiment plan.
#[derive(Clone)]
pub struct ExperimentPlan {
    /// Angle/phase sequence visited per Z slice.
    pub sequence: SimSequence,
    /// Starting Z altitude (stage units).
    pub z_start: f64,
    /// Height of the imaged volume (stage units).
    pub z_height: f64,
    /// Height of one Z slice (stage units).
    pub slice_height: f64,
    /// Cameras to expose at every step. At least one.
    pub cameras: Vec<CameraRef>,
    /// Lights raised for every exposure.
    pub lights: Vec<LightRef>,
    /// Z positioner, when the plan moves in Z.
    pub z_positioner: Option<StageRef>,
    /// Pattern-generator clients written once per step. Queried fresh each
    /// planning run; attachment can change between runs.
    pub pattern_clients: Vec<AnalogRef>,
    /// Number of back-to-back repetitions the executor will run.
    pub num_reps: u32,
}

impl ExperimentPlan {
    /// Starts building a plan around a generated sequence.
    pub fn builder(sequence: SimSequence) -> PlanBuilder {
        PlanBuilder {
            sequence,
            z_start: 0.0,
            z_height: 0.0,
            slice_height: 0.0,
            cameras: Vec::new(),
            lights: Vec::new(),
            z_positioner: None,
            pattern_clients: Vec::new(),
            num_reps: 1,
        }
    }
}

/// Builder for [`ExperimentPlan`].
pub struct PlanBuilder {
    sequence: SimSequence,
    z_start: f64,
    z_height: f64,
    slice_height: f64,
    cameras: Vec<CameraRef>,
    lights: Vec<LightRef>,
    z_positioner: Option<StageRef>,
    pattern_clients: Vec<AnalogRef>,
    num_reps: u32,
}

impl PlanBuilder {
    /// Sets the Z stack geometry.
    pub fn z_range(mut self, z_start: f64, z_height: f64, slice_height: f64) -> Self {
        self.z_start = z_start;
        self.z_height = z_height;
        self.slice_height = slice_height;
        self
    }

    /// Adds a camera.
    pub fn camera(mut self, camera: CameraRef) -> Self {
        self.cameras.push(camera);
        self
    }

    /// Adds a light source.
    pub fn light(mut self, light: LightRef) -> Self {
        self.lights.push(light);
        self
    }

    /// Sets the Z positioner.
    pub fn z_positioner(mut self, stage: StageRef) -> Self {
        self.z_positioner = Some(stage);
        self
    }

    /// Adds a pattern-generator client.
    pub fn pattern_client(mut self, client: AnalogRef) -> Self {
        self.pattern_clients.push(client);
        self
    }

    /// Sets the repetition count.
    pub fn num_reps(mut self, num_reps: u32) -> Self {
        self.num_reps = num_reps;
        self
    }

    /// Validates and finishes the plan.
    pub fn build(self) -> SeqResult<ExperimentPlan> {
        if self.cameras.is_empty() {
            return Err(SequencerError::Configuration(
                "plan requires at least one camera".to_string(),
            ));
        }
        if self.num_reps == 0 {
            return Err(SequencerError::Configuration(
                "plan requires at least one repetition".to_string(),
            ));
        }
        for value in [self.z_start, self.z_height, self.slice_height] {
            if !value.is_finite() {
                return Err(SequencerError::Configuration(format!(
                    "z parameters must be finite, got {value}"
                )));
            }
        }
        Ok(ExperimentPlan {
            sequence: self.sequence,
            z_start: self.z_start,
            z_height: self.z_height,
            slice_height: self.slice_height,
            cameras: self.cameras,
            lights: self.lights,
            z_positioner: self.z_positioner,
            pattern_clients: self.pattern_clients,
            num_reps: self.num_reps,
        })
    }
}

/// Serialized plan description, resolved against a registry by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDescription {
    /// Number of pattern angles.
    pub num_angles: usize,
    /// Number of pattern phases per angle.
    pub num_phases: usize,
    /// Illumination wavelength in meters.
    #[serde(default = "default_wavelength")]
    pub wavelength: f64,
    /// Starting Z altitude.
    #[serde(default)]
    pub z_start: f64,
    /// Height of the imaged volume.
    #[serde(default)]
    pub z_height: f64,
    /// Height of one Z slice.
    #[serde(default)]
    pub slice_height: f64,
    /// Camera ids.
    pub cameras: Vec<ResourceId>,
    /// Camera ids that are already in a known-ready state.
    #[serde(default)]
    pub ready_cameras: Vec<ResourceId>,
    /// Light ids.
    #[serde(default)]
    pub lights: Vec<ResourceId>,
    /// Z positioner id, if the plan moves in Z.
    #[serde(default)]
    pub z_positioner: Option<ResourceId>,
    /// Pattern-generator client ids.
    #[serde(default)]
    pub pattern_clients: Vec<ResourceId>,
    /// Number of back-to-back repetitions.
    #[serde(default = "default_num_reps")]
    pub num_reps: u32,
}

impl PlanDescription {
    /// Parses a plan description from TOML text.
    pub fn from_toml_str(text: &str) -> SeqResult<Self> {
        toml::from_str(text)
            .map_err(|err| SequencerError::Configuration(format!("plan file: {err}")))
    }

    /// Resolves every named resource against `registry` and builds the plan.
    pub fn resolve(&self, registry: &DeviceRegistry) -> SeqResult<ExperimentPlan> {
        let sequence = SimSequence::generate(self.num_angles, self.num_phases, self.wavelength)?;
        let mut builder = ExperimentPlan::builder(sequence)
            .z_range(self.z_start, self.z_height, self.slice_height)
            .num_reps(self.num_reps);

        for id in &self.cameras {
            let mut camera = CameraRef::new(id.clone(), registry.camera(id)?);
            if self.ready_cameras.contains(id) {
                camera = camera.ready();
            }
            builder = builder.camera(camera);
        }
        for id in &self.lights {
            builder = builder.light(LightRef::new(id.clone(), registry.light(id)?));
        }
        if let Some(id) = &self.z_positioner {
            builder = builder.z_positioner(StageRef::new(id.clone(), registry.stage(id)?));
        }
        for id in &self.pattern_clients {
            builder = builder.pattern_client(AnalogRef::new(id.clone(), registry.analog(id)?));
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{CameraProfile, DeviceFile, LightProfile, StageProfile};
    use crate::time::Time;

    #[test]
    fn test_sequence_grid() {
        let seq = SimSequence::generate(3, 5, 488e-9).unwrap();
        assert_eq!(seq.len(), 15);
        // Phases innermost.
        assert_eq!(seq.steps()[0], SimStep { angle: 0.0, phase: 0.0 });
        assert_eq!(seq.steps()[1], SimStep { angle: 0.0, phase: 72.0 });
        assert_eq!(seq.steps()[5], SimStep { angle: 60.0, phase: 0.0 });
        assert_eq!(seq.steps()[14], SimStep { angle: 120.0, phase: 288.0 });
    }

    #[test]
    fn test_sequence_rejects_zero_counts() {
        assert!(SimSequence::generate(0, 5, 488e-9).is_err());
        assert!(SimSequence::generate(3, 0, 488e-9).is_err());
    }

    #[test]
    fn test_slice_count_flat_volume() {
        // Flat plans image exactly one slice, no extra top slice.
        assert_eq!(slice_count(0.0, 0.0, 1e-6).unwrap(), 1);
        assert_eq!(slice_count(1e-7, 1.0, 1e-6).unwrap(), 1);
    }

    #[test]
    fn test_slice_count_adds_top_slice() {
        assert_eq!(slice_count(5.0, 1.0, 1e-6).unwrap(), 6);
        assert_eq!(slice_count(10.0, 3.0, 1e-6).unwrap(), 5);
    }

    #[test]
    fn test_slice_count_rejects_bad_heights() {
        assert!(slice_count(-1.0, 1.0, 1e-6).is_err());
        assert!(slice_count(5.0, 0.0, 1e-6).is_err());
        assert!(slice_count(5.0, -2.0, 1e-6).is_err());
    }

    #[test]
    fn test_builder_requires_camera_and_reps() {
        let seq = SimSequence::generate(1, 1, 488e-9).unwrap();
        assert!(ExperimentPlan::builder(seq.clone()).build().is_err());

        let camera = CameraRef::new(
            "cam0",
            Arc::new(CameraProfile::new("cam0").with_exposure(Time::from_millis(50))),
        );
        assert!(ExperimentPlan::builder(seq)
            .camera(camera)
            .num_reps(0)
            .build()
            .is_err());
    }

    #[test]
    fn test_description_resolves_against_registry() {
        let devices = DeviceFile {
            cameras: vec![CameraProfile::new("cam0")
                .with_exposure(Time::from_millis(50))
                .with_inter_exposure_gap(Time::from_millis(10))],
            lights: vec![LightProfile::new("488nm")],
            stages: vec![StageProfile::new("zPiezo")
                .with_velocity(1.0)
                .with_settle(Time::from_millis(5))],
            analog_clients: vec![],
        };
        let registry = devices.into_registry();

        let description = PlanDescription {
            num_angles: 2,
            num_phases: 1,
            wavelength: 488e-9,
            z_start: 0.0,
            z_height: 2.0,
            slice_height: 1.0,
            cameras: vec![ResourceId::new("cam0")],
            ready_cameras: vec![ResourceId::new("cam0")],
            lights: vec![ResourceId::new("488nm")],
            z_positioner: Some(ResourceId::new("zPiezo")),
            pattern_clients: vec![],
            num_reps: 1,
        };
        let plan = description.resolve(&registry).unwrap();
        assert_eq!(plan.sequence.len(), 2);
        assert!(plan.cameras[0].ready);
        assert!(plan.z_positioner.is_some());

        // Unknown light id fails resolution.
        let mut broken = description;
        broken.lights.push(ResourceId::new("561nm"));
        assert!(broken.resolve(&registry).is_err());
    }
}
