//! Sequence planner: converts an [`ExperimentPlan`] into an action table.
//!
//! `generate` is a single-pass state machine with no backtracking:
//!
//! 1. **Arm phase**: cameras not in a known-ready state get a re-arm entry
//!    at the start of the schedule; the cursor advances past the longest
//!    reported reset window.
//! 2. **Z-slice loop**, per slice: move the stage (the entry is scheduled
//!    at the instant the move begins, and the cursor then waits out travel
//!    plus settle), then for every angle/phase step write the pattern-client
//!    indices, run the exposure sub-procedure, and wait the inter-trigger
//!    latch margin. A redundant hold re-asserts the slice altitude after the
//!    burst so a setpoint-snapping executor cannot drift.
//! 3. **Return phase**: move back to the start altitude and append a final
//!    hold at `max(cursor + settle, camera_ready)`, so a back-to-back
//!    repetition cannot begin before every camera has drained its pipeline.
//!
//! Planning is a pure computation: the planner consults only the capability
//! traits (offline timing estimates) and the table's own readiness query. No
//! hardware is touched, no suspension occurs, and the same plan with the
//! same oracles produces a bit-identical table.

use std::collections::HashMap;

use tracing::debug;

use crate::config::PlannerSettings;
use crate::error::{SeqResult, SequencerError};
use crate::plan::{slice_count, CameraRef, ExperimentPlan, LightRef};
use crate::resource::{MotionEstimate, ResourceId};
use crate::table::{ActionPayload, ActionTable};
use crate::time::Time;

/// Output of a planning run: the table plus per-camera scheduled-image
/// counts (bookkeeping for the external executor and metadata writer).
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedAcquisition {
    /// The finished, per-resource time-ordered command ledger.
    pub table: ActionTable,
    /// Number of images scheduled per camera.
    pub image_counts: HashMap<ResourceId, u32>,
}

/// Single-use planner. Construct with the run's settings, call
/// [`SequencePlanner::generate`] once.
pub struct SequencePlanner {
    settings: PlannerSettings,
    image_counts: HashMap<ResourceId, u32>,
}

/// Converts a timing-oracle miss into the configuration error surfaced to
/// the `generate` caller. A schedule built on a missing parameter is unsafe
/// to execute.
fn required<T>(result: SeqResult<T>) -> SeqResult<T> {
    result.map_err(|err| match err {
        SequencerError::UnavailableTiming { resource, quantity } => {
            SequencerError::Configuration(format!(
                "required timing '{quantity}' is unavailable for resource '{resource}'"
            ))
        }
        other => other,
    })
}

impl SequencePlanner {
    /// Creates a planner with the given scheduling margins.
    pub fn new(settings: PlannerSettings) -> Self {
        Self {
            settings,
            image_counts: HashMap::new(),
        }
    }

    /// Builds the complete action table for `plan`.
    ///
    /// All-or-nothing: any configuration or timing failure aborts the run
    /// with no partial table.
    pub fn generate(mut self, plan: ExperimentPlan) -> SeqResult<PlannedAcquisition> {
        let mut table = ActionTable::new();
        let mut cursor = Time::ZERO;

        // Arm phase: re-arm every camera that is not known-ready. A falling
        // edge on the trigger input re-arms the acquisition pipeline.
        let mut arm_complete = cursor;
        for camera in plan.cameras.iter().filter(|camera| !camera.ready) {
            let reset = required(camera.device.reset_time())?;
            table.append_with_busy(
                cursor,
                camera.id.clone(),
                ActionPayload::SetDigital(false),
                reset,
            )?;
            arm_complete = arm_complete.max(cursor + reset);
        }
        cursor = arm_complete;

        // Inter-step latch margin: the configured delay, widened by the
        // slowest attached pattern client. Queried fresh every run since
        // client attachment can change between runs.
        let mut step_margin = self.settings.inter_trigger_delay;
        for client in &plan.pattern_clients {
            step_margin = step_margin.max(required(client.device.settle_time())?);
        }

        let slices = slice_count(
            plan.z_height,
            plan.slice_height,
            self.settings.extra_slice_threshold,
        )?;
        debug!(
            slices,
            steps = plan.sequence.len(),
            cameras = plan.cameras.len(),
            "generating action table"
        );

        let mut prev_altitude: Option<f64> = None;
        let mut z_target = plan.z_start;
        for z_index in 0..slices {
            z_target = plan.z_start + plan.slice_height * z_index as f64;
            if let Some(stage) = &plan.z_positioner {
                let estimate = match prev_altitude {
                    Some(prev) => required(stage.device.motion_time(prev, z_target))?,
                    None => MotionEstimate::default(),
                };
                // Scheduled at the instant the move begins; nothing else runs
                // until the axis has travelled and settled.
                table.append_with_busy(
                    cursor,
                    stage.id.clone(),
                    ActionPayload::MoveAbsolute(z_target),
                    estimate.total(),
                )?;
                cursor += estimate.total();
            }
            prev_altitude = Some(z_target);

            for step in 0..plan.sequence.len() {
                for client in &plan.pattern_clients {
                    table.append(cursor, client.id.clone(), ActionPayload::Custom(step))?;
                }
                cursor = self.expose(&mut table, cursor, &plan.cameras, &plan.lights)?;
                cursor += step_margin;
            }

            if let Some(stage) = &plan.z_positioner {
                // Redundant hold pins the altitude through the burst.
                table.append(cursor, stage.id.clone(), ActionPayload::MoveAbsolute(z_target))?;
            }
        }

        // Return phase: back to the start altitude for the next repetition.
        let mut settle = Time::ZERO;
        if let Some(stage) = &plan.z_positioner {
            let estimate = required(stage.device.motion_time(z_target, plan.z_start))?;
            cursor += estimate.travel;
            table.append_with_busy(
                cursor,
                stage.id.clone(),
                ActionPayload::MoveAbsolute(plan.z_start),
                estimate.settle,
            )?;
            settle = estimate.settle;
        }

        // Cross-camera pipeline drain; only relevant when another repetition
        // follows immediately.
        let mut camera_ready = Time::ZERO;
        if plan.num_reps > 1 {
            for camera in &plan.cameras {
                camera_ready = camera_ready.max(table.earliest_available(&camera.id));
            }
        }
        let hold_at = (cursor + settle).max(camera_ready);
        if let Some(stage) = &plan.z_positioner {
            table.append(hold_at, stage.id.clone(), ActionPayload::MoveAbsolute(plan.z_start))?;
        }
        for light in &plan.lights {
            table.append(hold_at, light.id.clone(), ActionPayload::SetDigital(false))?;
        }
        if plan.z_positioner.is_none() && plan.lights.is_empty() {
            // No hold-bearing resource in the plan: park the table on the
            // cameras themselves. The falling edge doubles as a re-arm for
            // the next repetition.
            for camera in &plan.cameras {
                table.append(hold_at, camera.id.clone(), ActionPayload::SetDigital(false))?;
            }
        }

        debug!(entries = table.len(), end = %table.end_time(), "action table complete");
        Ok(PlannedAcquisition {
            table,
            image_counts: self.image_counts,
        })
    }

    /// Exposure sub-procedure: raise every light and trigger every camera at
    /// `cursor`, then return the exposure end time.
    ///
    /// The acquisition window is the widest `exposure + gap` across the
    /// cameras. Commands are issued speculatively at `cursor` (triggers are
    /// cheap and non-blocking); the returned end time is
    /// `max(last_ready, cursor + acquisition)`, so downstream steps are
    /// delayed by the true busy period without rewriting appended
    /// timestamps.
    fn expose(
        &mut self,
        table: &mut ActionTable,
        cursor: Time,
        cameras: &[CameraRef],
        lights: &[LightRef],
    ) -> SeqResult<Time> {
        let mut acquisition = Time::ZERO;
        let mut last_ready = Time::ZERO;
        let mut busy_windows = Vec::with_capacity(cameras.len());
        for camera in cameras {
            let exposure = required(camera.device.exposure_time())?;
            // The gap can depend on the exposure set for this run; read it
            // fresh, never from a cache.
            let gap = required(camera.device.inter_exposure_gap())?;
            let window = exposure + gap;
            busy_windows.push(window);
            acquisition = acquisition.max(window);
            last_ready = last_ready.max(table.earliest_available(&camera.id));
        }

        for light in lights {
            table.append(cursor, light.id.clone(), ActionPayload::SetDigital(true))?;
        }
        for (camera, window) in cameras.iter().zip(busy_windows) {
            table.append_with_busy(
                cursor,
                camera.id.clone(),
                ActionPayload::SetDigital(true),
                window,
            )?;
            *self.image_counts.entry(camera.id.clone()).or_insert(0) += 1;
        }

        Ok(last_ready.max(cursor + acquisition))
    }
}
