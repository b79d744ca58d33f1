//! Device registry scoped to one experiment run.
//!
//! Instead of a process-wide device directory, the planner is handed an
//! explicit [`DeviceRegistry`] mapping resource ids to capability handles.
//! Plans resolve their named resources against the registry once, at
//! construction time; a missing id or a capability mismatch is a
//! configuration error, not a runtime dispatch failure.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{SeqResult, SequencerError};
use crate::resource::{AnalogSettable, Exposable, Positionable, ResourceId, Triggerable};

/// Erased capability handle stored in the registry.
#[derive(Clone)]
pub enum CapabilityHandle {
    /// Camera-like resource.
    Camera(Arc<dyn Exposable>),
    /// Digital light source or trigger line.
    Light(Arc<dyn Triggerable>),
    /// Positionable stage axis.
    Stage(Arc<dyn Positionable>),
    /// Analog pattern-generator client.
    Analog(Arc<dyn AnalogSettable>),
}

impl CapabilityHandle {
    /// Human-readable capability name, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            CapabilityHandle::Camera(_) => "camera",
            CapabilityHandle::Light(_) => "light",
            CapabilityHandle::Stage(_) => "stage",
            CapabilityHandle::Analog(_) => "analog client",
        }
    }

    /// Downcast to an exposable camera handle.
    pub fn as_camera(&self) -> Option<Arc<dyn Exposable>> {
        match self {
            CapabilityHandle::Camera(dev) => Some(dev.clone()),
            _ => None,
        }
    }

    /// Downcast to a triggerable light handle.
    pub fn as_light(&self) -> Option<Arc<dyn Triggerable>> {
        match self {
            CapabilityHandle::Light(dev) => Some(dev.clone()),
            _ => None,
        }
    }

    /// Downcast to a positionable stage handle.
    pub fn as_stage(&self) -> Option<Arc<dyn Positionable>> {
        match self {
            CapabilityHandle::Stage(dev) => Some(dev.clone()),
            _ => None,
        }
    }

    /// Downcast to an analog-settable client handle.
    pub fn as_analog(&self) -> Option<Arc<dyn AnalogSettable>> {
        match self {
            CapabilityHandle::Analog(dev) => Some(dev.clone()),
            _ => None,
        }
    }
}

/// Registry of the devices available to a single planning run.
#[derive(Clone, Default)]
pub struct DeviceRegistry {
    devices: HashMap<ResourceId, CapabilityHandle>,
}

impl DeviceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a camera under `id`.
    pub fn register_camera(&mut self, id: impl Into<ResourceId>, device: Arc<dyn Exposable>) {
        self.devices.insert(id.into(), CapabilityHandle::Camera(device));
    }

    /// Registers a light source under `id`.
    pub fn register_light(&mut self, id: impl Into<ResourceId>, device: Arc<dyn Triggerable>) {
        self.devices.insert(id.into(), CapabilityHandle::Light(device));
    }

    /// Registers a stage axis under `id`.
    pub fn register_stage(&mut self, id: impl Into<ResourceId>, device: Arc<dyn Positionable>) {
        self.devices.insert(id.into(), CapabilityHandle::Stage(device));
    }

    /// Registers an analog pattern-generator client under `id`.
    pub fn register_analog(&mut self, id: impl Into<ResourceId>, device: Arc<dyn AnalogSettable>) {
        self.devices.insert(id.into(), CapabilityHandle::Analog(device));
    }

    /// Raw lookup.
    pub fn get(&self, id: &ResourceId) -> Option<&CapabilityHandle> {
        self.devices.get(id)
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    fn resolve(&self, id: &ResourceId, expected: &'static str) -> SeqResult<&CapabilityHandle> {
        self.devices.get(id).ok_or_else(|| {
            SequencerError::Configuration(format!("no {expected} registered under id '{id}'"))
        })
    }

    fn mismatch(id: &ResourceId, expected: &'static str, found: &CapabilityHandle) -> SequencerError {
        SequencerError::Configuration(format!(
            "resource '{id}' is a {} but a {expected} was required",
            found.kind()
        ))
    }

    /// Resolves `id` to a camera handle.
    pub fn camera(&self, id: &ResourceId) -> SeqResult<Arc<dyn Exposable>> {
        let handle = self.resolve(id, "camera")?;
        handle
            .as_camera()
            .ok_or_else(|| Self::mismatch(id, "camera", handle))
    }

    /// Resolves `id` to a light handle.
    pub fn light(&self, id: &ResourceId) -> SeqResult<Arc<dyn Triggerable>> {
        let handle = self.resolve(id, "light")?;
        handle
            .as_light()
            .ok_or_else(|| Self::mismatch(id, "light", handle))
    }

    /// Resolves `id` to a stage handle.
    pub fn stage(&self, id: &ResourceId) -> SeqResult<Arc<dyn Positionable>> {
        let handle = self.resolve(id, "stage")?;
        handle
            .as_stage()
            .ok_or_else(|| Self::mismatch(id, "stage", handle))
    }

    /// Resolves `id` to an analog client handle.
    pub fn analog(&self, id: &ResourceId) -> SeqResult<Arc<dyn AnalogSettable>> {
        let handle = self.resolve(id, "analog client")?;
        handle
            .as_analog()
            .ok_or_else(|| Self::mismatch(id, "analog client", handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{CameraProfile, LightProfile};
    use crate::time::Time;

    #[test]
    fn test_resolution_and_mismatch() {
        let mut registry = DeviceRegistry::new();
        registry.register_camera(
            "cam0",
            Arc::new(
                CameraProfile::new("cam0")
                    .with_exposure(Time::from_millis(50))
                    .with_inter_exposure_gap(Time::from_millis(10)),
            ),
        );
        registry.register_light("488nm", Arc::new(LightProfile::new("488nm")));

        assert!(registry.camera(&ResourceId::new("cam0")).is_ok());
        assert!(registry.light(&ResourceId::new("488nm")).is_ok());

        // Wrong capability.
        let err = registry.camera(&ResourceId::new("488nm")).unwrap_err();
        assert!(err.to_string().contains("light"));

        // Unknown id.
        let err = registry.camera(&ResourceId::new("cam9")).unwrap_err();
        assert!(matches!(err, SequencerError::Configuration(_)));
    }
}
