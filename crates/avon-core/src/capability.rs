//! Backend capability traits and the [`CapabilityTable`] that binds them.
//!
//! A backend implements one trait per role:
//!
//! | Role | Trait | Bound |
//! |---|---|---|
//! | clock | [`ClockSource`] | once, shared by all models |
//! | pose / geometry | [`MotionState`] | once, shared by all models |
//! | data / command / config | [`InterfaceHandler`] | once per [`InterfaceKind`] |
//!
//! Handlers are shared by every model of a kind; the model's [`Handle`]
//! selects the instance.  Every trait method has a default returning
//! [`BackendError::Unsupported`], so a backend only implements the
//! operations it supports.

use std::collections::HashMap;

use avon_types::{
    AvonError, BackendError, Geom, InterfaceConfig, InterfaceData, InterfaceKind, Message, Pva,
};

use crate::clock::{Clock, ClockSource};
use crate::registry::Handle;

/// Read and write the pose, velocity, acceleration and geometry of models.
pub trait MotionState {
    fn get_pva(&mut self, handle: Handle) -> Result<Pva, BackendError> {
        let _ = handle;
        Err(BackendError::Unsupported)
    }

    fn set_pva(&mut self, handle: Handle, pva: &Pva) -> Result<(), BackendError> {
        let _ = (handle, pva);
        Err(BackendError::Unsupported)
    }

    fn get_geom(&mut self, handle: Handle) -> Result<Geom, BackendError> {
        let _ = handle;
        Err(BackendError::Unsupported)
    }

    fn set_geom(&mut self, handle: Handle, geom: &Geom) -> Result<(), BackendError> {
        let _ = (handle, geom);
        Err(BackendError::Unsupported)
    }
}

/// Data, command and configuration access for one interface kind.
pub trait InterfaceHandler {
    fn get_data(&mut self, handle: Handle) -> Result<InterfaceData, BackendError> {
        let _ = handle;
        Err(BackendError::Unsupported)
    }

    fn set_command(&mut self, handle: Handle, command: &Message) -> Result<(), BackendError> {
        let _ = (handle, command);
        Err(BackendError::Unsupported)
    }

    fn set_config(&mut self, handle: Handle, config: &InterfaceConfig) -> Result<(), BackendError> {
        let _ = (handle, config);
        Err(BackendError::Unsupported)
    }

    fn get_config(&mut self, handle: Handle) -> Result<InterfaceConfig, BackendError> {
        let _ = handle;
        Err(BackendError::Unsupported)
    }
}

/// Process-wide capability bindings.
#[derive(Default)]
pub struct CapabilityTable {
    clock: Clock,
    motion: Option<Box<dyn MotionState>>,
    interfaces: HashMap<InterfaceKind, Box<dyn InterfaceHandler>>,
}

impl CapabilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the clock source.  Replaces any previous source.
    pub fn bind_clock(&mut self, source: Box<dyn ClockSource>) {
        self.clock.set_source(source);
    }

    /// Install the motion-state handler.  Replaces any previous handler.
    pub fn bind_motion_state(&mut self, handler: Box<dyn MotionState>) {
        self.motion = Some(handler);
    }

    /// Install the handler for `kind`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`AvonError::InvalidInterface`] for reserved kinds.
    pub fn bind_interface(
        &mut self,
        kind: InterfaceKind,
        handler: Box<dyn InterfaceHandler>,
    ) -> Result<(), AvonError> {
        if !kind.is_usable() {
            return Err(AvonError::InvalidInterface(kind.to_string()));
        }
        self.interfaces.insert(kind, handler);
        Ok(())
    }

    pub fn clock_mut(&mut self) -> &mut Clock {
        &mut self.clock
    }

    pub fn motion_mut(&mut self) -> Option<&mut (dyn MotionState + 'static)> {
        self.motion.as_deref_mut()
    }

    pub fn interface_mut(
        &mut self,
        kind: InterfaceKind,
    ) -> Option<&mut (dyn InterfaceHandler + 'static)> {
        self.interfaces.get_mut(&kind).map(|h| h.as_mut())
    }

    pub fn has_motion_state(&self) -> bool {
        self.motion.is_some()
    }

    pub fn is_bound(&self, kind: InterfaceKind) -> bool {
        self.interfaces.contains_key(&kind)
    }

    /// Drop every handler and reset the clock to the system clock.
    pub fn clear(&mut self) {
        self.motion = None;
        self.interfaces.clear();
        self.clock = Clock::default();
    }
}
