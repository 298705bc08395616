//! `avon-types` – shared records for the Avon robot telemetry server.
//!
//! - [`geometry`] – [`Pva`], [`Geom`] and [`Bounds`], used by every interface.
//! - [`interface`] – [`InterfaceKind`], the ranger and fiducial records, the
//!   opaque [`Message`] envelope and the hard size caps.
//! - [`operation`] – the eight addressable [`Operation`]s.
//! - [`error`] – [`AvonError`] and the backend-side [`BackendError`].

pub mod error;
pub mod geometry;
pub mod interface;
pub mod operation;

pub use error::{AvonError, BackendError};
pub use geometry::{Bounds, Geom, Pose6, Pva};
pub use interface::{
    FIDUCIALS_DETECTED_MAX, Fiducial, FiducialConfig, FiducialScan, InterfaceConfig,
    InterfaceData, InterfaceKind, Message, RANGER_SAMPLES_MAX, RANGER_TRANSDUCERS_MAX,
    RangerConfig, RangerSample, RangerScan, RangerTransducer, RangerTransducerConfig,
};
pub use operation::Operation;
