//! `avon-core` – Model registry, capability dispatch and event loop
//!
//! The transport-independent heart of the Avon server.  A backend registers
//! its models and installs capability handlers, then hands control to the
//! [`Server`] event loop, which routes each inbound request to the right
//! handler and encodes the reply.
//!
//! # Modules
//!
//! - [`registry`] – [`ModelRegistry`]: named models arranged in a
//!   parent/child tree, each tagged with one interface kind and an opaque
//!   backend [`Handle`].
//! - [`capability`] – the [`MotionState`] and [`InterfaceHandler`] traits a
//!   backend implements, and the [`CapabilityTable`] that holds them.
//! - [`clock`] – [`Clock`]: monotonic microsecond timestamps for outgoing
//!   records.
//! - [`codec`] – JSON encoding of every record, with the size caps enforced.
//! - [`dispatcher`] – [`Dispatcher`]: resolves a [`Request`] against the
//!   registry and invokes the bound handler.
//! - [`transport`] – the [`Transport`] seam and the in-process [`Loopback`].
//! - [`server`] – [`Server`]: two-phase lifecycle and the `wait` / `check`
//!   event loop.
//! - [`sim`] – [`SimWorld`]: a simulated backend with robots, rangers and
//!   fiducial finders.

pub mod capability;
pub mod clock;
pub mod codec;
pub mod dispatcher;
pub mod registry;
pub mod server;
pub mod sim;
pub mod transport;

pub use capability::{CapabilityTable, InterfaceHandler, MotionState};
pub use clock::{Clock, ClockSource, SystemClock};
pub use codec::{Encoding, Payload};
pub use dispatcher::{Dispatcher, Request};
pub use registry::{Handle, Model, ModelId, ModelRegistry, ModelSummary};
pub use server::{DEFAULT_PORT, Phase, Server, ServerConfig};
pub use sim::{SimWorld, SimWorldBuilder};
pub use transport::{Inbound, Loopback, LoopbackClient, Outcome, Token, Transport, WaitPolicy};
