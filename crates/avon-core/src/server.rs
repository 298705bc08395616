//! [`Server`] – lifecycle and event loop.
//!
//! ```text
//!   init ──► register / install ──► start ──► wait | check … ──► shutdown
//!            (Registering)                    (Serving)           (Shutdown)
//! ```
//!
//! Models and capabilities can only be added while the server is in the
//! registering phase; once [`Server::start`] is called they are read-only
//! and further registration fails with [`AvonError::RegistrationClosed`].
//!
//! The event loop is single-threaded: [`Server::wait`] and [`Server::check`]
//! run every ready request through the [`Dispatcher`] on the calling thread,
//! so backend callbacks never run concurrently with each other.

use std::path::PathBuf;

use avon_types::{AvonError, InterfaceKind};
use tracing::{debug, info, warn};

use crate::capability::{InterfaceHandler, MotionState};
use crate::clock::ClockSource;
use crate::codec::Payload;
use crate::dispatcher::{Dispatcher, Request};
use crate::registry::{Handle, ModelId, ModelRegistry};
use crate::transport::{Transport, WaitPolicy};

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 8000;

/// Server start-up parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory static files are served from.
    pub root_dir: PathBuf,
    /// Log every request at `info` instead of `debug`.
    pub verbose: bool,
    /// Backend identity, reported to clients for diagnostics only.
    pub backend_name: String,
    pub backend_version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            root_dir: PathBuf::from("."),
            verbose: false,
            backend_name: "avon".to_string(),
            backend_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Check the arguments that do not depend on the transport.
    ///
    /// # Errors
    ///
    /// [`AvonError::Init`] for an empty host or backend name.
    pub fn validate(&self) -> Result<(), AvonError> {
        if self.host.trim().is_empty() {
            return Err(AvonError::Init("host must not be empty".to_string()));
        }
        if self.backend_name.trim().is_empty() {
            return Err(AvonError::Init("backend name must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Lifecycle phase of a [`Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Registering,
    Serving,
    Shutdown,
}

pub struct Server {
    config: ServerConfig,
    dispatcher: Dispatcher,
    transport: Box<dyn Transport>,
    phase: Phase,
}

impl Server {
    /// Create a server in the registering phase.
    ///
    /// # Errors
    ///
    /// [`AvonError::Init`] when `config` is invalid.
    pub fn init(config: ServerConfig, transport: Box<dyn Transport>) -> Result<Self, AvonError> {
        config.validate()?;
        info!(
            backend = %config.backend_name,
            version = %config.backend_version,
            "avon server initialised"
        );
        Ok(Self {
            config,
            dispatcher: Dispatcher::new(),
            transport,
            phase: Phase::Registering,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn registry(&self) -> &ModelRegistry {
        self.dispatcher.registry()
    }

    fn ensure_registering(&self) -> Result<(), AvonError> {
        if self.phase == Phase::Registering {
            Ok(())
        } else {
            Err(AvonError::RegistrationClosed)
        }
    }

    // ── Registration phase ───────────────────────────────────────────────

    /// Register a model.  See [`ModelRegistry::register`] for the errors.
    pub fn register_model(
        &mut self,
        name: &str,
        prototype: &str,
        interface: InterfaceKind,
        parent: Option<&str>,
        handle: impl Into<Handle>,
    ) -> Result<ModelId, AvonError> {
        self.ensure_registering()?;
        let id = self.dispatcher.registry_mut().register(
            name,
            prototype,
            interface,
            parent,
            handle.into(),
        )?;
        debug!(model = name, prototype, %interface, parent, "model registered");
        Ok(id)
    }

    pub fn install_clock(&mut self, source: impl ClockSource + 'static) -> Result<(), AvonError> {
        self.ensure_registering()?;
        self.dispatcher
            .capabilities_mut()
            .bind_clock(Box::new(source));
        Ok(())
    }

    pub fn install_motion_state(
        &mut self,
        handler: impl MotionState + 'static,
    ) -> Result<(), AvonError> {
        self.ensure_registering()?;
        self.dispatcher
            .capabilities_mut()
            .bind_motion_state(Box::new(handler));
        Ok(())
    }

    pub fn install_interface(
        &mut self,
        kind: InterfaceKind,
        handler: impl InterfaceHandler + 'static,
    ) -> Result<(), AvonError> {
        self.ensure_registering()?;
        self.dispatcher
            .capabilities_mut()
            .bind_interface(kind, Box::new(handler))?;
        debug!(%kind, "interface handler installed");
        Ok(())
    }

    // ── Serving phase ────────────────────────────────────────────────────

    /// Start accepting connections.  Closes registration.
    pub fn start(&mut self) -> Result<(), AvonError> {
        self.ensure_registering()?;
        self.transport.start()?;
        let models = self.registry().tree();
        self.transport.publish_models(&models);
        self.phase = Phase::Serving;
        info!(
            host = %self.config.host,
            port = self.config.port,
            models = self.registry().len(),
            "avon server serving"
        );
        Ok(())
    }

    /// Block until at least one transport event occurs, then process every
    /// ready request.  Returns the number of requests dispatched.
    pub fn wait(&mut self) -> Result<usize, AvonError> {
        self.process_ready(WaitPolicy::Block)
    }

    /// Process the requests that are already ready and return immediately.
    pub fn check(&mut self) -> Result<usize, AvonError> {
        self.process_ready(WaitPolicy::NonBlocking)
    }

    fn process_ready(&mut self, policy: WaitPolicy) -> Result<usize, AvonError> {
        if self.phase != Phase::Serving {
            return Err(AvonError::Init(format!(
                "server is not serving (phase {:?})",
                self.phase
            )));
        }
        let ready = self.transport.poll(policy)?;
        let count = ready.len();
        for inbound in ready {
            let outcome = self.handle(&inbound.request);
            self.transport.respond(inbound.token, outcome)?;
        }
        Ok(count)
    }

    fn handle(&mut self, request: &Request) -> Result<Payload, AvonError> {
        let outcome = self.dispatcher.dispatch(request);
        match &outcome {
            Ok(payload) if self.config.verbose => info!(
                model = %request.model,
                interface = %request.interface,
                operation = %request.operation,
                bytes = payload.body.len(),
                "request served"
            ),
            Ok(payload) => debug!(
                model = %request.model,
                operation = %request.operation,
                bytes = payload.body.len(),
                "request served"
            ),
            Err(e) => warn!(
                model = %request.model,
                operation = %request.operation,
                error = %e,
                "request failed"
            ),
        }
        outcome
    }

    /// Execute a request directly, bypassing the transport.  Only allowed
    /// while serving.
    pub fn dispatch(&mut self, request: &Request) -> Result<Payload, AvonError> {
        if self.phase != Phase::Serving {
            return Err(AvonError::Init("server is not serving".to_string()));
        }
        self.handle(request)
    }

    /// Release the transport, the registry and every capability binding.
    pub fn shutdown(&mut self) {
        if self.phase == Phase::Shutdown {
            return;
        }
        self.transport.shutdown();
        self.dispatcher.clear();
        self.phase = Phase::Shutdown;
        info!("avon server shut down");
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
    }
}
