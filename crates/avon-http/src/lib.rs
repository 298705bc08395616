//! `avon-http` – HTTP front end for the Avon server
//!
//! Wraps an [`avon_core::Server`] in an axum HTTP transport:
//!
//! 1. **Routes** `/{model}/pva`, `/{model}/geom` and
//!    `/{model}/{kind}/data|cmd|cfg` to the core dispatcher, mapping every
//!    [`AvonError`] onto an HTTP status with the error as a JSON body.
//!
//! 2. **Lists** the registered model tree at `GET /models`.
//!
//! 3. **Serves** any other path as a static file from the configured root
//!    directory.
//!
//! # Usage
//!
//! ```rust,no_run
//! use avon_core::ServerConfig;
//!
//! let (mut server, _interrupter) = avon_http::init(ServerConfig::default()).unwrap();
//! // register models and install handlers here
//! server.start().unwrap();
//! loop {
//!     server.wait().unwrap();
//! }
//! ```

pub mod response;
pub mod route;
pub mod transport;

use avon_core::{Server, ServerConfig};
use avon_types::AvonError;

pub use response::{ApiError, PayloadResponse, TIME_HEADER, status_for};
pub use route::MAX_BODY_BYTES;
pub use transport::{HttpTransport, Interrupter};

/// Bind the HTTP transport and create a server in the registering phase.
///
/// # Errors
///
/// [`AvonError::Init`] for port `0`, a missing root directory or an invalid
/// config; [`AvonError::Transport`] when the port cannot be bound.  Use
/// [`HttpTransport::bind`] directly for an ephemeral port.
pub fn init(config: ServerConfig) -> Result<(Server, Interrupter), AvonError> {
    if config.port == 0 {
        return Err(AvonError::Init("port must not be 0".to_string()));
    }
    config.validate()?;
    let transport = HttpTransport::bind(&config)?;
    let interrupter = transport.interrupter();
    let server = Server::init(config, Box::new(transport))?;
    Ok((server, interrupter))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_rejects_port_zero() {
        let config = ServerConfig {
            port: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(init(config), Err(AvonError::Init(_))));
    }

    #[test]
    fn init_rejects_empty_host_before_binding() {
        let config = ServerConfig {
            host: " ".to_string(),
            ..ServerConfig::default()
        };
        assert!(matches!(init(config), Err(AvonError::Init(_))));
    }
}
