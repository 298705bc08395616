//! The [`Transport`] seam between the event loop and the outside world.
//!
//! A transport accepts connections, frames requests and writes responses.
//! The core only sees complete [`Request`]s tagged with a [`Token`] and
//! answers each one through [`Transport::respond`].
//!
//! [`Loopback`] is an in-process transport: requests are queued by a
//! [`LoopbackClient`] and processed on the next [`Server::check`] call.  It
//! is used for embedding the server without sockets and in tests.
//!
//! [`Server::check`]: crate::server::Server::check

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use avon_types::AvonError;

use crate::codec::Payload;
use crate::dispatcher::Request;
use crate::registry::ModelSummary;

/// Identifies an in-flight request so its response can be routed back.
pub type Token = u64;

/// Whether [`Transport::poll`] may suspend the calling thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Wait until at least one event is ready.
    Block,
    /// Only collect events that are already ready.
    NonBlocking,
}

/// A complete inbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub token: Token,
    pub request: Request,
}

/// Outcome of one request, as handed back to the transport.
pub type Outcome = Result<Payload, AvonError>;

pub trait Transport {
    /// Begin accepting connections.
    fn start(&mut self) -> Result<(), AvonError>;

    /// Collect the requests that are ready.  With [`WaitPolicy::Block`] the
    /// call first waits for at least one transport event; that event may
    /// carry no request (e.g. a new connection or an interrupt).
    fn poll(&mut self, policy: WaitPolicy) -> Result<Vec<Inbound>, AvonError>;

    /// Deliver the outcome of the request identified by `token`.
    fn respond(&mut self, token: Token, outcome: Outcome) -> Result<(), AvonError>;

    /// Receive the final model list.  Called once when serving starts; the
    /// registry is read-only from then on.
    fn publish_models(&mut self, models: &[ModelSummary]) {
        let _ = models;
    }

    /// Release sockets and any other transport resources.
    fn shutdown(&mut self) {}
}

// ─────────────────────────────────────────────────────────────────────────────
// Loopback
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct LoopbackState {
    next_token: Token,
    pending: VecDeque<Inbound>,
    responses: HashMap<Token, Outcome>,
    models: Vec<ModelSummary>,
    started: bool,
}

/// In-process transport.  Create with [`Loopback::new`], which also returns
/// the client half.
pub struct Loopback {
    state: Rc<RefCell<LoopbackState>>,
}

/// Client half of a [`Loopback`] transport.
#[derive(Clone)]
pub struct LoopbackClient {
    state: Rc<RefCell<LoopbackState>>,
}

impl Loopback {
    pub fn new() -> (Self, LoopbackClient) {
        let state = Rc::new(RefCell::new(LoopbackState::default()));
        (
            Self {
                state: Rc::clone(&state),
            },
            LoopbackClient { state },
        )
    }
}

impl Transport for Loopback {
    fn start(&mut self) -> Result<(), AvonError> {
        self.state.borrow_mut().started = true;
        Ok(())
    }

    fn poll(&mut self, policy: WaitPolicy) -> Result<Vec<Inbound>, AvonError> {
        let mut state = self.state.borrow_mut();
        if policy == WaitPolicy::Block && state.pending.is_empty() {
            // Nothing can enqueue while this thread is blocked.
            return Err(AvonError::Transport(
                "loopback has no pending requests to wait for".to_string(),
            ));
        }
        Ok(state.pending.drain(..).collect())
    }

    fn respond(&mut self, token: Token, outcome: Outcome) -> Result<(), AvonError> {
        self.state.borrow_mut().responses.insert(token, outcome);
        Ok(())
    }

    fn publish_models(&mut self, models: &[ModelSummary]) {
        self.state.borrow_mut().models = models.to_vec();
    }

    fn shutdown(&mut self) {
        let mut state = self.state.borrow_mut();
        state.started = false;
        state.pending.clear();
    }
}

impl LoopbackClient {
    /// Queue a request and return its token.
    pub fn send(&self, request: Request) -> Token {
        let mut state = self.state.borrow_mut();
        let token = state.next_token;
        state.next_token += 1;
        state.pending.push_back(Inbound { token, request });
        token
    }

    /// Take the response for `token`, if it has been produced.
    pub fn take_response(&self, token: Token) -> Option<Outcome> {
        self.state.borrow_mut().responses.remove(&token)
    }

    pub fn pending(&self) -> usize {
        self.state.borrow().pending.len()
    }

    /// Models published when the server started.
    pub fn models(&self) -> Vec<ModelSummary> {
        self.state.borrow().models.clone()
    }

    pub fn is_started(&self) -> bool {
        self.state.borrow().started
    }
}
