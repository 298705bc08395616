//! [`HttpTransport`] – HTTP front end for the event loop.
//!
//! The axum server runs on a private tokio runtime.  It answers `/models` and
//! static files itself and forwards API requests to the event-loop thread
//! over a channel.  The event loop replies through a one-shot channel held
//! under the request's [`Token`].
//!
//! ```text
//!  client ──► axum handler ──(mpsc)──► poll() ──► Server::dispatch
//!    ▲                                                   │
//!    └──────────── axum handler ◄──(oneshot)── respond() ◄┘
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use avon_core::{Inbound, ModelSummary, Outcome, ServerConfig, Token, Transport, WaitPolicy};
use avon_types::AvonError;
use axum::http::{HeaderValue, header};
use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{debug, info, warn};

use crate::route::{AppState, Event, router};

const EVENT_QUEUE: usize = 1024;

/// Wakes a blocked [`Server::wait`](avon_core::Server::wait) from another
/// thread, e.g. a Ctrl-C handler.
#[derive(Clone)]
pub struct Interrupter {
    events: mpsc::Sender<Event>,
}

impl Interrupter {
    pub fn interrupt(&self) {
        // A full queue already wakes the loop.
        let _ = self.events.try_send(Event::Interrupt);
    }
}

pub struct HttpTransport {
    runtime: Runtime,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    root_dir: PathBuf,
    server_header: HeaderValue,
    events_tx: mpsc::Sender<Event>,
    events_rx: mpsc::Receiver<Event>,
    models: watch::Sender<Arc<Vec<ModelSummary>>>,
    pending: HashMap<Token, oneshot::Sender<Outcome>>,
    next_token: Token,
    serve_task: Option<JoinHandle<()>>,
}

impl HttpTransport {
    /// Bind the listening socket.  Port `0` binds an ephemeral port; see
    /// [`HttpTransport::local_addr`].
    ///
    /// # Errors
    ///
    /// [`AvonError::Init`] when the root directory does not exist, the
    /// backend identity is not a valid header value or the runtime cannot be
    /// built; [`AvonError::Transport`] when binding fails.
    pub fn bind(config: &ServerConfig) -> Result<Self, AvonError> {
        if !config.root_dir.is_dir() {
            return Err(AvonError::Init(format!(
                "root directory {} does not exist",
                config.root_dir.display()
            )));
        }
        let server_header =
            HeaderValue::try_from(format!("{}/{}", config.backend_name, config.backend_version))
                .map_err(|e| AvonError::Init(format!("backend identity: {e}")))?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("avon-http")
            .enable_all()
            .build()
            .map_err(|e| AvonError::Init(format!("tokio runtime: {e}")))?;

        let addr = format!("{}:{}", config.host, config.port);
        let listener = runtime
            .block_on(TcpListener::bind(&addr))
            .map_err(|e| AvonError::Transport(format!("bind error on {addr}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| AvonError::Transport(format!("local address: {e}")))?;

        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
        let (models, _) = watch::channel(Arc::new(Vec::new()));
        Ok(Self {
            runtime,
            listener: Some(listener),
            local_addr,
            root_dir: config.root_dir.clone(),
            server_header,
            events_tx,
            events_rx,
            models,
            pending: HashMap::new(),
            next_token: 0,
            serve_task: None,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn interrupter(&self) -> Interrupter {
        Interrupter {
            events: self.events_tx.clone(),
        }
    }

    fn admit(&mut self, event: Event, ready: &mut Vec<Inbound>) {
        match event {
            Event::Request { request, reply } => {
                let token = self.next_token;
                self.next_token += 1;
                self.pending.insert(token, reply);
                ready.push(Inbound { token, request });
            }
            Event::Interrupt => debug!("event loop interrupted"),
        }
    }
}

impl Transport for HttpTransport {
    fn start(&mut self) -> Result<(), AvonError> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| AvonError::Transport("http transport already started".to_string()))?;
        let state = Arc::new(AppState {
            events: self.events_tx.clone(),
            models: self.models.subscribe(),
        });
        let app = router(state, &self.root_dir).layer(SetResponseHeaderLayer::overriding(
            header::SERVER,
            self.server_header.clone(),
        ));
        self.serve_task = Some(self.runtime.spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                warn!(error = %e, "http server stopped");
            }
        }));
        info!(addr = %self.local_addr, root = %self.root_dir.display(), "http transport listening");
        Ok(())
    }

    fn poll(&mut self, policy: WaitPolicy) -> Result<Vec<Inbound>, AvonError> {
        let mut ready = Vec::new();
        if policy == WaitPolicy::Block {
            let event = self
                .events_rx
                .blocking_recv()
                .ok_or_else(|| AvonError::Transport("event channel closed".to_string()))?;
            self.admit(event, &mut ready);
        }
        while let Ok(event) = self.events_rx.try_recv() {
            self.admit(event, &mut ready);
        }
        Ok(ready)
    }

    fn respond(&mut self, token: Token, outcome: Outcome) -> Result<(), AvonError> {
        let reply = self
            .pending
            .remove(&token)
            .ok_or_else(|| AvonError::Transport(format!("no pending request for token {token}")))?;
        if reply.send(outcome).is_err() {
            debug!(token, "client went away before the response was ready");
        }
        Ok(())
    }

    fn publish_models(&mut self, models: &[ModelSummary]) {
        self.models.send_replace(Arc::new(models.to_vec()));
    }

    fn shutdown(&mut self) {
        if let Some(task) = self.serve_task.take() {
            task.abort();
        }
        self.listener = None;
        self.pending.clear();
        info!(addr = %self.local_addr, "http transport closed");
    }
}
