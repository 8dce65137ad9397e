//! Selection dispatcher – drives each selection from capture to presentation.
//!
//! A single coordinating task owns the state machine
//! (`Idle → Capturing → Suggesting → Presenting → Idle`) and receives typed
//! events over a channel. Each suggestion runs in its own task and reports back
//! with the request id it was started for. Only a result whose id matches the
//! current request is presented; anything else was superseded and is dropped,
//! whatever order the results arrive in.

use futures_util::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::managers::suggestion::SuggestionEngine;
use crate::overlay::Presenter;
use crate::suggestion::{Point, SelectionEvent, SuggestionSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Idle,
    Capturing,
    Suggesting { request_id: u64 },
    Presenting { request_id: u64 },
    Stopped,
}

/// Internal conditions of a selection session. None of these reach the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SuggestError {
    #[error("selection is empty")]
    EmptyInput,
    #[error("request {0} was superseded by a newer selection")]
    Superseded(u64),
    #[error("suggestion task failed: {0}")]
    TaskFailed(String),
}

#[derive(Debug)]
pub enum DispatcherEvent {
    SelectionCaptured { text: String, origin: Point },
    SuggestionReady { request_id: u64, suggestions: SuggestionSet },
    SuggestionFailed { request_id: u64, error: SuggestError },
    Shutdown,
}

/// Capture-side handle. Cloning is not supported; share it behind an `Arc`.
pub struct DispatcherHandle {
    tx: mpsc::UnboundedSender<DispatcherEvent>,
    state_rx: watch::Receiver<DispatcherState>,
    coordinator: Mutex<Option<JoinHandle<()>>>,
}

impl DispatcherHandle {
    /// Start the coordinating task. Must be called from within a tokio runtime.
    pub fn spawn(engine: Arc<SuggestionEngine>, presenter: Arc<dyn Presenter>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(DispatcherState::Idle);

        let coordinator = Coordinator {
            engine,
            presenter,
            tx: tx.clone(),
            state_tx,
            next_request_id: 0,
            active: None,
            in_flight: HashMap::new(),
        };
        let handle = tokio::spawn(coordinator.run(rx).in_current_span());

        Self {
            tx,
            state_rx,
            coordinator: Mutex::new(Some(handle)),
        }
    }

    /// Capture collaborator entry point. Never blocks; returns `false` once stopped.
    pub fn on_selection(&self, text: impl Into<String>, origin: Point) -> bool {
        self.tx
            .send(DispatcherEvent::SelectionCaptured {
                text: text.into(),
                origin,
            })
            .is_ok()
    }

    pub fn state(&self) -> DispatcherState {
        *self.state_rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<DispatcherState> {
        self.state_rx.clone()
    }

    /// Abort in-flight suggestions, dismiss the overlay and stop the coordinator.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(DispatcherEvent::Shutdown);
        let handle = self.coordinator.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Dispatcher task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for DispatcherHandle {
    fn drop(&mut self) {
        let _ = self.tx.send(DispatcherEvent::Shutdown);
    }
}

struct Coordinator {
    engine: Arc<SuggestionEngine>,
    presenter: Arc<dyn Presenter>,
    tx: mpsc::UnboundedSender<DispatcherEvent>,
    state_tx: watch::Sender<DispatcherState>,
    next_request_id: u64,
    /// The one selection whose result may still be presented.
    active: Option<SelectionEvent>,
    in_flight: HashMap<u64, JoinHandle<()>>,
}

impl Coordinator {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<DispatcherEvent>) {
        debug!("Selection dispatcher started");
        while let Some(event) = rx.recv().await {
            match event {
                DispatcherEvent::SelectionCaptured { text, origin } => {
                    self.on_captured(text, origin)
                }
                DispatcherEvent::SuggestionReady {
                    request_id,
                    suggestions,
                } => self.on_ready(request_id, suggestions),
                DispatcherEvent::SuggestionFailed { request_id, error } => {
                    self.on_failed(request_id, error)
                }
                DispatcherEvent::Shutdown => break,
            }
        }
        self.teardown();
    }

    fn set_state(&self, state: DispatcherState) {
        self.state_tx.send_replace(state);
    }

    fn allocate_request_id(&mut self) -> u64 {
        self.next_request_id += 1;
        self.next_request_id
    }

    fn on_captured(&mut self, text: String, origin: Point) {
        self.set_state(DispatcherState::Capturing);

        // Every capture, empty or not, supersedes whatever is in flight.
        let request_id = self.allocate_request_id();
        if let Some(previous) = self.active.take() {
            debug!(
                superseded = previous.request_id,
                request_id, "New selection supersedes in-flight request"
            );
        }

        let text = text.trim();
        if text.is_empty() {
            debug!(request_id, reason = %SuggestError::EmptyInput, "Ignoring selection");
            self.presenter.dismiss();
            self.set_state(DispatcherState::Idle);
            return;
        }

        let event = SelectionEvent {
            text: text.to_string(),
            origin,
            request_id,
        };
        self.set_state(DispatcherState::Suggesting { request_id });
        self.spawn_suggestion(&event);
        self.active = Some(event);
    }

    fn spawn_suggestion(&mut self, event: &SelectionEvent) {
        let engine = Arc::clone(&self.engine);
        let tx = self.tx.clone();
        let request_id = event.request_id;
        let text = event.text.clone();

        let task = async move {
            let outcome = AssertUnwindSafe(engine.suggest(&text)).catch_unwind().await;
            let event = match outcome {
                Ok(suggestions) => DispatcherEvent::SuggestionReady {
                    request_id,
                    suggestions,
                },
                Err(panic) => DispatcherEvent::SuggestionFailed {
                    request_id,
                    error: SuggestError::TaskFailed(panic_message(panic.as_ref())),
                },
            };
            let _ = tx.send(event);
        };

        let handle = tokio::spawn(task.instrument(info_span!("suggest", request_id)));
        self.in_flight.insert(request_id, handle);
    }

    fn take_if_current(&mut self, request_id: u64) -> Option<SelectionEvent> {
        self.in_flight.remove(&request_id);
        let current = self.active.as_ref().map(|a| a.request_id);
        if current == Some(request_id) {
            return self.active.take();
        }
        debug!(
            request_id,
            current,
            reason = %SuggestError::Superseded(request_id),
            "Discarding result"
        );
        None
    }

    fn on_ready(&mut self, request_id: u64, suggestions: SuggestionSet) {
        let Some(event) = self.take_if_current(request_id) else {
            return;
        };

        self.set_state(DispatcherState::Presenting { request_id });
        info!(
            request_id,
            count = suggestions.len(),
            "Presenting suggestions"
        );
        self.presenter.present(&suggestions, event.origin);
        self.set_state(DispatcherState::Idle);
    }

    fn on_failed(&mut self, request_id: u64, error: SuggestError) {
        if self.take_if_current(request_id).is_none() {
            return;
        }
        warn!(request_id, error = %error, "Suggestion failed");
        self.presenter.dismiss();
        self.set_state(DispatcherState::Idle);
    }

    fn teardown(&mut self) {
        let aborted = self.in_flight.len();
        for (_, handle) in self.in_flight.drain() {
            handle.abort();
        }
        self.active = None;
        self.presenter.dismiss();
        self.set_state(DispatcherState::Stopped);
        info!(aborted, "Selection dispatcher stopped");
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
