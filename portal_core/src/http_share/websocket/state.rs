//! Shared state for upload sessions

use crate::TransferEvent;
use crate::config::ReceiverConfig;
use crate::transfer::PathGuard;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

/// State shared by every connection on one server
pub struct UploadState {
    pub guard: Arc<PathGuard>,
    pub config: ReceiverConfig,
    pub event_tx: Option<mpsc::Sender<TransferEvent>>,
    /// Sessions currently running
    active_count: AtomicUsize,
}

impl UploadState {
    pub fn new(guard: PathGuard) -> Self {
        Self {
            guard: Arc::new(guard),
            config: ReceiverConfig::default(),
            event_tx: None,
            active_count: AtomicUsize::new(0),
        }
    }

    pub fn with_events(mut self, event_tx: mpsc::Sender<TransferEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn with_config(mut self, config: ReceiverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn active_sessions(&self) -> usize {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Count a session in; the returned guard counts it out when dropped
    pub(super) fn enter(self: &Arc<Self>) -> ActiveSession {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        ActiveSession {
            state: self.clone(),
        }
    }
}

pub(super) struct ActiveSession {
    state: Arc<UploadState>,
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.state.active_count.fetch_sub(1, Ordering::SeqCst);
    }
}
