//! Still capture bookkeeping: one ticket per request, each resolved once.

use crate::errors::CameraError;
use crate::types::{CameraPosition, CaptureRequest, CaptureTicket, CapturedImage};
use chrono::{DateTime, Utc};
use image::DynamicImage;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

pub type CaptureResult = Result<CapturedImage, CameraError>;

/// Completion invoked exactly once per accepted ticket.
pub type CaptureCompletion = Box<dyn FnOnce(CaptureResult) + Send + 'static>;

pub(crate) struct PendingCapture {
    pub completion: CaptureCompletion,
    pub request: CaptureRequest,
    pub position: CameraPosition,
    pub submitted_at: DateTime<Utc>,
}

struct RegistryInner {
    next_ticket: u64,
    pending: BTreeMap<CaptureTicket, PendingCapture>,
    completed: u64,
    failed: u64,
    rejected: u64,
}

/// Maps outstanding tickets to their completions.
///
/// Requests beyond `max_pending` are rejected up front instead of replacing
/// an earlier completion.
pub(crate) struct CaptureRegistry {
    max_pending: usize,
    inner: Mutex<RegistryInner>,
}

impl CaptureRegistry {
    pub fn new(max_pending: usize) -> Self {
        Self {
            max_pending: max_pending.max(1),
            inner: Mutex::new(RegistryInner {
                next_ticket: 1,
                pending: BTreeMap::new(),
                completed: 0,
                failed: 0,
                rejected: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Hands the completion back when the registry is full.
    pub fn register(
        &self,
        request: CaptureRequest,
        position: CameraPosition,
        completion: CaptureCompletion,
    ) -> Result<CaptureTicket, CaptureCompletion> {
        let mut g = self.lock();
        if g.pending.len() >= self.max_pending {
            g.rejected += 1;
            return Err(completion);
        }

        let ticket = CaptureTicket(g.next_ticket);
        g.next_ticket += 1;
        g.pending.insert(
            ticket,
            PendingCapture {
                completion,
                request,
                position,
                submitted_at: Utc::now(),
            },
        );
        Ok(ticket)
    }

    /// Removes the ticket; whoever gets it back must invoke the completion.
    pub fn take(&self, ticket: CaptureTicket) -> Option<PendingCapture> {
        self.lock().pending.remove(&ticket)
    }

    pub fn take_all(&self) -> Vec<(CaptureTicket, PendingCapture)> {
        std::mem::take(&mut self.lock().pending).into_iter().collect()
    }

    pub fn record_outcome(&self, success: bool) {
        let mut g = self.lock();
        if success {
            g.completed += 1;
        } else {
            g.failed += 1;
        }
    }

    pub fn pending_tickets(&self) -> Vec<CaptureTicket> {
        self.lock().pending.keys().copied().collect()
    }

    pub fn counters(&self) -> CaptureCounters {
        let g = self.lock();
        CaptureCounters {
            pending: g.pending.len(),
            completed: g.completed,
            failed: g.failed,
            rejected: g.rejected,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CaptureCounters {
    pub pending: usize,
    pub completed: u64,
    pub failed: u64,
    pub rejected: u64,
}

/// Decode the compressed bytes a photo output hands back.
pub fn decode_still(data: &[u8]) -> Result<DynamicImage, CameraError> {
    image::load_from_memory(data).map_err(|e| {
        log::debug!("Failed to decode still image ({} bytes): {}", data.len(), e);
        CameraError::Unknown
    })
}
