//! Peer Session Manager.
//!
//! Opens and closes transports through a [`Connector`] and owns the audio
//! capture shared by every transport generation. The capture is acquired on
//! the first `open` and stopped only by [`PeerSessionManager::shutdown`], so
//! the microphone permission prompt never repeats across rollovers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;

use super::base::{
    AudioCapture, Connector, EventSender, RealtimeError, RealtimeResult, Transport, TransportId,
};
use crate::core::session::SessionCredential;

pub struct PeerSessionManager {
    connector: Arc<dyn Connector>,
    events: EventSender,
    capture: Mutex<Option<Arc<dyn AudioCapture>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl PeerSessionManager {
    pub fn new(connector: Arc<dyn Connector>, events: EventSender) -> Self {
        Self {
            connector,
            events,
            capture: Mutex::new(None),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Reserve the id of the next transport generation.
    pub fn allocate_id(&self) -> TransportId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// The shared capture, acquiring it on first use.
    pub async fn capture(&self) -> RealtimeResult<Arc<dyn AudioCapture>> {
        let mut slot = self.capture.lock().await;
        if self.is_shut_down() {
            return Err(RealtimeError::SessionClosed);
        }
        if let Some(capture) = slot.as_ref() {
            return Ok(capture.clone());
        }
        let capture = self.connector.acquire_capture().await?;
        tracing::debug!("Audio capture acquired");
        *slot = Some(capture.clone());
        Ok(capture)
    }

    /// Open transport `id` with `credential`, reusing the shared capture.
    pub async fn open(
        &self,
        id: TransportId,
        credential: &SessionCredential,
    ) -> RealtimeResult<Arc<dyn Transport>> {
        let capture = self.capture().await?;
        let transport = self
            .connector
            .open(id, credential, capture, self.events.clone())
            .await?;

        // Shut down while the offer/answer exchange was in flight.
        if self.is_shut_down() {
            transport.close().await;
            return Err(RealtimeError::SessionClosed);
        }
        tracing::debug!("Transport {} opened", id);
        Ok(transport)
    }

    /// Close one transport. The shared capture keeps running.
    pub async fn close(&self, transport: &Arc<dyn Transport>) {
        tracing::debug!("Closing transport {}", transport.id());
        transport.close().await;
    }

    /// Stop the shared capture and refuse further opens. Idempotent.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(capture) = self.capture.lock().await.take() {
            capture.stop();
            tracing::debug!("Audio capture stopped");
        }
    }
}
