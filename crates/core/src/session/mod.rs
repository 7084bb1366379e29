//! Per-stream reassembly sessions.
//!
//! Each media stream (SSRC + payload type) gets its own
//! [`FrameAssembler`], created lazily when its first packet is routed.
//! Sessions never coordinate with each other; the registry lock is only
//! held long enough to look one up or insert it, and packet processing
//! then runs under that session's own lock.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::assembler::{AccessUnit, AssemblerConfig, FrameAssembler, Ingest, StreamKey};
use crate::error::Result;
use crate::media::rtp::RtpPacket;

/// Thread-safe registry of reassembly sessions keyed by [`StreamKey`].
///
/// Cloning is cheap and yields a handle onto the same sessions.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<StreamKey, Arc<FrameAssembler>>>>,
    config: AssemblerConfig,
}

impl SessionRegistry {
    pub fn new(config: AssemblerConfig) -> Self {
        SessionRegistry {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Look up the session for `key`, creating it if needed.
    pub fn get_or_create(&self, key: StreamKey) -> Arc<FrameAssembler> {
        if let Some(session) = self.sessions.read().get(&key) {
            return session.clone();
        }

        let mut sessions = self.sessions.write();
        let total = sessions.len();
        sessions
            .entry(key)
            .or_insert_with(|| {
                tracing::debug!(
                    ssrc = format_args!("{:#010X}", key.ssrc),
                    pt = key.payload_type,
                    total_sessions = total + 1,
                    "session created"
                );
                Arc::new(FrameAssembler::new(self.config.clone()))
            })
            .clone()
    }

    /// Feed a packet to the session of its stream.
    pub fn route(&self, packet: &RtpPacket) -> Result<Ingest> {
        self.get_or_create(StreamKey::of(packet)).push(packet)
    }

    pub fn get(&self, key: StreamKey) -> Option<Arc<FrameAssembler>> {
        self.sessions.read().get(&key).cloned()
    }

    /// Remove and return a session (e.g. when its track is unsubscribed).
    pub fn remove(&self, key: StreamKey) -> Option<Arc<FrameAssembler>> {
        let mut sessions = self.sessions.write();
        let removed = sessions.remove(&key);
        if removed.is_some() {
            let total = sessions.len();
            tracing::debug!(
                ssrc = format_args!("{:#010X}", key.ssrc),
                pt = key.payload_type,
                total_sessions = total,
                "session removed"
            );
        }
        removed
    }

    pub fn keys(&self) -> Vec<StreamKey> {
        self.sessions.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Poll every session at `now` and take each access unit that is ready.
    ///
    /// Drives idle-timeout completion for streams that have stopped sending.
    pub fn take_ready_at(&self, now: Instant) -> Vec<(StreamKey, AccessUnit)> {
        let sessions: Vec<(StreamKey, Arc<FrameAssembler>)> = self
            .sessions
            .read()
            .iter()
            .map(|(k, s)| (*k, s.clone()))
            .collect();

        let mut ready: Vec<(StreamKey, AccessUnit)> = sessions
            .into_iter()
            .filter_map(|(k, s)| s.poll_and_take_at(now).map(|frame| (k, frame)))
            .collect();
        ready.sort_by_key(|(k, _)| *k);
        ready
    }

    pub fn take_ready(&self) -> Vec<(StreamKey, AccessUnit)> {
        self.take_ready_at(Instant::now())
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(AssemblerConfig::default())
    }
}
