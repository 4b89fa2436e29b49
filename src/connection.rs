//! Current-connection bookkeeping
//!
//! The dispatcher holds exactly one of these. It tracks at most one live
//! handle as "current"; closing resets it to absent and the next use lazily
//! falls back to the engine's default handle.
use std::sync::Arc;

use tracing::debug;

use crate::engine::{Engine, EngineError, SessionHandle};

pub struct ConnectionManager {
    engine: Arc<dyn Engine>,
    current: Option<SessionHandle>,
}

impl ConnectionManager {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            current: None,
        }
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// The current handle, if any. Never creates one.
    pub fn current(&self) -> Option<&SessionHandle> {
        self.current.as_ref()
    }

    /// The engine's shared default handle.
    pub fn default_handle(&self) -> Result<SessionHandle, EngineError> {
        self.engine.default_session()
    }

    /// Open a fresh handle from a connection string.
    pub fn open(&self, target: &str) -> Result<SessionHandle, EngineError> {
        debug!(target = %target, "opening connection");
        self.engine.open(target)
    }

    /// Replace the current handle. The previous handle (if any) is simply
    /// released; this layer does not garbage-collect abandoned connections.
    pub fn set_current(&mut self, handle: SessionHandle) {
        self.current = Some(handle);
    }

    /// Reset to absent without closing, used when the engine reports the
    /// handle broken.
    pub fn reset(&mut self) {
        self.current = None;
    }

    /// The current handle, creating and committing the default one if absent.
    pub fn current_or_default(&mut self) -> Result<SessionHandle, EngineError> {
        if self.current.is_none() {
            debug!("no current connection, falling back to default handle");
            self.current = Some(self.engine.default_session()?);
        }
        Ok(self.current.as_ref().expect("just set").clone())
    }

    /// Close the current handle and reset to absent. Closing when absent is a
    /// no-op. The handle is reset before the close error (if any) surfaces.
    pub fn close(&mut self) -> Result<(), EngineError> {
        match self.current.take() {
            Some(handle) => handle.close(),
            None => Ok(()),
        }
    }
}
