//! Engine configuration.

use std::time::Duration;

/// Tunables for a [`crate::JunoModule`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleConfig {
    /// How long an awaited [`crate::PendingResponse`] waits before failing with
    /// [`crate::ModuleError::Timeout`].
    ///
    /// `None` (the default) waits for as long as the process lives; the bus
    /// protocol has no notion of request expiry.
    pub request_timeout: Option<Duration>,
}

impl ModuleConfig {
    /// Returns a copy of this configuration with `timeout` applied to every
    /// request.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}
