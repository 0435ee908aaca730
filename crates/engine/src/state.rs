//! Registration state of a module.

/// Where a module is in its registration lifecycle.
///
/// There is no terminal state: closing the transport ends the module's useful
/// life without resetting this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModuleState {
    /// `initialize` has not run yet; nothing can be sent.
    #[default]
    Unregistered,
    /// Registration was sent (or the bus deactivated us); requests are buffered.
    Buffering,
    /// The bus fired `juno.activated`; requests go straight to the transport.
    Active,
}

impl ModuleState {
    /// Returns `true` if outbound requests are written immediately.
    pub fn is_active(self) -> bool {
        self == Self::Active
    }
}

impl std::fmt::Display for ModuleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Unregistered => "unregistered",
            Self::Buffering => "buffering",
            Self::Active => "active",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_active_writes_immediately() {
        assert!(ModuleState::Active.is_active());
        assert!(!ModuleState::Buffering.is_active());
        assert!(!ModuleState::default().is_active());
        assert_eq!(ModuleState::Buffering.to_string(), "buffering");
    }
}
