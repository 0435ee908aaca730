//! Newtype identifiers.
//!
//! Every name that travels on the wire is a distinct newtype wrapping a
//! non-empty `String`. This prevents accidentally passing a hook name where a
//! function name is expected even though both are plain strings on the wire.
//! Deserialisation goes through the same non-empty check, so a frame carrying
//! `"requestId": ""` never produces a [`RequestId`].

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::EmptyIdentifier;

/// Hook fired by the bus once this module's registration is complete.
pub const ACTIVATED_HOOK: &str = "juno.activated";

/// Hook fired by the bus when this module must go back to buffering.
pub const DEACTIVATED_HOOK: &str = "juno.deactivated";

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), TryFrom<String>,
// From<Self> for String, Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = EmptyIdentifier;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value).ok_or(EmptyIdentifier(stringify!($name)))
            }
        }

        impl TryFrom<&str> for $name {
            type Error = EmptyIdentifier;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                Self::try_from(value.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// String-backed identifiers
// ---------------------------------------------------------------------------

string_id! {
    /// Correlates a request with its eventual response.
    ///
    /// Opaque to the engine. Locally generated ids have the form
    /// `<moduleId>-<nanoseconds>`; see [`RequestIdGenerator`].
    RequestId
}

string_id! {
    /// Identifies a module on the bus (e.g. `"mod-a"`).
    ModuleId
}

string_id! {
    /// Names a function a module declares and other modules call.
    FunctionName
}

string_id! {
    /// Names a pub/sub hook.
    ///
    /// Two names are reserved for bus control signals: [`ACTIVATED_HOOK`] and
    /// [`DEACTIVATED_HOOK`].
    HookName
}

impl HookName {
    /// Returns `true` for the bus activation signal.
    pub fn is_activation(&self) -> bool {
        self.0 == ACTIVATED_HOOK
    }

    /// Returns `true` for the bus deactivation signal.
    pub fn is_deactivation(&self) -> bool {
        self.0 == DEACTIVATED_HOOK
    }

    /// Returns `true` if this name is a control signal rather than a user hook.
    pub fn is_reserved(&self) -> bool {
        self.is_activation() || self.is_deactivation()
    }
}

// ---------------------------------------------------------------------------
// Error codes
// ---------------------------------------------------------------------------

/// Numeric error code carried by an error frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(u32);

impl ErrorCode {
    /// Creates an error code from its raw value.
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the underlying integer value.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Request id generation
// ---------------------------------------------------------------------------

/// Produces [`RequestId`]s of the form `<moduleId>-<nanoseconds>`.
///
/// The nanosecond component is the wall clock, bumped by one whenever the
/// clock has not moved past the previously issued value. Ids from one
/// generator are therefore strictly increasing and never repeat, even when two
/// requests are built within the same clock tick.
#[derive(Debug)]
pub struct RequestIdGenerator {
    module_id: ModuleId,
    last: AtomicI64,
}

impl RequestIdGenerator {
    /// Creates a generator that prefixes every id with `module_id`.
    pub fn new(module_id: ModuleId) -> Self {
        Self {
            module_id,
            last: AtomicI64::new(0),
        }
    }

    /// Returns the module id used as the prefix.
    pub fn module_id(&self) -> &ModuleId {
        &self.module_id
    }

    /// Issues the next request id.
    pub fn next_id(&self) -> RequestId {
        let now = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX - 1);
        let mut previous = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(previous.saturating_add(1));
            match self.last.compare_exchange_weak(
                previous,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return RequestId(format!("{}-{}", self.module_id, candidate)),
                Err(actual) => previous = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_identifiers_are_rejected() {
        assert!(RequestId::new("").is_none());
        assert_eq!(
            HookName::try_from(""),
            Err(EmptyIdentifier("HookName"))
        );
    }

    #[test]
    fn empty_identifier_fails_deserialisation() {
        let parsed: Result<FunctionName, _> = serde_json::from_str("\"\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn reserved_hooks_are_recognised() {
        let activated = HookName::try_from(ACTIVATED_HOOK).unwrap();
        let deactivated = HookName::try_from(DEACTIVATED_HOOK).unwrap();
        let user = HookName::try_from("build.done").unwrap();

        assert!(activated.is_activation() && activated.is_reserved());
        assert!(deactivated.is_deactivation() && deactivated.is_reserved());
        assert!(!user.is_reserved());
    }

    #[test]
    fn generated_ids_are_prefixed_and_strictly_increasing() {
        let generator = RequestIdGenerator::new(ModuleId::try_from("mod-a").unwrap());
        assert_eq!(generator.module_id().as_str(), "mod-a");

        let stamps: Vec<i64> = (0..1000)
            .map(|_| {
                let id = generator.next_id();
                let stamp = id
                    .as_str()
                    .strip_prefix("mod-a-")
                    .expect("module id prefix");
                stamp.parse().expect("nanosecond suffix")
            })
            .collect();

        assert!(stamps.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
