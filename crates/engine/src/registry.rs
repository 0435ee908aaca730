//! Locally declared functions and hook listeners.
//!
//! Both registries are shared between the public API (writers) and the inbound
//! dispatcher (readers). Readers clone the handler `Arc`s out and release the
//! lock before invoking anything, so a handler may itself declare functions or
//! register hooks without deadlocking.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use protocol::{Arguments, FunctionName, HookName};
use serde_json::Value;
use tracing::debug;

/// Future returned by a [`FunctionHandler`].
pub type FunctionFuture = Pin<Box<dyn Future<Output = Value> + Send + 'static>>;

/// Serves inbound calls to one declared function.
pub type FunctionHandler = Arc<dyn Fn(Arguments) -> FunctionFuture + Send + Sync>;

/// Called, without a payload, each time a subscribed hook fires.
pub type HookListener = Arc<dyn Fn() + Send + Sync>;

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

/// Function name → handler. Entries are never removed.
#[derive(Default)]
pub(crate) struct FunctionRegistry {
    handlers: RwLock<HashMap<FunctionName, FunctionHandler>>,
}

impl FunctionRegistry {
    /// Installs `handler`, replacing any earlier handler for the same name.
    pub(crate) fn insert(&self, function: FunctionName, handler: FunctionHandler) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        if handlers.insert(function.clone(), handler).is_some() {
            debug!(%function, "replaced existing function handler");
        }
    }

    pub(crate) fn get(&self, function: &FunctionName) -> Option<FunctionHandler> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(function)
            .cloned()
    }
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// Hook name → listeners in registration order.
#[derive(Default)]
pub(crate) struct HookRegistry {
    listeners: RwLock<HashMap<HookName, Vec<HookListener>>>,
}

impl HookRegistry {
    pub(crate) fn add(&self, hook: HookName, listener: HookListener) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(hook)
            .or_default()
            .push(listener);
    }

    /// Snapshot of the listeners for `hook`, oldest first.
    pub(crate) fn listeners(&self, hook: &HookName) -> Vec<HookListener> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(hook)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn last_declared_handler_wins() {
        let registry = FunctionRegistry::default();
        let name = FunctionName::try_from("answer").unwrap();

        registry.insert(name.clone(), Arc::new(|_: Arguments| -> FunctionFuture { Box::pin(async { json!(1) }) }));
        registry.insert(name.clone(), Arc::new(|_: Arguments| -> FunctionFuture { Box::pin(async { json!(2) }) }));

        let handler = registry.get(&name).expect("handler is registered");
        assert_eq!(handler(Arguments::new()).await, json!(2));
    }

    #[test]
    fn unknown_function_has_no_handler() {
        let registry = FunctionRegistry::default();
        assert!(registry.get(&FunctionName::try_from("missing").unwrap()).is_none());
    }

    #[test]
    fn listeners_keep_registration_order() {
        let registry = HookRegistry::default();
        let hook = HookName::try_from("build.done").unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let calls = Arc::clone(&calls);
            registry.add(hook.clone(), Arc::new(move || calls.lock().unwrap().push(tag)));
        }
        for listener in registry.listeners(&hook) {
            listener();
        }

        assert_eq!(*calls.lock().unwrap(), ["first", "second", "third"]);
        assert!(registry.listeners(&HookName::try_from("other").unwrap()).is_empty());
    }
}
