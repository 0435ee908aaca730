//! Inbound frame dispatch.
//!
//! The transport calls [`Dispatcher::dispatch`] once per frame, each on its own
//! task. The returned `bool` is a local report only: failures here (undecodable
//! frames, responses nobody is waiting for, calls to undeclared functions) are
//! logged and never reach a caller of the module API.

use std::sync::Arc;

use protocol::{
    DataHandler, DispatchFuture, FunctionCallRequest, FunctionCallResponse, HookName, JsonCodec, Message,
    RequestId, RequestIdGenerator,
};
use serde_json::Value;
use tracing::{debug, warn};

use crate::correlator::{CorrelatorHandle, WeakCorrelatorHandle};
use crate::registry::{FunctionRegistry, HookRegistry};
use crate::ModuleError;

pub(crate) struct Dispatcher {
    pub(crate) codec: JsonCodec,
    pub(crate) ids: Arc<RequestIdGenerator>,
    pub(crate) functions: Arc<FunctionRegistry>,
    pub(crate) hooks: Arc<HookRegistry>,
    pub(crate) correlator: WeakCorrelatorHandle,
}

impl Dispatcher {
    /// Wraps this dispatcher as a transport data handler.
    pub(crate) fn into_data_handler(self) -> DataHandler {
        let dispatcher = Arc::new(self);
        Arc::new(move |frame: Vec<u8>| -> DispatchFuture {
            let dispatcher = Arc::clone(&dispatcher);
            Box::pin(async move { dispatcher.dispatch(&frame).await })
        })
    }

    pub(crate) async fn dispatch(&self, frame: &[u8]) -> bool {
        let Some(correlator) = self.correlator.upgrade() else {
            debug!("module dropped; inbound frame ignored");
            return false;
        };

        match self.codec.decode(frame) {
            Message::RegisterModuleResponse(response) => {
                correlator.resolve(response.request_id, Ok(Value::Bool(true))).await
            }
            Message::DeclareFunctionResponse(response) => {
                correlator.resolve(response.request_id, Ok(Value::Bool(true))).await
            }
            Message::RegisterHookResponse(response) => {
                correlator.resolve(response.request_id, Ok(Value::Bool(true))).await
            }
            Message::FunctionCallResponse(response) => {
                correlator.resolve(response.request_id, Ok(response.data)).await
            }
            Message::TriggerHookRequest(trigger) => {
                self.hook_fired(&correlator, trigger.request_id, Some(trigger.hook))
                    .await
            }
            Message::TriggerHookResponse(trigger) => {
                self.hook_fired(&correlator, trigger.request_id, trigger.hook)
                    .await
            }
            Message::FunctionCallRequest(call) => self.function_called(correlator, call).await,
            Message::Error(error) => {
                warn!(code = %error.error, request_id = ?error.request_id, "bus reported an error");
                if let Some(request_id) = error.request_id {
                    correlator
                        .resolve(request_id, Err(ModuleError::Remote { code: error.error }))
                        .await;
                }
                false
            }
            message @ (Message::RegisterModuleRequest(_)
            | Message::RegisterHookRequest(_)
            | Message::DeclareFunctionRequest(_)) => {
                warn!(
                    kind = ?message.kind(),
                    request_id = ?message.request_id(),
                    "unexpected inbound request kind"
                );
                false
            }
            Message::Unknown => {
                warn!(frame_len = frame.len(), "dropping undecodable frame");
                false
            }
        }
    }

    async fn hook_fired(
        &self,
        correlator: &CorrelatorHandle,
        request_id: RequestId,
        hook: Option<HookName>,
    ) -> bool {
        match hook {
            Some(hook) if hook.is_activation() => {
                if correlator.activate().await.is_err() {
                    return false;
                }
            }
            Some(hook) if hook.is_deactivation() => {
                if correlator.deactivate().await.is_err() {
                    return false;
                }
            }
            Some(hook) => {
                let listeners = self.hooks.listeners(&hook);
                debug!(%hook, listeners = listeners.len(), "hook fired");
                for listener in listeners {
                    listener();
                }
            }
            None => debug!(%request_id, "own hook trigger acknowledged"),
        }

        // Completes our own TriggerHook request when this is its echo; any
        // other request id has no pending entry and is dropped.
        correlator.resolve(request_id, Ok(Value::Bool(true))).await;
        true
    }

    async fn function_called(&self, correlator: CorrelatorHandle, call: FunctionCallRequest) -> bool {
        let Some(handler) = self.functions.get(&call.function) else {
            warn!(
                function = %call.function,
                request_id = %call.request_id,
                "call for undeclared function; no response sent"
            );
            return false;
        };

        debug!(function = %call.function, request_id = %call.request_id, "serving function call");
        let data = handler(call.arguments).await;

        let request_id = self.ids.next_id();
        let response = Message::from(FunctionCallResponse {
            request_id: request_id.clone(),
            data,
        });
        let frame = match self.codec.encode(&response) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(%error, function = %call.function, "failed to encode function result");
                return false;
            }
        };

        let completion = match correlator.send(request_id, frame).await {
            Ok(completion) => completion,
            Err(error) => {
                warn!(%error, function = %call.function, "failed to send function result");
                return false;
            }
        };
        drop(correlator);

        matches!(completion.await, Ok(Ok(_)))
    }
}
