//! The public module API.

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use protocol::{
    Arguments, DeclareFunctionRequest, Dependencies, FunctionCallRequest, FunctionName, HookName,
    JsonCodec, Message, ModuleId, RegisterHookRequest, RegisterModuleRequest, RequestId,
    RequestIdGenerator, Transport, TriggerHookRequest,
};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

use crate::correlator::{Completion, Correlator, CorrelatorHandle};
use crate::dispatch::Dispatcher;
use crate::registry::{
    FunctionFuture, FunctionHandler, FunctionRegistry, HookListener, HookRegistry,
};
use crate::{ModuleConfig, ModuleError, ModuleState};

// ---------------------------------------------------------------------------
// Pending responses
// ---------------------------------------------------------------------------

/// A request that has been sent or buffered and awaits its response.
///
/// Await it directly (`pending.await`) to get the response value: `true` for
/// bare acknowledgements, the returned data for function calls.
#[must_use = "a pending response does nothing unless awaited"]
pub struct PendingResponse {
    request_id: RequestId,
    receiver: oneshot::Receiver<Completion>,
    timeout: Option<Duration>,
    correlator: CorrelatorHandle,
}

impl PendingResponse {
    /// The correlation id of the request.
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    async fn wait(self) -> Result<Value, ModuleError> {
        let Self {
            request_id,
            receiver,
            timeout,
            correlator,
        } = self;

        let outcome = match timeout {
            None => receiver.await,
            Some(limit) => match tokio::time::timeout(limit, receiver).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    debug!(%request_id, ?limit, "request timed out");
                    correlator.forget(request_id.clone());
                    return Err(ModuleError::Timeout {
                        request_id,
                        timeout: limit,
                    });
                }
            },
        };
        outcome.map_err(|_| ModuleError::EngineStopped)?
    }
}

impl IntoFuture for PendingResponse {
    type Output = Result<Value, ModuleError>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

impl std::fmt::Debug for PendingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingResponse")
            .field("request_id", &self.request_id)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Module
// ---------------------------------------------------------------------------

/// Per-registration state created by [`JunoModule::initialize`].
#[derive(Clone)]
struct Session {
    ids: Arc<RequestIdGenerator>,
    correlator: CorrelatorHandle,
}

/// A module on the Juno bus.
///
/// Construct it around a [`Transport`], call [`initialize`](Self::initialize)
/// once, then declare functions, call functions, and work with hooks. Every
/// operation except [`close`](Self::close) returns a [`PendingResponse`].
///
/// Requests issued before the bus activates the module are buffered and sent
/// in one write on activation. Must be used from within a Tokio runtime.
pub struct JunoModule {
    transport: Arc<dyn Transport>,
    config: ModuleConfig,
    codec: JsonCodec,
    functions: Arc<FunctionRegistry>,
    hooks: Arc<HookRegistry>,
    initializing: AtomicBool,
    session: RwLock<Option<Session>>,
}

impl JunoModule {
    /// Creates an unregistered module that will talk through `transport`.
    pub fn new(transport: Arc<dyn Transport>, config: ModuleConfig) -> Self {
        Self {
            transport,
            config,
            codec: JsonCodec::new(),
            functions: Arc::default(),
            hooks: Arc::default(),
            initializing: AtomicBool::new(false),
            session: RwLock::new(None),
        }
    }

    /// Opens the transport and registers this module with the bus.
    ///
    /// The registration frame is written immediately; the module then buffers
    /// all other requests until the bus fires `juno.activated`. The returned
    /// response resolves to `true` when the bus acknowledges registration.
    ///
    /// Fails with [`ModuleError::AlreadyRegistered`] if called more than once.
    #[instrument(skip(self, dependencies), fields(dependencies = dependencies.len()))]
    pub async fn initialize(
        &self,
        module_id: &str,
        version: &str,
        dependencies: Dependencies,
    ) -> Result<PendingResponse, ModuleError> {
        if self.initializing.swap(true, Ordering::AcqRel) {
            return Err(ModuleError::AlreadyRegistered);
        }

        let registered = match ModuleId::try_from(module_id) {
            Ok(module_id) => self.register(module_id, version, dependencies).await,
            Err(error) => Err(error.into()),
        };
        match registered {
            Ok(pending) => Ok(pending),
            Err(error) => {
                *self.session.write().unwrap_or_else(PoisonError::into_inner) = None;
                self.initializing.store(false, Ordering::Release);
                Err(error)
            }
        }
    }

    async fn register(
        &self,
        module_id: ModuleId,
        version: &str,
        dependencies: Dependencies,
    ) -> Result<PendingResponse, ModuleError> {
        let ids = Arc::new(RequestIdGenerator::new(module_id.clone()));
        let request_id = ids.next_id();
        let frame = self.encode(
            RegisterModuleRequest {
                request_id: request_id.clone(),
                module_id,
                version: version.to_owned(),
                dependencies,
            }
            .into(),
        )?;

        debug!(module_id = %ids.module_id(), %request_id, "starting module session");
        let correlator = Correlator::spawn(Arc::clone(&self.transport));
        let dispatcher = Dispatcher {
            codec: self.codec,
            ids: Arc::clone(&ids),
            functions: Arc::clone(&self.functions),
            hooks: Arc::clone(&self.hooks),
            correlator: correlator.downgrade(),
        };
        self.transport.set_data_handler(dispatcher.into_data_handler());
        self.transport.open().await?;

        let receiver = match correlator.register(request_id.clone(), frame).await {
            Ok(receiver) => receiver,
            Err(error) => {
                if let Err(close_error) = self.transport.close() {
                    debug!(%close_error, "transport close after failed registration");
                }
                return Err(error);
            }
        };

        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(Session {
            ids,
            correlator: correlator.clone(),
        });
        Ok(self.pending(request_id, receiver, correlator))
    }

    /// Declares `function` on the bus and serves inbound calls to it with
    /// `handler`.
    ///
    /// Declaring the same name again replaces the handler.
    pub async fn declare_function<F, Fut>(
        &self,
        function: &str,
        handler: F,
    ) -> Result<PendingResponse, ModuleError>
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Value> + Send + 'static,
    {
        let session = self.session()?;
        let function = FunctionName::try_from(function)?;

        let handler: FunctionHandler =
            Arc::new(move |arguments: Arguments| -> FunctionFuture { Box::pin(handler(arguments)) });
        self.functions.insert(function.clone(), handler);

        let request_id = session.ids.next_id();
        let message = DeclareFunctionRequest {
            request_id: request_id.clone(),
            function,
        };
        self.submit(session, request_id, message.into()).await
    }

    /// Calls `function` on whichever module declared it.
    ///
    /// The response resolves to the function's return value.
    pub async fn call_function(
        &self,
        function: &str,
        arguments: Arguments,
    ) -> Result<PendingResponse, ModuleError> {
        let session = self.session()?;
        let request_id = session.ids.next_id();
        let message = FunctionCallRequest {
            request_id: request_id.clone(),
            function: FunctionName::try_from(function)?,
            arguments,
        };
        self.submit(session, request_id, message.into()).await
    }

    /// Subscribes to `hook`; `listener` runs each time another module fires it.
    ///
    /// Multiple listeners per hook are allowed and run in registration order.
    pub async fn register_hook<F>(&self, hook: &str, listener: F) -> Result<PendingResponse, ModuleError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let session = self.session()?;
        let hook = user_hook(hook)?;

        let listener: HookListener = Arc::new(listener);
        self.hooks.add(hook.clone(), listener);

        let request_id = session.ids.next_id();
        let message = RegisterHookRequest {
            request_id: request_id.clone(),
            hook,
        };
        self.submit(session, request_id, message.into()).await
    }

    /// Fires `hook` for every module subscribed to it.
    pub async fn trigger_hook(&self, hook: &str) -> Result<PendingResponse, ModuleError> {
        let session = self.session()?;
        let request_id = session.ids.next_id();
        let message = TriggerHookRequest {
            request_id: request_id.clone(),
            hook: user_hook(hook)?,
        };
        self.submit(session, request_id, message.into()).await
    }

    /// Current registration state.
    pub async fn state(&self) -> ModuleState {
        match self.current_session() {
            Some(session) => session
                .correlator
                .state()
                .await
                .unwrap_or(ModuleState::Unregistered),
            None => ModuleState::Unregistered,
        }
    }

    /// Closes the transport. Pending requests are left unresolved.
    pub fn close(&self) -> Result<(), ModuleError> {
        self.transport.close()?;
        info!("module transport closed");
        Ok(())
    }

    fn current_session(&self) -> Option<Session> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn session(&self) -> Result<Session, ModuleError> {
        self.current_session().ok_or(ModuleError::NotInitialized)
    }

    fn encode(&self, message: Message) -> Result<Vec<u8>, ModuleError> {
        self.codec.encode(&message).map_err(ModuleError::Encode)
    }

    async fn submit(
        &self,
        session: Session,
        request_id: RequestId,
        message: Message,
    ) -> Result<PendingResponse, ModuleError> {
        let frame = self.encode(message)?;
        let receiver = session.correlator.send(request_id.clone(), frame).await?;
        Ok(self.pending(request_id, receiver, session.correlator))
    }

    fn pending(
        &self,
        request_id: RequestId,
        receiver: oneshot::Receiver<Completion>,
        correlator: CorrelatorHandle,
    ) -> PendingResponse {
        PendingResponse {
            request_id,
            receiver,
            timeout: self.config.request_timeout,
            correlator,
        }
    }
}

impl Drop for JunoModule {
    fn drop(&mut self) {
        if self.current_session().is_some() {
            if let Err(error) = self.transport.close() {
                debug!(%error, "transport already closed on drop");
            }
        }
    }
}

/// Parses a hook name supplied by a caller, rejecting the bus control signals.
fn user_hook(hook: &str) -> Result<HookName, ModuleError> {
    let hook = HookName::try_from(hook)?;
    if hook.is_reserved() {
        warn!(%hook, "refused to use a reserved hook");
        return Err(ModuleError::ReservedHook(hook));
    }
    Ok(hook)
}
