//! In-memory transport shared by the engine integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use engine::{JunoModule, ModuleConfig, ModuleState, PendingResponse};
use protocol::{DataHandler, Transport, TransportError};
use serde_json::{json, Value};
use tokio::task::JoinHandle;

/// Records every write and lets tests play the bus by injecting frames.
#[derive(Default)]
pub struct MockTransport {
    writes: Mutex<Vec<Vec<u8>>>,
    handler: Mutex<Option<DataHandler>>,
    open: AtomicBool,
    fail_sends: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Raw bytes of each `send` call, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    /// Every frame written so far, split on the delimiter and parsed.
    pub fn frames(&self) -> Vec<Value> {
        self.writes()
            .iter()
            .flat_map(|write| split_frames(write))
            .collect()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Delivers `frame` to the engine and waits for dispatch to finish.
    pub async fn inject(&self, frame: Value) -> bool {
        self.inject_raw(serde_json::to_vec(&frame).unwrap()).await
    }

    pub async fn inject_raw(&self, frame: Vec<u8>) -> bool {
        let handler = self.handler().expect("data handler installed");
        handler(frame).await
    }

    /// Delivers `frame` on its own task, the way a socket read loop does.
    pub fn inject_detached(&self, frame: Value) -> JoinHandle<bool> {
        let handler = self.handler().expect("data handler installed");
        tokio::spawn(handler(serde_json::to_vec(&frame).unwrap()))
    }

    /// Polls until a written frame satisfies `predicate`.
    pub async fn wait_for_frame(&self, predicate: impl Fn(&Value) -> bool) -> Value {
        for _ in 0..200 {
            if let Some(frame) = self.frames().into_iter().find(|frame| predicate(frame)) {
                return frame;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no matching frame was written; frames: {:?}", self.frames());
    }

    fn handler(&self) -> Option<DataHandler> {
        self.handler.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self) -> Result<(), TransportError> {
        if self.open.swap(true, Ordering::SeqCst) {
            return Err(TransportError::AlreadyConnected);
        }
        Ok(())
    }

    fn close(&self) -> Result<(), TransportError> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        Ok(())
    }

    async fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotConnected);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.writes.lock().unwrap().push(frame.to_vec());
        Ok(())
    }

    fn set_data_handler(&self, handler: DataHandler) {
        *self.handler.lock().unwrap() = Some(handler);
    }
}

pub fn split_frames(bytes: &[u8]) -> Vec<Value> {
    assert_eq!(bytes.last(), Some(&b'\n'), "writes end on a frame boundary");
    bytes
        .split(|byte| *byte == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_slice(line).unwrap())
        .collect()
}

pub fn module(transport: &Arc<MockTransport>) -> JunoModule {
    module_with_config(transport, ModuleConfig::default())
}

pub fn module_with_config(transport: &Arc<MockTransport>, config: ModuleConfig) -> JunoModule {
    let transport: Arc<dyn Transport> = Arc::clone(transport) as Arc<dyn Transport>;
    JunoModule::new(transport, config)
}

/// Registers as `mod-a` and returns the pending registration.
pub async fn initialized(transport: &Arc<MockTransport>) -> (JunoModule, PendingResponse) {
    let module = module(transport);
    let registration = module
        .initialize("mod-a", "1.0", Default::default())
        .await
        .unwrap();
    (module, registration)
}

/// Registers as `mod-a` and activates the module.
pub async fn activated(transport: &Arc<MockTransport>) -> JunoModule {
    let (module, _registration) = initialized(transport).await;
    assert!(transport.inject(activation()).await);
    assert_eq!(module.state().await, ModuleState::Active);
    module
}

pub fn activation() -> Value {
    json!({ "type": 8, "requestId": "bus-1", "hook": "juno.activated" })
}

pub fn deactivation() -> Value {
    json!({ "type": 8, "requestId": "bus-2", "hook": "juno.deactivated" })
}
