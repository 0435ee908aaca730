//! Registration, buffering, and activation behaviour of `JunoModule`.

mod support;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use engine::{Arguments, ModuleConfig, ModuleError, ModuleState};
use serde_json::{json, Value};
use support::{activated, activation, deactivation, initialized, module, module_with_config, MockTransport};

#[tokio::test]
async fn initialize_sends_one_registration_frame_immediately() {
    let transport = MockTransport::new();
    let (module, registration) = initialized(&transport).await;

    assert!(transport.is_open());
    let frames = transport.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["type"], json!(1));
    assert_eq!(frames[0]["moduleId"], json!("mod-a"));
    assert_eq!(frames[0]["version"], json!("1.0"));
    assert_eq!(frames[0]["dependencies"], json!({}));
    assert_eq!(frames[0]["requestId"], json!(registration.request_id().as_str()));
    assert!(registration.request_id().as_str().starts_with("mod-a-"));
    assert_eq!(module.state().await, ModuleState::Buffering);
}

#[tokio::test]
async fn registration_resolves_on_acknowledgement() {
    let transport = MockTransport::new();
    let (_module, registration) = initialized(&transport).await;
    let request_id = registration.request_id().as_str().to_owned();

    assert!(transport.inject(json!({ "type": 2, "requestId": request_id })).await);

    assert_eq!(registration.await.unwrap(), Value::Bool(true));
}

#[tokio::test]
async fn second_initialize_is_rejected() {
    let transport = MockTransport::new();
    let (module, _registration) = initialized(&transport).await;

    let second = module.initialize("mod-a", "1.0", Default::default()).await;

    assert!(matches!(second, Err(ModuleError::AlreadyRegistered)));
    assert_eq!(transport.write_count(), 1);
}

#[tokio::test]
async fn operations_before_initialize_fail() {
    let transport = MockTransport::new();
    let module = module(&transport);

    assert!(matches!(
        module.call_function("f", Arguments::new()).await,
        Err(ModuleError::NotInitialized)
    ));
    assert!(matches!(
        module.declare_function("f", |_| async { Value::Null }).await,
        Err(ModuleError::NotInitialized)
    ));
    assert!(matches!(
        module.register_hook("h", || {}).await,
        Err(ModuleError::NotInitialized)
    ));
    assert!(matches!(
        module.trigger_hook("h").await,
        Err(ModuleError::NotInitialized)
    ));
    assert_eq!(module.state().await, ModuleState::Unregistered);
    assert_eq!(transport.write_count(), 0);
}

#[tokio::test]
async fn failed_open_leaves_the_module_unregistered() {
    let transport = MockTransport::new();
    let module = module(&transport);
    // Opening an already-open transport fails.
    protocol::Transport::open(&*transport).await.unwrap();

    let result = module.initialize("mod-a", "1.0", Default::default()).await;

    assert!(matches!(result, Err(ModuleError::Transport(_))));
    assert_eq!(module.state().await, ModuleState::Unregistered);
}

#[tokio::test]
async fn requests_before_activation_are_buffered_then_flushed_once() {
    let transport = MockTransport::new();
    let (module, _registration) = initialized(&transport).await;

    let call = module.call_function("f", Arguments::new()).await.unwrap();
    assert_eq!(transport.write_count(), 1, "call must be buffered, not written");

    assert!(transport.inject(activation()).await);

    let writes = transport.writes();
    assert_eq!(writes.len(), 2);
    let flushed = support::split_frames(&writes[1]);
    assert_eq!(flushed.len(), 1);
    assert_eq!(flushed[0]["type"], json!(3));
    assert_eq!(flushed[0]["function"], json!("f"));
    assert_eq!(flushed[0]["requestId"], json!(call.request_id().as_str()));
    assert_eq!(module.state().await, ModuleState::Active);
}

#[tokio::test]
async fn buffered_requests_flush_in_one_write_in_call_order() {
    let transport = MockTransport::new();
    let (module, _registration) = initialized(&transport).await;

    let call = module.call_function("f", Arguments::new()).await.unwrap();
    let hook = module.register_hook("build.done", || {}).await.unwrap();
    let trigger = module.trigger_hook("build.started").await.unwrap();
    let declare = module.declare_function("g", |_| async { Value::Null }).await.unwrap();

    assert!(transport.inject(activation()).await);

    let writes = transport.writes();
    assert_eq!(writes.len(), 2, "buffer flushes as a single write");
    let flushed = support::split_frames(&writes[1]);
    let types: Vec<Value> = flushed.iter().map(|frame| frame["type"].clone()).collect();
    let ids: Vec<Value> = flushed.iter().map(|frame| frame["requestId"].clone()).collect();
    assert_eq!(types, [json!(3), json!(5), json!(7), json!(9)]);
    assert_eq!(
        ids,
        [call, hook, trigger, declare].map(|pending| json!(pending.request_id().as_str()))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn requests_racing_activation_are_written_exactly_once() {
    let transport = MockTransport::new();
    let (module, _registration) = initialized(&transport).await;
    let module = Arc::new(module);

    let callers: Vec<_> = (0..64)
        .map(|n| {
            let module = Arc::clone(&module);
            tokio::spawn(async move {
                let pending = module
                    .call_function(&format!("f{n}"), Arguments::new())
                    .await
                    .unwrap();
                pending.request_id().as_str().to_owned()
            })
        })
        .collect();
    let activation = transport.inject_detached(activation());

    let mut issued = Vec::new();
    for caller in callers {
        issued.push(caller.await.unwrap());
    }
    assert!(activation.await.unwrap());
    assert_eq!(module.state().await, ModuleState::Active);

    let written: Vec<String> = transport
        .frames()
        .into_iter()
        .filter(|frame| frame["type"] == json!(3))
        .map(|frame| frame["requestId"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(written.len(), issued.len(), "no request lost or sent twice");
    let unique: HashSet<&String> = written.iter().collect();
    assert_eq!(unique.len(), written.len());
    for request_id in &issued {
        assert!(unique.contains(request_id), "{request_id} was never written");
    }
}

#[tokio::test]
async fn repeated_activation_does_not_resend() {
    let transport = MockTransport::new();
    let (module, _registration) = initialized(&transport).await;
    let _call = module.call_function("f", Arguments::new()).await.unwrap();

    assert!(transport.inject(activation()).await);
    assert!(transport.inject(activation()).await);

    assert_eq!(transport.write_count(), 2);
    assert_eq!(module.state().await, ModuleState::Active);
}

#[tokio::test]
async fn active_requests_are_written_immediately() {
    let transport = MockTransport::new();
    let module = activated(&transport).await;
    let before = transport.write_count();

    let _call = module.call_function("f", Arguments::new()).await.unwrap();

    assert_eq!(transport.write_count(), before + 1);
    assert_eq!(transport.frames().last().unwrap()["type"], json!(3));
}

#[tokio::test]
async fn deactivation_returns_to_buffering() {
    let transport = MockTransport::new();
    let module = activated(&transport).await;

    assert!(transport.inject(deactivation()).await);
    assert_eq!(module.state().await, ModuleState::Buffering);

    let before = transport.write_count();
    let _call = module.call_function("f", Arguments::new()).await.unwrap();
    assert_eq!(transport.write_count(), before);

    assert!(transport.inject(activation()).await);
    assert_eq!(transport.write_count(), before + 1);
}

#[tokio::test]
async fn reserved_hooks_are_refused() {
    let transport = MockTransport::new();
    let module = activated(&transport).await;
    let before = transport.write_count();

    assert!(matches!(
        module.register_hook("juno.activated", || {}).await,
        Err(ModuleError::ReservedHook(_))
    ));
    assert!(matches!(
        module.trigger_hook("juno.deactivated").await,
        Err(ModuleError::ReservedHook(_))
    ));
    assert_eq!(transport.write_count(), before);
}

#[tokio::test]
async fn empty_names_are_refused() {
    let transport = MockTransport::new();
    let module = activated(&transport).await;

    assert!(matches!(
        module.call_function("", Arguments::new()).await,
        Err(ModuleError::InvalidIdentifier(_))
    ));
    assert!(matches!(
        module.initialize("", "1.0", Default::default()).await,
        Err(ModuleError::AlreadyRegistered)
    ));
}

#[tokio::test]
async fn empty_module_id_leaves_initialize_retryable() {
    let transport = MockTransport::new();
    let module = module(&transport);

    assert!(matches!(
        module.initialize("", "1.0", Default::default()).await,
        Err(ModuleError::InvalidIdentifier(_))
    ));
    assert_eq!(transport.write_count(), 0);

    let _registration = module.initialize("mod-a", "1.0", Default::default()).await.unwrap();
    assert_eq!(module.state().await, ModuleState::Buffering);
}

#[tokio::test]
async fn transport_failure_is_returned_to_the_caller() {
    let transport = MockTransport::new();
    let module = activated(&transport).await;
    transport.fail_sends(true);

    let result = module.call_function("f", Arguments::new()).await;

    assert!(matches!(result, Err(ModuleError::Transport(_))));
}

#[tokio::test]
async fn failed_flush_fails_the_buffered_requests() {
    let transport = MockTransport::new();
    let (module, _registration) = initialized(&transport).await;
    let call = module.call_function("f", Arguments::new()).await.unwrap();
    transport.fail_sends(true);

    assert!(transport.inject(activation()).await);

    assert!(matches!(call.await, Err(ModuleError::FlushFailed { .. })));
}

#[tokio::test]
async fn unanswered_request_times_out_and_is_forgotten() {
    let transport = MockTransport::new();
    let config = ModuleConfig::default().with_request_timeout(Duration::from_millis(20));
    let module = module_with_config(&transport, config);
    let _registration = module.initialize("mod-a", "1.0", Default::default()).await.unwrap();
    assert!(transport.inject(activation()).await);

    let call = module.call_function("f", Arguments::new()).await.unwrap();
    let request_id = call.request_id().as_str().to_owned();

    assert!(matches!(call.await, Err(ModuleError::Timeout { .. })));
    let late = json!({ "type": 4, "requestId": request_id, "data": 1 });
    assert!(!transport.inject(late).await, "late response finds no pending entry");
}

#[tokio::test]
async fn close_closes_the_transport_without_resetting_state() {
    let transport = MockTransport::new();
    let module = activated(&transport).await;

    module.close().unwrap();

    assert!(!transport.is_open());
    assert_eq!(module.state().await, ModuleState::Active);
    assert!(matches!(
        module.call_function("f", Arguments::new()).await,
        Err(ModuleError::Transport(_))
    ));
}
