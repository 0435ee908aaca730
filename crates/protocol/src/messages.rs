//! The closed set of messages exchanged on the bus.
//!
//! Each variant's body is a plain struct whose serde representation is the
//! JSON object on the wire minus the `type` discriminant; [`crate::codec`]
//! adds and strips that field. [`Message`] ties the bodies together and is
//! what the engine matches on.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::{ErrorCode, FunctionName, HookName, ModuleId, RequestId};

/// Named arguments of a function call: any JSON object.
pub type Arguments = Map<String, Value>;

/// Module dependencies declared at registration: module id → version range.
pub type Dependencies = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// Discriminant
// ---------------------------------------------------------------------------

/// Integer discriminant carried in every frame's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Error,
    RegisterModuleRequest,
    RegisterModuleResponse,
    FunctionCallRequest,
    FunctionCallResponse,
    RegisterHookRequest,
    RegisterHookResponse,
    TriggerHookRequest,
    TriggerHookResponse,
    DeclareFunctionRequest,
    DeclareFunctionResponse,
}

impl MessageKind {
    /// Maps a wire discriminant to a kind, or `None` if it is not one of ours.
    pub fn from_code(code: u64) -> Option<Self> {
        Some(match code {
            0 => Self::Error,
            1 => Self::RegisterModuleRequest,
            2 => Self::RegisterModuleResponse,
            3 => Self::FunctionCallRequest,
            4 => Self::FunctionCallResponse,
            5 => Self::RegisterHookRequest,
            6 => Self::RegisterHookResponse,
            7 => Self::TriggerHookRequest,
            8 => Self::TriggerHookResponse,
            9 => Self::DeclareFunctionRequest,
            10 => Self::DeclareFunctionResponse,
            _ => return None,
        })
    }

    /// Returns the wire discriminant.
    pub fn code(self) -> u64 {
        match self {
            Self::Error => 0,
            Self::RegisterModuleRequest => 1,
            Self::RegisterModuleResponse => 2,
            Self::FunctionCallRequest => 3,
            Self::FunctionCallResponse => 4,
            Self::RegisterHookRequest => 5,
            Self::RegisterHookResponse => 6,
            Self::TriggerHookRequest => 7,
            Self::TriggerHookResponse => 8,
            Self::DeclareFunctionRequest => 9,
            Self::DeclareFunctionResponse => 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// Announces this module to the bus. The only message never buffered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterModuleRequest {
    pub request_id: RequestId,
    pub module_id: ModuleId,
    pub version: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub dependencies: Dependencies,
}

/// Acknowledges a [`RegisterModuleRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterModuleResponse {
    pub request_id: RequestId,
}

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

/// Tells the bus this module serves calls to `function`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclareFunctionRequest {
    pub request_id: RequestId,
    pub function: FunctionName,
}

/// Acknowledges a [`DeclareFunctionRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclareFunctionResponse {
    pub request_id: RequestId,
    pub function: FunctionName,
}

/// Invokes `function` on whichever module declared it.
///
/// Sent by this module for outbound calls and received for inbound ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCallRequest {
    pub request_id: RequestId,
    pub function: FunctionName,
    #[serde(default, deserialize_with = "null_as_default")]
    pub arguments: Arguments,
}

/// Carries a function's return value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCallResponse {
    pub request_id: RequestId,
    #[serde(default)]
    pub data: Value,
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// Subscribes this module to `hook`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterHookRequest {
    pub request_id: RequestId,
    pub hook: HookName,
}

/// Acknowledges a [`RegisterHookRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterHookResponse {
    pub request_id: RequestId,
}

/// Fires `hook` for every subscribed module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerHookRequest {
    pub request_id: RequestId,
    pub hook: HookName,
}

/// A hook notification.
///
/// `hook` is present when another module (or the bus) fired it, and absent or
/// empty when the frame is the echo of this module's own trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerHookResponse {
    pub request_id: RequestId,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_as_none"
    )]
    pub hook: Option<HookName>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A failure reported by the bus, optionally tied to one of our requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_as_none"
    )]
    pub request_id: Option<RequestId>,
    pub error: ErrorCode,
}

/// Reads `null` as the type's default. Peers that serialise a nil map send
/// `null` rather than omitting the key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<String>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| T::try_from(value).ok()))
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Any frame on the bus, decoded.
///
/// [`Message::Unknown`] stands in for every frame the codec could not
/// classify; it carries nothing and cannot be correlated.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    RegisterModuleRequest(RegisterModuleRequest),
    RegisterModuleResponse(RegisterModuleResponse),
    FunctionCallRequest(FunctionCallRequest),
    FunctionCallResponse(FunctionCallResponse),
    RegisterHookRequest(RegisterHookRequest),
    RegisterHookResponse(RegisterHookResponse),
    TriggerHookRequest(TriggerHookRequest),
    TriggerHookResponse(TriggerHookResponse),
    DeclareFunctionRequest(DeclareFunctionRequest),
    DeclareFunctionResponse(DeclareFunctionResponse),
    Error(ErrorMessage),
    Unknown,
}

impl Message {
    /// Returns the wire discriminant, or `None` for [`Message::Unknown`].
    pub fn kind(&self) -> Option<MessageKind> {
        Some(match self {
            Self::RegisterModuleRequest(_) => MessageKind::RegisterModuleRequest,
            Self::RegisterModuleResponse(_) => MessageKind::RegisterModuleResponse,
            Self::FunctionCallRequest(_) => MessageKind::FunctionCallRequest,
            Self::FunctionCallResponse(_) => MessageKind::FunctionCallResponse,
            Self::RegisterHookRequest(_) => MessageKind::RegisterHookRequest,
            Self::RegisterHookResponse(_) => MessageKind::RegisterHookResponse,
            Self::TriggerHookRequest(_) => MessageKind::TriggerHookRequest,
            Self::TriggerHookResponse(_) => MessageKind::TriggerHookResponse,
            Self::DeclareFunctionRequest(_) => MessageKind::DeclareFunctionRequest,
            Self::DeclareFunctionResponse(_) => MessageKind::DeclareFunctionResponse,
            Self::Error(_) => MessageKind::Error,
            Self::Unknown => return None,
        })
    }

    /// Returns the correlation id, if the message carries one.
    pub fn request_id(&self) -> Option<&RequestId> {
        match self {
            Self::RegisterModuleRequest(m) => Some(&m.request_id),
            Self::RegisterModuleResponse(m) => Some(&m.request_id),
            Self::FunctionCallRequest(m) => Some(&m.request_id),
            Self::FunctionCallResponse(m) => Some(&m.request_id),
            Self::RegisterHookRequest(m) => Some(&m.request_id),
            Self::RegisterHookResponse(m) => Some(&m.request_id),
            Self::TriggerHookRequest(m) => Some(&m.request_id),
            Self::TriggerHookResponse(m) => Some(&m.request_id),
            Self::DeclareFunctionRequest(m) => Some(&m.request_id),
            Self::DeclareFunctionResponse(m) => Some(&m.request_id),
            Self::Error(m) => m.request_id.as_ref(),
            Self::Unknown => None,
        }
    }
}

macro_rules! into_message {
    ($($body:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$body> for Message {
                fn from(body: $body) -> Self {
                    Self::$variant(body)
                }
            }
        )*
    };
}

into_message! {
    RegisterModuleRequest => RegisterModuleRequest,
    RegisterModuleResponse => RegisterModuleResponse,
    FunctionCallRequest => FunctionCallRequest,
    FunctionCallResponse => FunctionCallResponse,
    RegisterHookRequest => RegisterHookRequest,
    RegisterHookResponse => RegisterHookResponse,
    TriggerHookRequest => TriggerHookRequest,
    TriggerHookResponse => TriggerHookResponse,
    DeclareFunctionRequest => DeclareFunctionRequest,
    DeclareFunctionResponse => DeclareFunctionResponse,
    ErrorMessage => Error,
}
