//! Newline-delimited JSON codec.
//!
//! A frame is one JSON object followed by `\n`. The object holds the message
//! body's fields plus an integer `type` discriminant (see [`MessageKind`]).
//!
//! Encoding reports failures to the caller. Decoding never does: anything that
//! is not valid JSON, lacks a known `type`, or does not match that type's
//! schema becomes [`Message::Unknown`].

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::{Message, MessageKind, ProtocolError};

const TYPE_KEY: &str = "type";
const DELIMITER: u8 = b'\n';

/// Stateless JSON codec for bus frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    /// Creates a codec.
    pub fn new() -> Self {
        Self
    }

    /// Encodes `message` into a frame, delimiter included.
    pub fn encode(&self, message: &Message) -> Result<Vec<u8>, ProtocolError> {
        let body = match message {
            Message::RegisterModuleRequest(m) => tagged_body(MessageKind::RegisterModuleRequest, m)?,
            Message::RegisterModuleResponse(m) => tagged_body(MessageKind::RegisterModuleResponse, m)?,
            Message::FunctionCallRequest(m) => tagged_body(MessageKind::FunctionCallRequest, m)?,
            Message::FunctionCallResponse(m) => tagged_body(MessageKind::FunctionCallResponse, m)?,
            Message::RegisterHookRequest(m) => tagged_body(MessageKind::RegisterHookRequest, m)?,
            Message::RegisterHookResponse(m) => tagged_body(MessageKind::RegisterHookResponse, m)?,
            Message::TriggerHookRequest(m) => tagged_body(MessageKind::TriggerHookRequest, m)?,
            Message::TriggerHookResponse(m) => tagged_body(MessageKind::TriggerHookResponse, m)?,
            Message::DeclareFunctionRequest(m) => tagged_body(MessageKind::DeclareFunctionRequest, m)?,
            Message::DeclareFunctionResponse(m) => tagged_body(MessageKind::DeclareFunctionResponse, m)?,
            Message::Error(m) => tagged_body(MessageKind::Error, m)?,
            Message::Unknown => return Err(ProtocolError::UnknownMessage),
        };

        let mut frame = serde_json::to_vec(&body)?;
        frame.push(DELIMITER);
        Ok(frame)
    }

    /// Decodes one frame. The trailing delimiter, if still present, is ignored.
    pub fn decode(&self, frame: &[u8]) -> Message {
        match try_decode(strip_delimiter(frame)) {
            Ok(message) => message,
            Err(error) => {
                debug!(%error, frame_len = frame.len(), "frame decoded as unknown message");
                Message::Unknown
            }
        }
    }
}

fn tagged_body<T: Serialize>(kind: MessageKind, message: &T) -> Result<Value, ProtocolError> {
    let mut value = serde_json::to_value(message)?;
    let Value::Object(fields) = &mut value else {
        return Err(ProtocolError::NotAnObject(kind));
    };
    fields.insert(TYPE_KEY.to_owned(), Value::from(kind.code()));
    Ok(value)
}

fn try_decode(frame: &[u8]) -> Result<Message, ProtocolError> {
    let value: Value = serde_json::from_slice(frame)?;
    let code = value
        .get(TYPE_KEY)
        .and_then(Value::as_u64)
        .ok_or(ProtocolError::MissingType)?;
    let kind = MessageKind::from_code(code).ok_or(ProtocolError::UnknownType(code))?;

    Ok(match kind {
        MessageKind::Error => Message::Error(parse(value)?),
        MessageKind::RegisterModuleRequest => Message::RegisterModuleRequest(parse(value)?),
        MessageKind::RegisterModuleResponse => Message::RegisterModuleResponse(parse(value)?),
        MessageKind::FunctionCallRequest => Message::FunctionCallRequest(parse(value)?),
        MessageKind::FunctionCallResponse => Message::FunctionCallResponse(parse(value)?),
        MessageKind::RegisterHookRequest => Message::RegisterHookRequest(parse(value)?),
        MessageKind::RegisterHookResponse => Message::RegisterHookResponse(parse(value)?),
        MessageKind::TriggerHookRequest => Message::TriggerHookRequest(parse(value)?),
        MessageKind::TriggerHookResponse => Message::TriggerHookResponse(parse(value)?),
        MessageKind::DeclareFunctionRequest => Message::DeclareFunctionRequest(parse(value)?),
        MessageKind::DeclareFunctionResponse => Message::DeclareFunctionResponse(parse(value)?),
    })
}

fn parse<T: DeserializeOwned>(value: Value) -> Result<T, ProtocolError> {
    Ok(serde_json::from_value(value)?)
}

fn strip_delimiter(frame: &[u8]) -> &[u8] {
    let frame = frame.strip_suffix(&[DELIMITER]).unwrap_or(frame);
    frame.strip_suffix(b"\r").unwrap_or(frame)
}
