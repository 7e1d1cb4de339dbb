use lib_common::utils::clock::now_millis;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CONNECTED_MESSAGE: &str = "Gateway bridge connected";
pub const NO_TEXT_PROVIDED: &str = "No text provided";
pub const PROCESSING_FAILED: &str = "Failed to process message";

/// Message sent by a client.
///
/// `text` is the current field name, `message` the legacy one. Values are
/// kept loose so that a wrong type reads as "no text" instead of a parse
/// failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientMessage {
    #[serde(default)]
    pub text: Option<Value>,
    #[serde(default)]
    pub message: Option<Value>,
}

impl ClientMessage {
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        // Any JSON value is accepted; non-objects simply carry no fields.
        let value: Value = serde_json::from_str(raw)?;
        match value {
            Value::Object(_) => serde_json::from_value(value),
            _ => Ok(ClientMessage::default()),
        }
    }

    /// The first non-empty string among `text` and `message`.
    pub fn into_text(self) -> Option<String> {
        first_non_empty([self.text, self.message])
    }
}

/// Events pushed to a client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerEvent {
    Connected { message: String, timestamp: i64 },
    Typing { value: bool },
    Response { message: String, timestamp: i64 },
    Error { message: String },
}

impl ServerEvent {
    pub fn connected() -> Self {
        ServerEvent::Connected {
            message: CONNECTED_MESSAGE.to_string(),
            timestamp: now_millis(),
        }
    }

    pub fn typing(value: bool) -> Self {
        ServerEvent::Typing { value }
    }

    pub fn response(message: impl Into<String>) -> Self {
        ServerEvent::Response {
            message: message.into(),
            timestamp: now_millis(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error { message: message.into() }
    }
}

/// Body of the upstream gateway call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRequest<'a> {
    pub message: &'a str,
    pub session_key: &'a str,
}

/// Reply shape the gateway is expected to produce. Both fields are optional
/// and loosely typed; see [`GatewayReply::into_text`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayReply {
    #[serde(default)]
    pub reply: Option<Value>,
    #[serde(default)]
    pub message: Option<Value>,
}

impl GatewayReply {
    /// The first non-empty string among `reply` and `message`.
    pub fn into_text(self) -> Option<String> {
        first_non_empty([self.reply, self.message])
    }
}

fn first_non_empty<const N: usize>(fields: [Option<Value>; N]) -> Option<String> {
    fields.into_iter().flatten().find_map(|v| match v {
        Value::String(s) if !s.is_empty() => Some(s),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_field_is_primary() {
        let msg = ClientMessage::parse(r#"{"text":"hi","message":"legacy"}"#).unwrap();
        assert_eq!(msg.into_text().as_deref(), Some("hi"));
    }

    #[test]
    fn message_field_is_accepted_as_alias() {
        let msg = ClientMessage::parse(r#"{"message":"hi"}"#).unwrap();
        assert_eq!(msg.into_text().as_deref(), Some("hi"));

        let empty_primary = ClientMessage::parse(r#"{"text":"","message":"hi"}"#).unwrap();
        assert_eq!(empty_primary.into_text().as_deref(), Some("hi"));
    }

    #[test]
    fn missing_or_non_string_text_is_none() {
        for raw in [r#"{}"#, r#"{"text":""}"#, r#"{"text":5}"#, r#"{"text":null}"#, "42", "null", r#"["hi"]"#] {
            let msg = ClientMessage::parse(raw).unwrap();
            assert_eq!(msg.into_text(), None, "payload {raw}");
        }
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        assert!(ClientMessage::parse("hello there").is_err());
        assert!(ClientMessage::parse(r#"{"text": "#).is_err());
    }

    #[test]
    fn events_serialize_with_type_tag() {
        assert_eq!(
            serde_json::to_value(ServerEvent::typing(true)).unwrap(),
            json!({"type": "typing", "value": true})
        );
        assert_eq!(
            serde_json::to_value(ServerEvent::error(NO_TEXT_PROVIDED)).unwrap(),
            json!({"type": "error", "message": "No text provided"})
        );

        let response = serde_json::to_value(ServerEvent::response("there")).unwrap();
        assert_eq!(response["type"], "response");
        assert_eq!(response["message"], "there");
        assert!(response["timestamp"].as_i64().unwrap() > 0);

        let connected = serde_json::to_value(ServerEvent::connected()).unwrap();
        assert_eq!(connected["type"], "connected");
        assert_eq!(connected["message"], CONNECTED_MESSAGE);
    }

    #[test]
    fn gateway_request_uses_session_key_casing() {
        let body = GatewayRequest { message: "hi", session_key: "bridge" };
        assert_eq!(
            serde_json::to_value(body).unwrap(),
            json!({"message": "hi", "sessionKey": "bridge"})
        );
    }

    #[test]
    fn gateway_reply_prefers_reply_over_message() {
        let both: GatewayReply = serde_json::from_value(json!({"reply": "a", "message": "b"})).unwrap();
        assert_eq!(both.into_text().as_deref(), Some("a"));

        let only_message: GatewayReply = serde_json::from_value(json!({"message": "b"})).unwrap();
        assert_eq!(only_message.into_text().as_deref(), Some("b"));

        let neither: GatewayReply = serde_json::from_value(json!({"status": "ok"})).unwrap();
        assert_eq!(neither.into_text(), None);
    }
}
