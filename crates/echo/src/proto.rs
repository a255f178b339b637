//! Wire messages.

use serde::{Deserialize, Serialize};

/// The one message type: sent as the request and returned unchanged.
#[derive(Clone, PartialEq, Eq, Hash, prost::Message, Serialize, Deserialize)]
pub struct EchoMessage {
    #[prost(string, tag = "1")]
    #[serde(default)]
    pub value: String,
}

impl EchoMessage {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message as _;

    #[test]
    fn json_field_name() {
        let msg: EchoMessage = serde_json::from_str(r#"{"value":"hi"}"#).unwrap();
        assert_eq!(msg, EchoMessage::new("hi"));
        assert_eq!(serde_json::to_string(&msg).unwrap(), r#"{"value":"hi"}"#);
    }

    #[test]
    fn missing_value_defaults_to_empty() {
        let msg: EchoMessage = serde_json::from_str("{}").unwrap();
        assert_eq!(msg.value, "");
    }

    #[test]
    fn wire_encoding_uses_field_one() {
        let bytes = EchoMessage::new("a").encode_to_vec();
        // tag 1, wire type 2 (length-delimited), length 1, "a"
        assert_eq!(bytes, vec![0x0a, 0x01, b'a']);
    }
}
