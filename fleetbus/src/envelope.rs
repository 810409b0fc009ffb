//! 消息信封（Envelope）与线上编解码
//!
//! 线上格式为 JSON 对象：`{"service": string, "event_type": string, "payload": any}`。
//! 解码是宽松的：未知字段被忽略，缺失的 `payload` 视为 `null`，缺失的 `service`
//! 视为空串；只有格式错误或 `event_type` 缺失/为空时才报错。
//!
use crate::error::{BusError, BusResult};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// 发布方服务名，入站时非字符串一律视为空串
    #[serde(default, deserialize_with = "lenient_string")]
    service: String,
    /// 事件类型，用于路由到处理器，非空
    event_type: String,
    /// 事件负载
    #[serde(default)]
    payload: Value,
}

impl Envelope {
    pub fn new(
        service: impl Into<String>,
        event_type: impl Into<String>,
        payload: Value,
    ) -> BusResult<Self> {
        let event_type = event_type.into();
        if event_type.trim().is_empty() {
            return Err(BusError::argument("event_type is required"));
        }

        Ok(Self {
            service: service.into(),
            event_type,
            payload,
        })
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn into_parts(self) -> (String, String, Value) {
        (self.service, self.event_type, self.payload)
    }

    pub fn to_bytes(&self) -> BusResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| BusError::Encoding {
            reason: e.to_string(),
        })
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        _ => Ok(String::new()),
    }
}

/// 构建信封并序列化为线上格式
pub fn encode<P>(event_type: &str, payload: &P, service: &str) -> BusResult<Vec<u8>>
where
    P: Serialize + ?Sized,
{
    let payload = serde_json::to_value(payload).map_err(|e| BusError::Encoding {
        reason: e.to_string(),
    })?;

    Envelope::new(service, event_type, payload)?.to_bytes()
}

/// 解析线上格式为信封
pub fn decode(bytes: &[u8]) -> BusResult<Envelope> {
    let envelope: Envelope = serde_json::from_slice(bytes)?;

    if envelope.event_type.trim().is_empty() {
        return Err(BusError::decoding("event_type is empty"));
    }

    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn decode_restores_encoded_fields() {
        let payloads = [
            json!({"id": 42, "tags": ["a", "b"]}),
            json!("plain text"),
            json!([1, 2, 3]),
            Value::Null,
        ];

        for payload in payloads {
            let bytes = encode("invoice.paid", &payload, "billing").unwrap();
            let envelope = decode(&bytes).unwrap();
            assert_eq!(envelope.event_type(), "invoice.paid");
            assert_eq!(envelope.service(), "billing");
            assert_eq!(envelope.payload(), &payload);
        }
    }

    #[test]
    fn decode_ignores_unknown_fields_and_defaults_missing_ones() {
        let envelope =
            decode(br#"{"event_type":"user.created","trace":"abc","version":3}"#).unwrap();
        assert_eq!(envelope.event_type(), "user.created");
        assert_eq!(envelope.service(), "");
        assert_eq!(envelope.payload(), &Value::Null);

        for service in ["null", "42", r#"{"name":"billing"}"#] {
            let raw = format!(
                r#"{{"service":{service},"event_type":"user.created","payload":{{"id":1}}}}"#
            );
            let envelope = decode(raw.as_bytes()).unwrap();
            assert_eq!(envelope.service(), "");
            assert_eq!(envelope.event_type(), "user.created");
            assert_eq!(envelope.payload(), &json!({"id": 1}));
        }
    }

    #[test]
    fn decode_rejects_malformed_input() {
        let cases: [&[u8]; 5] = [
            b"not json",
            br#"["event_type"]"#,
            br#"{"service":"billing","payload":{}}"#,
            br#"{"event_type":""}"#,
            br#"{"event_type":7}"#,
        ];

        for raw in cases {
            let err = decode(raw).unwrap_err();
            assert!(matches!(err, BusError::Decoding { .. }), "{err:?}");
        }
    }

    #[test]
    fn encode_rejects_empty_event_type() {
        let err = encode("  ", &json!({}), "billing").unwrap_err();
        assert!(matches!(err, BusError::Argument { .. }));
    }

    #[test]
    fn encode_reports_unserializable_payload() {
        // JSON 对象键必须是字符串
        let mut payload: HashMap<(u8, u8), u8> = HashMap::new();
        payload.insert((1, 2), 3);

        let err = encode("grid.updated", &payload, "maps").unwrap_err();
        assert!(matches!(err, BusError::Encoding { .. }));
    }
}
