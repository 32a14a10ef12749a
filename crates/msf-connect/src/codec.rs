//! MessagePack wire codec for the RPC endpoint
//!
//! Requests are a msgpack array `[method, token?, args...]`. Replies are an
//! arbitrary msgpack value which is normalized into JSON: binary and
//! extension payloads become lossy UTF-8 strings, non-string map keys are
//! stringified and non-finite floats become `null`.

use msf_core_interface::RpcError;
use serde_json::{Map, Number, Value};

pub const CONTENT_TYPE: &str = "binary/message-pack";

const AUTH_FAILURE_MARKER: &str = "Invalid Authentication Token";

/// Encode one request frame
pub fn encode_request(
    method: &str,
    token: Option<&str>,
    args: &[Value],
) -> Result<Vec<u8>, RpcError> {
    let mut frame = Vec::with_capacity(args.len() + 2);
    frame.push(Value::String(method.to_string()));
    if let Some(token) = token {
        frame.push(Value::String(token.to_string()));
    }
    frame.extend_from_slice(args);

    rmp_serde::to_vec(&frame)
        .map_err(|e| RpcError::Decode(format!("failed to encode {method} request: {e}")))
}

/// Decode a reply body into JSON
pub fn decode_response(body: &[u8]) -> Result<Value, RpcError> {
    let mut cursor = body;
    let value = rmpv::decode::read_value(&mut cursor)
        .map_err(|e| RpcError::Decode(format!("invalid msgpack reply: {e}")))?;
    Ok(to_json(value))
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn float(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

fn to_json(value: rmpv::Value) -> Value {
    match value {
        rmpv::Value::Nil => Value::Null,
        rmpv::Value::Boolean(b) => Value::Bool(b),
        rmpv::Value::Integer(i) => {
            if let Some(n) = i.as_i64() {
                Value::from(n)
            } else if let Some(n) = i.as_u64() {
                Value::from(n)
            } else {
                Value::Null
            }
        }
        rmpv::Value::F32(f) => float(f64::from(f)),
        rmpv::Value::F64(f) => float(f),
        rmpv::Value::String(s) => Value::String(lossy(s.as_bytes())),
        rmpv::Value::Binary(b) => Value::String(lossy(&b)),
        rmpv::Value::Array(items) => Value::Array(items.into_iter().map(to_json).collect()),
        rmpv::Value::Map(pairs) => {
            let mut object = Map::with_capacity(pairs.len());
            for (k, v) in pairs {
                object.insert(key_string(k), to_json(v));
            }
            Value::Object(object)
        }
        rmpv::Value::Ext(_, data) => Value::String(lossy(&data)),
    }
}

fn key_string(key: rmpv::Value) -> String {
    match to_json(key) {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Turn an HTTP status and decoded body into a result, classifying failures
///
/// HTTP 401, `error_code == 401` or the service's token-rejection message mean
/// the token is no longer valid. Any other `error: true` body or non-200 status
/// is a remote failure.
pub fn check_reply(status: u16, reply: Value) -> Result<Value, RpcError> {
    let flagged = reply.get("error").and_then(Value::as_bool).unwrap_or(false);
    if status == 200 && !flagged {
        return Ok(reply);
    }

    let message = reply
        .get("error_message")
        .or_else(|| reply.get("error_string"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP status {status}"));
    let code = reply.get("error_code").and_then(Value::as_i64);

    if status == 401 || code == Some(401) || message.contains(AUTH_FAILURE_MARKER) {
        return Err(RpcError::AuthExpired(message));
    }

    Err(RpcError::Remote {
        class: reply
            .get("error_class")
            .and_then(Value::as_str)
            .unwrap_or("Msf::RPC::Exception")
            .to_string(),
        message,
        code: code.or(Some(i64::from(status))),
    })
}

/// Handle a body that could not be decoded at all
pub fn undecodable_reply(status: u16, err: RpcError) -> RpcError {
    match status {
        200 => err,
        401 => RpcError::AuthExpired(format!("HTTP status {status}")),
        _ => RpcError::Remote {
            class: "HTTP".to_string(),
            message: format!("HTTP status {status}"),
            code: Some(i64::from(status)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encode_raw(value: &rmpv::Value) -> Vec<u8> {
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, value).unwrap();
        buf
    }

    #[test]
    fn test_request_frame_layout() {
        let args = [json!("exploit"), json!("multi/handler")];
        let bytes = encode_request("module.info", Some("TEMPtoken"), &args).unwrap();
        let frame: Vec<Value> = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(
            frame,
            vec![
                json!("module.info"),
                json!("TEMPtoken"),
                json!("exploit"),
                json!("multi/handler")
            ]
        );
    }

    #[test]
    fn test_login_frame_has_no_token() {
        let bytes = encode_request("auth.login", None, &[json!("msf"), json!("pw")]).unwrap();
        let frame: Vec<Value> = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(frame, vec![json!("auth.login"), json!("msf"), json!("pw")]);
    }

    #[test]
    fn test_option_maps_survive_encoding() {
        let options = json!({"RHOSTS": "10.0.0.5", "RPORT": 445});
        let bytes = encode_request("module.execute", Some("t"), &[options]).unwrap();
        let decoded = decode_response(&bytes).unwrap();
        assert_eq!(decoded[2], json!({"RHOSTS": "10.0.0.5", "RPORT": 445}));
    }

    #[test]
    fn test_binary_strings_and_integer_keys() {
        let raw = rmpv::Value::Map(vec![
            (
                rmpv::Value::Binary(b"data".to_vec()),
                rmpv::Value::Binary(b"meterpreter > ".to_vec()),
            ),
            (
                rmpv::Value::from(3),
                rmpv::Value::Map(vec![(rmpv::Value::from("type"), rmpv::Value::from("shell"))]),
            ),
            (rmpv::Value::from("ratio"), rmpv::Value::F64(f64::NAN)),
        ]);
        let decoded = decode_response(&encode_raw(&raw)).unwrap();

        assert_eq!(decoded["data"], json!("meterpreter > "));
        assert_eq!(decoded["3"]["type"], json!("shell"));
        assert_eq!(decoded["ratio"], Value::Null);
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let raw = rmpv::Value::Binary(vec![0x66, 0x6f, 0xff]);
        let decoded = decode_response(&encode_raw(&raw)).unwrap();
        assert_eq!(decoded, json!("fo\u{fffd}"));
    }

    #[test]
    fn test_truncated_body_is_decode_error() {
        assert!(matches!(decode_response(&[0x92, 0xa1]), Err(RpcError::Decode(_))));
    }

    #[test]
    fn test_check_reply_classification() {
        assert!(check_reply(200, json!({"result": "success"})).is_ok());

        let expired = check_reply(
            401,
            json!({
                "error": true,
                "error_class": "Msf::RPC::Exception",
                "error_message": "Invalid Authentication Token",
                "error_code": 401
            }),
        );
        assert!(matches!(expired, Err(RpcError::AuthExpired(_))));

        let by_message = check_reply(
            500,
            json!({"error": true, "error_message": "Invalid Authentication Token"}),
        );
        assert!(matches!(by_message, Err(RpcError::AuthExpired(_))));

        let rejected = json!({
            "error": true,
            "error_class": "ArgumentError",
            "error_message": "Invalid Module",
            "error_code": 500
        });
        match check_reply(500, rejected) {
            Err(RpcError::Remote { class, message, code }) => {
                assert_eq!(class, "ArgumentError");
                assert_eq!(message, "Invalid Module");
                assert_eq!(code, Some(500));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_undecodable_reply() {
        let err = RpcError::Decode("eof".into());
        assert!(matches!(undecodable_reply(200, err.clone()), RpcError::Decode(_)));
        assert!(matches!(undecodable_reply(401, err.clone()), RpcError::AuthExpired(_)));
        assert!(matches!(
            undecodable_reply(502, err),
            RpcError::Remote { code: Some(502), .. }
        ));
    }
}
