//! EntryPoint revert payloads and JSON-RPC error enrichment.

use crate::encoding::{fmt_bytes, parse_hex_bytes};
use crate::error::CodecError;
use ethers::abi::{decode, encode, ParamType, Token};
use ethers::types::{Bytes, U256};
use serde_json::Value;

/// `bytes4(keccak256("Error(string)"))`
pub const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// `bytes4(keccak256("FailedOp(uint256,string)"))`
pub const FAILED_OP_SELECTOR: [u8; 4] = [0x22, 0x02, 0x66, 0xb6];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedRevert {
    pub message: String,
    /// Index of the failing operation in the bundle; only set for `FailedOp`.
    pub op_index: Option<U256>,
}

/// Classifies a raw revert payload by its 4-byte selector.
///
/// `Ok(None)` means the payload is not one we know how to read (including payloads
/// too short to hold a selector). A known selector followed by a malformed body is an error.
pub fn decode_revert_reason(data: &[u8]) -> Result<Option<DecodedRevert>, CodecError> {
    if data.len() < 4 {
        return Ok(None);
    }
    let (selector, body) = data.split_at(4);

    if selector == ERROR_SELECTOR {
        let tokens = decode(&[ParamType::String], body)?;
        return match tokens.as_slice() {
            [Token::String(message)] => Ok(Some(DecodedRevert {
                message: message.clone(),
                op_index: None,
            })),
            _ => Err(CodecError::UnexpectedTokens("Error(string)")),
        };
    }

    if selector == FAILED_OP_SELECTOR {
        let tokens = decode(&[ParamType::Uint(256), ParamType::String], body)?;
        return match tokens.as_slice() {
            [Token::Uint(op_index), Token::String(message)] => Ok(Some(DecodedRevert {
                message: format!("FailedOp: {message}"),
                op_index: Some(*op_index),
            })),
            _ => Err(CodecError::UnexpectedTokens("FailedOp(uint256,string)")),
        };
    }

    Ok(None)
}

/// Same as [`decode_revert_reason`] for a `0x`-prefixed hex string.
pub fn decode_revert_reason_hex(data: &str) -> Result<Option<DecodedRevert>, CodecError> {
    if data.len() <= 2 {
        return Ok(None);
    }
    decode_revert_reason(&parse_hex_bytes(data)?)
}

/// `Error(string)` revert payload carrying `message`.
pub fn encode_error_string(message: &str) -> Bytes {
    let mut out = ERROR_SELECTOR.to_vec();
    out.extend(encode(&[Token::String(message.to_string())]));
    out.into()
}

/// JSON pointer to the innermost `data` value of a (possibly wrapped) JSON-RPC error.
///
/// Providers nest the node's error under `error`, and the revert data itself is
/// sometimes wrapped in further `data` objects.
fn revert_data_pointer(error: &Value) -> String {
    let mut ptr = String::new();
    while error
        .pointer(&format!("{ptr}/error"))
        .is_some_and(|v| !v.is_null())
    {
        ptr.push_str("/error");
    }
    while error
        .pointer(&format!("{ptr}/data"))
        .is_some_and(|v| !v.is_null())
    {
        ptr.push_str("/data");
    }
    ptr
}

/// Returns a copy of `error` with the revert reason decoded into it.
///
/// The top-level `message` becomes the decoded reason. A `FailedOp` revert also has
/// its innermost `data` rewritten to an equivalent `Error(string)` payload so that
/// consumers which only understand `Error(string)` still match it. Unrecognized or
/// undecodable payloads leave the error as is.
pub fn enrich_revert_error(error: &Value) -> Value {
    let ptr = revert_data_pointer(error);
    let raw = match error.pointer(&ptr).and_then(Value::as_str) {
        Some(raw) if raw.len() > 2 => raw,
        _ => return error.clone(),
    };

    let decoded = match decode_revert_reason_hex(raw) {
        Ok(Some(decoded)) => decoded,
        Ok(None) => return error.clone(),
        Err(err) => {
            tracing::debug!(error = %err, data = raw, "revert data did not decode");
            return error.clone();
        }
    };

    let mut enriched = error.clone();
    if let Some(obj) = enriched.as_object_mut() {
        obj.insert("message".to_string(), Value::String(decoded.message.clone()));
    }
    if decoded.op_index.is_some() && !ptr.is_empty() {
        if let Some(slot) = enriched.pointer_mut(&ptr) {
            *slot = Value::String(fmt_bytes(&encode_error_string(&decoded.message)));
        }
    }
    enriched
}

/// An EntryPoint call failure, after revert-reason enrichment.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{}", error_message(.0))]
pub struct RevertError(pub Value);

impl RevertError {
    pub fn message(&self) -> Option<&str> {
        self.0.get("message").and_then(Value::as_str)
    }

    pub fn payload(&self) -> &Value {
        &self.0
    }
}

fn error_message(v: &Value) -> String {
    match v.get("message").and_then(Value::as_str) {
        Some(m) => m.to_string(),
        None => v.to_string(),
    }
}

/// Enriches `error` and hands it back as an `Err`; there is no `Ok` path.
pub fn rethrow_with_decoded_reason<T>(error: Value) -> Result<T, RevertError> {
    Err(RevertError(enrich_revert_error(&error)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const INSUFFICIENT_FUNDS: &str = "0x08c379a000000000000000000000000000000000000000000000000000000000000000200000000000000000000000000000000000000000000000000000000000000012696e73756666696369656e742066756e64730000000000000000000000000000";
    const FAILED_OP_AA21: &str = "0x220266b600000000000000000000000000000000000000000000000000000000000000020000000000000000000000000000000000000000000000000000000000000040000000000000000000000000000000000000000000000000000000000000001741413231206469646e2774207061792070726566756e64000000000000000000";
    const AA21_AS_ERROR: &str = "0x08c379a0000000000000000000000000000000000000000000000000000000000000002000000000000000000000000000000000000000000000000000000000000000214661696c65644f703a2041413231206469646e2774207061792070726566756e6400000000000000000000000000000000000000000000000000000000000000";

    #[test]
    fn selectors_match_signatures() {
        assert_eq!(ethers::utils::id("Error(string)"), ERROR_SELECTOR);
        assert_eq!(
            ethers::utils::id("FailedOp(uint256,string)"),
            FAILED_OP_SELECTOR
        );
    }

    #[test]
    fn decodes_error_string() {
        let decoded = decode_revert_reason_hex(INSUFFICIENT_FUNDS).unwrap().unwrap();
        assert_eq!(decoded.message, "insufficient funds");
        assert_eq!(decoded.op_index, None);
    }

    #[test]
    fn decodes_failed_op() {
        let decoded = decode_revert_reason_hex(FAILED_OP_AA21).unwrap().unwrap();
        assert_eq!(decoded.message, "FailedOp: AA21 didn't pay prefund");
        assert_eq!(decoded.op_index, Some(U256::from(2u64)));
    }

    #[test]
    fn unknown_or_short_payloads_are_unclassified() {
        assert_eq!(decode_revert_reason_hex("0xdeadbeef").unwrap(), None);
        assert_eq!(decode_revert_reason_hex("0xdeadbeef0000").unwrap(), None);
        assert_eq!(decode_revert_reason_hex("0x08c379").unwrap(), None);
        assert_eq!(decode_revert_reason_hex("0x").unwrap(), None);
        assert_eq!(decode_revert_reason_hex("").unwrap(), None);
        assert_eq!(decode_revert_reason(&[0x08, 0xc3]).unwrap(), None);
    }

    #[test]
    fn known_selector_with_bad_body_is_an_error() {
        assert!(decode_revert_reason_hex("0x08c379a0").is_err());
        assert!(decode_revert_reason_hex("0x220266b60000").is_err());
        assert!(decode_revert_reason_hex("0xnothex!").is_err());
    }

    #[test]
    fn encode_error_string_matches_abi() {
        let encoded = encode_error_string("FailedOp: AA21 didn't pay prefund");
        assert_eq!(fmt_bytes(&encoded), AA21_AS_ERROR);
        let decoded = decode_revert_reason(&encoded).unwrap().unwrap();
        assert_eq!(decoded.message, "FailedOp: AA21 didn't pay prefund");
    }

    #[test]
    fn enrich_error_string_sets_message_only() {
        let original = json!({
            "message": "execution reverted",
            "error": { "code": -32000, "message": "execution reverted", "data": INSUFFICIENT_FUNDS }
        });
        let enriched = enrich_revert_error(&original);
        assert_eq!(enriched["message"], json!("insufficient funds"));
        assert_eq!(enriched["error"]["data"], json!(INSUFFICIENT_FUNDS));
        assert_eq!(enriched["error"]["message"], json!("execution reverted"));
        // the input is left untouched
        assert_eq!(original["message"], json!("execution reverted"));
    }

    #[test]
    fn enrich_failed_op_normalizes_innermost_data() {
        let original = json!({
            "message": "call failed",
            "error": {
                "error": {
                    "code": -32500,
                    "data": { "data": FAILED_OP_AA21 }
                }
            }
        });
        let enriched = enrich_revert_error(&original);
        assert_eq!(enriched["message"], json!("FailedOp: AA21 didn't pay prefund"));
        assert_eq!(
            enriched["error"]["error"]["data"]["data"],
            json!(AA21_AS_ERROR)
        );
        assert_eq!(enriched["error"]["error"]["code"], json!(-32500));
    }

    #[test]
    fn enrich_leaves_unrecognized_errors_unchanged() {
        let original = json!({
            "message": "boom",
            "error": { "code": 3, "data": "0xdeadbeef" }
        });
        assert_eq!(enrich_revert_error(&original), original);

        let placeholder = json!({ "message": "boom", "data": "0x" });
        assert_eq!(enrich_revert_error(&placeholder), placeholder);

        let no_data = json!({ "message": "boom", "error": null });
        assert_eq!(enrich_revert_error(&no_data), no_data);

        let malformed = json!({ "message": "boom", "data": "0x08c379a0" });
        assert_eq!(enrich_revert_error(&malformed), malformed);
    }

    #[test]
    fn rethrow_always_errs() {
        let original = json!({ "message": "boom", "error": { "data": "0xdeadbeef" } });
        let err = rethrow_with_decoded_reason::<()>(original.clone()).unwrap_err();
        assert_eq!(err.payload(), &original);
        assert_eq!(err.to_string(), "boom");

        let failed = json!({ "message": "boom", "data": FAILED_OP_AA21 });
        let err = rethrow_with_decoded_reason::<u64>(failed).unwrap_err();
        assert_eq!(err.message(), Some("FailedOp: AA21 didn't pay prefund"));
        assert_eq!(err.payload()["data"], json!(AA21_AS_ERROR));
    }
}
