use crate::error::CodecError;
use crate::types::{UnresolvedUserOperation, UserOperation};
use ethers::types::{Address, Bytes, H256, U256};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Structured input accepted by [`deep_hexlify`].
///
/// Mirrors the loosely typed objects a wallet builds before a JSON-RPC call:
/// numbers, big integers and byte buffers mixed with strings and nested containers.
#[derive(Clone, Debug, PartialEq)]
pub enum HexValue {
    Null,
    Bool(bool),
    String(String),
    Number(serde_json::Number),
    BigInt(U256),
    Bytes(Bytes),
    /// A callable member. Never serialized.
    Function,
    List(Vec<HexValue>),
    Record(BTreeMap<String, HexValue>),
}

impl From<Value> for HexValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => HexValue::Null,
            Value::Bool(b) => HexValue::Bool(b),
            Value::String(s) => HexValue::String(s),
            Value::Number(n) => HexValue::Number(n),
            Value::Array(items) => HexValue::List(items.into_iter().map(HexValue::from).collect()),
            Value::Object(map) => HexValue::Record(
                map.into_iter()
                    .map(|(k, v)| (k, HexValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<U256> for HexValue {
    fn from(v: U256) -> Self {
        HexValue::BigInt(v)
    }
}

impl From<u64> for HexValue {
    fn from(v: u64) -> Self {
        HexValue::Number(v.into())
    }
}

impl From<Bytes> for HexValue {
    fn from(b: Bytes) -> Self {
        HexValue::Bytes(b)
    }
}

impl From<Vec<u8>> for HexValue {
    fn from(b: Vec<u8>) -> Self {
        HexValue::Bytes(b.into())
    }
}

impl From<H256> for HexValue {
    fn from(h: H256) -> Self {
        HexValue::Bytes(Bytes::from(h.as_bytes().to_vec()))
    }
}

/// Addresses are already strings on the wire.
impl From<Address> for HexValue {
    fn from(a: Address) -> Self {
        HexValue::String(fmt_address(a))
    }
}

impl From<&str> for HexValue {
    fn from(s: &str) -> Self {
        HexValue::String(s.to_string())
    }
}

impl From<String> for HexValue {
    fn from(s: String) -> Self {
        HexValue::String(s)
    }
}

impl From<bool> for HexValue {
    fn from(b: bool) -> Self {
        HexValue::Bool(b)
    }
}

impl<T: Into<HexValue>> From<Option<T>> for HexValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(HexValue::Null)
    }
}

impl From<&UserOperation> for HexValue {
    fn from(op: &UserOperation) -> Self {
        let mut rec = BTreeMap::new();
        rec.insert("sender".to_string(), op.sender.into());
        rec.insert("nonce".to_string(), op.nonce.into());
        rec.insert("initCode".to_string(), op.init_code.clone().into());
        rec.insert("callData".to_string(), op.call_data.clone().into());
        rec.insert("callGasLimit".to_string(), op.call_gas_limit.into());
        rec.insert(
            "verificationGasLimit".to_string(),
            op.verification_gas_limit.into(),
        );
        rec.insert(
            "preVerificationGas".to_string(),
            op.pre_verification_gas.into(),
        );
        rec.insert("maxFeePerGas".to_string(), op.max_fee_per_gas.into());
        rec.insert(
            "maxPriorityFeePerGas".to_string(),
            op.max_priority_fee_per_gas.into(),
        );
        rec.insert(
            "paymasterAndData".to_string(),
            op.paymaster_and_data.clone().into(),
        );
        rec.insert("signature".to_string(), op.signature.clone().into());
        HexValue::Record(rec)
    }
}

pub fn fmt_address(addr: Address) -> String {
    format!("0x{}", hex::encode(addr.as_bytes()))
}

pub fn fmt_h256(h: H256) -> String {
    format!("0x{}", hex::encode(h.as_bytes()))
}

pub fn fmt_bytes(b: &[u8]) -> String {
    format!("0x{}", hex::encode(b))
}

/// JSON-RPC "quantity" encoding.
///
/// The value is rendered as even-length hex first, then a single redundant
/// leading zero nibble is dropped (`0x05` -> `0x5`, `0x00` -> `0x0`).
pub fn fmt_quantity(v: U256) -> String {
    let mut digits = format!("{v:x}");
    if digits.len() % 2 == 1 {
        digits.insert(0, '0');
    }
    let padded = format!("0x{digits}");
    match padded.strip_prefix("0x0") {
        Some(rest) => format!("0x{rest}"),
        None => padded,
    }
}

fn number_quantity(n: &serde_json::Number) -> Result<String, CodecError> {
    n.as_u64()
        .map(|v| fmt_quantity(U256::from(v)))
        .ok_or_else(|| CodecError::InvalidQuantity(n.to_string()))
}

/// Renders every numeric and binary leaf as a lowercase `0x` hex string.
///
/// Strings, booleans and nulls pass through untouched, so the transform is idempotent.
pub fn deep_hexlify(value: &HexValue) -> Result<Value, CodecError> {
    Ok(match value {
        HexValue::Null => Value::Null,
        HexValue::Bool(b) => Value::Bool(*b),
        HexValue::String(s) => Value::String(s.clone()),
        HexValue::Number(n) => Value::String(number_quantity(n)?),
        HexValue::BigInt(v) => Value::String(fmt_quantity(*v)),
        HexValue::Bytes(b) => Value::String(fmt_bytes(b)),
        // Dropped members serialize as absent; inside a list that is a null slot.
        HexValue::Function => Value::Null,
        HexValue::List(items) => Value::Array(
            items
                .iter()
                .map(deep_hexlify)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        HexValue::Record(rec) => {
            let mut out = Map::new();
            for (key, member) in rec {
                if matches!(member, HexValue::Function) {
                    continue;
                }
                out.insert(key.clone(), deep_hexlify(member)?);
            }
            Value::Object(out)
        }
    })
}

pub fn user_op_to_json(op: &UserOperation) -> Result<Value, CodecError> {
    deep_hexlify(&HexValue::from(op))
}

/// Resolves every pending field, then hexlifies the concrete operation.
pub async fn resolve_and_hexlify(op: UnresolvedUserOperation) -> anyhow::Result<Value> {
    let op = op.resolve().await?;
    Ok(user_op_to_json(&op)?)
}

pub fn parse_u256_quantity(s: &str) -> anyhow::Result<U256> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.is_empty() {
        return Ok(U256::zero());
    }
    Ok(U256::from_str_radix(s, 16)?)
}

pub fn parse_h256(s: &str) -> anyhow::Result<H256> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s)?;
    if bytes.len() != 32 {
        anyhow::bail!("expected 32-byte hex, got {} bytes", bytes.len());
    }
    Ok(H256::from_slice(&bytes))
}

pub fn parse_hex_bytes(s: &str) -> Result<Bytes, CodecError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    Ok(Bytes::from(hex::decode(s)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Field;
    use serde_json::json;
    use std::time::Duration;

    fn sample_op() -> UserOperation {
        UserOperation {
            sender: "0x9c5754De1443984659E1b3a8d1931D83475ba29C".parse().unwrap(),
            nonce: U256::from(5u64),
            init_code: Bytes::default(),
            call_data: Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]),
            call_gas_limit: U256::from(200_000u64),
            verification_gas_limit: U256::from(100_000u64),
            pre_verification_gas: U256::from(21_000u64),
            max_fee_per_gas: U256::from(3_000_000_000u64),
            max_priority_fee_per_gas: U256::from(1_000_000_000u64),
            paymaster_and_data: Bytes::default(),
            signature: Bytes::from(vec![0u8; 2]),
        }
    }

    #[test]
    fn quantity_strips_one_leading_zero_nibble() {
        assert_eq!(fmt_quantity(U256::zero()), "0x0");
        assert_eq!(fmt_quantity(U256::from(5u64)), "0x5");
        assert_eq!(fmt_quantity(U256::from(16u64)), "0x10");
        assert_eq!(fmt_quantity(U256::from(256u64)), "0x100");
        assert_eq!(fmt_quantity(U256::from(0xabcu64)), "0xabc");
        assert_eq!(fmt_quantity(U256::MAX), format!("0x{}", "f".repeat(64)));
    }

    #[test]
    fn hexlify_user_op() {
        let out = user_op_to_json(&sample_op()).unwrap();
        assert_eq!(
            out,
            json!({
                "sender": "0x9c5754de1443984659e1b3a8d1931d83475ba29c",
                "nonce": "0x5",
                "initCode": "0x",
                "callData": "0xdeadbeef",
                "callGasLimit": "0x30d40",
                "verificationGasLimit": "0x186a0",
                "preVerificationGas": "0x5208",
                "maxFeePerGas": "0xb2d05e00",
                "maxPriorityFeePerGas": "0x3b9aca00",
                "paymasterAndData": "0x",
                "signature": "0x0000"
            })
        );
    }

    #[test]
    fn hexlify_keeps_bytes_leading_zeros() {
        let out = deep_hexlify(&HexValue::from(vec![0x00u8, 0x01])).unwrap();
        assert_eq!(out, json!("0x0001"));
    }

    #[test]
    fn hexlify_nested_structure() {
        let mut rec = BTreeMap::new();
        rec.insert("gas".to_string(), HexValue::from(U256::from(1u64)));
        rec.insert("callback".to_string(), HexValue::Function);
        rec.insert("label".to_string(), HexValue::from("keep me"));
        rec.insert("flag".to_string(), HexValue::from(true));
        rec.insert("none".to_string(), HexValue::Null);
        rec.insert(
            "list".to_string(),
            HexValue::List(vec![
                HexValue::from(255u64),
                HexValue::Function,
                HexValue::from(vec![0xffu8]),
            ]),
        );

        let out = deep_hexlify(&HexValue::Record(rec)).unwrap();
        assert_eq!(
            out,
            json!({
                "gas": "0x1",
                "label": "keep me",
                "flag": true,
                "none": null,
                "list": ["0xff", null, "0xff"]
            })
        );
    }

    #[test]
    fn hexlify_is_idempotent() {
        let input = HexValue::from(json!({
            "a": 1,
            "b": [0, 4096, "0xabc"],
            "c": { "d": 17, "e": false, "f": null }
        }));
        let once = deep_hexlify(&input).unwrap();
        let twice = deep_hexlify(&HexValue::from(once.clone())).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once["b"], json!(["0x0", "0x1000", "0xabc"]));
        assert_eq!(once["c"]["d"], json!("0x11"));

        let op = user_op_to_json(&sample_op()).unwrap();
        assert_eq!(deep_hexlify(&HexValue::from(op.clone())).unwrap(), op);
    }

    #[test]
    fn hexlify_rejects_negative_and_fractional_numbers() {
        assert!(matches!(
            deep_hexlify(&HexValue::from(json!(-1))),
            Err(CodecError::InvalidQuantity(_))
        ));
        assert!(matches!(
            deep_hexlify(&HexValue::from(json!([1.5]))),
            Err(CodecError::InvalidQuantity(_))
        ));
    }

    #[test]
    fn parse_helpers() {
        assert_eq!(parse_u256_quantity("0x").unwrap(), U256::zero());
        assert_eq!(parse_u256_quantity("0x1f").unwrap(), U256::from(31u64));
        assert!(parse_h256("0x1234").is_err());
        assert_eq!(parse_hex_bytes("0xdead").unwrap().as_ref(), &[0xde, 0xad]);
        assert!(parse_hex_bytes("0xzz").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn resolve_and_hexlify_runs_fields_concurrently() {
        let mut op = UnresolvedUserOperation::from(sample_op());
        op.call_gas_limit = Field::pending(async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(U256::from(0x1234u64))
        });
        op.pre_verification_gas = Field::pending(async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(U256::from(0x10u64))
        });

        let started = tokio::time::Instant::now();
        let out = resolve_and_hexlify(op).await.unwrap();
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(500), "took {elapsed:?}");
        assert_eq!(out["callGasLimit"], json!("0x1234"));
        assert_eq!(out["preVerificationGas"], json!("0x10"));
    }

    #[tokio::test]
    async fn resolve_and_hexlify_rejects_without_output() {
        let mut op = UnresolvedUserOperation::from(sample_op());
        op.max_fee_per_gas = Field::pending(async { Err(anyhow::anyhow!("fee oracle down")) });
        let err = resolve_and_hexlify(op).await.unwrap_err();
        assert_eq!(err.to_string(), "fee oracle down");
    }
}
