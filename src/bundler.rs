use crate::encoding::{fmt_address, fmt_h256, parse_h256, parse_u256_quantity, user_op_to_json};
use crate::revert::{rethrow_with_decoded_reason, RevertError};
use crate::types::UserOperation;
use anyhow::{anyhow, Context, Result};
use ethers::types::{Address, H256, U256};
use serde_json::Value;
use std::convert::Infallible;
use std::time::Duration;

/// ERC-4337 bundler JSON-RPC client.
#[derive(Debug, Clone)]
pub struct BundlerClient {
    url: String,
    http: reqwest::Client,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasEstimates {
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
}

impl BundlerClient {
    pub fn new(url: String) -> Self {
        Self {
            url,
            http: reqwest::Client::new(),
        }
    }

    pub async fn supported_entry_points(&self) -> Result<Vec<Address>> {
        let res = self
            .rpc("eth_supportedEntryPoints", serde_json::json!([]))
            .await
            .context("eth_supportedEntryPoints failed")?;
        res.as_array()
            .ok_or_else(|| anyhow!("expected an array of entry points, got {res}"))?
            .iter()
            .map(|v| {
                v.as_str()
                    .ok_or_else(|| anyhow!("entry point is not a string: {v}"))?
                    .parse::<Address>()
                    .map_err(|e| anyhow!("invalid entry point address: {e}"))
            })
            .collect()
    }

    pub async fn estimate_user_operation_gas(
        &self,
        op: &UserOperation,
        entrypoint: Address,
    ) -> Result<GasEstimates> {
        let params = serde_json::json!([user_op_to_json(op)?, fmt_address(entrypoint)]);
        let res = self
            .rpc("eth_estimateUserOperationGas", params)
            .await
            .context("eth_estimateUserOperationGas failed")?;
        parse_gas_estimates(&res)
    }

    pub async fn send_user_operation(&self, op: &UserOperation, entrypoint: Address) -> Result<H256> {
        let params = serde_json::json!([user_op_to_json(op)?, fmt_address(entrypoint)]);
        let res = self
            .rpc("eth_sendUserOperation", params)
            .await
            .context("eth_sendUserOperation failed")?;
        parse_userop_hash(&res)
    }

    pub async fn get_user_operation_receipt(&self, user_op_hash: H256) -> Result<Option<Value>> {
        let params = serde_json::json!([fmt_h256(user_op_hash)]);
        let res = self.rpc("eth_getUserOperationReceipt", params).await?;
        Ok(if res.is_null() { None } else { Some(res) })
    }

    /// Poll for a receipt until timeout. A zero timeout polls forever.
    pub async fn wait_user_operation_receipt(
        &self,
        user_op_hash: H256,
        timeout: Duration,
    ) -> Result<Value> {
        let start = std::time::Instant::now();
        loop {
            if !timeout.is_zero() && start.elapsed() > timeout {
                return Err(anyhow!(
                    "timed out waiting for userOp receipt after {:?}",
                    timeout
                ));
            }

            match self.get_user_operation_receipt(user_op_hash).await {
                Ok(Some(v)) => return Ok(v),
                Ok(None) => {}
                Err(e) => {
                    // transient errors are common on free-tier bundlers; keep polling
                    tracing::warn!(error = %e, "bundler receipt poll error");
                }
            }

            tokio::time::sleep(Duration::from_millis(1500)).await;
        }
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value> {
        let req = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        tracing::debug!(method, url = %self.url, "bundler request");

        let resp = self
            .http
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .with_context(|| format!("POST {} failed", self.url))?;

        let status = resp.status();
        let body: Value = resp.json().await.context("failed to decode JSON")?;

        // Bundlers report reverts with both 200 and 4xx/5xx statuses.
        if let Some(err) = body.get("error") {
            return Err(rpc_error(err).into());
        }

        if !status.is_success() {
            return Err(anyhow!("HTTP {}: {}", status, body));
        }

        body.get("result")
            .cloned()
            .ok_or_else(|| anyhow!("missing result field"))
    }
}

/// Wraps a JSON-RPC `error` member, decoding any EntryPoint revert it carries.
fn rpc_error(err: &Value) -> RevertError {
    let message = err
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("RPC error");
    let wrapped = serde_json::json!({ "message": message, "error": err });
    match rethrow_with_decoded_reason::<Infallible>(wrapped) {
        Ok(never) => match never {},
        Err(e) => e,
    }
}

fn parse_u256_field(v: &Value, key: &str) -> Result<U256> {
    let field = v
        .get(key)
        .ok_or_else(|| anyhow!("missing field {key}"))?;
    // Some bundlers return plain JSON numbers instead of hex quantities.
    if let Some(n) = field.as_u64() {
        return Ok(U256::from(n));
    }
    let s = field
        .as_str()
        .ok_or_else(|| anyhow!("invalid field {key}: {field}"))?;
    parse_u256_quantity(s)
}

fn parse_gas_estimates(res: &Value) -> Result<GasEstimates> {
    Ok(GasEstimates {
        call_gas_limit: parse_u256_field(res, "callGasLimit")?,
        verification_gas_limit: parse_u256_field(res, "verificationGasLimit")?,
        pre_verification_gas: parse_u256_field(res, "preVerificationGas")?,
    })
}

fn parse_userop_hash(res: &Value) -> Result<H256> {
    // Most bundlers return the userOpHash directly as a JSON string; some wrap it.
    let hash_str = if let Some(s) = res.as_str() {
        s
    } else if let Some(s) = res.get("result").and_then(|v| v.as_str()) {
        s
    } else if let Some(s) = res.get("userOpHash").and_then(|v| v.as_str()) {
        s
    } else if let Some(s) = res.get("userOperationHash").and_then(|v| v.as_str()) {
        s
    } else {
        return Err(anyhow!(
            "unexpected eth_sendUserOperation result shape (expected string or {{result: ...}}): {}",
            res
        ));
    };

    parse_h256(hash_str)
}
