use ethers::types::{Address, Bytes, U256};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// ERC-4337 UserOperation (EntryPoint v0.6 layout).
///
/// Note: EntryPoint v0.7 uses a *different* packed struct layout.
///
/// Deserializes from the bundler JSON shape (camelCase keys, `0x` hex quantities).
/// Every field is required; a missing or malformed field is rejected by serde.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

impl UserOperation {
    pub fn from_json_str(s: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

/// A single, possibly not yet computed, UserOperation field.
///
/// Gas limits and fees are usually fetched over the network while the rest of the
/// operation is already known; `Pending` carries that in-flight work.
pub enum Field<T> {
    Ready(T),
    Pending(BoxFuture<'static, anyhow::Result<T>>),
}

impl<T: Send + 'static> Field<T> {
    pub fn pending<F>(fut: F) -> Self
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self::Pending(Box::pin(fut))
    }

    pub async fn resolve(self) -> anyhow::Result<T> {
        match self {
            Field::Ready(v) => Ok(v),
            Field::Pending(fut) => fut.await,
        }
    }
}

impl<T> From<T> for Field<T> {
    fn from(value: T) -> Self {
        Field::Ready(value)
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Field::Ready(v) => f.debug_tuple("Ready").field(v).finish(),
            Field::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// A UserOperation whose fields may still be futures.
#[derive(Debug)]
pub struct UnresolvedUserOperation {
    pub sender: Field<Address>,
    pub nonce: Field<U256>,
    pub init_code: Field<Bytes>,
    pub call_data: Field<Bytes>,
    pub call_gas_limit: Field<U256>,
    pub verification_gas_limit: Field<U256>,
    pub pre_verification_gas: Field<U256>,
    pub max_fee_per_gas: Field<U256>,
    pub max_priority_fee_per_gas: Field<U256>,
    pub paymaster_and_data: Field<Bytes>,
    pub signature: Field<Bytes>,
}

impl UnresolvedUserOperation {
    /// Awaits every pending field concurrently.
    ///
    /// The first field to fail aborts the whole resolution with its own error.
    pub async fn resolve(self) -> anyhow::Result<UserOperation> {
        let (
            sender,
            nonce,
            init_code,
            call_data,
            call_gas_limit,
            verification_gas_limit,
            pre_verification_gas,
            max_fee_per_gas,
            max_priority_fee_per_gas,
            paymaster_and_data,
            signature,
        ) = futures::try_join!(
            self.sender.resolve(),
            self.nonce.resolve(),
            self.init_code.resolve(),
            self.call_data.resolve(),
            self.call_gas_limit.resolve(),
            self.verification_gas_limit.resolve(),
            self.pre_verification_gas.resolve(),
            self.max_fee_per_gas.resolve(),
            self.max_priority_fee_per_gas.resolve(),
            self.paymaster_and_data.resolve(),
            self.signature.resolve(),
        )?;

        Ok(UserOperation {
            sender,
            nonce,
            init_code,
            call_data,
            call_gas_limit,
            verification_gas_limit,
            pre_verification_gas,
            max_fee_per_gas,
            max_priority_fee_per_gas,
            paymaster_and_data,
            signature,
        })
    }
}

impl From<UserOperation> for UnresolvedUserOperation {
    fn from(op: UserOperation) -> Self {
        Self {
            sender: op.sender.into(),
            nonce: op.nonce.into(),
            init_code: op.init_code.into(),
            call_data: op.call_data.into(),
            call_gas_limit: op.call_gas_limit.into(),
            verification_gas_limit: op.verification_gas_limit.into(),
            pre_verification_gas: op.pre_verification_gas.into(),
            max_fee_per_gas: op.max_fee_per_gas.into(),
            max_priority_fee_per_gas: op.max_priority_fee_per_gas.into(),
            paymaster_and_data: op.paymaster_and_data.into(),
            signature: op.signature.into(),
        }
    }
}
