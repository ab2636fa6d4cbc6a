//! ABI packing and hashing of v0.6 UserOperations.

use crate::types::UserOperation;
use ethers::abi::{encode, Token};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;

fn hashed(b: &Bytes) -> Token {
    Token::FixedBytes(keccak256(b.as_ref()).to_vec())
}

/// Pre-image of the operation hash.
///
/// The three dynamic fields are replaced by their keccak256 and the signature is
/// left out, so the encoding is always ten words.
pub fn pack_for_signature(op: &UserOperation) -> Bytes {
    encode(&[
        Token::Address(op.sender),
        Token::Uint(op.nonce),
        hashed(&op.init_code),
        hashed(&op.call_data),
        Token::Uint(op.call_gas_limit),
        Token::Uint(op.verification_gas_limit),
        Token::Uint(op.pre_verification_gas),
        Token::Uint(op.max_fee_per_gas),
        Token::Uint(op.max_priority_fee_per_gas),
        hashed(&op.paymaster_and_data),
    ])
    .into()
}

/// Full ABI encoding including raw dynamic bytes and the signature.
///
/// Its length tracks the calldata an EntryPoint call carrying this operation pays for.
pub fn pack_for_gas_estimation(op: &UserOperation) -> Bytes {
    encode(&[
        Token::Address(op.sender),
        Token::Uint(op.nonce),
        Token::Bytes(op.init_code.to_vec()),
        Token::Bytes(op.call_data.to_vec()),
        Token::Uint(op.call_gas_limit),
        Token::Uint(op.verification_gas_limit),
        Token::Uint(op.pre_verification_gas),
        Token::Uint(op.max_fee_per_gas),
        Token::Uint(op.max_priority_fee_per_gas),
        Token::Bytes(op.paymaster_and_data.to_vec()),
        Token::Bytes(op.signature.to_vec()),
    ])
    .into()
}

/// `userOpHash` as computed by `EntryPoint.getUserOpHash`.
///
/// Binds the operation to one EntryPoint and one chain.
pub fn user_op_hash(op: &UserOperation, entry_point: Address, chain_id: impl Into<U256>) -> H256 {
    let inner = keccak256(pack_for_signature(op));
    let outer = encode(&[
        Token::FixedBytes(inner.to_vec()),
        Token::Address(entry_point),
        Token::Uint(chain_id.into()),
    ]);
    H256::from(keccak256(outer))
}
