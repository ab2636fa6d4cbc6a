//! ERC-4337 (EntryPoint v0.6) UserOperation codec.
//!
//! Packing and hashing live in [`packing`], revert decoding in [`revert`] and the
//! JSON-RPC hex conversions in [`encoding`].

pub mod bundler;
pub mod config;
pub mod encoding;
pub mod error;
pub mod gas;
pub mod packing;
pub mod revert;
pub mod types;

pub use encoding::{deep_hexlify, resolve_and_hexlify, user_op_to_json, HexValue};
pub use error::CodecError;
pub use gas::{calc_pre_verification_gas, GasOverheads};
pub use packing::{pack_for_gas_estimation, pack_for_signature, user_op_hash};
pub use revert::{
    decode_revert_reason, decode_revert_reason_hex, enrich_revert_error,
    rethrow_with_decoded_reason, DecodedRevert, RevertError,
};
pub use types::{Field, UnresolvedUserOperation, UserOperation};
