use crate::packing::pack_for_gas_estimation;
use crate::types::UserOperation;
use ethers::types::{Bytes, U256};

/// Calldata overheads charged on top of the packed operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GasOverheads {
    /// Fixed per-bundle cost, split evenly across `bundle_size` operations.
    pub fixed: u64,
    pub per_user_op: u64,
    pub per_user_op_word: u64,
    pub zero_byte: u64,
    pub non_zero_byte: u64,
    pub bundle_size: u64,
    /// Length of the dummy signature used when the operation is not signed yet.
    pub sig_size: usize,
}

impl Default for GasOverheads {
    fn default() -> Self {
        Self {
            fixed: 21_000,
            per_user_op: 18_300,
            per_user_op_word: 4,
            zero_byte: 4,
            non_zero_byte: 16,
            bundle_size: 1,
            sig_size: 65,
        }
    }
}

/// `preVerificationGas` covering the calldata cost of submitting `op` in a bundle.
///
/// The operation's own `preVerificationGas` is replaced by a placeholder and an
/// unsigned operation gets a dummy signature, so the estimate does not depend on
/// values that are only known after it.
pub fn calc_pre_verification_gas(op: &UserOperation, ov: &GasOverheads) -> U256 {
    let mut probe = op.clone();
    probe.pre_verification_gas = U256::from(21_000u64);
    if probe.signature.is_empty() {
        probe.signature = Bytes::from(vec![1u8; ov.sig_size]);
    }

    let packed = pack_for_gas_estimation(&probe);
    let words = packed.len().div_ceil(32) as u64;
    let call_data_cost: u64 = packed
        .iter()
        .map(|b| if *b == 0 { ov.zero_byte } else { ov.non_zero_byte })
        .sum();

    // fixed / bundle_size, rounded half up
    let bundle_size = ov.bundle_size.max(1);
    let fixed_share = (2 * ov.fixed + bundle_size) / (2 * bundle_size);

    U256::from(call_data_cost + fixed_share + ov.per_user_op + ov.per_user_op_word * words)
}
