use thiserror::Error;

/// Failures raised by the pure codec functions.
///
/// Anything above the codec (config, bundler, CLI) wraps these in `anyhow`.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("abi decode failed: {0}")]
    Abi(#[from] ethers::abi::Error),

    #[error("unexpected abi tokens in {0} payload")]
    UnexpectedTokens(&'static str),

    /// Hex quantities are unsigned integers only.
    #[error("invalid quantity {0}: expected a non-negative integer")]
    InvalidQuantity(String),
}
