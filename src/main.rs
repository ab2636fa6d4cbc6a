use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Bytes;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use userop_codec::bundler::BundlerClient;
use userop_codec::config::{load_deployment, resolve_config, EntryPointConfig, Overrides};
use userop_codec::encoding::{fmt_bytes, fmt_h256, fmt_quantity};
use userop_codec::{
    calc_pre_verification_gas, decode_revert_reason_hex, deep_hexlify, pack_for_gas_estimation,
    pack_for_signature, user_op_hash, user_op_to_json, GasOverheads, HexValue, UserOperation,
};

#[derive(Parser, Debug)]
#[command(name = "userop", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// ABI-pack a UserOperation.
    Pack(PackArgs),

    /// Compute the userOpHash for an EntryPoint and chain.
    Hash(HashArgs),

    /// Sign the userOpHash and print the signed UserOperation.
    Sign(SignArgs),

    /// Compute preVerificationGas from the operation's calldata cost.
    PreVerificationGas(PreVerificationGasArgs),

    /// Decode an EntryPoint revert payload.
    DecodeRevert(DecodeRevertArgs),

    /// Hexlify every number in a JSON document.
    Hexlify(HexlifyArgs),

    /// Sign and submit a UserOperation to a bundler.
    Send(SendArgs),
}

#[derive(Args, Debug)]
struct OpArgs {
    /// UserOperation JSON file (bundler shape, camelCase keys).
    #[arg(long)]
    op: PathBuf,
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// Deployment file with chainId, entryPoint and an optional bundlerUrl.
    #[arg(long, env = "USEROP_DEPLOYMENT")]
    deployment: Option<PathBuf>,

    /// EntryPoint address (overrides the deployment file).
    #[arg(long, env = "USEROP_ENTRYPOINT")]
    entrypoint: Option<String>,

    /// Chain id (overrides the deployment file).
    #[arg(long, env = "USEROP_CHAIN_ID")]
    chain_id: Option<u64>,

    /// Bundler RPC URL (overrides the deployment file).
    #[arg(long, env = "USEROP_BUNDLER_URL")]
    bundler: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum PackMode {
    /// Hash pre-image (dynamic fields hashed, no signature).
    Signature,
    /// Full encoding used for calldata cost.
    Gas,
}

#[derive(Args, Debug)]
struct PackArgs {
    #[command(flatten)]
    op: OpArgs,

    #[arg(long, value_enum, default_value_t = PackMode::Signature)]
    mode: PackMode,
}

#[derive(Args, Debug)]
struct HashArgs {
    #[command(flatten)]
    op: OpArgs,

    #[command(flatten)]
    target: TargetArgs,
}

#[derive(Args, Debug)]
struct SignArgs {
    #[command(flatten)]
    op: OpArgs,

    #[command(flatten)]
    target: TargetArgs,

    /// Signer private key. Recommended: set via env var USEROP_SIGNER_PRIVATE_KEY.
    #[arg(long, env = "USEROP_SIGNER_PRIVATE_KEY", hide_env_values = true)]
    private_key: String,
}

#[derive(Args, Debug)]
struct PreVerificationGasArgs {
    #[command(flatten)]
    op: OpArgs,

    /// Number of operations sharing the fixed bundle cost.
    #[arg(long, default_value_t = 1)]
    bundle_size: u64,
}

#[derive(Args, Debug)]
struct DecodeRevertArgs {
    /// Revert data as 0x-prefixed hex.
    data: String,
}

#[derive(Args, Debug)]
struct HexlifyArgs {
    /// JSON file to convert.
    file: PathBuf,
}

#[derive(Args, Debug)]
struct SendArgs {
    #[command(flatten)]
    op: OpArgs,

    #[command(flatten)]
    target: TargetArgs,

    #[arg(long, env = "USEROP_SIGNER_PRIVATE_KEY", hide_env_values = true)]
    private_key: String,

    /// Replace the gas limits with the bundler's eth_estimateUserOperationGas result.
    #[arg(long, default_value_t = false)]
    estimate: bool,

    /// Do not send the UserOperation; only sign (and estimate).
    #[arg(long)]
    dry_run: bool,

    /// Do not wait for the userOp receipt.
    #[arg(long)]
    no_wait: bool,

    /// Max seconds to wait for userOp receipt. Use 0 to disable timeout.
    #[arg(long, default_value_t = 180)]
    max_wait_seconds: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        // Always write logs to stderr so stdout can be used for script-friendly outputs.
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::Pack(args) => cmd_pack(args),
        Command::Hash(args) => cmd_hash(args),
        Command::Sign(args) => cmd_sign(args).await,
        Command::PreVerificationGas(args) => cmd_pre_verification_gas(args),
        Command::DecodeRevert(args) => cmd_decode_revert(args),
        Command::Hexlify(args) => cmd_hexlify(args),
        Command::Send(args) => cmd_send(args).await,
    }
}

fn read_op(path: &Path) -> Result<UserOperation> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read user operation at {}", path.display()))?;
    UserOperation::from_json_str(&raw)
        .with_context(|| format!("invalid user operation in {}", path.display()))
}

fn target_config(target: &TargetArgs) -> Result<EntryPointConfig> {
    let deployment = target
        .deployment
        .as_deref()
        .map(load_deployment)
        .transpose()?;
    resolve_config(
        deployment.as_ref(),
        Overrides {
            chain_id: target.chain_id,
            entry_point: target.entrypoint.clone(),
            bundler_url: target.bundler.clone(),
        },
    )
}

fn parse_wallet(private_key: &str, chain_id: u64) -> Result<LocalWallet> {
    let wallet: LocalWallet = private_key
        .trim()
        .parse()
        .map_err(|e| anyhow!("invalid signer private key: {e}"))?;
    Ok(wallet.with_chain_id(chain_id))
}

fn cmd_pack(args: PackArgs) -> Result<()> {
    let op = read_op(&args.op.op)?;
    let packed = match args.mode {
        PackMode::Signature => pack_for_signature(&op),
        PackMode::Gas => pack_for_gas_estimation(&op),
    };
    tracing::debug!(mode = ?args.mode, len = packed.len(), "packed user operation");
    println!("{}", fmt_bytes(&packed));
    Ok(())
}

fn cmd_hash(args: HashArgs) -> Result<()> {
    let op = read_op(&args.op.op)?;
    let cfg = target_config(&args.target)?;
    let hash = user_op_hash(&op, cfg.entry_point, cfg.chain_id);
    println!("{}", fmt_h256(hash));
    Ok(())
}

/// Signs the userOpHash with an EIP-191 personal message signature, as SimpleAccount expects.
async fn sign_userop(op: &mut UserOperation, cfg: &EntryPointConfig, wallet: &LocalWallet) -> Result<()> {
    let hash = user_op_hash(op, cfg.entry_point, cfg.chain_id);
    let sig = wallet
        .sign_message(hash.as_bytes())
        .await
        .context("failed to sign userOpHash")?;
    op.signature = Bytes::from(sig.to_vec());
    tracing::info!(
        user_op_hash = %fmt_h256(hash),
        signer = %wallet.address(),
        "signed user operation"
    );
    Ok(())
}

async fn cmd_sign(args: SignArgs) -> Result<()> {
    let mut op = read_op(&args.op.op)?;
    let cfg = target_config(&args.target)?;
    let wallet = parse_wallet(&args.private_key, cfg.chain_id)?;
    sign_userop(&mut op, &cfg, &wallet).await?;
    println!("{}", serde_json::to_string_pretty(&user_op_to_json(&op)?)?);
    Ok(())
}

fn cmd_pre_verification_gas(args: PreVerificationGasArgs) -> Result<()> {
    let op = read_op(&args.op.op)?;
    let ov = GasOverheads {
        bundle_size: args.bundle_size,
        ..Default::default()
    };
    let pvg = calc_pre_verification_gas(&op, &ov);
    println!("{} ({})", fmt_quantity(pvg), pvg);
    Ok(())
}

fn cmd_decode_revert(args: DecodeRevertArgs) -> Result<()> {
    match decode_revert_reason_hex(args.data.trim()).context("failed to decode revert data")? {
        Some(decoded) => {
            let out = serde_json::json!({
                "message": decoded.message,
                "opIndex": decoded.op_index.map(|i| i.to_string()),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        None => {
            tracing::warn!(data = %args.data, "unrecognized revert selector");
            println!("null");
        }
    }
    Ok(())
}

fn cmd_hexlify(args: HexlifyArgs) -> Result<()> {
    let raw = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse JSON in {}", args.file.display()))?;
    let out = deep_hexlify(&HexValue::from(value))?;
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn cmd_send(args: SendArgs) -> Result<()> {
    let mut op = read_op(&args.op.op)?;
    let cfg = target_config(&args.target)?;
    let bundler_url = cfg
        .bundler_url
        .clone()
        .ok_or_else(|| anyhow!("send requires --bundler (or USEROP_BUNDLER_URL / deployment bundlerUrl)"))?;
    let wallet = parse_wallet(&args.private_key, cfg.chain_id)?;
    let bundler = BundlerClient::new(bundler_url);

    let supported = bundler.supported_entry_points().await?;
    if !supported.contains(&cfg.entry_point) {
        return Err(anyhow!(
            "bundler does not support entryPoint {:?} (supported: {:?})",
            cfg.entry_point,
            supported
        ));
    }

    if args.estimate {
        // Sign for estimation; some accounts revert on an empty signature.
        sign_userop(&mut op, &cfg, &wallet).await?;
        let est = bundler
            .estimate_user_operation_gas(&op, cfg.entry_point)
            .await
            .context("bundler gas estimate failed")?;

        let local_pvg = calc_pre_verification_gas(&op, &GasOverheads::default());
        tracing::info!(
            call_gas_limit = %est.call_gas_limit,
            verification_gas_limit = %est.verification_gas_limit,
            pre_verification_gas = %est.pre_verification_gas,
            local_pre_verification_gas = %local_pvg,
            "bundler gas estimate"
        );

        op.call_gas_limit = est.call_gas_limit;
        op.verification_gas_limit = est.verification_gas_limit;
        op.pre_verification_gas = est.pre_verification_gas.max(local_pvg);
    }

    // Re-sign with final gas limits.
    sign_userop(&mut op, &cfg, &wallet).await?;
    eprintln!(
        "UserOperation (final):\n{}",
        serde_json::to_string_pretty(&user_op_to_json(&op)?)?
    );

    if args.dry_run {
        eprintln!("--dry-run set: not sending user operation.");
        return Ok(());
    }

    let user_op_hash = bundler
        .send_user_operation(&op, cfg.entry_point)
        .await
        .context("bundler send failed")?;
    println!("{}", fmt_h256(user_op_hash));

    if args.no_wait {
        return Ok(());
    }

    let receipt = bundler
        .wait_user_operation_receipt(user_op_hash, Duration::from_secs(args.max_wait_seconds))
        .await
        .context("failed waiting for userOp receipt")?;
    let success = receipt.get("success").and_then(|v| v.as_bool());
    tracing::info!(?success, "user operation included");
    eprintln!("UserOp receipt:\n{}", serde_json::to_string_pretty(&receipt)?);

    if success == Some(false) {
        return Err(anyhow!("user operation reverted on-chain"));
    }
    Ok(())
}
