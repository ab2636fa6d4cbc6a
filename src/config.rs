use anyhow::{anyhow, Context, Result};
use ethers::types::Address;
use serde::Deserialize;
use std::{env, fs, path::Path};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPointDeploymentRaw {
    pub chain_id: u64,
    pub entry_point: String,
    #[serde(default)]
    pub bundler_url: Option<String>,
    #[serde(default)]
    pub bundler_url_env_var: Option<String>,
}

/// Where operations are hashed for and sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPointConfig {
    pub chain_id: u64,
    pub entry_point: Address,
    pub bundler_url: Option<String>,
}

/// Explicit values (CLI flags / env) that take precedence over the deployment file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub chain_id: Option<u64>,
    pub entry_point: Option<String>,
    pub bundler_url: Option<String>,
}

pub fn load_deployment(path: &Path) -> Result<EntryPointDeploymentRaw> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read deployment json at {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse deployment json at {}", path.display()))
}

/// Merges the optional deployment file with overrides.
///
/// Bundler URL precedence: override, then the env var named by the file, then the file.
pub fn resolve_config(
    deployment: Option<&EntryPointDeploymentRaw>,
    overrides: Overrides,
) -> Result<EntryPointConfig> {
    let chain_id = overrides
        .chain_id
        .or(deployment.map(|d| d.chain_id))
        .ok_or_else(|| anyhow!("missing chain id (use --chain-id or a deployment file)"))?;

    let entry_point = overrides
        .entry_point
        .or_else(|| deployment.map(|d| d.entry_point.clone()))
        .ok_or_else(|| anyhow!("missing entry point (use --entrypoint or a deployment file)"))?;
    let entry_point = parse_addr(&entry_point).context("invalid entryPoint address")?;

    let bundler_url = if let Some(url) = overrides.bundler_url {
        Some(url)
    } else if let Some(d) = deployment {
        match d.bundler_url_env_var.as_deref() {
            Some(var) => env::var(var).ok().or_else(|| d.bundler_url.clone()),
            None => d.bundler_url.clone(),
        }
    } else {
        None
    };

    Ok(EntryPointConfig {
        chain_id,
        entry_point,
        bundler_url,
    })
}

pub fn parse_addr(s: &str) -> Result<Address> {
    let hex_part = s.strip_prefix("0x").unwrap_or(s);
    if hex_part.len() != 40 {
        return Err(anyhow!("expected a 20-byte address, got {s:?}"));
    }
    s.parse::<Address>().map_err(|e| anyhow!("{e}"))
}
