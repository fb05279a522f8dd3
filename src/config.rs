use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result, bail};

/// Runtime configuration for the bot core. Owned by the caller — front-ends
/// build one and hand it to the components; nothing here is global.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// HTTPS endpoint for the chain JSON-RPC.
    pub rpc_url: String,
    /// Used in the auth payload and subscription stream names.
    pub chain_id: u64,
    pub exchange_address: Address,
    pub collateral_token: Address,

    /// Cold key; never used for trading after proxy setup.
    pub owner_private_key: Option<String>,
    /// Hot key trading through the proxy.
    pub operator_private_key: String,
    /// Proxy through which operator writes flow.
    pub delegated_account_address: Option<Address>,

    pub api_base_url: String,
    pub ws_url: String,
    /// Prefer API reads where the router has both paths.
    pub use_api: bool,

    pub anthropic_api_key: Option<String>,
    pub chatbot_model: String,
    /// Path to the fork binary used by the liquidation simulator.
    pub anvil_path: String,
}

impl BotConfig {
    /// Build from environment variables. Private keys resolve from
    /// `PERPLBOT_*_KEY` or `PERPLBOT_*_KEY_FILE`.
    ///
    /// Using the `_FILE` variant is preferred in containers — the key never
    /// appears in `env` or `printenv` output, reducing accidental exposure.
    pub fn from_env() -> Result<Self> {
        let rpc_url = require_env("PERPLBOT_RPC_URL")?;
        let chain_id: u64 = require_env("PERPLBOT_CHAIN_ID")?
            .parse()
            .context("PERPLBOT_CHAIN_ID must be a number")?;
        let exchange_address = parse_address(&require_env("PERPLBOT_EXCHANGE_ADDRESS")?)?;
        let collateral_token = parse_address(&require_env("PERPLBOT_COLLATERAL_TOKEN")?)?;

        let operator_private_key = key_from_env("PERPLBOT_OPERATOR_KEY")?.ok_or_else(|| {
            anyhow::anyhow!(
                "Operator key not configured. Set PERPLBOT_OPERATOR_KEY or \
                 PERPLBOT_OPERATOR_KEY_FILE pointing to a file containing the key."
            )
        })?;
        let owner_private_key = key_from_env("PERPLBOT_OWNER_KEY")?;

        let delegated_account_address = match std::env::var("PERPLBOT_DELEGATED_ACCOUNT") {
            Ok(addr) if !addr.trim().is_empty() => Some(parse_address(&addr)?),
            _ => None,
        };

        Ok(BotConfig {
            rpc_url,
            chain_id,
            exchange_address,
            collateral_token,
            owner_private_key,
            operator_private_key,
            delegated_account_address,
            api_base_url: require_env("PERPLBOT_API_BASE_URL")?,
            ws_url: require_env("PERPLBOT_WS_URL")?,
            use_api: std::env::var("PERPLBOT_USE_API")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true),
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok().filter(|k| !k.is_empty()),
            chatbot_model: std::env::var("PERPLBOT_CHATBOT_MODEL")
                .unwrap_or_else(|_| "claude-sonnet-4-5".to_string()),
            anvil_path: std::env::var("PERPLBOT_ANVIL_PATH")
                .unwrap_or_else(|_| "anvil".to_string()),
        })
    }

    pub fn operator_signer(&self) -> Result<PrivateKeySigner> {
        self.operator_private_key
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid operator private key: {e}"))
    }

    pub fn owner_signer(&self) -> Result<PrivateKeySigner> {
        let key = self
            .owner_private_key
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Owner key not configured"))?;
        key.parse()
            .map_err(|e| anyhow::anyhow!("Invalid owner private key: {e}"))
    }

    pub fn operator_address(&self) -> Result<Address> {
        Ok(self.operator_signer()?.address())
    }
}

fn require_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => bail!("{name} is not set"),
    }
}

/// Resolve a key from `<name>` directly or `<name>_FILE` as a path.
fn key_from_env(name: &str) -> Result<Option<String>> {
    if let Ok(key) = std::env::var(name) {
        if !key.trim().is_empty() {
            return Ok(Some(key.trim().to_string()));
        }
    }
    let file_var = format!("{name}_FILE");
    if let Ok(path) = std::env::var(&file_var) {
        let key = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Failed to read private key from {path}: {e}"))?
            .trim()
            .to_string();
        if key.is_empty() {
            bail!("{file_var} points at an empty file");
        }
        return Ok(Some(key));
    }
    Ok(None)
}

fn parse_address(value: &str) -> Result<Address> {
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid address '{value}': {e}"))
}
