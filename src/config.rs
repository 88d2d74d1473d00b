use anyhow::{Context, Result};
use ethers::abi::Abi;
use ethers::types::Address;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::address::WalletAddress;

const CONFIG_PATH_VAR: &str = "NFT_BOT_CONFIG";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(default = "default_contract_address")]
    pub contract_address: String,
    #[serde(default = "default_abi_path")]
    pub abi_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Webhook mode when true, long polling otherwise.
    #[serde(default)]
    pub production: bool,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub webhook_base_url: Option<String>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            contract_address: default_contract_address(),
            abi_path: default_abi_path(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            production: false,
            port: default_port(),
            webhook_base_url: None,
        }
    }
}

fn default_rpc_url() -> String {
    "https://rpc.ankr.com/eth".to_string()
}

fn default_contract_address() -> String {
    "0x3e6A286f005AC829b95DD102328E47A321D4FE4C".to_string()
}

fn default_abi_path() -> PathBuf {
    PathBuf::from("nft_abi.json")
}

fn default_port() -> u16 {
    8080
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => anyhow::bail!("{} must be \"true\" or \"false\", got {:?}", name, other),
    }
}

impl ChainConfig {
    pub fn contract_address(&self) -> Result<Address> {
        let address = WalletAddress::parse(&self.contract_address)
            .with_context(|| format!("Invalid contract address: {}", self.contract_address))?;
        Ok(address.as_address())
    }

    /// Load the contract interface. Startup must fail if this is missing,
    /// unparsable, or has no `balanceOf`.
    pub fn load_abi(&self) -> Result<Abi> {
        load_abi(&self.abi_path)
    }
}

pub fn load_abi(path: &Path) -> Result<Abi> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read ABI file: {}", path.display()))?;
    let abi: Abi = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse ABI file: {}", path.display()))?;
    abi.function("balanceOf")
        .with_context(|| format!("ABI in {} has no balanceOf function", path.display()))?;
    Ok(abi)
}

impl ServerConfig {
    /// Public URL Telegram should push updates to. The token doubles as the
    /// path so the endpoint cannot be guessed.
    pub fn webhook_url(&self, bot_token: &str) -> Result<String> {
        let base = self
            .webhook_base_url
            .as_deref()
            .context("WEBHOOK_BASE_URL is required in production mode")?;
        Ok(format!("{}/{}", base.trim_end_matches('/'), bot_token))
    }
}

impl Config {
    /// Read `config.toml` (or `$NFT_BOT_CONFIG`) if present, then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let content = if path.exists() {
            Some(
                std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?,
            )
        } else {
            None
        };

        Self::from_sources(content.as_deref(), |name| std::env::var(name).ok())
            .with_context(|| format!("Invalid configuration (file: {})", path.display()))
    }

    pub fn from_sources<F>(file: Option<&str>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: Config = match file {
            Some(content) => toml::from_str(content).context("Failed to parse config file")?,
            None => Config::default(),
        };

        if let Some(token) = env("TELEGRAM_BOT_TOKEN") {
            config.telegram.bot_token = token;
        }
        if let Some(url) = env("RPC_URL") {
            config.chain.rpc_url = url;
        }
        if let Some(address) = env("CONTRACT_ADDRESS") {
            config.chain.contract_address = address;
        }
        if let Some(path) = env("ABI_PATH") {
            config.chain.abi_path = PathBuf::from(path);
        }
        if let Some(flag) = env("PRODUCTION") {
            config.server.production = parse_bool("PRODUCTION", &flag)?;
        }
        if let Some(port) = env("PORT") {
            config.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("PORT must be a port number, got {:?}", port))?;
        }
        if let Some(url) = env("WEBHOOK_BASE_URL") {
            config.server.webhook_base_url = Some(url);
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            anyhow::bail!("Telegram bot token is not set (TELEGRAM_BOT_TOKEN)");
        }
        self.chain.contract_address()?;
        if self.server.production {
            self.server.webhook_url(&self.telegram.bot_token)?;
        }
        Ok(())
    }
}
