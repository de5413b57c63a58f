use std::env;
use std::time::Duration;

use crate::enums::ChainBackend;

#[derive(Debug, Clone)]
pub enum NetworkMode {
    Testnet,
    Mainnet,
}

/// Settings for the chain transactor selected by `CHAIN_BACKEND`.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub backend: ChainBackend,
    pub rpc_url: String,
    /// EVM chain id; unused by Solana.
    pub chain_id: Option<u64>,
    pub wallet_mnemonic: String,
    pub stable_token_address: Option<String>,
    pub stable_token_decimals: u32,
}

/// Settings for the price analysis pipeline.
#[derive(Debug, Clone)]
pub struct PriceConfig {
    pub asset_id: String,
    pub coingecko_api_base: String,
    pub coingecko_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_api_base: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub network_mode: NetworkMode,
    pub database_url: String,
    pub chain: ChainConfig,
    pub price: PriceConfig,
    pub server_host: String,
    pub server_port: u16,
    pub transactor_timeout: Duration,
    pub oracle_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenv::dotenv().ok();

        let network_mode = match
            env::var("NETWORK_MODE").unwrap_or_else(|_| "testnet".to_string()).to_lowercase().as_str()
        {
            "mainnet" => NetworkMode::Mainnet,
            "testnet" => NetworkMode::Testnet,
            _ => {
                return Err("NETWORK_MODE must be 'testnet' or 'mainnet'".into());
            }
        };

        let database_url = env::var("DATABASE_URL")?;

        let backend: ChainBackend = env
            ::var("CHAIN_BACKEND")
            .unwrap_or_else(|_| "evm".to_string())
            .parse()?;

        let wallet_mnemonic = env::var("WALLET_MNEMONIC")?;
        let rpc_url = env::var("CHAIN_RPC_URL")?;

        let chain_id = match backend {
            ChainBackend::Evm =>
                Some(match env::var("CHAIN_ID") {
                    Ok(value) => value.parse()?,
                    Err(_) => Self::default_evm_chain_id(&network_mode),
                }),
            ChainBackend::Solana => None,
        };

        let stable_token_address = env
            ::var("STABLE_TOKEN_ADDRESS")
            .ok()
            .filter(|s| !s.trim().is_empty());
        let stable_token_decimals = env
            ::var("STABLE_TOKEN_DECIMALS")
            .unwrap_or_else(|_| "6".to_string())
            .parse()?;

        let price = PriceConfig {
            asset_id: env
                ::var("PRICE_ASSET_ID")
                .unwrap_or_else(|_| backend.default_price_asset().to_string()),
            coingecko_api_base: env
                ::var("COINGECKO_API_BASE")
                .unwrap_or_else(|_| "https://api.coingecko.com/api/v3".to_string()),
            coingecko_api_key: env::var("COINGECKO_API_KEY").ok(),
            openai_api_key: env
                ::var("OPENAI_API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            openai_api_base: env
                ::var("OPENAI_API_BASE")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
        };

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let server_port = env
            ::var("SERVER_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()?;

        let transactor_timeout = Self::parse_secs("TRANSACTOR_TIMEOUT_SECS", 30)?;
        let oracle_timeout = Self::parse_secs("ORACLE_TIMEOUT_SECS", 20)?;

        Ok(Config {
            network_mode,
            database_url,
            chain: ChainConfig {
                backend,
                rpc_url,
                chain_id,
                wallet_mnemonic,
                stable_token_address,
                stable_token_decimals,
            },
            price,
            server_host,
            server_port,
            transactor_timeout,
            oracle_timeout,
        })
    }

    fn parse_secs(key: &str, default: u64) -> Result<Duration, Box<dyn std::error::Error>> {
        let secs: u64 = match env::var(key) {
            Ok(value) => value.trim().parse()?,
            Err(_) => default,
        };

        if secs == 0 {
            return Err(format!("{} must be greater than zero", key).into());
        }

        Ok(Duration::from_secs(secs))
    }

    fn default_evm_chain_id(network_mode: &NetworkMode) -> u64 {
        match network_mode {
            NetworkMode::Testnet => 11155111, // Sepolia
            NetworkMode::Mainnet => 1,
        }
    }
}
