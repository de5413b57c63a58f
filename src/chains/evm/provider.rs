use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::{
    prelude::*,
    providers::{ Http, Provider },
    types::{ TransactionRequest as EthTxRequest, U256 },
    utils::{ format_units, parse_units },
};
use rust_decimal::Decimal;

use crate::chains::evm::wallet;
use crate::config::ChainConfig;
use crate::enums::AssetKind;
use crate::error::{ AppError, Result };
use crate::providers::ChainTransactor;

const NATIVE_DECIMALS: u32 = 18;

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Stable-token contract the service pays out in, when configured.
#[derive(Debug, Clone)]
struct StableToken {
    address: Address,
    decimals: u32,
}

pub struct EvmTransactor {
    client: Arc<SignerClient>,
    stable: Option<StableToken>,
}

impl EvmTransactor {
    pub fn from_config(config: &ChainConfig) -> Result<Self> {
        let chain_id = config.chain_id.ok_or_else(||
            AppError::Config("CHAIN_ID is required for the EVM backend".to_string())
        )?;

        let provider = Provider::<Http>
            ::try_from(config.rpc_url.as_str())
            .map_err(|e| AppError::Config(format!("Failed to create provider: {}", e)))?;

        let wallet = wallet::service_wallet(&config.wallet_mnemonic, chain_id)?;
        tracing::info!("EVM service wallet: {:?} (chain {})", wallet.address(), chain_id);

        let stable = match &config.stable_token_address {
            Some(address) =>
                Some(StableToken {
                    address: address
                        .parse()
                        .map_err(|_|
                            AppError::Config(format!("Invalid STABLE_TOKEN_ADDRESS: {}", address))
                        )?,
                    decimals: config.stable_token_decimals,
                }),
            None => None,
        };

        Ok(Self {
            client: Arc::new(SignerMiddleware::new(provider, wallet)),
            stable,
        })
    }

    fn erc20(&self, token: Address) -> Result<Contract<SignerClient>> {
        let abi = ethers::abi
            ::parse_abi(
                &[
                    "function balanceOf(address) external view returns (uint256)",
                    "function transfer(address to, uint256 amount) external returns (bool)",
                ]
            )
            .map_err(|e| AppError::Internal(format!("Failed to parse ABI: {}", e)))?;

        Ok(Contract::new(token, abi, self.client.clone()))
    }

    async fn send_erc20(&self, token: &StableToken, to: Address, amount: U256) -> Result<String> {
        let contract = self.erc20(token.address)?;

        let call = contract
            .method::<_, bool>("transfer", (to, amount))
            .map_err(|e| AppError::Transactor(format!("Failed to prepare transfer: {}", e)))?;

        let pending_tx = call
            .send().await
            .map_err(|e| AppError::Transactor(format!("Transaction failed: {}", e)))?;

        Ok(format!("{:?}", pending_tx.tx_hash()))
    }

    async fn send_native(&self, to: Address, amount: U256) -> Result<String> {
        let tx = EthTxRequest::new().to(to).value(amount);

        let pending_tx = self.client
            .send_transaction(tx, None).await
            .map_err(|e| AppError::Transactor(format!("Transaction failed: {}", e)))?;

        Ok(format!("{:?}", pending_tx.tx_hash()))
    }

    async fn balance_of(&self, address: &str, asset: AssetKind) -> Result<Decimal> {
        let owner: Address = address
            .parse()
            .map_err(|_| AppError::invalid_field("address", "Invalid EVM address"))?;

        let (raw, decimals) = match (asset, &self.stable) {
            (AssetKind::Native, _) => {
                let raw = self.client
                    .get_balance(owner, None).await
                    .map_err(|e| AppError::Transactor(format!("Failed to get balance: {}", e)))?;
                (raw, NATIVE_DECIMALS)
            }
            (AssetKind::Stable, Some(token)) => {
                let raw: U256 = self
                    .erc20(token.address)?
                    .method::<_, U256>("balanceOf", owner)
                    .map_err(|e| AppError::Transactor(format!("Failed to call balanceOf: {}", e)))?
                    .call().await
                    .map_err(|e| AppError::Transactor(format!("balanceOf call failed: {}", e)))?;
                (raw, token.decimals)
            }
            (AssetKind::Stable, None) => {
                return Err(AppError::Config("No stable token configured".to_string()));
            }
        };

        let formatted = format_units(raw, decimals).map_err(|e|
            AppError::Internal(format!("Failed to format balance: {}", e))
        )?;

        Decimal::from_str(&formatted).map_err(|e|
            AppError::Internal(format!("Balance out of range: {}", e))
        )
    }
}

/// Convert a human amount to base units. Fails when the token cannot carry its precision.
fn to_base_units(amount: Decimal, decimals: u32) -> Result<U256> {
    if amount <= Decimal::ZERO {
        return Err(AppError::invalid_field("amount", "amount must be greater than zero"));
    }

    let amount = amount.normalize();
    if amount.scale() > decimals {
        return Err(
            AppError::invalid_field(
                "amount",
                format!("{} has more than {} decimal places", amount, decimals)
            )
        );
    }

    let units = parse_units(amount.to_string(), decimals).map_err(|e|
        AppError::invalid_field("amount", format!("Invalid amount: {}", e))
    )?;

    Ok(units.into())
}

#[async_trait]
impl ChainTransactor for EvmTransactor {
    fn name(&self) -> &'static str {
        "evm"
    }

    fn amount_scale(&self) -> u32 {
        self.stable.as_ref().map_or(NATIVE_DECIMALS, |token| token.decimals)
    }

    async fn send_transaction(
        &self,
        amount: Decimal,
        from_address: &str,
        to_address: &str
    ) -> Result<String> {
        let to: Address = to_address
            .trim()
            .parse()
            .map_err(|_| AppError::Transactor(format!("Invalid destination: {}", to_address)))?;

        let tx_hash = match &self.stable {
            Some(token) => {
                let units = to_base_units(amount, token.decimals)?;
                self.send_erc20(token, to, units).await?
            }
            None => {
                let units = to_base_units(amount, NATIVE_DECIMALS)?;
                self.send_native(to, units).await?
            }
        };

        tracing::info!(
            "EVM transfer of {} on behalf of {} to {}: {}",
            amount,
            from_address,
            to_address,
            tx_hash
        );

        Ok(tx_hash)
    }

    async fn get_balance(&self, address: &str, asset: AssetKind) -> Decimal {
        match self.balance_of(address, asset).await {
            Ok(balance) => balance,
            Err(e) => {
                tracing::warn!("EVM {} balance lookup for {} failed: {}", asset, address, e);
                Decimal::ZERO
            }
        }
    }

    fn validate_address(&self, address: &str) -> bool {
        wallet::validate_address(address)
    }
}
