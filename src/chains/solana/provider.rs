use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_request::TokenAccountsFilter;
use solana_commitment_config::CommitmentConfig;
use solana_keypair::Keypair;
use solana_sdk::{ pubkey::Pubkey, signer::Signer, transaction::Transaction };
use solana_system_interface::instruction as system_instruction;

use crate::chains::solana::wallet;
use crate::config::ChainConfig;
use crate::enums::AssetKind;
use crate::error::{ AppError, Result };
use crate::providers::ChainTransactor;

const LAMPORTS_PER_SOL: u64 = 1_000_000_000;
const SOL_DECIMALS: u32 = 9;

pub struct SolanaTransactor {
    client: RpcClient,
    keypair: Keypair,
    stable_mint: Option<Pubkey>,
}

impl SolanaTransactor {
    pub fn from_config(config: &ChainConfig) -> Result<Self> {
        let client = RpcClient::new_with_commitment(
            config.rpc_url.clone(),
            CommitmentConfig::confirmed()
        );

        let keypair = wallet::service_keypair(&config.wallet_mnemonic)?;
        tracing::info!("Solana service wallet: {}", wallet::service_address(&keypair));

        let stable_mint = match &config.stable_token_address {
            Some(mint) =>
                Some(
                    Pubkey::from_str(mint).map_err(|_|
                        AppError::Config(format!("Invalid STABLE_TOKEN_ADDRESS: {}", mint))
                    )?
                ),
            None => None,
        };

        Ok(Self {
            client,
            keypair,
            stable_mint,
        })
    }

    async fn native_balance(&self, owner: &Pubkey) -> Result<Decimal> {
        let lamports = self.client
            .get_balance(owner).await
            .map_err(|e| AppError::Transactor(format!("Failed to get balance: {}", e)))?;

        Ok(Decimal::from(lamports) / Decimal::from(LAMPORTS_PER_SOL))
    }

    /// Sum over every token account the owner holds for the configured mint.
    async fn stable_balance(&self, owner: &Pubkey) -> Result<Decimal> {
        let mint = self.stable_mint.ok_or_else(||
            AppError::Config("No stable token mint configured".to_string())
        )?;

        let accounts = self.client
            .get_token_accounts_by_owner(owner, TokenAccountsFilter::Mint(mint)).await
            .map_err(|e| AppError::Transactor(format!("Failed to list token accounts: {}", e)))?;

        let mut total = Decimal::ZERO;
        for account in accounts {
            let pubkey = Pubkey::from_str(&account.pubkey).map_err(|_|
                AppError::Internal(format!("Invalid token account: {}", account.pubkey))
            )?;

            let amount = self.client
                .get_token_account_balance(&pubkey).await
                .map_err(|e| AppError::Transactor(format!("Failed to get token balance: {}", e)))?;

            total += Decimal::from_str(&amount.ui_amount_string).map_err(|e|
                AppError::Internal(format!("Invalid token amount: {}", e))
            )?;
        }

        Ok(total)
    }
}

/// Whole lamports only: an amount below one lamport of precision is rejected.
fn to_lamports(amount: Decimal) -> Result<u64> {
    if amount <= Decimal::ZERO {
        return Err(AppError::invalid_field("amount", "amount must be greater than zero"));
    }

    let amount = amount.normalize();
    if amount.scale() > SOL_DECIMALS {
        return Err(
            AppError::invalid_field(
                "amount",
                format!("{} has more than {} decimal places", amount, SOL_DECIMALS)
            )
        );
    }

    (amount * Decimal::from(LAMPORTS_PER_SOL))
        .to_u64()
        .ok_or_else(|| AppError::invalid_field("amount", "amount exceeds lamport range"))
}

#[async_trait]
impl ChainTransactor for SolanaTransactor {
    fn name(&self) -> &'static str {
        "solana"
    }

    fn amount_scale(&self) -> u32 {
        SOL_DECIMALS
    }

    async fn send_transaction(
        &self,
        amount: Decimal,
        from_address: &str,
        to_address: &str
    ) -> Result<String> {
        let to = Pubkey::from_str(to_address.trim()).map_err(|_|
            AppError::Transactor(format!("Invalid destination: {}", to_address))
        )?;
        let lamports = to_lamports(amount)?;

        let instruction = system_instruction::transfer(&self.keypair.pubkey(), &to, lamports);

        let recent_blockhash = self.client
            .get_latest_blockhash().await
            .map_err(|e| AppError::Transactor(format!("Failed to get recent blockhash: {}", e)))?;

        let transaction = Transaction::new_signed_with_payer(
            &[instruction],
            Some(&self.keypair.pubkey()),
            &[&self.keypair],
            recent_blockhash
        );

        let signature = self.client
            .send_and_confirm_transaction(&transaction).await
            .map_err(|e| AppError::Transactor(format!("Transaction failed: {}", e)))?;

        tracing::info!(
            "Solana transfer of {} SOL on behalf of {} to {}: {}",
            amount,
            from_address,
            to_address,
            signature
        );

        Ok(signature.to_string())
    }

    async fn get_balance(&self, address: &str, asset: AssetKind) -> Decimal {
        let owner = match Pubkey::from_str(address.trim()) {
            Ok(owner) => owner,
            Err(_) => {
                tracing::warn!("Invalid Solana address for balance lookup: {}", address);
                return Decimal::ZERO;
            }
        };

        let balance = match asset {
            AssetKind::Native => self.native_balance(&owner).await,
            AssetKind::Stable => self.stable_balance(&owner).await,
        };

        balance.unwrap_or_else(|e| {
            tracing::warn!("Solana {} balance lookup for {} failed: {}", asset, address, e);
            Decimal::ZERO
        })
    }

    fn validate_address(&self, address: &str) -> bool {
        wallet::validate_address(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_lamports() {
        assert_eq!(to_lamports(Decimal::from(2)).unwrap(), 2_000_000_000);
        assert_eq!(to_lamports(Decimal::new(15, 1)).unwrap(), 1_500_000_000);
        assert_eq!(to_lamports(Decimal::new(1_234_567_891, 9)).unwrap(), 1_234_567_891);
        assert!(to_lamports(Decimal::ZERO).is_err());
        assert!(to_lamports(Decimal::from(-1)).is_err());
    }

    #[test]
    fn test_to_lamports_rejects_sub_lamport_precision() {
        assert!(to_lamports(Decimal::new(1, 10)).is_err());
        assert!(to_lamports(Decimal::new(12_345_678_912, 10)).is_err());
    }
}
