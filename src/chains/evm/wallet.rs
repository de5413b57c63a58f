use bip39::{ Language, Mnemonic };
use ethers::core::types::H160;
use ethers::signers::{ coins_bip39::English, LocalWallet, MnemonicBuilder, Signer };

use crate::error::{ AppError, Result };

/// First account of the standard Ethereum path.
const SERVICE_DERIVATION_PATH: &str = "m/44'/60'/0'/0/0";

/// Derive the service signing wallet from a BIP-39 phrase.
pub fn service_wallet(mnemonic_phrase: &str, chain_id: u64) -> Result<LocalWallet> {
    let phrase = mnemonic_phrase.trim();
    Mnemonic::parse_in(Language::English, phrase).map_err(|_| AppError::InvalidMnemonic)?;

    let wallet = MnemonicBuilder::<English>
        ::default()
        .phrase(phrase)
        .derivation_path(SERVICE_DERIVATION_PATH)
        .map_err(|e| AppError::Config(format!("Invalid derivation path: {}", e)))?
        .build()
        .map_err(|e| AppError::Config(format!("Failed to build wallet: {}", e)))?;

    Ok(wallet.with_chain_id(chain_id))
}

pub fn validate_address(address: &str) -> bool {
    address.trim().parse::<H160>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHRASE: &str =
        "test test test test test test test test test test test junk";

    #[test]
    fn test_service_wallet_is_deterministic() {
        let first = service_wallet(PHRASE, 1).unwrap();
        let second = service_wallet(PHRASE, 1).unwrap();

        assert_eq!(first.address(), second.address());
        assert_eq!(
            format!("{:?}", first.address()),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
        assert_eq!(first.chain_id(), 1);
    }

    #[test]
    fn test_service_wallet_rejects_bad_phrase() {
        assert!(matches!(service_wallet("not a phrase", 1), Err(AppError::InvalidMnemonic)));
    }

    #[test]
    fn test_validate_address() {
        assert!(validate_address("0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb0"));
        assert!(!validate_address("invalid"));
        assert!(!validate_address("0x123"));
    }
}
