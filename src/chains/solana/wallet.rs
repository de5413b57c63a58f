use bip39::Mnemonic;
use solana_keypair::Keypair;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signer::{ SeedDerivable, Signer };

use crate::error::{ AppError, Result };

/// Derive the service keypair from a BIP-39 phrase (first 32 bytes of the seed).
pub fn service_keypair(mnemonic_phrase: &str) -> Result<Keypair> {
    let mnemonic = Mnemonic::parse(mnemonic_phrase.trim()).map_err(|_| AppError::InvalidMnemonic)?;

    let seed = mnemonic.to_seed("");

    Keypair::from_seed(&seed[..32]).map_err(|e|
        AppError::Config(format!("Failed to create keypair: {}", e))
    )
}

pub fn service_address(keypair: &Keypair) -> String {
    keypair.pubkey().to_string()
}

pub fn validate_address(address: &str) -> bool {
    address.trim().parse::<Pubkey>().is_ok()
}
