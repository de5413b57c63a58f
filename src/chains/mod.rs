pub mod evm;
pub mod solana;

use std::sync::Arc;

use crate::config::ChainConfig;
use crate::enums::ChainBackend;
use crate::error::Result;
use crate::providers::ChainTransactor;

pub use evm::EvmTransactor;
pub use solana::SolanaTransactor;

/// Build the transactor selected by configuration.
pub fn build_transactor(config: &ChainConfig) -> Result<Arc<dyn ChainTransactor>> {
    let transactor: Arc<dyn ChainTransactor> = match config.backend {
        ChainBackend::Evm => Arc::new(EvmTransactor::from_config(config)?),
        ChainBackend::Solana => Arc::new(SolanaTransactor::from_config(config)?),
    };

    tracing::info!("Chain transactor initialized: {}", transactor.name());

    Ok(transactor)
}
