pub mod chain_transactor;
pub mod price_oracle;

pub use chain_transactor::ChainTransactor;
pub use price_oracle::{ sanitize_factor, PriceOracle, NEUTRAL_FACTOR };
