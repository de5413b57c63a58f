mod provider;
pub mod wallet;

pub use provider::SolanaTransactor;
