pub mod config;
pub mod enums;
pub mod error;
pub mod clock;
pub mod db;
pub mod providers;
pub mod chains;
pub mod services;
pub mod executor;
pub mod scheduler;
pub mod api;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use enums::{ AssetKind, ChainBackend, Frequency };
pub use error::{ AppError, Result };
