use std::fmt;
use std::str::FromStr;

use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };

use crate::error::AppError;

// ─── Frequency ──────────────────────────────────────────────────────

/// How often an investment plan fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Minute,
    Hour,
    Day,
}

impl Frequency {
    /// Canonical string stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Minute => "minute",
            Frequency::Hour => "hour",
            Frequency::Day => "day",
        }
    }

    /// Length of one period in seconds.
    pub fn period_secs(&self) -> i64 {
        match self {
            Frequency::Minute => 60,
            Frequency::Hour => 3_600,
            Frequency::Day => 86_400,
        }
    }

    /// Cron-equivalent expression, for logs and the API.
    pub fn cron_expression(&self) -> &'static str {
        match self {
            Frequency::Minute => "* * * * *",
            Frequency::Hour => "0 * * * *",
            Frequency::Day => "0 0 * * *",
        }
    }

    /// First period boundary strictly after `after`.
    ///
    /// Boundaries are aligned to the Unix epoch, so minutes fire at second 0,
    /// hours at minute 0 and days at 00:00 UTC.
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let period = self.period_secs();
        let next = after.timestamp().div_euclid(period) * period + period;

        DateTime::<Utc>::from_timestamp(next, 0).unwrap_or(after)
    }

    pub fn all() -> &'static [Frequency] {
        &[Frequency::Minute, Frequency::Hour, Frequency::Day]
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "minute" => Ok(Frequency::Minute),
            "hour" => Ok(Frequency::Hour),
            "day" => Ok(Frequency::Day),
            _ =>
                Err(
                    AppError::invalid_field(
                        "frequency",
                        format!("Invalid frequency: {}. Supported: minute, hour, day", s)
                    )
                ),
        }
    }
}

// ─── ChainBackend ───────────────────────────────────────────────────

/// Which chain transactor the process runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChainBackend {
    Evm,
    Solana,
}

impl ChainBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainBackend::Evm => "evm",
            ChainBackend::Solana => "solana",
        }
    }

    /// CoinGecko id used for price analysis when none is configured.
    pub fn default_price_asset(&self) -> &'static str {
        match self {
            ChainBackend::Evm => "ethereum",
            ChainBackend::Solana => "solana",
        }
    }
}

impl fmt::Display for ChainBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "evm" | "eth" | "ethereum" => Ok(ChainBackend::Evm),
            "solana" | "sol" => Ok(ChainBackend::Solana),
            _ =>
                Err(
                    AppError::Config(
                        format!("Unsupported chain backend: {}. Supported: evm, solana", s)
                    )
                ),
        }
    }
}

// ─── AssetKind ──────────────────────────────────────────────────────

/// Balance kinds a transactor can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Native,
    Stable,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Native => "native",
            AssetKind::Stable => "stable",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "native" => Ok(AssetKind::Native),
            "stable" | "usdt" | "usdc" => Ok(AssetKind::Stable),
            _ =>
                Err(
                    AppError::invalid_field(
                        "asset",
                        format!("Invalid asset kind: {}. Supported: native, stable", s)
                    )
                ),
        }
    }
}
