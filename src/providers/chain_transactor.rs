use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::enums::AssetKind;
use crate::error::Result;

/// Moves funds on one chain.
///
/// Implementations sign with the service wallet; `from_address` names the plan
/// owner the transfer is made for. A failed send is reported once and never
/// retried here.
#[async_trait]
pub trait ChainTransactor: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    /// Decimal places a transfer can carry (the token's decimals).
    fn amount_scale(&self) -> u32;

    /// Submit a transfer of `amount` (human units) and return its transaction id.
    ///
    /// Amounts finer than [`amount_scale`](Self::amount_scale) are rejected,
    /// never rounded, so the value sent is always the value given.
    async fn send_transaction(
        &self,
        amount: Decimal,
        from_address: &str,
        to_address: &str
    ) -> Result<String>;

    /// Balance in human units; zero when the lookup fails.
    async fn get_balance(&self, address: &str, asset: AssetKind) -> Decimal;

    /// Validate address format
    fn validate_address(&self, address: &str) -> bool;
}
