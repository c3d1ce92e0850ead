//! Key Recovery Service fee calculation (§4.9).

use crate::collaborators::{PriceFeed, RequestContext};
use crate::error::{Result, WalletError};

/// A KRS provider's published fee structure. Only `FlatUsd` is
/// implemented; any other tag is rejected rather than silently guessed at.
#[derive(Debug, Clone, Copy)]
pub enum FeeStructure {
    FlatUsd { fee_usd: f64 },
    Other,
}

/// Smallest-unit-per-coin-unit factor used to convert a USD fee into the
/// coin's base unit (1e8 for BTC-family satoshis).
const BASE_FACTOR: f64 = 100_000_000.0;

/// §4.9: `ceil(feeUsd / marketPriceUsd * baseFactor)` satoshis.
pub async fn krs_fee(
    fee_structure: &FeeStructure,
    coin: &str,
    price_feed: &dyn PriceFeed,
    ctx: &RequestContext,
) -> Result<u64> {
    let FeeStructure::FlatUsd { fee_usd } = fee_structure else {
        return Err(WalletError::FeeStructureNotImplemented(format!(
            "{fee_structure:?}"
        )));
    };

    let market_price_usd = price_feed.get_market_price_usd(coin, ctx).await?;
    if market_price_usd <= 0.0 {
        return Err(WalletError::FeeStructureNotImplemented(format!(
            "non-positive market price for {coin}"
        )));
    }

    let satoshis = (fee_usd / market_price_usd * BASE_FACTOR).ceil();
    Ok(satoshis as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedPriceFeed(f64);

    #[async_trait]
    impl PriceFeed for FixedPriceFeed {
        async fn get_market_price_usd(&self, _coin: &str, _ctx: &RequestContext) -> Result<f64> {
            Ok(self.0)
        }
    }

    #[tokio::test]
    async fn flat_usd_fee_converts_to_satoshis() {
        let feed = FixedPriceFeed(20_000.0);
        let ctx = RequestContext::default();
        let fee = krs_fee(&FeeStructure::FlatUsd { fee_usd: 2.0 }, "btc", &feed, &ctx)
            .await
            .unwrap();
        // 2 / 20000 * 1e8 = 10_000 sat
        assert_eq!(fee, 10_000);
    }

    #[tokio::test]
    async fn unsupported_fee_structure_is_rejected() {
        let feed = FixedPriceFeed(20_000.0);
        let ctx = RequestContext::default();
        let result = krs_fee(&FeeStructure::Other, "btc", &feed, &ctx).await;
        assert!(matches!(result, Err(WalletError::FeeStructureNotImplemented(_))));
    }
}
