//! Price upstream interface

use async_trait::async_trait;

use crate::shared::errors::FetchError;
use crate::shared::types::PriceQuote;

/// Anything that can produce a fresh `PriceQuote`
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// One upstream round-trip, no caching
    async fn fetch_quote(&self) -> Result<PriceQuote, FetchError>;

    fn name(&self) -> &str;
}
