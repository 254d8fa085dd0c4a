//! USD to GBP conversion for the hourly charge rate.
//!
//! The projection only ever sees a settled GBP rate. Conversion happens here,
//! before the engine runs, and never fails: any problem with the exchange-rate
//! endpoint degrades to [`FALLBACK_USD_TO_GBP`].

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_FX_URL: &str = "https://api.exchangerate-api.com/v4/latest/USD";
pub const FALLBACK_USD_TO_GBP: f64 = 0.79;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum InputCurrency {
    #[default]
    Usd,
    Gbp,
}

impl InputCurrency {
    pub fn code(self) -> &'static str {
        match self {
            InputCurrency::Usd => "USD",
            InputCurrency::Gbp => "GBP",
        }
    }
}

#[derive(Debug, Error)]
pub enum FxError {
    #[error("exchange-rate request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("exchange-rate endpoint returned {0}")]
    Status(reqwest::StatusCode),
    #[error("invalid exchange-rate JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("exchange-rate response has no usable GBP rate")]
    MissingRate,
}

#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn usd_to_gbp(&self) -> Result<f64, FxError>;
}

#[derive(Debug, Deserialize)]
struct LatestRates {
    rates: Rates,
}

#[derive(Debug, Deserialize)]
struct Rates {
    #[serde(rename = "GBP")]
    gbp: Option<f64>,
}

pub fn parse_gbp_rate(body: &str) -> Result<f64, FxError> {
    let latest: LatestRates = serde_json::from_str(body)?;
    match latest.rates.gbp {
        Some(rate) if rate.is_finite() => Ok(rate),
        _ => Err(FxError::MissingRate),
    }
}

/// Fetches the latest USD rates over HTTP. No timeout is set, so the
/// client's defaults apply.
pub struct HttpRateProvider {
    url: String,
    client: reqwest::Client,
}

impl HttpRateProvider {
    pub fn new(url: impl Into<String>) -> Result<Self, FxError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("gpu-earnings/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl RateProvider for HttpRateProvider {
    async fn usd_to_gbp(&self) -> Result<f64, FxError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FxError::Status(status));
        }
        let body = response.text().await?;
        parse_gbp_rate(&body)
    }
}

/// Answers with a fixed multiplier. Used for offline runs and when no HTTP
/// client could be built.
pub struct FixedRateProvider(pub f64);

#[async_trait]
impl RateProvider for FixedRateProvider {
    async fn usd_to_gbp(&self) -> Result<f64, FxError> {
        Ok(self.0)
    }
}

impl Default for FixedRateProvider {
    fn default() -> Self {
        Self(FALLBACK_USD_TO_GBP)
    }
}

pub async fn usd_to_gbp_or_fallback(provider: &dyn RateProvider) -> f64 {
    match provider.usd_to_gbp().await {
        Ok(rate) => {
            tracing::debug!(rate, "fetched USD to GBP rate");
            rate
        }
        Err(err) => {
            tracing::warn!(error = %err, fallback = FALLBACK_USD_TO_GBP, "using fallback USD to GBP rate");
            FALLBACK_USD_TO_GBP
        }
    }
}

/// Multiplier that turns an hourly rate quoted in `currency` into GBP.
pub async fn conversion_rate(currency: InputCurrency, provider: &dyn RateProvider) -> f64 {
    match currency {
        InputCurrency::Usd => usd_to_gbp_or_fallback(provider).await,
        InputCurrency::Gbp => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingProvider;

    #[async_trait]
    impl RateProvider for FailingProvider {
        async fn usd_to_gbp(&self) -> Result<f64, FxError> {
            Err(FxError::MissingRate)
        }
    }

    struct CountingProvider {
        calls: AtomicUsize,
        rate: f64,
    }

    #[async_trait]
    impl RateProvider for CountingProvider {
        async fn usd_to_gbp(&self) -> Result<f64, FxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.rate)
        }
    }

    #[test]
    fn parse_gbp_rate_reads_nested_field() {
        let body = r#"{"base":"USD","rates":{"EUR":0.92,"GBP":0.7712}}"#;
        assert_eq!(parse_gbp_rate(body).expect("valid body"), 0.7712);
    }

    #[test]
    fn parse_gbp_rate_rejects_missing_rate() {
        let body = r#"{"base":"USD","rates":{"EUR":0.92}}"#;
        assert!(matches!(parse_gbp_rate(body), Err(FxError::MissingRate)));
    }

    #[test]
    fn parse_gbp_rate_rejects_malformed_json() {
        assert!(matches!(
            parse_gbp_rate("<html>rate limited</html>"),
            Err(FxError::Parse(_))
        ));
        assert!(matches!(
            parse_gbp_rate(r#"{"rates":{"GBP":"0.79"}}"#),
            Err(FxError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn failure_falls_back_to_fixed_rate() {
        assert_eq!(usd_to_gbp_or_fallback(&FailingProvider).await, 0.79);
        assert_eq!(
            conversion_rate(InputCurrency::Usd, &FailingProvider).await,
            FALLBACK_USD_TO_GBP
        );
    }

    #[tokio::test]
    async fn unreachable_endpoint_falls_back_to_fixed_rate() {
        let provider = HttpRateProvider::new("http://127.0.0.1:1/latest/USD").expect("client");
        assert_eq!(usd_to_gbp_or_fallback(&provider).await, 0.79);
    }

    #[tokio::test]
    async fn gbp_input_skips_the_fetch() {
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
            rate: 0.5,
        };
        assert_eq!(conversion_rate(InputCurrency::Gbp, &provider).await, 1.0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);

        assert_eq!(conversion_rate(InputCurrency::Usd, &provider).await, 0.5);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }
}
