//! GoldAPI.io adapter (secondary source)

use crate::error::Result;
use crate::sources::types::*;
use crate::sources::RateSource;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Duration;

/// GoldAPI.io implementation
pub struct GoldApiSource {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl GoldApiSource {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl RateSource for GoldApiSource {
    fn id(&self) -> &'static str {
        "gold_api"
    }

    fn name(&self) -> &'static str {
        "GoldAPI.io"
    }

    async fn fetch_rate(&self, metal: Metal) -> FetchResult<RateQuote> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| FetchError::Unconfigured("GOLD_API_KEY is not set".to_string()))?;

        let response = self
            .client
            .get(format!("{}/{}/INR", self.base_url, metal.iso_code()))
            .header("x-access-token", api_key)
            .header("Content-Type", "application/json")
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FetchError::Unconfigured(format!(
                "GoldAPI rejected credentials (HTTP {})",
                status
            )));
        }
        if !status.is_success() {
            return Err(FetchError::Unavailable(format!("GoldAPI returned HTTP {}", status)));
        }

        let body: Value = response.json().await?;
        parse_quote(&body, metal, self.id())
    }
}

/// Parse a `/{metal}/INR` response.
///
/// `price_gram_24k` is already INR per gram of pure metal; `price` is per
/// troy ounce.
pub fn parse_quote(body: &Value, metal: Metal, source: &str) -> FetchResult<RateQuote> {
    if let Some(error) = body.get("error").and_then(Value::as_str) {
        return Err(FetchError::Unavailable(error.to_string()));
    }

    let number = |key: &str| {
        body.get(key)
            .and_then(json_decimal)
            .filter(|v| *v > Decimal::ZERO)
    };

    let per_gram = match number("price_gram_24k") {
        Some(per_gram) => per_gram.round_dp(4),
        None => {
            let per_ounce = number("price").ok_or_else(|| {
                FetchError::MalformedResponse(format!("no price for {}", metal.iso_code()))
            })?;
            per_ounce_to_per_gram(per_ounce)
        }
    };

    RateQuote::new(metal, per_gram, source)
}
