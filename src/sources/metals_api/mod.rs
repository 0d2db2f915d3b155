//! Metals-API adapter (primary source)

use crate::error::Result;
use crate::sources::types::*;
use crate::sources::RateSource;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Duration;

/// Error code Metals-API returns for a missing or invalid access key
const INVALID_ACCESS_KEY: i64 = 101;

/// Metals-API implementation
pub struct MetalsApiSource {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl MetalsApiSource {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl RateSource for MetalsApiSource {
    fn id(&self) -> &'static str {
        "metals_api"
    }

    fn name(&self) -> &'static str {
        "Metals-API"
    }

    async fn fetch_rate(&self, metal: Metal) -> FetchResult<RateQuote> {
        let mut quotes = self.fetch_rates(&[metal]).await?;
        quotes
            .pop()
            .ok_or_else(|| FetchError::MalformedResponse(format!("No rate for {}", metal)))
    }

    async fn fetch_rates(&self, metals: &[Metal]) -> FetchResult<Vec<RateQuote>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| FetchError::Unconfigured("METALS_API_KEY is not set".to_string()))?;

        let symbols = metals
            .iter()
            .map(|m| m.iso_code())
            .collect::<Vec<_>>()
            .join(",");

        let response = self
            .client
            .get(format!("{}/latest", self.base_url))
            .query(&[("access_key", api_key), ("base", "INR"), ("symbols", symbols.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FetchError::Unconfigured(format!(
                "Metals-API rejected credentials (HTTP {})",
                status
            )));
        }
        if !status.is_success() {
            return Err(FetchError::Unavailable(format!("Metals-API returned HTTP {}", status)));
        }

        let body: Value = response.json().await?;
        parse_latest(&body, metals, self.id())
    }
}

/// Parse a `/latest` response with `base=INR`.
///
/// Newer responses carry `INRXAU` (INR per ounce) directly; older ones only
/// carry `XAU` (ounces per INR), which is inverted.
pub fn parse_latest(body: &Value, metals: &[Metal], source: &str) -> FetchResult<Vec<RateQuote>> {
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        let code = body
            .pointer("/error/code")
            .and_then(Value::as_i64)
            .unwrap_or_default();
        let info = body
            .pointer("/error/info")
            .and_then(Value::as_str)
            .unwrap_or("request failed")
            .to_string();

        return Err(if code == INVALID_ACCESS_KEY {
            FetchError::Unconfigured(info)
        } else {
            FetchError::Unavailable(info)
        });
    }

    let rates = body
        .get("rates")
        .and_then(Value::as_object)
        .ok_or_else(|| FetchError::MalformedResponse("missing rates object".to_string()))?;

    metals
        .iter()
        .map(|metal| {
            let direct = rates
                .get(&format!("INR{}", metal.iso_code()))
                .and_then(json_decimal);

            let per_ounce = match direct {
                Some(price) => price,
                None => {
                    let inverse = rates
                        .get(metal.iso_code())
                        .and_then(json_decimal)
                        .filter(|r| *r > Decimal::ZERO)
                        .ok_or_else(|| {
                            FetchError::MalformedResponse(format!(
                                "no usable rate for {}",
                                metal.iso_code()
                            ))
                        })?;
                    Decimal::ONE.checked_div(inverse).ok_or_else(|| {
                        FetchError::MalformedResponse(format!(
                            "rate for {} out of range",
                            metal.iso_code()
                        ))
                    })?
                }
            };

            RateQuote::new(*metal, per_ounce_to_per_gram(per_ounce), source)
        })
        .collect()
}
