//! Corrently API client: virtual meter readings and CO2 emission.
//!
//! A reading is pushed as the current power of the mesh; the API keeps
//! the cumulative register (`1.8.0`) and returns the meter account, which
//! is then used to query the emission calculation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::identity::Identity;

// ── Errors ──────────────────────────────────────────────────────────

/// Errors from submitting a meter reading.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("unexpected reading response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors from querying the emission calculation.
#[derive(Debug, thiserror::Error)]
pub enum EmissionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("unexpected emission response: {0}")]
    Parse(#[from] serde_json::Error),
}

// ── Wire format ─────────────────────────────────────────────────────

/// Form fields of a reading submission.
#[derive(Debug, Serialize)]
struct ReadingForm<'a> {
    power: u64,
    zip: &'a str,
    #[serde(rename = "externalAccount")]
    external_account: &'a str,
    secret: &'a str,
}

/// Meter state returned after a reading was stored.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MeterReading {
    /// Cumulative energy register in Wh
    #[serde(rename = "1.8.0")]
    pub cumulative_wh: f64,
    /// Meter account reference
    pub account: String,
}

/// CO2 figures of a meter account, in grams.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Emission {
    pub co2: f64,
    pub compensation: Compensation,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Compensation {
    /// Already compensated
    pub base_haben: f64,
    /// Outstanding, reported as a negative balance
    pub balance_base: f64,
}

// ── Traits ──────────────────────────────────────────────────────────

/// Submits power readings to a virtual meter.
#[async_trait]
pub trait MeterReporter: Send + Sync {
    async fn report(&self, power_w: u64, identity: &Identity) -> Result<MeterReading, ReportError>;

    /// Public URL of the readings stored for `account`.
    fn reading_url(&self, account: &str) -> String;
}

/// Computes the CO2 emission of a meter account.
#[async_trait]
pub trait EmissionSource: Send + Sync {
    async fn calculate(&self, account: &str) -> Result<Emission, EmissionError>;

    /// Public URL of the emission calculation for `account`.
    fn emission_url(&self, account: &str) -> String;
}

/// Append `account=<account>` to an endpoint URL.
pub fn account_url(base: &str, account: &str) -> String {
    match reqwest::Url::parse_with_params(base, &[("account", account)]) {
        Ok(url) => url.to_string(),
        Err(_) => format!("{base}?account={account}"),
    }
}

// ── Client ──────────────────────────────────────────────────────────

/// Client for the Corrently reading and emission endpoints.
#[derive(Debug, Clone)]
pub struct CorrentlyClient {
    client: reqwest::Client,
    reading_url: String,
    emission_url: String,
    zip: String,
}

impl CorrentlyClient {
    pub fn new(
        client: reqwest::Client,
        reading_url: impl Into<String>,
        emission_url: impl Into<String>,
        zip: impl Into<String>,
    ) -> Self {
        Self {
            client,
            reading_url: reading_url.into(),
            emission_url: emission_url.into(),
            zip: zip.into(),
        }
    }
}

/// Read the body of a successful response, or the error text otherwise.
async fn success_body(response: reqwest::Response) -> Result<String, (u16, String)> {
    let status = response.status();
    let text = response.text().await;
    if !status.is_success() {
        let message = text.unwrap_or_else(|_| "unknown error".to_string());
        return Err((status.as_u16(), message));
    }
    text.map_err(|e| (status.as_u16(), e.to_string()))
}

#[async_trait]
impl MeterReporter for CorrentlyClient {
    async fn report(&self, power_w: u64, identity: &Identity) -> Result<MeterReading, ReportError> {
        let form = ReadingForm {
            power: power_w,
            zip: &self.zip,
            external_account: &identity.meter_id,
            secret: &identity.meter_secret,
        };

        log::debug!("Submitting {} W to {}", power_w, self.reading_url);
        let response = self
            .client
            .post(&self.reading_url)
            .form(&form)
            .send()
            .await?;

        let body = success_body(response)
            .await
            .map_err(|(status, message)| ReportError::Api { status, message })?;
        let reading: MeterReading = serde_json::from_str(&body)?;
        log::info!(
            "Stored reading for account {} ({} Wh total)",
            reading.account,
            reading.cumulative_wh
        );
        Ok(reading)
    }

    fn reading_url(&self, account: &str) -> String {
        account_url(&self.reading_url, account)
    }
}

#[async_trait]
impl EmissionSource for CorrentlyClient {
    async fn calculate(&self, account: &str) -> Result<Emission, EmissionError> {
        log::debug!("Querying emission of account {}", account);
        let response = self
            .client
            .get(&self.emission_url)
            .query(&[("account", account)])
            .send()
            .await?;

        let body = success_body(response)
            .await
            .map_err(|(status, message)| EmissionError::Api { status, message })?;
        let emission: Emission = serde_json::from_str(&body)?;
        Ok(emission)
    }

    fn emission_url(&self, account: &str) -> String {
        account_url(&self.emission_url, account)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
