//! One metering run: identity → node list → power → reading → emission.
//!
//! Every step must succeed before the next one starts. The first failure
//! aborts the run and nothing is reported.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::config::Config;
use crate::corrently::{
    CorrentlyClient, Emission, EmissionError, EmissionSource, MeterReading, MeterReporter,
    ReportError,
};
use crate::identity::{load_identity, Identity};
use crate::meshviewer::{FetchError, MeshviewerClient, NodeSource};
use crate::power;
use crate::store::{KeyValueStore, SqliteStore, StoreError};

/// Failure of a metering run, by step.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("unable to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("unable to load meter identity: {0}")]
    Store(#[from] StoreError),

    #[error("unable to retrieve node list: {0}")]
    Fetch(#[from] FetchError),

    #[error("unable to store reading: {0}")]
    Report(#[from] ReportError),

    #[error("unable to retrieve CO2 calculation: {0}")]
    Emission(#[from] EmissionError),
}

/// Result of a successful run, in display units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub meter_id: String,
    pub power_kw: f64,
    pub consumption_kwh: f64,
    pub account: String,
    pub reading_url: String,
    pub emission_url: String,
    pub co2_kg: f64,
    pub compensated_co2_kg: f64,
    pub outstanding_co2_kg: f64,
}

impl RunSummary {
    fn new(
        identity: &Identity,
        power_w: u64,
        reading: &MeterReading,
        emission: &Emission,
        reading_url: String,
        emission_url: String,
    ) -> Self {
        Self {
            meter_id: identity.meter_id.clone(),
            power_kw: power_w as f64 / 1000.0,
            consumption_kwh: reading.cumulative_wh / 1000.0,
            account: reading.account.clone(),
            reading_url,
            emission_url,
            co2_kg: emission.co2 / 1000.0,
            compensated_co2_kg: emission.compensation.base_haben / 1000.0,
            // the balance is negative while compensation is outstanding; +0.0 drops a -0
            outstanding_co2_kg: emission.compensation.balance_base / -1000.0 + 0.0,
        }
    }

    /// Render the summary in the given format.
    pub fn render(&self, format: OutputFormat) -> Result<String, serde_json::Error> {
        match format {
            OutputFormat::Text => Ok(self.to_string()),
            OutputFormat::Json => serde_json::to_string_pretty(self),
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Meter Id: {}", self.meter_id)?;
        writeln!(f, "Current Power Load (kW): {}", self.power_kw)?;
        writeln!(
            f,
            "Total Consumption/Meter Reading (kWh): {}",
            self.consumption_kwh
        )?;
        writeln!(
            f,
            "Immutable URL of virtual meter reading: {}",
            self.reading_url
        )?;
        writeln!(
            f,
            "Immutable URL for CO2 emission of virtual meter: {}",
            self.emission_url
        )?;
        writeln!(f, "Total CO2 emission (kg): {}", self.co2_kg)?;
        writeln!(f, "Compensated CO2 (kg): {}", self.compensated_co2_kg)?;
        write!(f, "Waiting for Compensation (kg): {}", self.outstanding_co2_kg)
    }
}

/// How the summary is printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown format '{other}' (expected text or json)")),
        }
    }
}

/// The metering steps wired to their collaborators.
pub struct Pipeline<'a> {
    store: &'a dyn KeyValueStore,
    nodes: &'a dyn NodeSource,
    reporter: &'a dyn MeterReporter,
    emission: &'a dyn EmissionSource,
    meter_prefix: &'a str,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        store: &'a dyn KeyValueStore,
        nodes: &'a dyn NodeSource,
        reporter: &'a dyn MeterReporter,
        emission: &'a dyn EmissionSource,
        meter_prefix: &'a str,
    ) -> Self {
        Self {
            store,
            nodes,
            reporter,
            emission,
            meter_prefix,
        }
    }

    /// Run every step in order, stopping at the first failure.
    pub async fn run(&self) -> Result<RunSummary, RunError> {
        let identity = load_identity(self.store, self.meter_prefix)?;
        log::info!("Meter Id {}", identity.meter_id);

        let nodes = self.nodes.fetch().await?;
        let power_w = power::estimate(&nodes);
        log::info!(
            "Current power load {} W ({} of {} nodes online)",
            power_w,
            nodes.iter().filter(|n| n.is_online).count(),
            nodes.len()
        );

        let reading = self.reporter.report(power_w, &identity).await?;
        let emission = self.emission.calculate(&reading.account).await?;

        Ok(RunSummary::new(
            &identity,
            power_w,
            &reading,
            &emission,
            self.reporter.reading_url(&reading.account),
            self.emission.emission_url(&reading.account),
        ))
    }
}

/// Run once against the stores and endpoints named by `config`.
pub async fn run(config: &Config) -> Result<RunSummary, RunError> {
    let store_path = config.resolve_store_path().ok_or(StoreError::NoHomeDir)?;
    let store = SqliteStore::open(&store_path)?;

    let http = config.http_client().map_err(RunError::Client)?;
    let nodes = MeshviewerClient::new(http.clone(), config.node_list_url.as_str());
    let corrently = CorrentlyClient::new(
        http,
        config.reading_url.as_str(),
        config.emission_url.as_str(),
        config.zip.as_str(),
    );

    Pipeline::new(&store, &nodes, &corrently, &corrently, &config.meter_prefix)
        .run()
        .await
}
