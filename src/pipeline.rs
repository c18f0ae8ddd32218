//! The pipeline module runs one scrape request end to end and keeps the last
//! successful outcome in an explicit session object owned by the caller.

use chrono::{DateTime, Local};
use log::{error, info, warn};
use serde_json::Value;

use crate::assemble::{ExportBundle, TabularResult, assemble};
use crate::catalog::{self, ModelSpec};
use crate::constants::TIMESTAMP_FORMAT;
use crate::cost::{CostEstimate, estimate_cost};
use crate::dispatch::{ProviderFactory, UsageRecord, extract_with_model};
use crate::error::{DispatchError, ScrapeError};
use crate::fetch::{Source, retrieve};
use crate::normalize::{HtmlOptions, NormalizedContent, RawContent, normalize};
use crate::schema::{ExtractionSchema, build_schema};
use crate::storage::Storage;

/// What the user asked for.
#[derive(Clone, Debug)]
pub struct ScrapeRequest {
    pub source: Source,
    pub fields: Vec<String>,
    pub model_id: String,
}

/// Collaborators and options shared by pipeline runs.
pub struct PipelineContext<'a> {
    pub factory: &'a dyn ProviderFactory,
    /// Audit store; runs work without one.
    pub storage: Option<&'a Storage>,
    pub html: HtmlOptions,
}

/// Structured output of a run with its usage and source content.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractionResult {
    pub structured_data: Value,
    pub usage: UsageRecord,
    pub timestamp: DateTime<Local>,
    pub content: NormalizedContent,
    pub model_id: String,
    pub chunks: usize,
}

impl ExtractionResult {
    /// Timestamp used to key stored and exported artifacts.
    pub fn timestamp_key(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// A fully formed result, ready to display and export.
#[derive(Clone, Debug)]
pub struct ScrapeOutcome {
    pub result: ExtractionResult,
    pub schema: ExtractionSchema,
    /// `None` when the model has no known pricing.
    pub cost: Option<CostEstimate>,
    pub table: TabularResult,
    pub bundle: ExportBundle,
}

impl ScrapeOutcome {
    /// Cost to display, zero when unknown.
    pub fn display_cost(&self) -> CostEstimate {
        self.cost.unwrap_or_default()
    }
}

/// Holds the last successful outcome between runs.
///
/// A failed run never touches the held outcome.
#[derive(Debug, Default)]
pub struct Session {
    current: Option<ScrapeOutcome>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&ScrapeOutcome> {
        self.current.as_ref()
    }

    /// Runs a request and, on success, replaces the held outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if any pipeline stage fails; the held outcome is kept.
    pub async fn run(
        &mut self,
        request: &ScrapeRequest,
        ctx: &PipelineContext<'_>,
    ) -> Result<&ScrapeOutcome, ScrapeError> {
        let outcome = scrape(request, ctx).await?;
        Ok(&*self.current.insert(outcome))
    }

    /// Runs already retrieved content and, on success, replaces the held outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if any pipeline stage fails; the held outcome is kept.
    pub async fn run_raw(
        &mut self,
        raw: &RawContent,
        schema: &ExtractionSchema,
        model: &ModelSpec,
        ctx: &PipelineContext<'_>,
    ) -> Result<&ScrapeOutcome, ScrapeError> {
        let outcome = process(raw, schema, model, ctx).await?;
        Ok(&*self.current.insert(outcome))
    }
}

/// Runs a request: validates fields and model, retrieves and processes content.
///
/// # Errors
///
/// Returns an error if any pipeline stage fails.
pub async fn scrape(
    request: &ScrapeRequest,
    ctx: &PipelineContext<'_>,
) -> Result<ScrapeOutcome, ScrapeError> {
    let schema = build_schema(&request.fields)?;
    let model = catalog::lookup(&request.model_id)
        .ok_or_else(|| DispatchError::UnsupportedModel(request.model_id.clone()))?;

    info!(
        "Scraping {} via {:?} with {}",
        request.source.url(),
        request.source.method(),
        model.id
    );
    let raw = retrieve(&request.source).await?;
    process(&raw, &schema, model, ctx).await
}

/// Normalizes retrieved content, extracts records, prices the run and
/// assembles its exports.
///
/// The run is priced from the catalog entry for `model.id`; a model outside
/// the catalog gets no cost whatever its `pricing` says.
///
/// # Errors
///
/// Returns an error if normalization, extraction or assembly fails.
pub async fn process(
    raw: &RawContent,
    schema: &ExtractionSchema,
    model: &ModelSpec,
    ctx: &PipelineContext<'_>,
) -> Result<ScrapeOutcome, ScrapeError> {
    let timestamp = Local::now();
    let timestamp_key = timestamp.format(TIMESTAMP_FORMAT).to_string();

    let content = normalize(raw, &ctx.html)?;
    if let Some(storage) = ctx.storage
        && let Err(err) = storage.save_raw(&content.text, &timestamp_key)
    {
        error!("Unable to store raw content for {timestamp_key}: {err}");
    }

    let extraction = extract_with_model(&content, schema, model, ctx.factory).await?;

    let cost = match estimate_cost(model.id, &extraction.usage) {
        Ok(cost) => Some(cost),
        Err(err) => {
            warn!("{err}, showing zero cost");
            None
        }
    };

    let (table, bundle) = assemble(
        &extraction.data,
        schema,
        &timestamp_key,
        &content.text,
    )?;

    if let Some(storage) = ctx.storage
        && let Err(err) = storage.save_formatted(&extraction.data, &timestamp_key)
    {
        error!("Unable to store formatted data for {timestamp_key}: {err}");
    }

    info!(
        "Extracted {} record(s); tokens in/out {}/{}; cost ${:.4}",
        table.rows.len(),
        extraction.usage.input_tokens,
        extraction.usage.output_tokens,
        cost.unwrap_or_default().total_cost
    );

    Ok(ScrapeOutcome {
        result: ExtractionResult {
            structured_data: extraction.data,
            usage: extraction.usage,
            timestamp,
            content,
            model_id: model.id.to_string(),
            chunks: extraction.chunks,
        },
        schema: schema.clone(),
        cost,
        table,
        bundle,
    })
}
