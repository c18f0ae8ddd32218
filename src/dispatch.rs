//! The dispatch module sends normalized content to a language model and turns
//! its reply into records conforming to the extraction schema.
//!
//! Models belong to a calling convention family. Schema-native backends are
//! handed the container schema and return a conforming object; prompt-and-parse
//! backends get the schema in the prompt and their reply is cleaned up and
//! parsed. Content over a model's safe size is chunked and the per-chunk
//! records are concatenated in order.

use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::{ChatMessage, ChatProvider, StructuredOutputFormat};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::ops::{Add, AddAssign};

use crate::catalog::{self, Family, ModelSpec, Provider};
use crate::chunk::split_into_chunks;
use crate::constants::{
    CHARS_PER_TOKEN, CODE_FENCE, CONTAINER_KEY, CONTAINER_NAME, FORMAT_INSTRUCTIONS_TEMPLATE,
    MODEL_API_KEY_ENV_NAME, SYSTEM_PROMPT, THINK_STRIPPER, USER_PROMPT_TEMPLATE,
};
use crate::error::DispatchError;
use crate::normalize::NormalizedContent;
use crate::schema::{ExtractionSchema, Record};

static THINK_STRIPPER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(THINK_STRIPPER).expect("Failed to compile THINK_STRIPPER regex"));

static CODE_FENCE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(CODE_FENCE).expect("Failed to compile CODE_FENCE regex"));

/// Token counts of one extraction, summed over all chunks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UsageRecord {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Add for UsageRecord {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            input_tokens: self.input_tokens + other.input_tokens,
            output_tokens: self.output_tokens + other.output_tokens,
        }
    }
}

impl AddAssign for UsageRecord {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

/// Structured output of a completed extraction.
#[derive(Clone, Debug, PartialEq)]
pub struct Extraction {
    /// Records container conforming to the extraction schema.
    pub data: Value,
    pub usage: UsageRecord,
    /// Number of requests the content was split into.
    pub chunks: usize,
}

/// Everything needed to issue one extraction request.
#[derive(Clone, Debug)]
pub struct PreparedRequest {
    pub system: String,
    pub prompt: String,
    /// Target schema for backends that accept one directly.
    pub structured_output: Option<StructuredOutputFormat>,
}

/// Request/response shape of a provider family.
pub trait Convention: Sync {
    /// Builds the request for a single chunk.
    fn prepare_request(&self, chunk: &str, schema: &ExtractionSchema) -> PreparedRequest;

    /// Parses a reply into conforming records.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if the reply cannot be parsed.
    fn parse_response(&self, response: &str, schema: &ExtractionSchema)
    -> Result<Vec<Record>, String>;
}

/// Convention of backends that accept a target schema.
pub struct SchemaNative;

/// Convention of backends that only take text.
pub struct PromptAndParse;

impl Family {
    /// The calling convention of this family.
    pub fn convention(self) -> &'static dyn Convention {
        match self {
            Family::SchemaNative => &SchemaNative,
            Family::PromptAndParse => &PromptAndParse,
        }
    }
}

impl Convention for SchemaNative {
    fn prepare_request(&self, chunk: &str, schema: &ExtractionSchema) -> PreparedRequest {
        PreparedRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt: user_prompt(chunk, schema),
            structured_output: Some(StructuredOutputFormat {
                name: CONTAINER_NAME.to_string(),
                description: Some(format!("Records holding {}", schema.describe_fields())),
                schema: Some(schema.container_schema()),
                strict: Some(!schema.is_unconstrained()),
            }),
        }
    }

    fn parse_response(
        &self,
        response: &str,
        schema: &ExtractionSchema,
    ) -> Result<Vec<Record>, String> {
        let value = parse_json_reply(response)?;
        conform_all(records_from_reply(value, schema, false)?, schema)
    }
}

impl Convention for PromptAndParse {
    fn prepare_request(&self, chunk: &str, schema: &ExtractionSchema) -> PreparedRequest {
        let container_schema = serde_json::to_string_pretty(&schema.container_schema())
            .unwrap_or_else(|_| schema.container_schema().to_string());
        let mut prompt = user_prompt(chunk, schema);
        prompt.push_str(&FORMAT_INSTRUCTIONS_TEMPLATE.replace("{schema}", &container_schema));

        PreparedRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt,
            structured_output: None,
        }
    }

    fn parse_response(
        &self,
        response: &str,
        schema: &ExtractionSchema,
    ) -> Result<Vec<Record>, String> {
        let value = parse_json_reply(response)?;
        conform_all(records_from_reply(value, schema, true)?, schema)
    }
}

/// Fills the user prompt template; neither the content nor the field list is
/// scanned for placeholders once inserted.
fn user_prompt(chunk: &str, schema: &ExtractionSchema) -> String {
    let fields = schema.describe_fields();
    match USER_PROMPT_TEMPLATE.split_once("{content}") {
        Some((before, after)) => format!(
            "{}{chunk}{}",
            before.replace("{fields}", &fields),
            after.replace("{fields}", &fields)
        ),
        None => USER_PROMPT_TEMPLATE.replace("{fields}", &fields),
    }
}

/// Strips reasoning blocks and markdown code fences from a reply and parses
/// the JSON left over.
fn parse_json_reply(response: &str) -> Result<Value, String> {
    let stripped = THINK_STRIPPER_REGEX.replace_all(response, "");
    let cleaned = match CODE_FENCE_REGEX.captures(&stripped) {
        Some(captures) => captures
            .get(1)
            .map_or(String::new(), |inner| inner.as_str().to_string()),
        None => stripped.trim().to_string(),
    };

    serde_json::from_str(&cleaned).or_else(|err| {
        json_span(&cleaned)
            .and_then(|span| serde_json::from_str(span).ok())
            .ok_or_else(|| format!("reply is not valid JSON: {err}"))
    })
}

/// Outermost JSON-looking span of a text.
fn json_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let end = text.rfind(['}', ']'])?;
    text.get(start..=end)
}

/// Pulls the record list out of a reply.
///
/// Strict replies must be the container object. Lenient ones may also be a
/// bare array, an object whose first array value holds the records, or a single
/// record object. An object sharing no key with the declared fields, or an empty
/// one, holds no records.
fn records_from_reply(
    value: Value,
    schema: &ExtractionSchema,
    lenient: bool,
) -> Result<Vec<Value>, String> {
    match value {
        Value::Object(mut object) => {
            if let Some(Value::Array(items)) = object.remove(CONTAINER_KEY) {
                return Ok(items);
            }
            if !lenient {
                return Err(format!("reply lacks a `{CONTAINER_KEY}` array"));
            }
            let first_array = object.values_mut().find_map(|value| match value {
                Value::Array(items) => Some(std::mem::take(items)),
                _ => None,
            });
            if let Some(items) = first_array {
                return Ok(items);
            }
            let is_record = if schema.is_unconstrained() {
                !object.is_empty()
            } else {
                schema.fields().iter().any(|field| object.contains_key(field))
            };
            Ok(if is_record {
                vec![Value::Object(object)]
            } else {
                Vec::new()
            })
        }
        Value::Array(items) if lenient => Ok(items),
        _ => Err("reply is not a records container".to_string()),
    }
}

fn conform_all(items: Vec<Value>, schema: &ExtractionSchema) -> Result<Vec<Record>, String> {
    items
        .into_iter()
        .map(|item| {
            schema
                .conform(item)
                .ok_or_else(|| "record is not a JSON object".to_string())
        })
        .collect()
}

/// Builds a chat provider for a model and a prepared request.
pub trait ProviderFactory: Sync {
    /// # Errors
    ///
    /// Returns an error if the provider cannot be configured, e.g. a missing API key.
    fn build(
        &self,
        model: &ModelSpec,
        request: &PreparedRequest,
    ) -> Result<Box<dyn ChatProvider>, DispatchError>;
}

/// Provider factory backed by the `llm` crate.
#[derive(Clone, Debug, Default)]
pub struct LlmProviderFactory {
    /// Explicit API key, taking precedence over the environment.
    pub api_key: Option<String>,
    /// Custom endpoint, e.g. a local Ollama server.
    pub base_url: Option<String>,
}

impl LlmProviderFactory {
    fn resolve_api_key(&self, provider: Provider) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(MODEL_API_KEY_ENV_NAME).ok())
            .or_else(|| provider.api_key_env().and_then(|name| std::env::var(name).ok()))
    }
}

fn backend(provider: Provider) -> LLMBackend {
    match provider {
        Provider::OpenAI => LLMBackend::OpenAI,
        Provider::Google => LLMBackend::Google,
        Provider::Anthropic => LLMBackend::Anthropic,
        Provider::Groq => LLMBackend::Groq,
        Provider::Ollama => LLMBackend::Ollama,
    }
}

impl ProviderFactory for LlmProviderFactory {
    fn build(
        &self,
        model: &ModelSpec,
        request: &PreparedRequest,
    ) -> Result<Box<dyn ChatProvider>, DispatchError> {
        let mut builder = LLMBuilder::new()
            .backend(backend(model.provider))
            .model(model.remote_name)
            .system(request.system.clone());

        match self.resolve_api_key(model.provider) {
            Some(api_key) => builder = builder.api_key(api_key),
            None => debug!("No API key provided for {}", model.provider),
        }
        if let Some(base_url) = &self.base_url {
            builder = builder.base_url(base_url.clone());
        }
        if let Some(format) = &request.structured_output {
            builder = builder.schema(format.clone());
        }

        let provider: Box<dyn ChatProvider> = builder
            .build()
            .map_err(|e| DispatchError::backend(model.id, format!("failed to build model: {e}")))?;
        Ok(provider)
    }
}

/// Extracts records from content with the model named by `model_id`.
///
/// # Errors
///
/// Returns an error if:
/// * The model is not in the catalog
/// * The content is empty
/// * Any backend call fails or returns an unusable reply
pub async fn extract(
    content: &NormalizedContent,
    schema: &ExtractionSchema,
    model_id: &str,
    factory: &dyn ProviderFactory,
) -> Result<Extraction, DispatchError> {
    let model = catalog::lookup(model_id)
        .ok_or_else(|| DispatchError::UnsupportedModel(model_id.to_string()))?;
    extract_with_model(content, schema, model, factory).await
}

/// Extracts records from content with an explicit model description.
///
/// Either every chunk succeeds and the concatenated records are returned, or
/// the first failure is returned and nothing else.
///
/// # Errors
///
/// Returns an error if the content is empty or any backend call fails.
pub async fn extract_with_model(
    content: &NormalizedContent,
    schema: &ExtractionSchema,
    model: &ModelSpec,
    factory: &dyn ProviderFactory,
) -> Result<Extraction, DispatchError> {
    if content.is_empty() {
        return Err(DispatchError::EmptyContent);
    }

    let convention = model.family.convention();
    let chunks = split_into_chunks(content, model.max_chunk_chars);
    info!(
        "Extracting {} with {} in {} chunk(s) from {} bytes",
        schema.describe_fields(),
        model.id,
        chunks.len(),
        content.byte_len()
    );

    let mut records = Vec::new();
    let mut usage = UsageRecord::default();
    for (index, chunk) in chunks.iter().enumerate() {
        let (chunk_records, chunk_usage) =
            extract_chunk(chunk, schema, model, convention, factory).await?;
        debug!(
            "Chunk {}/{} yielded {} record(s)",
            index + 1,
            chunks.len(),
            chunk_records.len()
        );
        records.extend(chunk_records);
        usage += chunk_usage;
    }

    Ok(Extraction {
        data: schema.container(records),
        usage,
        chunks: chunks.len(),
    })
}

async fn extract_chunk(
    chunk: &str,
    schema: &ExtractionSchema,
    model: &ModelSpec,
    convention: &dyn Convention,
    factory: &dyn ProviderFactory,
) -> Result<(Vec<Record>, UsageRecord), DispatchError> {
    let request = convention.prepare_request(chunk, schema);
    let provider = factory.build(model, &request)?;
    let messages = vec![ChatMessage::user().content(request.prompt.clone()).build()];

    let response = provider
        .chat(&messages)
        .await
        .map_err(|err| DispatchError::backend(model.id, format!("LLM error: {err}")))?;

    let text = response.text().unwrap_or_default();
    if text.trim().is_empty() {
        return Err(DispatchError::backend(model.id, "empty reply"));
    }

    let usage = match response.usage() {
        Some(usage) => UsageRecord {
            input_tokens: u64::from(usage.prompt_tokens),
            output_tokens: u64::from(usage.completion_tokens),
        },
        None => {
            warn!("{} reported no token usage, estimating", model.id);
            estimate_usage(&request, &text)
        }
    };

    let records = convention
        .parse_response(&text, schema)
        .map_err(|reason| DispatchError::backend(model.id, reason))?;

    Ok((records, usage))
}

/// Estimates token counts from text length.
pub fn estimate_usage(request: &PreparedRequest, reply: &str) -> UsageRecord {
    let tokens = |chars: usize| chars.div_ceil(CHARS_PER_TOKEN) as u64;
    UsageRecord {
        input_tokens: tokens(request.system.len() + request.prompt.len()),
        output_tokens: tokens(reply.len()),
    }
}
