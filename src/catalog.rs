//! Static catalog of supported models: who serves them, how they are called
//! and what they cost.

use std::fmt;

/// Backend service a model is served by.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Google,
    Anthropic,
    Groq,
    Ollama,
}

impl Provider {
    /// Conventional environment variable holding the provider's API key.
    pub fn api_key_env(self) -> Option<&'static str> {
        match self {
            Provider::OpenAI => Some("OPENAI_API_KEY"),
            Provider::Google => Some("GOOGLE_API_KEY"),
            Provider::Anthropic => Some("ANTHROPIC_API_KEY"),
            Provider::Groq => Some("GROQ_API_KEY"),
            Provider::Ollama => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Provider::OpenAI => "openai",
            Provider::Google => "google",
            Provider::Anthropic => "anthropic",
            Provider::Groq => "groq",
            Provider::Ollama => "ollama",
        };
        formatter.pad(name)
    }
}

/// Calling convention family of a model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Family {
    /// Accepts the target schema and returns a conforming JSON object.
    SchemaNative,
    /// Needs the schema described in the prompt and its reply parsed.
    PromptAndParse,
}

/// Price per million tokens, in dollars.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

/// A catalog entry.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelSpec {
    /// Identifier users select the model by.
    pub id: &'static str,
    pub provider: Provider,
    /// Model name sent to the backend.
    pub remote_name: &'static str,
    pub family: Family,
    /// Rates of a catalog entry. Costs are always looked up by `id` in
    /// [`MODELS`], so the rates of a spec built elsewhere are not used.
    pub pricing: Pricing,
    /// Largest content, in bytes, sent in a single request.
    pub max_chunk_chars: usize,
}

pub const MODELS: &[ModelSpec] = &[
    ModelSpec {
        id: "gpt-4o-mini",
        provider: Provider::OpenAI,
        remote_name: "gpt-4o-mini",
        family: Family::SchemaNative,
        pricing: Pricing {
            input_per_million: 0.150,
            output_per_million: 0.600,
        },
        max_chunk_chars: 200_000,
    },
    ModelSpec {
        id: "gpt-4o-2024-08-06",
        provider: Provider::OpenAI,
        remote_name: "gpt-4o-2024-08-06",
        family: Family::SchemaNative,
        pricing: Pricing {
            input_per_million: 2.50,
            output_per_million: 10.00,
        },
        max_chunk_chars: 200_000,
    },
    ModelSpec {
        id: "gemini-1.5-flash",
        provider: Provider::Google,
        remote_name: "gemini-1.5-flash",
        family: Family::SchemaNative,
        pricing: Pricing {
            input_per_million: 0.075,
            output_per_million: 0.30,
        },
        max_chunk_chars: 400_000,
    },
    ModelSpec {
        id: "claude-3-5-sonnet",
        provider: Provider::Anthropic,
        remote_name: "claude-3-5-sonnet-20240620",
        family: Family::PromptAndParse,
        pricing: Pricing {
            input_per_million: 3.00,
            output_per_million: 15.00,
        },
        max_chunk_chars: 300_000,
    },
    ModelSpec {
        id: "groq-llama3.1-70b",
        provider: Provider::Groq,
        remote_name: "llama-3.1-70b-versatile",
        family: Family::PromptAndParse,
        pricing: Pricing {
            input_per_million: 0.0,
            output_per_million: 0.0,
        },
        max_chunk_chars: 24_000,
    },
    ModelSpec {
        id: "llama3.1-8b",
        provider: Provider::Ollama,
        remote_name: "llama3.1:8b",
        family: Family::PromptAndParse,
        pricing: Pricing {
            input_per_million: 0.0,
            output_per_million: 0.0,
        },
        max_chunk_chars: 24_000,
    },
];

/// Looks a model up by identifier.
pub fn lookup(id: &str) -> Option<&'static ModelSpec> {
    MODELS.iter().find(|model| model.id == id)
}

/// Identifier of the default model.
pub fn default_model_id() -> &'static str {
    MODELS.first().map_or("gpt-4o-mini", |model| model.id)
}
