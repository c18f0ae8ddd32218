pub const MODEL_API_KEY_ENV_NAME: &str = "FIELDSCRAPE_MODEL_API_KEY";

pub const USER_AGENT: &str = "FieldScrape Bot";

/// Name of the container type wrapping extracted records.
pub const CONTAINER_NAME: &str = "ListingsContainer";

/// Key under which the container holds its records.
pub const CONTAINER_KEY: &str = "listings";

/// Name of the per-record type.
pub const RECORD_NAME: &str = "Listing";

/// Run key format, down to the microsecond.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";

/// Rough characters-per-token ratio used when a backend reports no usage.
pub(crate) const CHARS_PER_TOKEN: usize = 4;

pub(crate) const THINK_STRIPPER: &str = r"<think>[\s\S]*</think>\s*";

pub(crate) const CODE_FENCE: &str = r"```(?:json|JSON)?\s*([\s\S]*?)\s*```";

pub(crate) const SYSTEM_PROMPT: &str = r#"You are an intelligent text extraction and conversion assistant.
Extract structured information from the given text and return it as pure JSON.
The JSON must contain only the extracted data, with no commentary, explanations or extra text.
When a requested field cannot be found, use null. The text may be in a foreign language.
Answer with JSON only, no words before or after it."#;

pub(crate) const USER_PROMPT_TEMPLATE: &str = r#"Extract the following information from the provided text.
Page content:

{content}

Information to extract: {fields}"#;

pub(crate) const FORMAT_INSTRUCTIONS_TEMPLATE: &str = r#"
Reply with a single JSON object matching this JSON schema:
{schema}"#;

pub(crate) const ALL_FIELDS_DESCRIPTION: &str =
    "all data present on the page, one record per listed item, with keys named after what they hold";

pub(crate) const CHAT_INSTRUCTION_TEMPLATE: &str = "Grab all data from {url}";
