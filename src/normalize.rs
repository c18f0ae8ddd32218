//! The normalize module turns retrieved content into a single text blob
//! suitable for prompting: markdown for HTML pages, a markdown table for
//! JSON API payloads.

use dom_smoothie::{Article, CandidateSelectMode, Config, Readability, TextMode};
use html2md;
use log::{debug, warn};
use scraper::{Html, Selector as ScraperSelector};
use serde_json::Value;

use crate::TextBy;
use crate::constants::CHAT_INSTRUCTION_TEMPLATE;
use crate::error::NormalizeError;

/// Content as handed over by the retrieval collaborators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawContent {
    /// Rendered HTML of a page.
    HtmlPage { html: String },
    /// Body of a JSON API call together with its HTTP status.
    JsonPayload { status: u16, body: String },
    /// No retrieval; the model is only told where to look.
    Instruction { url: String },
}

/// Shape of the normalized text, used by the chunker to pick boundaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentKind {
    Markdown,
    Table,
    Instruction,
}

/// Flattened text representation of a source page or response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedContent {
    pub text: String,
    pub kind: ContentKind,
    /// Page title, when one could be found.
    pub title: Option<String>,
}

impl NormalizedContent {
    pub fn new(text: impl Into<String>, kind: ContentKind) -> Self {
        Self {
            text: text.into(),
            kind,
            title: None,
        }
    }

    /// Raw byte length of the text.
    pub fn byte_len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Options for HTML conversion.
#[derive(Clone, Debug, Default)]
pub struct HtmlOptions {
    /// The text extraction method.
    pub text_by: TextBy,
    /// Optional CSS selector limiting the HTML subset to convert.
    pub selector: Option<ScraperSelector>,
}

/// Normalizes raw content into prompt-ready text.
///
/// # Errors
///
/// Returns an error if:
/// * The content is empty or yields no text
/// * A JSON payload is malformed or came with a non-200 status
/// * Readability extraction fails and no fallback is possible
pub fn normalize(
    raw: &RawContent,
    options: &HtmlOptions,
) -> Result<NormalizedContent, NormalizeError> {
    let normalized = match raw {
        RawContent::HtmlPage { html } => html_to_markdown(html, options)?,
        RawContent::JsonPayload { status, body } => json_to_markdown(*status, body)?,
        RawContent::Instruction { url } => NormalizedContent::new(
            CHAT_INSTRUCTION_TEMPLATE.replace("{url}", url),
            ContentKind::Instruction,
        ),
    };

    if normalized.is_empty() {
        return Err(NormalizeError::EmptyContent);
    }

    debug!(
        "Normalized content: {} bytes ({:?})",
        normalized.byte_len(),
        normalized.kind
    );
    Ok(normalized)
}

/// Extracts the main content region of an HTML page as markdown.
///
/// # Errors
///
/// Returns an error if the page is empty.
pub fn html_to_markdown(
    html: &str,
    options: &HtmlOptions,
) -> Result<NormalizedContent, NormalizeError> {
    if html.trim().is_empty() {
        return Err(NormalizeError::EmptyContent);
    }

    let title = parse_title(html);
    let selected = options.selector.as_ref().map(|sel| {
        let document = Html::parse_document(html);
        let elements = document.select(sel);
        let selected_content: Vec<String> = elements.map(|el| el.html()).collect();
        selected_content.join("\n")
    });
    let selected_html = selected.as_deref().unwrap_or(html);

    let text = match options.text_by {
        TextBy::DomSmoothie => match readability_markdown(selected_html) {
            Ok(text) => text,
            Err(err) => {
                warn!("{err}, falling back to fast_html2md");
                html2md::parse_html(selected_html, false)
            }
        },
        TextBy::FastHtml2Md => html2md::parse_html(selected_html, false),
    };

    Ok(NormalizedContent {
        text: text.trim().to_string(),
        kind: ContentKind::Markdown,
        title,
    })
}

fn readability_markdown(html: &str) -> Result<String, NormalizeError> {
    let config = Config {
        text_mode: TextMode::Markdown,
        candidate_select_mode: CandidateSelectMode::DomSmoothie,
        ..Default::default()
    };

    let mut readability = Readability::new(html, None, Some(config))
        .map_err(|e| NormalizeError::Readability(e.to_string()))?;
    let article: Article = readability
        .parse()
        .map_err(|e| NormalizeError::Readability(e.to_string()))?;

    Ok(article.text_content.to_string())
}

/// Parses the title from HTML content
fn parse_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    ["title", "h1", "h2"].iter().find_map(|tag| {
        let selector = ScraperSelector::parse(tag).ok()?;
        let element = document.select(&selector).next()?;
        let text = element.text().collect::<Vec<_>>().join(" ").trim().to_string();
        (!text.is_empty()).then_some(text)
    })
}

/// Flattens a JSON API body into a markdown table.
///
/// The records are taken from the `items` array of a top-level object, or
/// from a top-level array. Columns are the keys of the first item only; later
/// items missing a column get an empty cell and their extra keys are dropped.
///
/// # Errors
///
/// Returns an error if:
/// * The status is not 200
/// * The body is empty or holds no items
/// * The body is not valid JSON
pub fn json_to_markdown(status: u16, body: &str) -> Result<NormalizedContent, NormalizeError> {
    if status != 200 {
        return Err(NormalizeError::UnexpectedStatus(status));
    }
    if body.trim().is_empty() {
        return Err(NormalizeError::EmptyContent);
    }

    let parsed: Value = serde_json::from_str(body)?;
    let items = match parsed {
        Value::Array(items) => items,
        Value::Object(mut object) => match object.remove("items") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    let text = items_to_markdown_table(&items).ok_or(NormalizeError::EmptyContent)?;
    Ok(NormalizedContent::new(text, ContentKind::Table))
}

/// Renders items as a markdown table whose columns come from the first item.
///
/// Keys that only later items carry are dropped; keys they lack render as
/// empty cells.
///
/// Non-object items render in a single `value` column. Returns `None` for an
/// empty slice.
pub fn items_to_markdown_table(items: &[Value]) -> Option<String> {
    let first = items.first()?;

    let Some(first) = first.as_object() else {
        let rows: Vec<Vec<String>> = items.iter().map(|item| vec![cell(item)]).collect();
        return Some(markdown_table(&["value".to_string()], &rows));
    };

    let columns: Vec<String> = first.keys().cloned().collect();
    let rows: Vec<Vec<String>> = items
        .iter()
        .map(|item| {
            columns
                .iter()
                .map(|column| item.get(column).map(cell).unwrap_or_default())
                .collect()
        })
        .collect();

    Some(markdown_table(&columns, &rows))
}

/// Renders a markdown table. Each row is guaranteed to occupy one line.
pub fn markdown_table(columns: &[String], rows: &[Vec<String>]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(table_line(columns.iter().map(|c| escape_cell(c))));
    lines.push(table_line(columns.iter().map(|_| "---".to_string())));
    for row in rows {
        lines.push(table_line(row.iter().map(|c| escape_cell(c))));
    }

    lines.join("\n")
}

fn table_line(cells: impl Iterator<Item = String>) -> String {
    format!("| {} |", cells.collect::<Vec<_>>().join(" | "))
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
}
