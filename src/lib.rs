//! The fieldscrape library extracts user-named fields from web pages and JSON
//! APIs: content is normalized to markdown, sent to a language model together
//! with a schema built from the field names, and the resulting records are
//! priced and exported as JSON, CSV and markdown.

pub mod assemble;
pub mod catalog;
pub mod chunk;
pub mod constants;
pub mod cost;
pub mod dispatch;
pub mod error;
pub mod fetch;
pub mod normalize;
pub mod pipeline;
pub mod schema;
pub mod storage;

/// Enum representing the text extraction method.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum TextBy {
    /// Use dom_smoothie for text extraction
    #[default]
    DomSmoothie,
    /// Use fast_html2md for text extraction
    FastHtml2Md,
}

impl std::str::FromStr for TextBy {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_lowercase().as_str() {
            "dom_smoothie" => Ok(TextBy::DomSmoothie),
            "fast_html2md" => Ok(TextBy::FastHtml2Md),
            _ => Err(format!("Invalid text extraction method: {}", input)),
        }
    }
}

/// Enum representing how content is retrieved.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Method {
    /// Fetch the page and convert its HTML.
    #[default]
    Link,
    /// Post a JSON payload and tabulate the returned items.
    Post,
    /// Retrieve nothing; ask the model to grab the data itself.
    Chat,
}

impl Method {
    pub const ALL: [Method; 3] = [Method::Link, Method::Post, Method::Chat];

    pub fn describe(self) -> &'static str {
        match self {
            Method::Link => "fetch the page and convert its main content to markdown",
            Method::Post => "POST a JSON payload and tabulate the returned `items`",
            Method::Chat => "send only an instruction naming the URL",
        }
    }
}

impl std::str::FromStr for Method {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_lowercase().as_str() {
            "link" => Ok(Method::Link),
            "post" => Ok(Method::Post),
            "chat" => Ok(Method::Chat),
            _ => Err(format!("Invalid scrape method: {}", input)),
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Method::Link => "LINK",
            Method::Post => "POST",
            Method::Chat => "CHAT",
        };
        formatter.pad(name)
    }
}

pub use cost::estimate_cost;
pub use dispatch::extract;
pub use normalize::normalize;
pub use pipeline::{Session, scrape};
pub use schema::build_schema;
