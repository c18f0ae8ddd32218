//! The fetch module retrieves raw content for a request: an HTML page, a
//! JSON API response, or nothing at all for chat-only requests.

use log::{debug, info};
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value};
use url::Url;

use crate::Method;
use crate::constants::USER_AGENT;
use crate::error::FetchError;
use crate::normalize::RawContent;

/// Where and how to retrieve content.
#[derive(Clone, Debug, PartialEq)]
pub enum Source {
    Link { url: Url },
    Post { url: Url, payload: Value, headers: Value },
    Chat { url: Url },
}

impl Source {
    pub fn url(&self) -> &Url {
        match self {
            Source::Link { url } | Source::Post { url, .. } | Source::Chat { url } => url,
        }
    }

    pub fn method(&self) -> Method {
        match self {
            Source::Link { .. } => Method::Link,
            Source::Post { .. } => Method::Post,
            Source::Chat { .. } => Method::Chat,
        }
    }
}

/// Parses a JSON command line argument; an empty text means an empty object.
///
/// # Errors
///
/// Returns an error if the text is not valid JSON.
pub fn parse_json_argument(name: &str, text: Option<&str>) -> Result<Value, FetchError> {
    match text.map(str::trim).filter(|text| !text.is_empty()) {
        Some(text) => serde_json::from_str(text)
            .map_err(|e| FetchError::InvalidPayload(format!("Invalid JSON in {name}: {e}"))),
        None => Ok(Value::Object(Map::new())),
    }
}

/// Retrieves raw content for a source.
///
/// # Errors
///
/// Returns an error if the request cannot be sent or its response read.
pub async fn retrieve(source: &Source) -> Result<RawContent, FetchError> {
    match source {
        Source::Link { url } => fetch_html(url).await,
        Source::Post {
            url,
            payload,
            headers,
        } => post_json(url, payload, headers).await,
        Source::Chat { url } => Ok(RawContent::Instruction {
            url: url.to_string(),
        }),
    }
}

fn client() -> Result<Client, FetchError> {
    Ok(Client::builder().user_agent(USER_AGENT).build()?)
}

/// Fetches a page's HTML.
///
/// # Errors
///
/// Returns an error if:
/// * The request fails
/// * The page responds with a non-success status
pub async fn fetch_html(url: &Url) -> Result<RawContent, FetchError> {
    info!("Fetching {url}");
    let response = client()?.get(url.clone()).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }

    let html = response.text().await?;
    debug!("Fetched {} bytes from {url}", html.len());
    Ok(RawContent::HtmlPage { html })
}

/// Posts a JSON payload and reads the streamed response body.
///
/// The HTTP status is kept with the body; judging it is left to normalization.
///
/// # Errors
///
/// Returns an error if:
/// * A header name or value is invalid
/// * The request fails or the body cannot be read
/// * The body is not valid UTF-8
pub async fn post_json(
    url: &Url,
    payload: &Value,
    headers: &Value,
) -> Result<RawContent, FetchError> {
    info!("Posting to {url}");
    let mut response = client()?
        .post(url.clone())
        .headers(header_map(headers)?)
        .json(payload)
        .send()
        .await?;

    let status = response.status().as_u16();
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        body.extend_from_slice(&chunk);
    }

    let body = String::from_utf8(body)?;
    info!("Total response length: {} ({status})", body.len());
    Ok(RawContent::JsonPayload { status, body })
}

/// Converts a JSON object of header names to values into a header map.
///
/// # Errors
///
/// Returns an error if the value is not an object or holds an invalid header.
pub fn header_map(headers: &Value) -> Result<HeaderMap, FetchError> {
    let entries = match headers {
        Value::Null => return Ok(HeaderMap::new()),
        Value::Object(entries) => entries,
        other => return Err(FetchError::InvalidHeader(other.to_string())),
    };

    let mut map = HeaderMap::new();
    for (name, value) in entries {
        let value = match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| FetchError::InvalidHeader(name.clone()))?;
        let header_value =
            HeaderValue::from_str(&value).map_err(|_| FetchError::InvalidHeader(name.clone()))?;
        map.insert(header_name, header_value);
    }

    Ok(map)
}
