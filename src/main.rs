//! fieldscrape is a CLI tool that extracts user-named fields from a web page
//! or JSON API with a language model and exports them as JSON, CSV and markdown.
//!
//! The tool has three commands:
//! 1. `scrape` - Retrieves content, extracts the fields and writes the exports
//! 2. `models` - Lists the supported models and their prices
//! 3. `methods` - Lists the supported retrieval methods

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Builder;
use log::{LevelFilter, info};
use scraper::Selector as ScraperSelector;
use url::Url;

use fieldscrape::{
    Method, Session, TextBy,
    catalog::{MODELS, default_model_id},
    dispatch::LlmProviderFactory,
    fetch::{Source, parse_json_argument},
    normalize::HtmlOptions,
    pipeline::{PipelineContext, ScrapeRequest},
    storage::Storage,
};

/// A CLI tool to extract structured fields from web content with an LLM
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// The command to execute
    #[command(subcommand)]
    command: Command,

    #[arg(long, short, action = clap::ArgAction::Count, help = "Output v(v...)erbosity: error (0), warn (1), info (2), debug (3), trace (4)", global = true, default_value_t = 2)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Extract fields from a URL and export the results
    Scrape {
        /// The URL to scrape
        url: String,
        /// Field to extract; repeat for several. None means all data
        #[arg(long = "field", short = 'f')]
        fields: Vec<String>,
        /// Model identifier, see `models`
        #[arg(long, short, default_value_t = default_model_id().to_string())]
        model: String,
        /// Retrieval method: "link" (default), "post" or "chat"
        #[arg(long, default_value = "link")]
        method: Method,
        /// JSON payload for the POST method
        #[arg(long)]
        payload: Option<String>,
        /// JSON object of headers for the POST method
        #[arg(long)]
        headers: Option<String>,
        /// Text extraction method: "dom_smoothie" (default) or "fast_html2md"
        #[arg(long, default_value = "dom_smoothie")]
        text_by: TextBy,
        /// CSS selector to limit the HTML subset from which content is extracted (optional)
        #[arg(long, short)]
        selector: Option<String>,
        /// Directory to write the exports to
        #[arg(long, short, default_value = "output")]
        output_dir: PathBuf,
        /// Path to an audit database storing raw and formatted data (optional)
        #[arg(long)]
        db: Option<String>,
        /// Custom model endpoint, e.g. a local Ollama server
        #[arg(long)]
        base_url: Option<String>,
    },
    /// List supported models with their prices per million tokens
    Models,
    /// List supported retrieval methods
    Methods,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    Builder::new()
        .filter_level(match cli.verbose {
            0 => LevelFilter::Error,
            1 => LevelFilter::Warn,
            2 => LevelFilter::Info,
            3 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        })
        .init();

    match cli.command {
        Command::Scrape {
            url,
            fields,
            model,
            method,
            payload,
            headers,
            text_by,
            selector,
            output_dir,
            db,
            base_url,
        } => {
            let source = build_source(&url, method, payload.as_deref(), headers.as_deref())?;
            let html = HtmlOptions {
                text_by,
                selector: parse_selector(selector)?,
            };
            let request = ScrapeRequest {
                source,
                fields,
                model_id: model,
            };
            handle_scrape_command(request, html, output_dir, db, base_url).await
        }
        Command::Models => {
            for model in MODELS {
                println!(
                    "{:<20} {:<10} ${:>7.3} in / ${:>7.3} out",
                    model.id,
                    model.provider,
                    model.pricing.input_per_million,
                    model.pricing.output_per_million
                );
            }
            Ok(())
        }
        Command::Methods => {
            for method in Method::ALL {
                println!("{:<6} {}", method, method.describe());
            }
            Ok(())
        }
    }
}

fn build_source(
    url: &str,
    method: Method,
    payload: Option<&str>,
    headers: Option<&str>,
) -> Result<Source> {
    let url = Url::parse(url).map_err(|e| anyhow::anyhow!("Invalid url: {}", e))?;

    Ok(match method {
        Method::Link => Source::Link { url },
        Method::Post => Source::Post {
            url,
            payload: parse_json_argument("payload", payload)?,
            headers: parse_json_argument("headers", headers)?,
        },
        Method::Chat => Source::Chat { url },
    })
}

fn parse_selector(selector_query: Option<String>) -> Result<Option<ScraperSelector>> {
    match selector_query {
        Some(selector_query) => Ok(Some(
            ScraperSelector::parse(&selector_query)
                .map_err(|e| anyhow::anyhow!("Invalid CSS selector: {}", e))?,
        )),
        None => Ok(None),
    }
}

async fn handle_scrape_command(
    request: ScrapeRequest,
    html: HtmlOptions,
    output_dir: PathBuf,
    db: Option<String>,
    base_url: Option<String>,
) -> Result<()> {
    let storage = match db {
        Some(db) => Some(Storage::new(&db).context(format!("Failed to open database: {db}"))?),
        None => None,
    };
    let factory = LlmProviderFactory {
        api_key: None,
        base_url,
    };
    let ctx = PipelineContext {
        factory: &factory,
        storage: storage.as_ref(),
        html,
    };

    let mut session = Session::new();
    let outcome = session.run(&request, &ctx).await?;

    println!("{}", outcome.table.to_markdown());

    let cost = outcome.display_cost();
    info!("Input tokens: {}", outcome.result.usage.input_tokens);
    info!("Output tokens: {}", outcome.result.usage.output_tokens);
    match outcome.cost {
        Some(_) => info!("Total cost: ${:.4}", cost.total_cost),
        None => info!("Total cost: unknown (${:.4})", cost.total_cost),
    }

    outcome.bundle.write_to(&output_dir)?;
    Ok(())
}
