//! The assemble module turns a records container into a table and the three
//! export encodings (JSON, CSV, markdown) of a run.

use anyhow::{Context, Result};
use log::info;
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::constants::CONTAINER_KEY;
use crate::error::AssembleError;
use crate::normalize::markdown_table;
use crate::schema::ExtractionSchema;

/// Records laid out as rows of text cells.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TabularResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TabularResult {
    /// Builds the table from a records container.
    ///
    /// Columns are the schema fields, or for unconstrained schemas the union of
    /// record keys in order of first appearance.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is not a container of record objects.
    pub fn from_container(
        data: &Value,
        schema: &ExtractionSchema,
    ) -> Result<Self, AssembleError> {
        let records = data
            .get(CONTAINER_KEY)
            .and_then(Value::as_array)
            .ok_or(AssembleError::NotAContainer)?;
        let records = records
            .iter()
            .map(|record| record.as_object().ok_or(AssembleError::NotAContainer))
            .collect::<Result<Vec<_>, _>>()?;

        let columns: Vec<String> = if schema.is_unconstrained() {
            let mut columns: Vec<String> = Vec::new();
            for key in records.iter().flat_map(|record| record.keys()) {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
            columns
        } else {
            schema.fields().to_vec()
        };

        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|column| record.get(column).map(cell).unwrap_or_default())
                    .collect()
            })
            .collect();

        Ok(Self { columns, rows })
    }

    /// Encodes the table as CSV with a header row.
    ///
    /// # Errors
    ///
    /// Returns an error if CSV encoding fails.
    pub fn to_csv(&self) -> Result<String, AssembleError> {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());

        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|err| csv::Error::from(err.into_error()))?;
        Ok(String::from_utf8(bytes)?)
    }

    pub fn to_markdown(&self) -> String {
        markdown_table(&self.columns, &self.rows)
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// The three downloadable artifacts of a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportBundle {
    pub timestamp: String,
    /// The structured data, serialized verbatim.
    pub json: String,
    pub csv: String,
    /// The normalized source content.
    pub markdown: String,
}

/// Converts structured data into a table and its export bundle.
///
/// # Errors
///
/// Returns an error if the data is not a records container or cannot be encoded.
pub fn assemble(
    structured_data: &Value,
    schema: &ExtractionSchema,
    timestamp: &str,
    markdown: &str,
) -> Result<(TabularResult, ExportBundle), AssembleError> {
    let table = TabularResult::from_container(structured_data, schema)?;
    let bundle = ExportBundle {
        timestamp: timestamp.to_string(),
        json: serde_json::to_string_pretty(structured_data)?,
        csv: table.to_csv()?,
        markdown: markdown.to_string(),
    };

    Ok((table, bundle))
}

impl ExportBundle {
    /// File names and contents of the artifacts.
    pub fn files(&self) -> [(String, &str); 3] {
        [
            (format!("{}_data.json", self.timestamp), self.json.as_str()),
            (format!("{}_data.csv", self.timestamp), self.csv.as_str()),
            (format!("{}_data.md", self.timestamp), self.markdown.as_str()),
        ]
    }

    /// Writes the artifacts into a directory, creating it when needed.
    ///
    /// # Returns
    ///
    /// Returns the paths of the written files.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * The directory cannot be created
    /// * Any file cannot be written
    pub fn write_to(&self, output_dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(output_dir).context(format!(
            "Failed to create output directory: {}",
            output_dir.display()
        ))?;

        let mut written = Vec::new();
        for (name, content) in self.files() {
            let path = output_dir.join(name);
            let mut file = OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(&path)
                .context(format!("Failed to open {}", path.display()))?;
            file.write_all(content.as_bytes())?;
            written.push(path);
        }

        info!(
            "Exported {} files to {}",
            written.len(),
            output_dir.display()
        );
        Ok(written)
    }
}
