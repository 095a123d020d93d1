//! Connector for the Zooniverse citizen-science platform (panoptes).
//!
//! Besides the standard claim/convert contract, this connector calls the
//! panoptes API to generate and retrieve the data exports referenced by
//! basket items. Each operation is a stateless sequence: resolve the
//! entity the item points at, check or request an export for the item's
//! category, optionally poll until generation completes (blocking, no
//! timeout), then stream-parse the resulting CSV payload row by row so
//! memory stays bounded regardless of export size.

use std::io::{BufRead, BufReader, Lines, Read};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header;
use serde::Deserialize;
use serde_json::Value;

use crate::config::Config;
use crate::connector::Connector;
use crate::models::{BasketItem, Record, Table};

pub const DEFAULT_API_HOST: &str = "https://www.zooniverse.org";

/// Media type the panoptes API requires.
const PANOPTES_ACCEPT: &str = "application/vnd.api+json; version=1";
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Panoptes collection path for each catalog kind a basket item may
/// reference.
fn entity_collection(catalog: &str) -> Option<&'static str> {
    match catalog {
        "workflow" => Some("workflows"),
        "project" => Some("projects"),
        _ => None,
    }
}

/// Columns that hold embedded JSON, per export category. These are
/// re-parsed into JSON values instead of staying flat strings.
fn category_converters(category: &str) -> &'static [&'static str] {
    match category {
        "subjects" => &["metadata", "locations"],
        "classifications" => &["metadata", "annotations"],
        _ => &[],
    }
}

#[derive(Debug, Deserialize)]
struct MediaEnvelope {
    #[serde(default)]
    media: Vec<ExportMedia>,
}

#[derive(Debug, Deserialize)]
struct ExportMedia {
    src: Option<String>,
    #[serde(default)]
    metadata: MediaMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct MediaMetadata {
    state: Option<String>,
}

impl ExportMedia {
    fn ready_src(&self) -> Option<&str> {
        if self.metadata.state.as_deref() == Some("creating") {
            return None;
        }
        self.src.as_deref()
    }
}

pub struct ZooniverseConnector {
    api_host: String,
    http: HttpClient,
    access_token: String,
}

impl ZooniverseConnector {
    /// Log in to panoptes with account credentials.
    pub fn connect(username: &str, password: &str) -> Result<Self> {
        Self::connect_to(DEFAULT_API_HOST, username, password)
    }

    /// Log in using the API host from configuration.
    pub fn from_config(config: &Config, username: &str, password: &str) -> Result<Self> {
        Self::connect_to(config.zooniverse.api_host.clone(), username, password)
    }

    /// Log in against a non-default panoptes host (staging, tests).
    pub fn connect_to(api_host: impl Into<String>, username: &str, password: &str) -> Result<Self> {
        let api_host = api_host.into();
        let http = HttpClient::new();

        let response = http
            .post(format!("{}/oauth/token", api_host.trim_end_matches('/')))
            .json(&serde_json::json!({
                "grant_type": "password",
                "username": username,
                "password": password,
            }))
            .send()
            .context("zooniverse login request failed")?
            .error_for_status()
            .context("zooniverse login rejected")?;

        let body: Value = response.json().context("zooniverse login response")?;
        let access_token = body
            .get("access_token")
            .and_then(|t| t.as_str())
            .context("zooniverse login response carried no access_token")?
            .to_string();

        Ok(Self {
            api_host,
            http,
            access_token,
        })
    }

    /// Whether an export for this item's category has already been
    /// generated and can be downloaded.
    pub fn is_available(&self, item: &BasketItem) -> bool {
        match self.describe_export(item) {
            Ok(media) => media.iter().any(|m| m.ready_src().is_some()),
            Err(_) => false,
        }
    }

    /// Request generation of the export referenced by `item`.
    ///
    /// Returns the parsed table when `wait` is set (blocks until the
    /// archive finishes generating, polling with no timeout), `None`
    /// when generation was started without waiting or the archive
    /// refused the request.
    pub fn generate(&self, item: &BasketItem, wait: bool) -> Result<Option<Table>> {
        println!("Generating requested export...");

        let url = self.export_url(item)?;
        let response = self
            .http
            .post(&url)
            .header(header::ACCEPT, PANOPTES_ACCEPT)
            .bearer_auth(&self.access_token)
            .send();

        match response {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                eprintln!(
                    "Warning: export generation request refused (HTTP {})",
                    response.status()
                );
                return Ok(None);
            }
            Err(e) => {
                eprintln!("Warning: export generation request failed: {e}");
                return Ok(None);
            }
        }

        if !wait {
            println!("\t\tNot waiting for generation to complete...");
            return Ok(None);
        }

        println!("\t\tWaiting for generation to complete...");
        let src = self.wait_for_export(item)?;
        self.download_export(&src, item).map(Some)
    }

    /// Retrieve the export referenced by `item`.
    ///
    /// Downloads the existing export when one is available and `generate`
    /// is false. With `generate` set the export is (re)generated first;
    /// `wait` then controls whether the call blocks for completion. An
    /// unavailable export with `generate` unset only warns.
    pub fn retrieve(&self, item: &BasketItem, generate: bool, wait: bool) -> Result<Option<Table>> {
        if !generate {
            // A failed media lookup (never-generated exports answer 404)
            // counts as unavailable, same as is_available.
            let media = self.describe_export(item).unwrap_or_default();
            match media.iter().find_map(|m| m.ready_src()) {
                Some(src) => {
                    let src = src.to_string();
                    return self.download_export(&src, item).map(Some);
                }
                None => {
                    eprintln!(
                        "Warning: requested export is not available and generate was not requested"
                    );
                    return Ok(None);
                }
            }
        }

        self.generate(item, wait)
    }

    /// `GET` the export media description for the item's category.
    fn describe_export(&self, item: &BasketItem) -> Result<Vec<ExportMedia>> {
        let url = self.export_url(item)?;
        let envelope: MediaEnvelope = self
            .http
            .get(&url)
            .header(header::ACCEPT, PANOPTES_ACCEPT)
            .bearer_auth(&self.access_token)
            .send()
            .with_context(|| format!("export lookup failed for {url}"))?
            .error_for_status()
            .with_context(|| format!("export lookup rejected for {url}"))?
            .json()
            .context("malformed export media description")?;
        Ok(envelope.media)
    }

    /// Poll the media description until a downloadable src appears.
    fn wait_for_export(&self, item: &BasketItem) -> Result<String> {
        loop {
            let media = self.describe_export(item)?;
            if let Some(src) = media.iter().find_map(|m| m.ready_src()) {
                return Ok(src.to_string());
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Download the export payload and parse it as CSV, applying the
    /// per-category JSON column converters.
    fn download_export(&self, src: &str, item: &BasketItem) -> Result<Table> {
        // Media src URLs are pre-signed; no auth header.
        let response = self
            .http
            .get(src)
            .send()
            .with_context(|| format!("export download failed: {src}"))?
            .error_for_status()
            .with_context(|| format!("export download rejected: {src}"))?;

        let category = item_entry(item, "category").unwrap_or_default();
        parse_export(BufReader::new(response), category_converters(&category))
    }

    /// Export endpoint for the entity and category an item references.
    fn export_url(&self, item: &BasketItem) -> Result<String> {
        let catalog = item_entry(item, "catalog")
            .ok_or_else(|| anyhow::anyhow!("basket item carries no catalog entry"))?;
        let collection = entity_collection(&catalog)
            .ok_or_else(|| anyhow::anyhow!("unknown zooniverse catalog kind: {catalog}"))?;
        let id = item_entry(item, &format!("{catalog}_id"))
            .ok_or_else(|| anyhow::anyhow!("basket item carries no {catalog}_id entry"))?;
        let category = item_entry(item, "category")
            .ok_or_else(|| anyhow::anyhow!("basket item carries no category entry"))?;

        Ok(format!(
            "{}/api/{collection}/{id}/{category}_export",
            self.api_host.trim_end_matches('/')
        ))
    }
}

impl Connector for ZooniverseConnector {
    fn name(&self) -> &str {
        "zooniverse"
    }

    fn archive(&self) -> &str {
        "zooniverse"
    }
}

/// Read one payload entry, tolerating the single-quoted pseudo-JSON the
/// portal GUI historically stored for zooniverse items.
fn item_entry(item: &BasketItem, entry: &str) -> Option<String> {
    let payload: Value = serde_json::from_str(&item.item_data)
        .or_else(|_| serde_json::from_str(&item.item_data.replace('\'', "\"")))
        .ok()?;
    match payload.get(entry)? {
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Parse a CSV export into records, one row at a time.
///
/// Columns named in `json_columns` are re-parsed as JSON values; all
/// other fields stay strings. Rows are read through the `BufRead`
/// incrementally, so only one record is held at a time besides the
/// accumulated output.
fn parse_export<R: Read>(reader: BufReader<R>, json_columns: &[&str]) -> Result<Table> {
    let mut lines = reader.lines();

    let Some(header) = next_csv_record(&mut lines)? else {
        return Ok(Table::new());
    };

    let mut rows = Table::new();
    while let Some(fields) = next_csv_record(&mut lines)? {
        if fields.len() == 1 && fields[0].is_empty() {
            continue;
        }
        let mut record = Record::new();
        for (name, value) in header.iter().zip(fields) {
            let parsed = if json_columns.contains(&name.as_str()) {
                serde_json::from_str(&value).unwrap_or(Value::String(value))
            } else {
                Value::String(value)
            };
            record.insert(name.clone(), parsed);
        }
        rows.push(record);
    }
    Ok(rows)
}

/// Pull the next CSV record, joining physical lines while a quoted field
/// is still open.
fn next_csv_record<R: Read>(lines: &mut Lines<BufReader<R>>) -> Result<Option<Vec<String>>> {
    let Some(first) = lines.next() else {
        return Ok(None);
    };
    let mut buffer = first.context("error reading export payload")?;

    loop {
        match split_csv_line(&buffer) {
            Some(fields) => return Ok(Some(fields)),
            None => match lines.next() {
                Some(next) => {
                    buffer.push('\n');
                    buffer.push_str(&next.context("error reading export payload")?);
                }
                None => bail!("unterminated quoted field in export payload"),
            },
        }
    }
}

/// Split one logical CSV line into fields. `None` when a quoted field is
/// left open (the record continues on the next physical line).
fn split_csv_line(line: &str) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
        } else {
            match c {
                ',' => fields.push(std::mem::take(&mut field)),
                '"' => in_quotes = true,
                _ => field.push(c),
            }
        }
    }

    if in_quotes {
        return None;
    }
    fields.push(field);
    Some(fields)
}
