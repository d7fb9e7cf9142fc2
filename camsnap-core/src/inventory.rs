//! Camera inventory: reads a tabular file (spreadsheet or CSV), maps its headers onto the
//! logical fields through an explicit [`ColumnSchema`], then filters and de-duplicates the
//! rows into [`CameraRecord`]s.
//!
//! Column resolution happens once, before any row is read. If a required field cannot be
//! matched the whole load fails with every missing field listed; there is no positional
//! fallback.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::credentials::{classify, CredentialClass};
use crate::error::InventoryError;

/// The camera categories a run captures. Any other value in the type column drops the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CameraType {
    Analytics,
    Fixed,
    Ptz,
}

impl CameraType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraType::Analytics => "ANALYTICS",
            CameraType::Fixed => "FIXED",
            CameraType::Ptz => "PTZ",
        }
    }

    /// Case and whitespace insensitive parse. Returns `None` for types outside the run.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "ANALYTICS" => Some(CameraType::Analytics),
            "FIXED" => Some(CameraType::Fixed),
            "PTZ" => Some(CameraType::Ptz),
            _ => None,
        }
    }
}

impl fmt::Display for CameraType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One camera to capture. Identity is the address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraRecord {
    pub name: String,
    pub address: String,
    pub camera_type: CameraType,
    /// Raw "type of analytics" cell, empty when the column is absent.
    pub analytics: String,
}

impl CameraRecord {
    pub fn credential_class(&self) -> CredentialClass {
        classify(self.camera_type, &self.analytics)
    }
}

/// Header aliases for each logical field. Matching is case and whitespace insensitive; an
/// exact header match wins over a substring match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnSchema {
    pub address: Vec<String>,
    pub camera_type: Vec<String>,
    pub location_name: Vec<String>,
    pub analytics_type: Vec<String>,
}

impl Default for ColumnSchema {
    fn default() -> Self {
        Self {
            address: vec!["IP".into()],
            camera_type: vec!["TYPE OF CAMERA".into()],
            location_name: vec!["LOCATION NAME".into()],
            analytics_type: vec!["ANALYTIC".into()],
        }
    }
}

/// Column indices resolved against a concrete header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub address: usize,
    pub camera_type: usize,
    pub location_name: Option<usize>,
    pub analytics_type: Option<usize>,
}

fn normalize(header: &str) -> String {
    header.trim().to_uppercase()
}

fn find_column(headers: &[String], aliases: &[String]) -> Option<usize> {
    let normalized: Vec<String> = headers.iter().map(|h| normalize(h)).collect();
    let aliases: Vec<String> = aliases
        .iter()
        .map(|a| normalize(a))
        .filter(|a| !a.is_empty())
        .collect();

    aliases
        .iter()
        .find_map(|alias| normalized.iter().position(|h| h == alias))
        .or_else(|| {
            aliases
                .iter()
                .find_map(|alias| normalized.iter().position(|h| h.contains(alias.as_str())))
        })
}

impl ColumnSchema {
    /// Maps every logical field onto a header index, failing with all missing required
    /// fields at once.
    pub fn resolve(&self, headers: &[String]) -> Result<ColumnMap, InventoryError> {
        let address = find_column(headers, &self.address);
        let camera_type = find_column(headers, &self.camera_type);

        let mut missing = Vec::new();
        if address.is_none() {
            missing.push(format!("address (aliases: {})", self.address.join(" | ")));
        }
        if camera_type.is_none() {
            missing.push(format!(
                "camera type (aliases: {})",
                self.camera_type.join(" | ")
            ));
        }

        match (address, camera_type) {
            (Some(address), Some(camera_type)) => {
                let map = ColumnMap {
                    address,
                    camera_type,
                    location_name: find_column(headers, &self.location_name),
                    analytics_type: find_column(headers, &self.analytics_type),
                };
                debug!(?map, "Resolved inventory columns");
                Ok(map)
            }
            _ => Err(InventoryError::MissingColumns { missing }),
        }
    }
}

/// A header row plus data rows, all cells rendered as strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Reads the first sheet of a workbook, or a CSV file, into a [`Table`].
pub fn read_table(path: &Path) -> Result<Table, InventoryError> {
    if !path.exists() {
        return Err(InventoryError::NotFound(path.to_path_buf()));
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "csv" => read_csv(path),
        "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => read_workbook(path),
        _ => Err(InventoryError::UnsupportedFormat {
            path: path.to_path_buf(),
        }),
    }
}

fn read_workbook(path: &Path) -> Result<Table, InventoryError> {
    let spreadsheet_err = |message: String| InventoryError::Spreadsheet {
        path: path.to_path_buf(),
        message,
    };

    let mut workbook = open_workbook_auto(path).map_err(|e| spreadsheet_err(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| InventoryError::Empty(path.to_path_buf()))?
        .map_err(|e| spreadsheet_err(e.to_string()))?;

    let mut rows = range.rows().map(|row| {
        row.iter()
            .map(|cell| match cell {
                Data::Empty => String::new(),
                other => other.to_string(),
            })
            .collect::<Vec<String>>()
    });

    let headers = rows
        .next()
        .ok_or_else(|| InventoryError::Empty(path.to_path_buf()))?;
    Ok(Table {
        headers,
        rows: rows.collect(),
    })
}

fn read_csv(path: &Path) -> Result<Table, InventoryError> {
    let csv_err = |source: csv::Error| InventoryError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(str::to_string)
        .collect();
    if headers.is_empty() {
        return Err(InventoryError::Empty(path.to_path_buf()));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(Table { headers, rows })
}

fn cell<'a>(row: &'a [String], index: Option<usize>) -> &'a str {
    index
        .and_then(|i| row.get(i))
        .map(|s| s.trim())
        .filter(|s| !s.eq_ignore_ascii_case("nan"))
        .unwrap_or("")
}

/// Turns table rows into camera records: drops rows without an address or with a camera
/// type outside {ANALYTICS, FIXED, PTZ}, and keeps only the first row for each address.
pub fn parse_inventory(
    table: &Table,
    schema: &ColumnSchema,
) -> Result<Vec<CameraRecord>, InventoryError> {
    let columns = schema.resolve(&table.headers)?;

    let mut seen: HashSet<String> = HashSet::new();
    let mut records = Vec::new();
    let mut filtered_type = 0usize;
    let mut missing_address = 0usize;
    let mut duplicates = 0usize;

    for row in &table.rows {
        let Some(camera_type) = CameraType::parse(cell(row, Some(columns.camera_type))) else {
            filtered_type += 1;
            continue;
        };

        let address = cell(row, Some(columns.address));
        if address.is_empty() {
            missing_address += 1;
            continue;
        }

        if !seen.insert(address.to_string()) {
            duplicates += 1;
            continue;
        }

        let name = match cell(row, columns.location_name) {
            "" => format!("Cam_{address}"),
            name => name.to_string(),
        };

        records.push(CameraRecord {
            name,
            address: address.to_string(),
            camera_type,
            analytics: cell(row, columns.analytics_type).to_string(),
        });
    }

    if missing_address > 0 {
        warn!(rows = missing_address, "Skipped inventory rows without an address");
    }
    info!(
        cameras = records.len(),
        filtered_type,
        duplicates,
        "Parsed camera inventory"
    );
    Ok(records)
}

/// Reads and parses the inventory at `path`.
pub fn load_inventory(
    path: impl Into<PathBuf>,
    schema: &ColumnSchema,
) -> Result<Vec<CameraRecord>, InventoryError> {
    let path = path.into();
    info!(inventory = %path.display(), "Reading camera inventory");
    let table = read_table(&path)?;
    parse_inventory(&table, schema)
}
