//! Content parsing: raw document bytes + declared media type into plain
//! text and/or ordered row records. Byte decoding itself is delegated to
//! the `csv`, `calamine` and `pdf-extract` crates; this module only
//! normalizes their output. Pure transform, no side effects.

use std::path::Path;

use tracing::debug;

use crate::error::{ResumenError, Result};
use crate::models::{ParsedContent, RowRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Pdf,
    Delimited,
    Spreadsheet,
    Text,
}

/// Resolve the media kind from the declared MIME type, falling back to
/// the file extension for generic or missing types.
pub fn resolve_media_kind(media_type: &str, file_name: &str) -> Option<MediaKind> {
    let declared = media_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    match declared.as_str() {
        "application/pdf" => return Some(MediaKind::Pdf),
        "text/csv" | "application/csv" | "text/tab-separated-values" => {
            return Some(MediaKind::Delimited)
        }
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        | "application/vnd.ms-excel"
        | "application/vnd.oasis.opendocument.spreadsheet" => return Some(MediaKind::Spreadsheet),
        _ => {}
    }
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("pdf") => Some(MediaKind::Pdf),
        Some("csv") | Some("tsv") => Some(MediaKind::Delimited),
        Some("xlsx") | Some("xls") | Some("ods") => Some(MediaKind::Spreadsheet),
        Some("txt") => Some(MediaKind::Text),
        _ if declared == "text/plain" => Some(MediaKind::Text),
        _ => None,
    }
}

/// Parse document bytes into text and/or rows. The only fatal outcome of
/// the whole pipeline besides store failures: an unrecognized media type.
pub fn parse(bytes: &[u8], media_type: &str, file_name: &str) -> Result<ParsedContent> {
    let kind = resolve_media_kind(media_type, file_name).ok_or_else(|| {
        ResumenError::UnsupportedFormat(format!("{media_type} ({file_name})"))
    })?;
    debug!(?kind, file_name, bytes = bytes.len(), "parsing document content");
    match kind {
        MediaKind::Pdf => parse_pdf(bytes),
        MediaKind::Delimited => parse_delimited(bytes),
        MediaKind::Spreadsheet => parse_spreadsheet(bytes),
        MediaKind::Text => Ok(ParsedContent {
            text: String::from_utf8_lossy(bytes).into_owned(),
            rows: Vec::new(),
        }),
    }
}

/// Pick the field delimiter by counting candidates on the first
/// non-empty line. Comma wins ties.
pub fn detect_delimiter(text: &str) -> u8 {
    let line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let mut best = b',';
    let mut best_count = line.matches(',').count();
    for (byte, ch) in [(b';', ';'), (b'\t', '\t')] {
        let count = line.matches(ch).count();
        if count > best_count {
            best = byte;
            best_count = count;
        }
    }
    best
}

fn parse_delimited(bytes: &[u8]) -> Result<ParsedContent> {
    let text = String::from_utf8_lossy(bytes).into_owned();
    let delimiter = detect_delimiter(&text);
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut header: Option<Vec<String>> = None;
    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        match &header {
            None => {
                header = Some(record.iter().map(|f| f.trim().to_string()).collect());
            }
            Some(names) => {
                let mut row = RowRecord::new();
                for (i, field) in record.iter().enumerate() {
                    let name = names
                        .get(i)
                        .filter(|n| !n.is_empty())
                        .cloned()
                        .unwrap_or_else(|| format!("col{i}"));
                    row.push(name, field.trim());
                }
                if !row.is_empty() {
                    rows.push(row);
                }
            }
        }
    }
    Ok(ParsedContent { text, rows })
}

#[cfg(feature = "pdf")]
fn parse_pdf(bytes: &[u8]) -> Result<ParsedContent> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| ResumenError::Pdf(e.to_string()))?;
    Ok(ParsedContent {
        text,
        rows: Vec::new(),
    })
}

#[cfg(not(feature = "pdf"))]
fn parse_pdf(_bytes: &[u8]) -> Result<ParsedContent> {
    Err(ResumenError::Pdf(
        "built without PDF support (enable the `pdf` feature)".into(),
    ))
}

#[cfg(feature = "xlsx")]
fn parse_spreadsheet(bytes: &[u8]) -> Result<ParsedContent> {
    use calamine::Reader;

    let cursor = std::io::Cursor::new(bytes.to_vec());
    let mut workbook = calamine::open_workbook_auto_from_rs(cursor)
        .map_err(|e| ResumenError::Spreadsheet(e.to_string()))?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ResumenError::Spreadsheet("workbook has no sheets".into()))?;
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| ResumenError::Spreadsheet(e.to_string()))?;

    let grid: Vec<Vec<String>> = range
        .rows()
        .map(|row| row.iter().map(render_cell).collect())
        .collect();

    let mut rows = Vec::new();
    if let Some(header_idx) = locate_header_row(&grid) {
        let names = &grid[header_idx];
        for cells in grid.iter().skip(header_idx + 1) {
            let mut row = RowRecord::new();
            for (i, value) in cells.iter().enumerate() {
                let name = names
                    .get(i)
                    .map(String::as_str)
                    .filter(|n| !n.trim().is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("col{i}"));
                row.push(name, value.trim());
            }
            if !row.is_empty() {
                rows.push(row);
            }
        }
    } else {
        debug!(sheet, "no header row found in the first 20 spreadsheet rows");
    }

    let text = grid
        .iter()
        .map(|cells| cells.join(" "))
        .collect::<Vec<_>>()
        .join("\n");
    Ok(ParsedContent { text, rows })
}

/// The true header row is rarely row 0; statements open with account
/// preamble. Scan the first 20 rows for one carrying at least 2 domain
/// header keywords.
#[cfg(feature = "xlsx")]
fn locate_header_row(grid: &[Vec<String>]) -> Option<usize> {
    grid.iter().take(20).position(|cells| {
        cells
            .iter()
            .filter(|cell| {
                let folded = crate::models::fold(cell);
                crate::profiles::header_keywords().any(|k| folded.contains(k))
            })
            .count()
            >= 2
    })
}

#[cfg(feature = "xlsx")]
fn render_cell(cell: &calamine::Data) -> String {
    use calamine::Data;
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_serial_to_iso(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("{e:?}"),
    }
}

/// Excel epoch is 1899-12-30, accounting for the 1900 leap year bug.
#[cfg(any(feature = "xlsx", test))]
fn excel_serial_to_iso(serial: f64) -> String {
    let base = chrono::NaiveDate::from_ymd_opt(1899, 12, 30).unwrap();
    let date = base + chrono::Duration::days(serial as i64);
    date.format("%Y-%m-%d").to_string()
}

#[cfg(not(feature = "xlsx"))]
fn parse_spreadsheet(_bytes: &[u8]) -> Result<ParsedContent> {
    Err(ResumenError::Spreadsheet(
        "built without spreadsheet support (enable the `xlsx` feature)".into(),
    ))
}
