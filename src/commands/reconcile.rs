use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use calamine::{Data, Reader, open_workbook_auto};
use rust_xlsxwriter::{Workbook, Worksheet, XlsxError};
use tracing::{info, warn};

use crate::cli::ReconcileArgs;
use crate::identifier::IdentifierMatcher;
use crate::store::{ProgressStore, parse_flag, render_flag};
use crate::util::{ensure_directory, has_extension};

pub const IDENTIFIER_COLUMN: &str = "field_identifier";
pub const CREATED_COLUMN: &str = "PDF/TXT Created?";
pub const UPLOADED_COLUMN: &str = "Transcript Uploaded?";
const DEFAULT_SHEET_NAME: &str = "spreadsheet";

/// First sheet of the project status workbook as text cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// A sheet after the first, carried to the output workbook as read.
#[derive(Debug, Clone, PartialEq)]
pub struct CompanionSheet {
    pub name: String,
    pub origin: (u32, u32),
    pub rows: Vec<Vec<Data>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusWorkbook {
    pub status: StatusSheet,
    pub companions: Vec<CompanionSheet>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub rows: usize,
    pub marked_created: usize,
    pub marked_uploaded: usize,
}

pub fn run(args: ReconcileArgs) -> Result<()> {
    if !args.progress_path.is_file() {
        bail!("progress file not found: {}", args.progress_path.display());
    }
    let output_path = args
        .output_path
        .clone()
        .unwrap_or_else(|| default_output_for(&args.spreadsheet));

    let store = ProgressStore::load(&args.progress_path)?;
    let matcher = IdentifierMatcher::new()?;
    let mut workbook = read_status_workbook(&args.spreadsheet)?;
    info!(
        path = %args.spreadsheet.display(),
        rows = workbook.status.rows.len(),
        companion_sheets = workbook.companions.len(),
        "loaded project spreadsheet"
    );

    let stats = reconcile(&mut workbook.status, &store, &matcher)?;
    write_output(&workbook, &output_path)?;

    info!(
        rows = stats.rows,
        marked_created = stats.marked_created,
        marked_uploaded = stats.marked_uploaded,
        path = %output_path.display(),
        "spreadsheet reconciled"
    );
    Ok(())
}

/// CSV exports reconcile to CSV; workbooks reconcile to `.xlsx`.
pub fn default_output_for(spreadsheet: &Path) -> PathBuf {
    let extension = if has_extension(spreadsheet, "csv") {
        "csv"
    } else {
        "xlsx"
    };
    PathBuf::from("files").join(format!("updated_project_status.{extension}"))
}

pub fn read_status_workbook(path: &Path) -> Result<StatusWorkbook> {
    if has_extension(path, "csv") {
        Ok(StatusWorkbook {
            status: read_csv_sheet(path)?,
            companions: Vec::new(),
        })
    } else {
        read_workbook(path)
    }
}

fn read_csv_sheet(path: &Path) -> Result<StatusSheet> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("failed to read header of {}", path.display()))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for (row_idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| {
            format!("failed to parse row {} of {}", row_idx + 1, path.display())
        })?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(StatusSheet {
        name: DEFAULT_SHEET_NAME.to_string(),
        headers,
        rows,
    })
}

fn read_workbook(path: &Path) -> Result<StatusWorkbook> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("failed to open workbook {}", path.display()))?;

    let sheet_names = workbook.sheet_names().to_vec();
    let Some((first, rest)) = sheet_names.split_first() else {
        bail!("workbook has no sheets: {}", path.display());
    };

    let range = workbook
        .worksheet_range(first)
        .with_context(|| format!("failed to read sheet {first} of {}", path.display()))?;
    let mut rows = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect::<Vec<_>>());
    let Some(headers) = rows.next() else {
        bail!("sheet {first} of {} is empty", path.display());
    };
    let status = StatusSheet {
        name: first.clone(),
        headers,
        rows: rows.collect(),
    };

    let mut companions = Vec::with_capacity(rest.len());
    for name in rest {
        let range = workbook
            .worksheet_range(name)
            .with_context(|| format!("failed to read sheet {name} of {}", path.display()))?;
        companions.push(CompanionSheet {
            name: name.clone(),
            origin: range.start().unwrap_or((0, 0)),
            rows: range.rows().map(<[Data]>::to_vec).collect(),
        });
    }

    Ok(StatusWorkbook { status, companions })
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(value) => value.clone(),
        Data::Float(value) if value.fract() == 0.0 => format!("{value:.0}"),
        Data::Float(value) => value.to_string(),
        Data::Int(value) => value.to_string(),
        Data::Bool(value) => value.to_string(),
        Data::DateTime(value) => value.to_string(),
        Data::DateTimeIso(value) | Data::DurationIso(value) => value.clone(),
        Data::Error(_) => String::new(),
    }
}

/// Marks rows `Yes` when any identifier listed in the row has the matching
/// progress flag set. Existing `Yes` values are kept.
pub fn reconcile(
    sheet: &mut StatusSheet,
    store: &ProgressStore,
    matcher: &IdentifierMatcher,
) -> Result<ReconcileStats> {
    let Some(id_idx) = column_index(&sheet.headers, IDENTIFIER_COLUMN) else {
        bail!("spreadsheet has no {IDENTIFIER_COLUMN} column");
    };
    let created_idx = ensure_column(&mut sheet.headers, CREATED_COLUMN);
    let uploaded_idx = ensure_column(&mut sheet.headers, UPLOADED_COLUMN);
    let width = sheet.headers.len();

    let mut stats = ReconcileStats::default();
    for row in &mut sheet.rows {
        row.resize(width, String::new());
        stats.rows += 1;

        let mut created = parse_flag(Some(&row[created_idx]));
        let mut uploaded = parse_flag(Some(&row[uploaded_idx]));
        let was_created = created;
        let was_uploaded = uploaded;

        for part in row[id_idx].split(',') {
            let cleaned = part.trim().trim_start_matches(':').trim();
            let Ok(base_identifier) = matcher.extract(cleaned) else {
                continue;
            };
            match store.get(base_identifier) {
                Some(record) => {
                    created |= record.pdf_done;
                    uploaded |= record.metadata_done;
                }
                None => {
                    warn!(base_identifier, "identifier not in progress file");
                }
            }
        }

        stats.marked_created += usize::from(created && !was_created);
        stats.marked_uploaded += usize::from(uploaded && !was_uploaded);
        row[created_idx] = render_flag(created).to_string();
        row[uploaded_idx] = render_flag(uploaded).to_string();
    }

    Ok(stats)
}

fn column_index(headers: &[String], name: &str) -> Option<usize> {
    headers.iter().position(|header| header.trim() == name)
}

fn ensure_column(headers: &mut Vec<String>, name: &str) -> usize {
    column_index(headers, name).unwrap_or_else(|| {
        headers.push(name.to_string());
        headers.len() - 1
    })
}

pub fn write_output(workbook: &StatusWorkbook, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_directory(parent)?;
    }
    if has_extension(path, "xlsx") {
        return write_workbook(workbook, path);
    }
    if !workbook.companions.is_empty() {
        warn!(
            path = %path.display(),
            sheets = workbook.companions.len(),
            "CSV output keeps only the status sheet"
        );
    }
    write_sheet(&workbook.status, path)
}

pub fn write_sheet(sheet: &StatusSheet, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    writer
        .write_record(&sheet.headers)
        .with_context(|| format!("failed to write header to {}", path.display()))?;
    for row in &sheet.rows {
        writer
            .write_record(row)
            .with_context(|| format!("failed to write row to {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to flush {}", path.display()))
}

/// Status sheet first, as text; companion sheets follow with their cell
/// types and positions kept.
pub fn write_workbook(workbook: &StatusWorkbook, path: &Path) -> Result<()> {
    let mut output = Workbook::new();

    let status = output.add_worksheet();
    status
        .set_name(workbook.status.name.as_str())
        .with_context(|| format!("invalid sheet name {}", workbook.status.name))?;
    let lines = std::iter::once(&workbook.status.headers).chain(&workbook.status.rows);
    for (row_idx, row) in lines.enumerate() {
        for (col_idx, cell) in row.iter().enumerate() {
            if cell.is_empty() {
                continue;
            }
            let (row_num, col_num) = cell_position((0, 0), row_idx, col_idx)?;
            status
                .write_string(row_num, col_num, cell.as_str())
                .with_context(|| {
                    format!("failed to write row {row_idx} of {}", workbook.status.name)
                })?;
        }
    }

    for companion in &workbook.companions {
        let sheet = output.add_worksheet();
        sheet
            .set_name(companion.name.as_str())
            .with_context(|| format!("invalid sheet name {}", companion.name))?;
        for (row_idx, row) in companion.rows.iter().enumerate() {
            for (col_idx, cell) in row.iter().enumerate() {
                let (row_num, col_num) = cell_position(companion.origin, row_idx, col_idx)?;
                write_cell(sheet, row_num, col_num, cell).with_context(|| {
                    format!("failed to copy row {row_idx} of {}", companion.name)
                })?;
            }
        }
    }

    output
        .save(path)
        .with_context(|| format!("failed to save workbook {}", path.display()))
}

fn cell_position(origin: (u32, u32), row_idx: usize, col_idx: usize) -> Result<(u32, u16)> {
    let row = u32::try_from(row_idx)
        .ok()
        .and_then(|row| origin.0.checked_add(row))
        .context("row index exceeds the xlsx limit")?;
    let col = u32::try_from(col_idx)
        .ok()
        .and_then(|col| origin.1.checked_add(col))
        .and_then(|col| u16::try_from(col).ok())
        .context("column index exceeds the xlsx limit")?;
    Ok((row, col))
}

fn write_cell(sheet: &mut Worksheet, row: u32, col: u16, cell: &Data) -> Result<(), XlsxError> {
    match cell {
        Data::Empty | Data::Error(_) => return Ok(()),
        Data::Float(value) => sheet.write_number(row, col, *value)?,
        Data::Int(value) => sheet.write_number(row, col, *value as f64)?,
        Data::Bool(value) => sheet.write_boolean(row, col, *value)?,
        other => sheet.write_string(row, col, cell_text(other).as_str())?,
    };
    Ok(())
}
