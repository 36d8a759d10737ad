//! Spreadsheet decoding into a plain grid of normalized cell strings.

use std::io::Cursor;

use assembly_util::normalize_cell_text;
use calamine::{Data, Range, Reader, Xlsx, open_workbook_from_rs};
use tracing::debug;

use crate::error::ParseError;

/// Sheet preferred when a workbook holds several.
pub const PRIMARY_SHEET_NAME: &str = "Sheet1";

/// Row-major cell text of one worksheet. Coordinates match the worksheet:
/// leading empty rows and columns are kept as blank cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetRows {
    rows: Vec<Vec<String>>,
}

impl SheetRows {
    /// Build from raw cell text; every cell is normalized.
    pub fn from_rows<R, C>(rows: impl IntoIterator<Item = R>) -> Self
    where
        R: IntoIterator<Item = C>,
        C: AsRef<str>,
    {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(|cell| normalize_cell_text(cell.as_ref())).collect())
            .collect();
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Index and text of the first non-empty cell in `row`.
pub(crate) fn leading_cell(row: &[String]) -> Option<(usize, &str)> {
    row.iter()
        .enumerate()
        .find(|(_, cell)| !cell.is_empty())
        .map(|(index, cell)| (index, cell.as_str()))
}

/// Decode the first relevant worksheet of an xlsx workbook.
pub fn decode_sheet(bytes: &[u8]) -> Result<SheetRows, ParseError> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))
        .map_err(|error| ParseError::structure_not_found(format!("document is not a readable workbook: {error}")))?;

    let sheet_names = workbook.sheet_names();
    let sheet_name = sheet_names
        .iter()
        .find(|name| name.as_str() == PRIMARY_SHEET_NAME)
        .or_else(|| sheet_names.first())
        .cloned()
        .ok_or_else(|| ParseError::structure_not_found("workbook contains no worksheets"))?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|error| ParseError::structure_not_found(format!("worksheet '{sheet_name}' unreadable: {error}")))?;

    let rows = range_to_rows(&range);
    debug!(sheet = %sheet_name, rows = rows.len(), "decoded spec worksheet");
    Ok(rows)
}

fn range_to_rows(range: &Range<Data>) -> SheetRows {
    let (start_row, start_col) = range
        .start()
        .map(|(row, col)| (row as usize, col as usize))
        .unwrap_or((0, 0));

    let mut rows: Vec<Vec<String>> = vec![Vec::new(); start_row];
    for row in range.rows() {
        let mut cells = vec![String::new(); start_col];
        cells.extend(row.iter().map(cell_text));
        rows.push(cells);
    }
    SheetRows { rows }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(text) => normalize_cell_text(text),
        other => normalize_cell_text(&other.to_string()),
    }
}
