//! Comma-separated values → Markdown table.
//!
//! The first record is the header. Columns are typed the way a dataframe
//! reader would type them (`int64`, `float64`, `bool`, `object`), and a
//! summary-statistics table follows whenever at least one column is numeric.

use super::encoding::{decode_first, labels, TABULAR_ENCODINGS};
use super::{with_metadata, ConversionInput, ConvertOptions, Converter, FileType};
use crate::error::{Doc2MdError, FormatError};
use crate::metadata::MetadataBlock;
use std::collections::HashMap;
use tracing::debug;

/// Literals read as missing values.
const NA_VALUES: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

const STAT_LABELS: [&str; 8] = ["count", "mean", "std", "min", "25%", "50%", "75%", "max"];

/// Tabular converter with configurable row and cell limits.
#[derive(Debug, Clone, Copy)]
pub struct CsvConverter {
    max_rows: usize,
    max_cell_chars: usize,
}

impl CsvConverter {
    pub fn new(max_rows: usize, max_cell_chars: usize) -> Self {
        Self {
            max_rows: max_rows.max(1),
            max_cell_chars: max_cell_chars.max(4),
        }
    }
}

impl Default for CsvConverter {
    fn default() -> Self {
        Self::new(1000, 100)
    }
}

impl Converter for CsvConverter {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn file_type(&self) -> FileType {
        FileType::Csv
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["csv"]
    }

    fn convert(
        &self,
        input: &ConversionInput,
        opts: &ConvertOptions<'_>,
    ) -> Result<String, Doc2MdError> {
        let filename = input.filename.as_str();
        let (enc, text) = decode_first(&input.bytes, TABULAR_ENCODINGS).ok_or_else(|| {
            Doc2MdError::format(
                filename,
                "decode",
                FormatError::Undecodable {
                    tried: labels(TABULAR_ENCODINGS),
                },
            )
        })?;
        debug!("{}: decoded as {}", filename, enc.label());

        let table = ParsedTable::parse(&text).map_err(|e| Doc2MdError::format(filename, "parse", e))?;

        let metadata = opts
            .include_metadata
            .then(|| table.metadata(filename).render());

        let mut lines = self.render_table(&table);
        if table.has_numeric() {
            lines.push(String::new());
            lines.push("## Summary Statistics".to_string());
            lines.push(String::new());
            lines.extend(table.summary_lines());
        }

        Ok(with_metadata(metadata, lines.join("\n")))
    }
}

impl CsvConverter {
    fn render_table(&self, table: &ParsedTable) -> Vec<String> {
        if table.columns.is_empty() {
            return vec!["*No data available*".to_string()];
        }

        let mut lines = Vec::with_capacity(table.row_count().min(self.max_rows) + 4);
        let headers: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.format_cell(&c.name))
            .collect();
        lines.push(table_row(&headers));
        lines.push(table_row(&vec!["---".to_string(); headers.len()]));

        for row in 0..table.row_count().min(self.max_rows) {
            let cells: Vec<String> = table
                .columns
                .iter()
                .map(|c| self.format_cell(&c.display(row)))
                .collect();
            lines.push(table_row(&cells));
        }

        if table.row_count() > self.max_rows {
            lines.push(String::new());
            lines.push(format!(
                "*Note: Showing first {} rows out of {} total rows.*",
                self.max_rows,
                table.row_count()
            ));
        }
        lines
    }

    /// Escape pipes, then truncate long values with a trailing `...`.
    fn format_cell(&self, value: &str) -> String {
        let escaped = value.replace('|', "\\|");
        if escaped.chars().count() > self.max_cell_chars {
            let kept: String = escaped.chars().take(self.max_cell_chars - 3).collect();
            format!("{kept}...")
        } else {
            escaped
        }
    }
}

fn table_row(cells: &[String]) -> String {
    format!("| {} |", cells.join(" | "))
}

// ── Parsed table ─────────────────────────────────────────────────────────

/// Column classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int64,
    Float64,
    Bool,
    Object,
}

impl ColumnType {
    pub fn label(self) -> &'static str {
        match self {
            ColumnType::Int64 => "int64",
            ColumnType::Float64 => "float64",
            ColumnType::Bool => "bool",
            ColumnType::Object => "object",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Int64 | ColumnType::Float64)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Missing,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

/// One typed column.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    cells: Vec<Cell>,
}

impl Column {
    fn from_raw(name: String, raw: Vec<String>) -> Self {
        let present: Vec<&str> = raw
            .iter()
            .map(String::as_str)
            .filter(|v| !is_na(v))
            .collect();
        let has_missing = present.len() < raw.len();

        let column_type = if raw.is_empty() {
            ColumnType::Object
        } else if present.is_empty() {
            ColumnType::Float64
        } else if present.iter().all(|v| parse_int(v).is_some()) {
            if has_missing {
                ColumnType::Float64
            } else {
                ColumnType::Int64
            }
        } else if present.iter().all(|v| parse_float(v).is_some()) {
            ColumnType::Float64
        } else if !has_missing && present.iter().all(|v| parse_bool(v).is_some()) {
            ColumnType::Bool
        } else {
            ColumnType::Object
        };

        let cells = raw
            .into_iter()
            .map(|v| {
                if column_type != ColumnType::Object && is_na(&v) {
                    return Cell::Missing;
                }
                match column_type {
                    ColumnType::Int64 => parse_int(&v).map_or(Cell::Missing, Cell::Int),
                    ColumnType::Float64 => parse_float(&v).map_or(Cell::Missing, Cell::Float),
                    ColumnType::Bool => parse_bool(&v).map_or(Cell::Missing, Cell::Bool),
                    ColumnType::Object if is_na(&v) => Cell::Missing,
                    ColumnType::Object => Cell::Text(v),
                }
            })
            .collect();

        Self {
            name,
            column_type,
            cells,
        }
    }

    fn display(&self, row: usize) -> String {
        match self.cells.get(row) {
            None | Some(Cell::Missing) => String::new(),
            Some(Cell::Int(i)) => i.to_string(),
            Some(Cell::Float(f)) => py_float_repr(*f),
            Some(Cell::Bool(true)) => "True".to_string(),
            Some(Cell::Bool(false)) => "False".to_string(),
            Some(Cell::Text(s)) => s.clone(),
        }
    }

    fn numeric_values(&self) -> Vec<f64> {
        self.cells
            .iter()
            .filter_map(|c| match c {
                Cell::Int(i) => Some(*i as f64),
                Cell::Float(f) if !f.is_nan() => Some(*f),
                _ => None,
            })
            .collect()
    }
}

/// Header plus typed columns.
#[derive(Debug, Clone)]
pub struct ParsedTable {
    pub columns: Vec<Column>,
    rows: usize,
}

impl ParsedTable {
    /// Parse decoded CSV text. Zero records is an error; a header alone is not.
    pub fn parse(text: &str) -> Result<Self, FormatError> {
        let mut records = split_records(text).into_iter();
        let header = records.next().ok_or(FormatError::NoRows)?;
        let names = normalise_headers(header);
        let width = names.len();

        let mut raw_columns: Vec<Vec<String>> = vec![Vec::new(); width];
        let mut rows = 0usize;
        for (i, mut record) in records.enumerate() {
            if record.len() > width {
                return Err(FormatError::RaggedRow {
                    row: i + 2,
                    expected: width,
                    found: record.len(),
                });
            }
            record.resize(width, String::new());
            for (col, value) in raw_columns.iter_mut().zip(record) {
                col.push(value);
            }
            rows += 1;
        }

        let columns = names
            .into_iter()
            .zip(raw_columns)
            .map(|(name, raw)| Column::from_raw(name, raw))
            .collect();
        Ok(Self { columns, rows })
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn has_numeric(&self) -> bool {
        self.rows > 0 && self.columns.iter().any(|c| c.column_type.is_numeric())
    }

    fn metadata(&self, filename: &str) -> MetadataBlock {
        MetadataBlock::new()
            .text("title", filename)
            .text("source_format", FileType::Csv.source_tag())
            .number("rows", self.rows as i64)
            .number("columns", self.columns.len() as i64)
            .list(
                "column_types",
                self.columns
                    .iter()
                    .map(|c| format!("{}: {}", c.name, c.column_type.label()))
                    .collect(),
            )
    }

    fn summary_lines(&self) -> Vec<String> {
        let numeric: Vec<&Column> = self
            .columns
            .iter()
            .filter(|c| c.column_type.is_numeric())
            .collect();
        if numeric.is_empty() {
            return Vec::new();
        }

        let stats: Vec<[f64; 8]> = numeric.iter().map(|c| describe(&c.numeric_values())).collect();

        let mut headers = vec!["Statistic".to_string()];
        headers.extend(numeric.iter().map(|c| c.name.replace('|', "\\|")));
        let mut lines = vec![
            table_row(&headers),
            table_row(&vec!["---".to_string(); headers.len()]),
        ];
        for (i, label) in STAT_LABELS.iter().enumerate() {
            let mut row = vec![label.to_string()];
            row.extend(stats.iter().map(|s| format_stat(s[i])));
            lines.push(table_row(&row));
        }
        lines
    }
}

/// count, mean, sample std, min, 25%, 50%, 75%, max.
fn describe(values: &[f64]) -> [f64; 8] {
    let n = values.len();
    if n == 0 {
        return [0.0, f64::NAN, f64::NAN, f64::NAN, f64::NAN, f64::NAN, f64::NAN, f64::NAN];
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mean = sorted.iter().sum::<f64>() / n as f64;
    let std = if n > 1 {
        let ss: f64 = sorted.iter().map(|v| (v - mean).powi(2)).sum();
        (ss / (n - 1) as f64).sqrt()
    } else {
        f64::NAN
    };

    [
        n as f64,
        mean,
        std,
        sorted[0],
        quantile(&sorted, 0.25),
        quantile(&sorted, 0.5),
        quantile(&sorted, 0.75),
        sorted[n - 1],
    ]
}

/// Linear interpolation between closest ranks.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

fn format_stat(v: f64) -> String {
    if v.is_nan() {
        "N/A".to_string()
    } else {
        format!("{v:.2}")
    }
}

// ── Record splitting ─────────────────────────────────────────────────────

/// Split text into records of fields, honouring double-quote quoting.
///
/// Quoted fields may contain commas, newlines and `""` escapes. Empty lines
/// outside quotes are skipped.
fn split_records(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut field_quoted = false;
    let mut line_has_content = false;
    let mut chars = text.chars().peekable();

    let mut end_record = |record: &mut Vec<String>, field: &mut String, has_content: bool| {
        if has_content {
            record.push(std::mem::take(field));
            records.push(std::mem::take(record));
        } else {
            record.clear();
            field.clear();
        }
    };

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
            continue;
        }

        match c {
            '"' if field.is_empty() && !field_quoted => {
                in_quotes = true;
                field_quoted = true;
                line_has_content = true;
            }
            ',' => {
                record.push(std::mem::take(&mut field));
                field_quoted = false;
                line_has_content = true;
            }
            '\r' | '\n' => {
                if c == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                end_record(&mut record, &mut field, line_has_content);
                field_quoted = false;
                line_has_content = false;
            }
            _ => {
                field.push(c);
                line_has_content = true;
            }
        }
    }
    end_record(&mut record, &mut field, line_has_content);
    records
}

/// Blank names become `Unnamed: <i>`; repeats get a `.<n>` suffix.
fn normalise_headers(raw: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut names = Vec::with_capacity(raw.len());
    for (i, name) in raw.into_iter().enumerate() {
        let base = if name.trim().is_empty() {
            format!("Unnamed: {i}")
        } else {
            name
        };
        let mut candidate = base.clone();
        while let Some(count) = seen.get_mut(&candidate) {
            *count += 1;
            candidate = format!("{base}.{count}");
        }
        seen.insert(candidate.clone(), 0);
        names.push(candidate);
    }
    names
}

fn is_na(v: &str) -> bool {
    NA_VALUES.contains(&v)
}

fn parse_int(v: &str) -> Option<i64> {
    v.trim().parse::<i64>().ok()
}

fn parse_float(v: &str) -> Option<f64> {
    let t = v.trim();
    if t.is_empty() || t.contains('_') {
        return None;
    }
    t.parse::<f64>().ok()
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim() {
        "True" | "TRUE" | "true" => Some(true),
        "False" | "FALSE" | "false" => Some(false),
        _ => None,
    }
}

/// Shortest round-trip float text, fixed notation for exponents in
/// `-4..16` (always with a fractional part), scientific otherwise.
fn py_float_repr(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let sci = format!("{v:e}");
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    if (-4..16).contains(&exp) {
        let fixed = format!("{v}");
        if fixed.contains('.') {
            fixed
        } else {
            format!("{fixed}.0")
        }
    } else {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exp.abs())
    }
}
