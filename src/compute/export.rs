//! Delimited-text and JSON export of sweep output.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use super::complexity::ComplexityMetrics;
use super::sweep::{RecordOutput, SweepRecord, SweepResult};

/// Leading columns of every exported row.
pub const PARAMETER_COLUMNS: [&str; 8] = [
    "sim_id", "rho1", "rho2", "rho3", "rho4", "judge", "reason", "iter",
];

/// Column names of an exported table.
pub fn table_header(result: &SweepResult) -> Vec<&'static str> {
    let mut header = PARAMETER_COLUMNS.to_vec();
    header.extend_from_slice(ComplexityMetrics::names(result.metric_set));
    header.push("final_reason");
    header
}

/// Write a sweep as delimited text: a header line and one line per metrics
/// row. Tail-mean records produce a single line with an empty `iter` field.
/// Missing values (judge, reason, final reason) are written as empty fields.
pub fn write_table<W: Write>(
    writer: &mut W,
    result: &SweepResult,
    delimiter: char,
) -> io::Result<()> {
    let sep = delimiter.to_string();
    writeln!(writer, "{}", table_header(result).join(&sep))?;

    for record in &result.records {
        match &record.output {
            RecordOutput::Rows(rows) => {
                for (i, row) in rows.iter().enumerate() {
                    write_row(writer, record, Some(i + 1), row, &sep)?;
                }
            }
            RecordOutput::TailMean(values) => write_row(writer, record, None, values, &sep)?,
        }
    }
    writer.flush()
}

fn write_row<W: Write>(
    writer: &mut W,
    record: &SweepRecord,
    iter: Option<usize>,
    values: &[f64],
    sep: &str,
) -> io::Result<()> {
    let point = &record.point;
    let mut fields = vec![
        record.sim_id.to_string(),
        point.rates.invention.to_string(),
        point.rates.combination.to_string(),
        point.rates.modification.to_string(),
        point.rates.loss().to_string(),
        optional(point.judge),
        optional(point.reason),
        iter.map(|i| i.to_string()).unwrap_or_default(),
    ];
    fields.extend(values.iter().map(f64::to_string));
    fields.push(optional(record.final_reason));
    writeln!(writer, "{}", fields.join(sep))
}

fn optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Save a sweep as a table. `.csv` files are comma separated, anything else
/// is tab separated.
pub fn save_table<P: AsRef<Path>>(path: P, result: &SweepResult) -> io::Result<()> {
    let path = path.as_ref();
    let delimiter = if path.extension().is_some_and(|e| e == "csv") {
        ','
    } else {
        '\t'
    };
    let mut writer = BufWriter::new(File::create(path)?);
    write_table(&mut writer, result, delimiter)
}

/// Save a sweep as pretty-printed JSON.
pub fn save_json<P: AsRef<Path>>(path: P, result: &SweepResult) -> io::Result<()> {
    let json = serde_json::to_string_pretty(result)?;
    fs::write(path, json)
}

/// Load a sweep saved with [`save_json`].
pub fn load_json<P: AsRef<Path>>(path: P) -> io::Result<SweepResult> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
