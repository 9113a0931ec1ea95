//! Response table ingestor
//!
//! Parses the whitespace-separated results table written by the execution
//! engine: a header line of column names followed by one row per run.

use std::collections::BTreeMap;

use crate::error::{ensure_len, UqError};
use crate::plan::ExecutionPlan;

/// Column the engine writes the 1-based run identifier into.
pub const EVAL_ID_COLUMN: &str = "eval_id";

/// Bookkeeping column dropped by default.
pub const INTERFACE_COLUMN: &str = "interface";

/// Columns of a parsed results table, each aligned by row.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseTable {
    columns: BTreeMap<String, Vec<f64>>,
    order: Vec<String>,
    header_line: usize,
    /// Source line of each row, blank lines included in the count.
    row_lines: Vec<usize>,
}

impl ResponseTable {
    pub fn row_count(&self) -> usize {
        self.row_lines.len()
    }

    /// 1-based line of the source text that held row `row`.
    pub fn source_line(&self, row: usize) -> Option<usize> {
        self.row_lines.get(row).copied()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Values of column `name`. A missing column is reported as a header
    /// problem of the table.
    pub fn column(&self, name: &str) -> Result<&[f64], UqError> {
        self.columns
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| UqError::malformed(self.header_line, format!("no column named '{name}'")))
    }

    /// Checks that the table holds exactly the runs of `plan`, in order.
    pub fn check_plan(&self, plan: &ExecutionPlan) -> Result<(), UqError> {
        ensure_len("results table row", plan.len(), self.row_count())?;

        if let Some(ids) = self.columns.get(EVAL_ID_COLUMN) {
            for (row, (&id, expected)) in ids.iter().zip(plan.run_ids()).enumerate() {
                if id != expected as f64 {
                    return Err(UqError::malformed(
                        self.row_lines[row],
                        format!("{EVAL_ID_COLUMN} {id} does not match planned run {expected}"),
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Parser for the results table format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableIngestor {
    ignored: Vec<String>,
}

impl Default for TableIngestor {
    fn default() -> Self {
        Self {
            ignored: vec![INTERFACE_COLUMN.to_string()],
        }
    }
}

impl TableIngestor {
    /// An ingestor that drops the named bookkeeping columns.
    pub fn with_ignored<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignored: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn ignored(&self) -> &[String] {
        &self.ignored
    }

    pub fn ingest(&self, raw: &str) -> Result<ResponseTable, UqError> {
        let mut lines = raw
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty());

        let (header_line, header) = lines
            .next()
            .ok_or_else(|| UqError::malformed(1, "table has no header line"))?;

        let names: Vec<String> = header
            .split_whitespace()
            .map(|name| name.strip_prefix('%').unwrap_or(name).to_string())
            .collect();

        let mut keep = Vec::with_capacity(names.len());
        let mut columns = BTreeMap::new();
        let mut order = Vec::new();
        for name in &names {
            if name.is_empty() {
                return Err(UqError::malformed(header_line, "empty column name"));
            }
            let retained = !self.ignored.iter().any(|ignored| ignored == name);
            keep.push(retained);
            if retained {
                if columns.insert(name.clone(), Vec::new()).is_some() {
                    return Err(UqError::malformed(
                        header_line,
                        format!("duplicate column '{name}'"),
                    ));
                }
                order.push(name.clone());
            }
        }

        let mut row_lines = Vec::new();
        for (line_no, line) in lines {
            let cells: Vec<&str> = line.split_whitespace().collect();
            if cells.len() != names.len() {
                return Err(UqError::malformed(
                    line_no,
                    format!(
                        "row has {} fields but the header names {}",
                        cells.len(),
                        names.len()
                    ),
                ));
            }

            for ((name, cell), &retained) in names.iter().zip(cells).zip(&keep) {
                if !retained {
                    continue;
                }
                let value = parse_cell(cell)
                    .ok_or_else(|| UqError::malformed(line_no, format!("bad value '{cell}' in '{name}'")))?;
                if let Some(column) = columns.get_mut(name) {
                    column.push(value);
                }
            }
            row_lines.push(line_no);
        }

        Ok(ResponseTable {
            columns,
            order,
            header_line,
            row_lines,
        })
    }
}

fn parse_cell(cell: &str) -> Option<f64> {
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parses `raw` with the default bookkeeping columns dropped.
pub fn ingest(raw: &str) -> Result<ResponseTable, UqError> {
    TableIngestor::default().ingest(raw)
}

/// Writes a results table in the engine's format: `%eval_id interface`,
/// the plan's input columns, then one column per response.
pub fn render(
    plan: &ExecutionPlan,
    interface: &str,
    responses: &[(String, Vec<f64>)],
) -> Result<String, UqError> {
    for (_, values) in responses {
        ensure_len("response column", plan.len(), values.len())?;
    }
    if interface.is_empty() || interface.contains(char::is_whitespace) {
        return Err(UqError::config(format!(
            "interface label '{interface}' must be a single token"
        )));
    }

    let mut header = vec![format!("%{EVAL_ID_COLUMN}"), INTERFACE_COLUMN.to_string()];
    header.extend(plan.names().iter().cloned());
    header.extend(responses.iter().map(|(name, _)| name.clone()));

    let mut out = header.join(" ");
    out.push('\n');

    for (row, run) in plan.runs().iter().enumerate() {
        let mut cells = vec![run.run_id.to_string(), interface.to_string()];
        cells.extend(run.values.iter().map(|value| format!("{value:e}")));
        cells.extend(responses.iter().map(|(_, values)| format!("{:e}", values[row])));
        out.push_str(&cells.join(" "));
        out.push('\n');
    }

    Ok(out)
}
