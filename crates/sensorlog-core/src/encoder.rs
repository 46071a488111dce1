//! Record encoder
//!
//! Pure mapping from a sample to a fixed-arity row. No I/O happens here;
//! the device stream decides where the rows go.

use crate::sample::Sample;
use chrono::{DateTime, SecondsFormat, Utc};

/// Header column holding the server receipt time
pub const SERVER_TIME_COLUMN: &str = "server_time_utc";

/// Header column holding the device ID
pub const DEVICE_ID_COLUMN: &str = "device_id";

/// One encoded row: `[server_time_utc, device_id, schema values...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row(Vec<String>);

impl Row {
    /// Header row for a device schema
    pub fn header(schema: &[String]) -> Self {
        let mut cells = Vec::with_capacity(schema.len() + 2);
        cells.push(SERVER_TIME_COLUMN.to_string());
        cells.push(DEVICE_ID_COLUMN.to_string());
        cells.extend(schema.iter().cloned());
        Row(cells)
    }

    pub fn cells(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Row> for Vec<String> {
    fn from(row: Row) -> Self {
        row.0
    }
}

/// Render a receipt instant with microsecond resolution (`2026-10-19T10:15:30.123456Z`)
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Encode one sample against a schema
///
/// Fields missing from the sample render as empty cells. Fields outside the
/// schema are ignored here; the caller is responsible for rejecting them.
pub fn encode_row(
    received_at: &DateTime<Utc>,
    device_id: &str,
    schema: &[String],
    sample: &Sample,
) -> Row {
    let mut cells = Vec::with_capacity(schema.len() + 2);
    cells.push(format_timestamp(received_at));
    cells.push(device_id.to_string());
    cells.extend(
        schema
            .iter()
            .map(|column| sample.get(column).map(|v| v.render()).unwrap_or_default()),
    );
    Row(cells)
}
