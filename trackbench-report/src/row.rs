//! Result Row

use crate::writer::ResultWriteError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use trackbench_core::{IDENTITY_FIELDS, Identity, TimingRecord};

/// Column names of a row with timestamps, in file order
pub const ROW_FIELDS: [&str; 11] = [
    "harness_version",
    IDENTITY_FIELDS[0],
    IDENTITY_FIELDS[1],
    IDENTITY_FIELDS[2],
    IDENTITY_FIELDS[3],
    IDENTITY_FIELDS[4],
    IDENTITY_FIELDS[5],
    IDENTITY_FIELDS[6],
    "duration",
    "started_at",
    "ended_at",
];

const BASE_LEN: usize = 9;

/// One persisted measurement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    /// Harness revision that produced the row
    pub harness_version: String,
    /// Identity fields of the ExpandedRun
    pub identity: Identity,
    /// Duration of the timed region in seconds
    pub duration_secs: f64,
    /// Start of the timed region, when timestamps are enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// End of the timed region, when timestamps are enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl ResultRow {
    /// Build a row from one timing record
    pub fn new(
        harness_version: &str,
        identity: &Identity,
        record: &TimingRecord,
        timestamps: bool,
    ) -> Self {
        Self {
            harness_version: harness_version.to_string(),
            identity: identity.clone(),
            duration_secs: record.duration_secs(),
            started_at: timestamps.then_some(record.started_at),
            ended_at: timestamps.then_some(record.ended_at),
        }
    }

    /// Field values in file order
    pub fn fields(&self) -> Vec<String> {
        let mut fields = Vec::with_capacity(ROW_FIELDS.len());
        fields.push(self.harness_version.clone());
        fields.extend(self.identity.values().iter().map(|v| v.to_string()));
        fields.push(self.duration_secs.to_string());
        if let (Some(start), Some(end)) = (self.started_at, self.ended_at) {
            fields.push(start.to_rfc3339_opts(SecondsFormat::Micros, true));
            fields.push(end.to_rfc3339_opts(SecondsFormat::Micros, true));
        }
        fields
    }

    /// Parse one CSV record; `line` is only used for error messages
    pub fn from_record(record: &csv::StringRecord, line: u64) -> Result<Self, ResultWriteError> {
        let malformed = |message: String| ResultWriteError::Malformed { line, message };

        if record.len() != BASE_LEN && record.len() != ROW_FIELDS.len() {
            return Err(malformed(format!(
                "expected {} or {} fields, found {}",
                BASE_LEN,
                ROW_FIELDS.len(),
                record.len()
            )));
        }

        let field = |i: usize| record.get(i).unwrap_or_default().to_string();
        let identity = Identity {
            test_name: field(1),
            test_profile: field(2),
            test_variant: field(3),
            client_version: field(4),
            client_type: field(5),
            server_version: field(6),
            server_type: field(7),
        };
        let duration_secs = field(8)
            .parse::<f64>()
            .map_err(|e| malformed(format!("duration: {}", e)))?;

        let timestamp = |i: usize| -> Result<Option<DateTime<Utc>>, ResultWriteError> {
            match record.get(i) {
                Some(raw) => DateTime::parse_from_rfc3339(raw)
                    .map(|t| Some(t.with_timezone(&Utc)))
                    .map_err(|e| malformed(format!("{}: {}", ROW_FIELDS[i], e))),
                None => Ok(None),
            }
        };

        Ok(Self {
            harness_version: field(0),
            identity,
            duration_secs,
            started_at: timestamp(9)?,
            ended_at: timestamp(10)?,
        })
    }
}
