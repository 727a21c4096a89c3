//! Log output format selection.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How the telemetry subscriber renders events.
///
/// Accepted spellings are case-insensitive in files, environment variables
/// and flags alike.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event, fields flattened.
    #[default]
    Json,
    /// One terse human-readable line per event.
    Compact,
    /// Multi-line human-readable output for local debugging.
    Pretty,
}

impl LogFormat {
    /// Whether the format is meant for machines rather than people.
    #[must_use]
    pub const fn is_structured(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Error returned when text names no [`LogFormat`].
pub type LogFormatParseError = strum::ParseError;
