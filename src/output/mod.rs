//! Where rendered readings go and what they look like.

pub mod render;
pub mod sink;

use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;

use crate::common::constants::STDOUT_TOKEN;

pub use render::render;
pub use sink::{OutputSink, SinkError};

/// Rendering style of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Multi-line block refreshed in place on a terminal.
    #[default]
    Text,
    /// One JSON record per line.
    Json,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Text => "text",
            OutputFormat::Json => "json",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(OutputFormat::Text),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target of the rendered output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Stdout,
    /// Append-only file that may be rotated or removed externally.
    File(PathBuf),
}

impl Destination {
    /// `""` and `"-"` mean standard output, anything else is a file path.
    pub fn parse(value: &str) -> Self {
        if value.is_empty() || value == STDOUT_TOKEN {
            Destination::Stdout
        } else {
            Destination::File(PathBuf::from(value))
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Destination::File(_))
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Stdout => f.write_str("standard output"),
            Destination::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dash_and_empty_mean_stdout() {
        assert_eq!(Destination::parse("-"), Destination::Stdout);
        assert_eq!(Destination::parse(""), Destination::Stdout);
        assert_eq!(
            Destination::parse("/var/log/weather.json"),
            Destination::File(PathBuf::from("/var/log/weather.json"))
        );
    }

    #[test]
    fn test_format_names_round_trip() {
        for format in [OutputFormat::Text, OutputFormat::Json] {
            assert_eq!(OutputFormat::parse(format.as_str()), Some(format));
        }
        assert_eq!(OutputFormat::parse("xml"), None);
    }
}
