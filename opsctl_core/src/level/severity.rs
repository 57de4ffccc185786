//! Severity thresholds and the inherited-level sentinel.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use tracing_subscriber::filter::LevelFilter;

/// An ordered logging threshold: `Trace < Debug < Info < Warn < Error < Off`.
///
/// `Off` only ever appears as a configured baseline. It is never accepted as an
/// override target (see [`Severity::parse_override`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Off,
}

/// Levels an operator may temporarily switch a logger to.
pub const OVERRIDE_LEVELS: [Severity; 5] = [
    Severity::Trace,
    Severity::Debug,
    Severity::Info,
    Severity::Warn,
    Severity::Error,
];

/// Returned when a level token is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown level '{0}', expected one of TRACE, DEBUG, INFO, WARN, ERROR")]
pub struct ParseSeverityError(pub String);

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Off => "OFF",
        }
    }

    /// Parse a token that is valid as an override target. `OFF` is rejected.
    pub fn parse_override(token: &str) -> Result<Self, ParseSeverityError> {
        match token.parse::<Severity>()? {
            Severity::Off => Err(ParseSeverityError(token.to_string())),
            level => Ok(level),
        }
    }
}

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Ok(Severity::Trace),
            "DEBUG" => Ok(Severity::Debug),
            "INFO" => Ok(Severity::Info),
            "WARN" | "WARNING" => Ok(Severity::Warn),
            "ERROR" => Ok(Severity::Error),
            "OFF" => Ok(Severity::Off),
            _ => Err(ParseSeverityError(s.to_string())),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Severity> for LevelFilter {
    fn from(level: Severity) -> Self {
        match level {
            Severity::Trace => LevelFilter::TRACE,
            Severity::Debug => LevelFilter::DEBUG,
            Severity::Info => LevelFilter::INFO,
            Severity::Warn => LevelFilter::WARN,
            Severity::Error => LevelFilter::ERROR,
            Severity::Off => LevelFilter::OFF,
        }
    }
}

impl From<LevelFilter> for Severity {
    fn from(filter: LevelFilter) -> Self {
        if filter == LevelFilter::TRACE {
            Severity::Trace
        } else if filter == LevelFilter::DEBUG {
            Severity::Debug
        } else if filter == LevelFilter::INFO {
            Severity::Info
        } else if filter == LevelFilter::WARN {
            Severity::Warn
        } else if filter == LevelFilter::ERROR {
            Severity::Error
        } else {
            Severity::Off
        }
    }
}

/// A logger's configured threshold: either its own, or whatever its parent
/// resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LevelSetting {
    Inherited,
    Explicit(Severity),
}

impl LevelSetting {
    pub fn explicit(&self) -> Option<Severity> {
        match self {
            LevelSetting::Inherited => None,
            LevelSetting::Explicit(level) => Some(*level),
        }
    }
}

impl fmt::Display for LevelSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelSetting::Inherited => f.write_str("INHERITED"),
            LevelSetting::Explicit(level) => fmt::Display::fmt(level, f),
        }
    }
}

impl FromStr for LevelSetting {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inherit" | "inherited" => Ok(LevelSetting::Inherited),
            _ => s.parse().map(LevelSetting::Explicit),
        }
    }
}

// Serialized as a plain string so JSON responses read `"originalLevel": "INHERITED"`.
impl Serialize for LevelSetting {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LevelSetting {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
