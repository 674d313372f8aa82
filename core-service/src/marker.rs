//! Marker commands as they arrive from clients.

use crate::error::{CoreError, Result};
use std::str::FromStr;

/// A marker update: either a new position or a request to drop them all
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarkerCommand {
    Add(f64),
    Clear,
}

impl MarkerCommand {
    /// Parse `"clear"` or a decimal position.
    ///
    /// ```
    /// use core_service::MarkerCommand;
    ///
    /// assert_eq!(MarkerCommand::parse("clear").unwrap(), MarkerCommand::Clear);
    /// assert_eq!(MarkerCommand::parse(" 12.5 ").unwrap(), MarkerCommand::Add(12.5));
    /// assert!(MarkerCommand::parse("soon").is_err());
    /// ```
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(invalid("marker value is required"));
        }
        if raw == "clear" {
            return Ok(MarkerCommand::Clear);
        }

        let position = raw
            .parse::<f64>()
            .map_err(|_| invalid(format!("'{}' is not a number", raw)))?;
        if !position.is_finite() {
            return Err(invalid(format!("'{}' is not a finite position", raw)));
        }

        Ok(MarkerCommand::Add(position))
    }
}

impl FromStr for MarkerCommand {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn invalid(message: impl Into<String>) -> CoreError {
    CoreError::InvalidInput {
        field: "marker".to_string(),
        message: message.into(),
    }
}
