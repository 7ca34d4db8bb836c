// Retention policy applied by the generated cleanup script

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

/// Which rule decides what the cleanup removes
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RetentionKind {
    /// Keep the newest N snapshots of each kind
    #[default]
    Count,
    /// Delete snapshots older than N days
    Age,
}

impl RetentionKind {
    pub fn as_str(&self) -> &str {
        match self {
            RetentionKind::Count => "count",
            RetentionKind::Age => "age",
        }
    }
}

impl FromStr for RetentionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "count" => Ok(RetentionKind::Count),
            "age" => Ok(RetentionKind::Age),
            other => Err(format!(
                "Unknown retention kind '{}'. Expected count or age",
                other
            )),
        }
    }
}

/// Retention policy for scheduled snapshots
///
/// `value` is a snapshot count or an age in days depending on `kind`.
/// It is never zero: deserializing a document with `value = 0` fails.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub kind: RetentionKind,
    pub value: NonZeroU32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            kind: RetentionKind::Count,
            value: NonZeroU32::new(7).unwrap_or(NonZeroU32::MIN),
        }
    }
}

impl RetentionPolicy {
    /// Build a policy, rejecting a zero value
    pub fn new(kind: RetentionKind, value: u32) -> Result<Self, String> {
        let value = NonZeroU32::new(value)
            .ok_or_else(|| format!("Retention {} must be at least 1", kind.as_str()))?;
        Ok(Self { kind, value })
    }

    pub fn count(keep: u32) -> Result<Self, String> {
        Self::new(RetentionKind::Count, keep)
    }

    pub fn age(days: u32) -> Result<Self, String> {
        Self::new(RetentionKind::Age, days)
    }

    pub fn value(&self) -> u32 {
        self.value.get()
    }
}

impl fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RetentionKind::Count => write!(f, "keep newest {}", self.value),
            RetentionKind::Age => write!(f, "delete older than {} days", self.value),
        }
    }
}
