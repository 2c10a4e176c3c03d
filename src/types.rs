use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("browser_launch: {0}")]
    BrowserLaunch(String),
    #[error("missing_winners: year file for {0} has no winners field")]
    MissingWinners(u16),
    #[error("invalid_winners: could not parse winners of {year}: {source}")]
    InvalidWinners {
        year: u16,
        source: serde_json::Error,
    },
}

/// Which listing a captured year-page response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingKind {
    Finalists,
    Winners,
}

/// Raw listing bodies observed while loading a year page.
///
/// Both fields hold whole JSON documents as text, exactly as they came off the
/// wire. Absent fields are left out of the written file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalists: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winners: Option<String>,
}

impl YearRecord {
    pub fn set(&mut self, kind: ListingKind, body: String) {
        match kind {
            ListingKind::Finalists => self.finalists = Some(body),
            ListingKind::Winners => self.winners = Some(body),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.finalists.is_some() && self.winners.is_some()
    }
}

/// The site serves node ids either as strings or as bare numbers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Nid {
    Text(String),
    Number(u64),
}

impl fmt::Display for Nid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Nid::Text(s) => write!(f, "{}", s),
            Nid::Number(n) => write!(f, "{}", n),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WinnerEntry {
    pub nid: Nid,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl WinnerEntry {
    pub fn parse_list(year: u16, winners: &str) -> Result<Vec<WinnerEntry>, HarvestError> {
        serde_json::from_str(winners).map_err(|source| HarvestError::InvalidWinners { year, source })
    }

    pub fn title(&self) -> Option<&str> {
        self.rest.get("title").and_then(Value::as_str)
    }
}

#[derive(Debug, Default)]
pub struct YearIndexResult {
    pub written: Vec<PathBuf>,
    // years whose record is missing finalists, winners or both
    pub incomplete: Vec<u16>,
}

#[derive(Debug, Default)]
pub struct WinnerDetailResult {
    pub written: Vec<PathBuf>,
    pub records: usize,
}
