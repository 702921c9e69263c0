use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{CommandConfig, DateIndexConfig};
use crate::digitizer::command::run_command;
use crate::error::Error;
use crate::models::DATE_FORMAT;

/// Dates already present in the record store, keyed `YYYY-MM-DD`, mapped to
/// the record id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExistingDateIndex {
    entries: HashMap<String, String>,
}

#[derive(Deserialize)]
struct SummaryFile {
    #[serde(default)]
    pages: Vec<SummaryPage>,
}

#[derive(Deserialize)]
struct SummaryPage {
    date: Option<String>,
    id: Option<String>,
}

impl ExistingDateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Parse a summary document: `{"pages": [{"date": ..., "id": ...}]}`.
    /// Entries missing either field are ignored.
    pub fn from_summary_json(json: &str) -> Result<Self, Error> {
        let summary: SummaryFile = serde_json::from_str(json)?;
        Ok(Self::from_entries(
            summary
                .pages
                .into_iter()
                .filter_map(|page| match (page.date, page.id) {
                    (Some(date), Some(id)) if !date.is_empty() && !id.is_empty() => {
                        Some((date, id))
                    }
                    _ => None,
                }),
        ))
    }

    pub fn insert(&mut self, date: NaiveDate, id: impl Into<String>) {
        self.entries
            .insert(date.format(DATE_FORMAT).to_string(), id.into());
    }

    pub fn get(&self, date: NaiveDate) -> Option<&str> {
        self.entries
            .get(&date.format(DATE_FORMAT).to_string())
            .map(String::as_str)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.get(date).is_some()
    }

    /// Keys that parse as dates, ascending. Malformed keys are skipped.
    pub fn dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self
            .entries
            .keys()
            .filter_map(|key| NaiveDate::parse_from_str(key, DATE_FORMAT).ok())
            .collect();
        dates.sort();
        dates
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Somewhere a fresh `ExistingDateIndex` can be loaded from.
pub trait DateIndexSource: Send + Sync {
    fn load(&self) -> Result<ExistingDateIndex, Error>;
}

/// Reads the summary file written by the record-store query tool, optionally
/// running that tool first.
#[derive(Debug, Clone)]
pub struct SummaryFileSource {
    summary_file: PathBuf,
    refresh_command: Option<CommandConfig>,
    timeout: Duration,
}

impl SummaryFileSource {
    pub fn new(summary_file: impl Into<PathBuf>) -> Self {
        Self {
            summary_file: summary_file.into(),
            refresh_command: None,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn from_config(config: &DateIndexConfig) -> Self {
        Self {
            summary_file: config.summary_file.clone(),
            refresh_command: config.refresh_command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn with_refresh_command(mut self, command: CommandConfig, timeout: Duration) -> Self {
        self.refresh_command = Some(command);
        self.timeout = timeout;
        self
    }
}

impl DateIndexSource for SummaryFileSource {
    fn load(&self) -> Result<ExistingDateIndex, Error> {
        if let Some(command) = &self.refresh_command {
            run_command(command, None, None, self.timeout).map_err(|e| {
                Error::DecisionFilter(format!("Date index query failed: {}", e))
            })?;
        }

        if !self.summary_file.exists() {
            warn!(
                "Date summary file not found: {}",
                self.summary_file.display()
            );
            return Ok(ExistingDateIndex::new());
        }

        let index = ExistingDateIndex::from_summary_json(&fs::read_to_string(&self.summary_file)?)?;
        info!("Loaded {} existing dates", index.len());
        Ok(index)
    }
}

/// Shared, wholesale-replaceable view of the index. Readers get a snapshot
/// that stays valid while a refresh swaps in a new one.
#[derive(Debug, Default)]
pub struct DateIndexHandle {
    current: RwLock<Arc<ExistingDateIndex>>,
}

impl DateIndexHandle {
    pub fn new(index: ExistingDateIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
        }
    }

    pub fn snapshot(&self) -> Arc<ExistingDateIndex> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, index: ExistingDateIndex) {
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(index);
    }
}
