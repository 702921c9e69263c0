use chrono::NaiveDate;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::index::ExistingDateIndex;
use crate::digitizer::Extractor;
use crate::error::Error;
use crate::models::{ProcessingDecision, DATE_FORMAT};

/// Decides, before any processing, what should happen to one dropped file.
pub trait DecisionFilter: Send + Sync {
    fn decide(&self, image: &Path, index: &ExistingDateIndex) -> Result<ProcessingDecision, Error>;
}

/// Processes everything as a new entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysNew;

impl DecisionFilter for AlwaysNew {
    fn decide(&self, _image: &Path, _index: &ExistingDateIndex) -> Result<ProcessingDecision, Error> {
        Ok(ProcessingDecision::new_entry(None, "No date validation available"))
    }
}

/// Classify a page by its planner date against what is already recorded.
pub fn decide_for_date(date: Option<NaiveDate>, index: &ExistingDateIndex) -> ProcessingDecision {
    let Some(date) = date else {
        return ProcessingDecision::skip("Could not extract date from image");
    };
    let key = date.format(DATE_FORMAT);
    match index.get(date) {
        Some(id) => ProcessingDecision::update(
            date,
            id.to_string(),
            format!("Date {} already exists", key),
        ),
        None => ProcessingDecision::new_entry(Some(date), format!("New date {} to be processed", key)),
    }
}

/// Probes each image for its date with an extractor, then applies
/// [`decide_for_date`]. A probe failure is an error, not a skip.
pub struct DatedDecisionFilter {
    probe: Arc<dyn Extractor>,
    timeout: Duration,
}

impl DatedDecisionFilter {
    pub fn new(probe: Arc<dyn Extractor>, timeout: Duration) -> Self {
        Self { probe, timeout }
    }
}

impl DecisionFilter for DatedDecisionFilter {
    fn decide(&self, image: &Path, index: &ExistingDateIndex) -> Result<ProcessingDecision, Error> {
        let output = self.probe.extract(image, self.timeout).map_err(|e| {
            Error::DecisionFilter(format!("Date probe failed for {}: {}", image.display(), e))
        })?;
        Ok(decide_for_date(output.date, index))
    }
}
