use chrono::NaiveDate;
use std::collections::BTreeSet;
use tracing::info;

use super::index::ExistingDateIndex;
use crate::models::{DateGap, DATE_FORMAT};

/// Every run of missing days between consecutive distinct dates.
///
/// Input order and duplicates don't matter. Fewer than two distinct dates
/// never yields a gap.
pub fn detect_gaps(dates: &[NaiveDate]) -> Vec<DateGap> {
    let distinct: BTreeSet<NaiveDate> = dates.iter().copied().collect();

    distinct
        .iter()
        .zip(distinct.iter().skip(1))
        .filter_map(|(&start, &end)| {
            let missing_dates: Vec<NaiveDate> = start
                .iter_days()
                .skip(1)
                .take_while(|day| *day < end)
                .collect();
            if missing_dates.is_empty() {
                None
            } else {
                Some(DateGap {
                    start_date: start,
                    end_date: end,
                    missing_dates,
                })
            }
        })
        .collect()
}

/// Gap detection over freshly decided dates plus the dates already on record.
#[derive(Debug, Clone, Copy, Default)]
pub struct GapDetector;

impl GapDetector {
    pub fn detect(&self, new_dates: &[NaiveDate], index: &ExistingDateIndex) -> Vec<DateGap> {
        let mut all_dates = new_dates.to_vec();
        all_dates.extend(index.dates());

        let gaps = detect_gaps(&all_dates);
        info!("Detected {} date gaps", gaps.len());
        for gap in &gaps {
            let missing: Vec<String> = gap
                .missing_dates
                .iter()
                .map(|d| d.format(DATE_FORMAT).to_string())
                .collect();
            info!("Gap: {} - Missing: {:?}", gap, missing);
        }
        gaps
    }
}
