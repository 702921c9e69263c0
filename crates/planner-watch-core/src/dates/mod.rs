pub mod decision;
pub mod gaps;
pub mod index;

pub use decision::{decide_for_date, AlwaysNew, DatedDecisionFilter, DecisionFilter};
pub use gaps::{detect_gaps, GapDetector};
pub use index::{DateIndexHandle, DateIndexSource, ExistingDateIndex, SummaryFileSource};
