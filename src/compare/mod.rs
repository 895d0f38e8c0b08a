//! Cross-environment comparison

pub mod diff;
pub mod filter;
pub mod normalize;
pub mod reconcile;
pub mod scanner;
pub mod session;

pub use reconcile::{CompareStatus, ObjectId, ReconciledObject};
pub use scanner::{ReconciliationScanner, ScanProgress, ScanSummary};
pub use session::{CompareSession, ComparePair};
