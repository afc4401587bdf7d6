//! Evolution Driver: the generational loop over compile -> evaluate ->
//! select -> mutate (spec §4.5).

mod driver;
mod lineage;
mod progress;
mod selection;

pub use driver::{Candidate, Driver, Generation, RunSummary};
pub use lineage::{LineageEdge, LineageLog};
pub use progress::{ProgressEvent, ProgressHub};
pub use selection::{select_survivors, CandidateRef, SelectionResult};
