//! Pipeline orchestration services.
//!
//! Services sit between the CLI and the repositories: discovery talks to the
//! remote archive and fills the catalogue, the pipeline driver sequences the
//! processing stages over worker pools.

mod discovery;
mod pipeline;

pub use discovery::{DiscoveryReport, DiscoveryService};
pub use pipeline::{PipelineDriver, StageCounts};
