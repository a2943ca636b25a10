//! Pipeline core for LessonVault: the per-item orchestrator and the
//! end-to-end ingest driver that ties discovery, the catalog, transcript
//! processing and the object store together.

mod orchestrator;
mod pipeline;

pub use orchestrator::{Orchestrator, RunTally};
pub use pipeline::Pipeline;
