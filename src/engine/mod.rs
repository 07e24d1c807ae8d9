//! Core engine: the fetch → extract → reconcile → commit loop.

pub mod orchestrator;
pub mod reconcile;
pub mod report;

pub use orchestrator::{CancelFlag, Orchestrator, OrchestratorConfig};
pub use report::{RunReport, Stage, WindowReport};
