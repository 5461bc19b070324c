//! Classification services
//!
//! - [`ServiceContainer`]: collaborator wiring
//! - [`SessionOrchestrator`]: drives one classification run end to end
//! - [`ClassificationQueries`]: read side over stored sessions

pub mod container;
pub mod query_service;
pub mod session_orchestrator;

pub use container::ServiceContainer;
pub use query_service::ClassificationQueries;
pub use session_orchestrator::{PipelineError, PipelineOutcome, SessionOrchestrator};
