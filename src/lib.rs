//! Qforge: Specialist Question Generation
//!
//! Routes assessment-question generation across several LLM providers. Each
//! question type has a primary and optional fallback generator; per-provider
//! circuit breakers and retry with backoff isolate failing vendors, and a batch
//! coordinator runs whole jobs with bounded concurrency and partial-failure
//! reporting.

pub mod assignment;
pub mod config;
pub mod error;
pub mod generation;
pub mod logging;
pub mod provider;
pub mod resilience;
pub mod resolver;
pub mod types;

pub use assignment::{AssignmentTable, GeneratorAssignment};
pub use config::{ConfigLoader, QforgeConfig};
pub use error::{ConfigurationError, GenerationError, ProviderError, ResolutionError};
pub use generation::{BatchGenerationCoordinator, GenerationJob, JobResult, SpecialistRouter};
pub use provider::{ProviderClient, ProviderRegistry};
pub use resilience::{ProviderHealthTracker, RetryPolicy};
pub use resolver::{GeneratorAssignmentResolver, Resolution};
pub use types::{ModelId, ProviderId, Tier};
