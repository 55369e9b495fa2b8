//! Question generation: per-request routing and batch coordination.

pub mod coordinator;
pub mod job;
pub mod router;

pub use coordinator::BatchGenerationCoordinator;
pub use job::{
    AttemptOutcome, AttemptRecord, FailureKind, FailureRecord, GeneratedQuestion, GenerationJob,
    GenerationRequest, JobResult, QuestionTypeResult, RequestId,
};
pub use router::SpecialistRouter;
