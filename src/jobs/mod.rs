//! Job lifecycle: validation, identity, stage sequencing and the job timeout

mod model;
mod orchestrator;
mod validation;

pub use model::{
    Job, JobError, JobId, JobResult, JobState, NO_LOCATION_MESSAGE, TIMEOUT_MESSAGE,
    TransitionError, VideoSummary,
};
pub use orchestrator::{JobHandle, Orchestrator};
pub use validation::UrlPolicy;
