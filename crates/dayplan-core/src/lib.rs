pub mod clock;
pub mod export;
pub mod fallback;
pub mod generator;
pub mod pipeline;
pub mod preferences;
pub mod request;
pub mod response;
pub mod store;
pub mod task;
pub mod validate;

pub use generator::{GenerationError, GenerationPrompt, Generator};
pub use pipeline::{PipelineError, PlanOutcome, Planner, RetryPolicy};
pub use request::ScheduleRequest;
pub use store::PlanStore;
pub use task::{NormalizeError, NormalizedTasks, Task, normalize_tasks};
