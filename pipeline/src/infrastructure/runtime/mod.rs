//! The parts of the system that are "running code", not "stored state":
//! the terminal progress surface (§4.4), the per-stage driver loop that
//! claims documents and runs a stage's sub-pipeline against them (§4.4),
//! the round-robin LLM pool the stages and driver share (§4.4, §4.7),
//! and the composer that launches one driver process per stage (§4.6).

pub mod composer;
pub mod llm_pool;
pub mod progress;
pub mod stage_driver;

pub use composer::Composer;
pub use llm_pool::LlmPool;
pub use progress::ProgressSurface;
pub use stage_driver::{StageDriver, StageDriverConfig};
