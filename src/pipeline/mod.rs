pub mod chain;
pub mod context;
pub mod input;
pub mod run;
pub mod stage;

pub use chain::{Chain, ChainResult, ChainSummary};
pub use context::PipelineContext;
pub use input::{AnalysisOptions, Backend, Database, Frontend, PipelineInput, TargetStack};
pub use run::{Pipeline, PipelineRun};
pub use stage::{ExecutionRecord, RunStatus, StageData, StageOutcome, StagePolicy, StageResult};
