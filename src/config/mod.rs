//! Configuration types and loading for demandflow

mod loader;

pub use loader::PipelineConfig;
