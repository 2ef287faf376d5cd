pub mod generator;
pub mod orchestrator;
pub mod report;
pub mod supervisor;
