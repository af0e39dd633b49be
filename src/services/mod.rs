pub mod ai;
pub mod availability;
pub mod orchestrator;
pub mod scheduling;
pub mod store;
