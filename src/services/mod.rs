pub mod broker;
pub mod dataset;
pub mod inference;
pub mod normalizer;
pub mod orchestrator;
pub mod registry;
