pub mod artifact_store;
pub mod job_store;
pub mod model;
pub mod queue;
pub mod runner;
pub mod service;
