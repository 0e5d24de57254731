pub mod job_store;
pub mod relay;
pub mod retention;
pub mod runner;
pub mod separator;
pub mod storage;
pub mod validation;
