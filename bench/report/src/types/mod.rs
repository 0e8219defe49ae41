pub mod actor_kind;
pub mod params;
pub mod report;
pub mod run_result;
pub mod summary;
pub mod transport;
pub mod worker_result;
