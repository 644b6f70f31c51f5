pub mod config;
pub mod converter;
pub mod db;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod repository;
pub mod routes;
pub mod s3;
pub mod schema;
pub mod state;
pub mod status;
pub mod storage;
pub mod sweeper;
pub mod utils;
pub mod validation;

pub use orchestrator::{Orchestrator, TriggerOutcome};
pub use sweeper::Sweeper;
