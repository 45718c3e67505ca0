pub mod analytics;
pub mod config;
pub mod export;
pub mod storage;

pub mod api;
pub mod ingest;
pub mod models;
