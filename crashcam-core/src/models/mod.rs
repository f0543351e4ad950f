pub mod config;
pub mod error;
pub mod fragment;
pub mod persist_report;
pub mod snapshot;
pub mod state;
