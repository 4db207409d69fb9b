//! Core domain types and logic.

pub mod ambiguity;
pub mod bar;
pub mod batch;
pub mod config;
pub mod config_validation;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod position;
pub mod trigger;
