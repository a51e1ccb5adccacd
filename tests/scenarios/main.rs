//! Scenario-based tests for accrual-pipeline

mod helpers;

mod checkpoint_roundtrip;
mod concurrent_loading;
mod condition_rules;
mod failure_handling;
mod orchestrator_defaults;
mod retry_behavior;
mod workpaper_integration;
