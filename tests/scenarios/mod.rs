//! Scenario-based tests for conveyor workflow runs

mod failure_handling;
mod checkout_steps;
mod background_service;
mod env_exports;
