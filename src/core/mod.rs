//! Core domain models for conveyor
//!
//! This module defines the fundamental data structures that represent
//! workflows, steps, triggers, and their configuration.

pub mod config;
pub mod context;
pub mod state;
pub mod step;
pub mod trigger;
pub mod workflow;

pub use context::*;
pub use state::*;
pub use step::*;
pub use trigger::*;
pub use workflow::*;
