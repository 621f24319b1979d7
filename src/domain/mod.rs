//! Core domain types and logic.

pub mod aggregate;
pub mod calendar;
pub mod config_validation;
pub mod cross_section;
pub mod engine;
pub mod equation;
pub mod error;
pub mod operator;
pub mod point_in_time;
pub mod registry;
pub mod universe;
