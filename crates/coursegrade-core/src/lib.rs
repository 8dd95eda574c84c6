//! coursegrade-core: grading orchestrator, data model and progress state machine.
//!
//! This crate defines the data model, collaborator traits, output
//! normalization and the course-unlock rules that the rest of the
//! workspace builds on.

pub mod engine;
pub mod error;
pub mod memory;
pub mod model;
pub mod normalize;
pub mod parser;
pub mod progress;
pub mod results;
pub mod traits;
