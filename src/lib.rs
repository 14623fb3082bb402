//! Order-dependency evaluation library
//!
//! Measures how the order of multiple-choice options changes LLM answers:
//! every question is asked under each cyclic rotation of its options, with
//! several option prefix styles and repeated trials, and the answers are
//! stored for position-bias and consistency analysis.

pub mod config;
pub mod errors;
pub mod evaluation;
pub mod models;
pub mod questions;
pub mod rotation;
pub mod store;
