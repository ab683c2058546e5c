//! GLP-1 adverse-event dashboard library
//!
//! Loads adverse-event reports and clinical-trial incidence into one record
//! table, then answers grouped frequency and comparison queries over it.

pub mod models;
pub mod parser;
pub mod organ_map;
pub mod aggregation;
pub mod comparison;
pub mod views;
pub mod output;
pub mod example_data;
pub mod errors;

pub use models::*;
pub use aggregation::*;
pub use comparison::*;
pub use errors::*;

/// Re-export commonly used types
pub type Result<T> = std::result::Result<T, DashboardError>;
