pub mod artifact;
pub mod config;
pub mod databricks;
pub mod error;
pub mod metadata;
pub mod poll;
pub mod registry;
pub mod release;
