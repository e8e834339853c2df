pub mod client;
pub mod models;

pub use client::DatabricksClient;
pub use models::{JobHandle, JobSpec, LifeCycleState, Parameter, ResultState, RunHandle, RunState};
