//! API endpoint implementations.

mod executions;
mod workflows;

pub use executions::{ExecutionsApi, ListExecutionsQuery};
pub use workflows::WorkflowsApi;
