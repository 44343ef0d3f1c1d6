//! Shared data model for the mysentry agent.
//!
//! Every component exchanges the types defined here: metric samples
//! flowing out of the collector, findings produced by the evaluator,
//! alerts owned by the alert manager, remediation audit records, and
//! the structured events handed to notifiers.

pub mod id;
pub mod types;
