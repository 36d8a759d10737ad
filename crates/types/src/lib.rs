//! Shared data model for the assembly open-data gateway.
//!
//! These types cross every crate boundary in the workspace: the registry
//! produces [`ResolvedSpec`] values, the engine consumes them and produces
//! [`RequestOutcome`] values, and the binary prints both.

mod outcome;
mod service;
mod spec;

pub use outcome::{EmbeddedStatus, FailureKind, OutputFormat, ParseOutputFormatError, RequestFailure, RequestOutcome};
pub use service::{InvalidServiceId, ServiceId};
pub use spec::{ParameterDescriptor, Requirement, ResolvedSpec, SpecInvariantError};
