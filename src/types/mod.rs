//! Types shared between the connector and its collaborators.

pub mod diagnostic;
pub mod traits;
