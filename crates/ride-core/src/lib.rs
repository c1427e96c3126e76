//! Shared contracts used across the negotiation, payments, spatial and
//! ride-type resolver crates: the error taxonomy, the response envelope and a
//! handful of small value types (money, coordinates) that every subsystem
//! otherwise re-derives slightly differently.

pub mod envelope;
pub mod error;
pub mod geography;
pub mod money;
pub mod types;

pub use envelope::{ApiError, Envelope};
pub use error::{CoreError, ErrorKind};
pub use geography::{Geography, GeographyResolution};
pub use money::Money;
pub use types::Coordinate;
