//! Negotiation State Machine (§4.2): session lifecycle, offers, atomic
//! acceptance, expiry sweeping and event emission.

pub mod collaborators;
pub mod service;
pub mod sweeper;

pub use {
    collaborators::{FareEstimate, Geography, GeographyResolution, Pricing},
    service::{DriverInfo, NegotiationService, StartSessionRequest, SubmitOfferRequest},
};
