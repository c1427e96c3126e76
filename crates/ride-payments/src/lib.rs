//! Payment & Wallet Engine (§4.3): transactional wallet payments, external
//! card payments behind a resilient client, commissioned payouts, refunds,
//! webhook handling, and the `rides.completed` driver-earning consumer.

pub mod circuit_breaker;
pub mod client;
pub mod consumer;
pub mod retry;
pub mod service;
pub mod webhook;

pub use {
    client::{PaymentProcessor, ProcessorError, ResilientProcessorClient},
    service::{PaymentsService, ProcessPaymentWithWalletRequest},
};
