//! Payment gateway integration: HTTP client, response-shape normalization,
//! and identifier resolution.

pub mod client;
pub mod resolver;
pub mod types;

pub use client::{PaymentGateway, PortOneClient};
pub use resolver::IdentifierResolver;
pub use types::{GatewayPaymentStatus, VirtualAccountDetails};
