//! StackPath DNS backend for external-dns style reconciliation.
//!
//! [`provider::StackPathProvider`] reads the zones and records of a stack,
//! presents them as merged [`endpoint::Endpoint`]s and applies precomputed
//! [`endpoint::Changes`] record by record.

pub mod dns;
pub mod endpoint;
pub mod filter;
pub mod provider;
pub mod settings;
pub mod zone;
