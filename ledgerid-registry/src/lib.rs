//! On-chain identity registry client.
//!
//! The registry contract exposes exactly four operations: register a user,
//! update a user, fetch a user, and check existence, all keyed by wallet
//! address. This crate is the thin client side of that interface:
//!
//! - Inputs are validated before any network call; a malformed address is
//!   `InvalidInput` and never reaches the wire.
//! - Every call is a single bounded attempt. The client never retries
//!   internally; retry policy belongs to the identity synchronizer.
//! - Transport failures and timeouts surface as [`RegistryError::Unavailable`],
//!   reverted transactions as [`RegistryError::Rejected`].
//!
//! The contract address is resolved once at startup, from explicit
//! configuration or deployment metadata (see [`deployment`]), and startup
//! fails fatally without one.

pub mod client;
pub mod deployment;
pub mod record;

pub use client::{HttpRegistryClient, Registry, RegistryConfig, RegistryError, TxReceipt};
pub use deployment::{resolve_contract_address, DeploymentError};
pub use record::{OnChainRecord, RegistryProfile};
