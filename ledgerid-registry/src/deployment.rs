//! Contract address resolution from deployment metadata.
//!
//! The registry contract address comes from one of two places, checked in
//! order:
//!
//! 1. Explicit configuration (highest precedence).
//! 2. A deployment metadata JSON file as produced by the contract migration
//!    tooling: `{"networks": {"<network-id>": {"address": "0x..."}}}`.
//!
//! Resolution happens exactly once at process start. If neither source
//! yields an address, startup must fail; there is no lazy fallback.

use std::collections::BTreeMap;
use std::path::Path;

use ledgerid_core::{Address, AddressError};
use serde::Deserialize;

/// Errors from contract address resolution.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DeploymentError {
    /// No explicit address and no usable metadata entry.
    #[error("no registry contract address: configure one or deploy the contract first")]
    Unresolved,

    /// The metadata file could not be read.
    #[error("failed to read deployment metadata: {0}")]
    Io(#[from] std::io::Error),

    /// The metadata file is not valid deployment JSON.
    #[error("malformed deployment metadata: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The resolved address string is not a valid address.
    #[error("invalid contract address in deployment source: {0}")]
    InvalidAddress(#[from] AddressError),
}

#[derive(Deserialize)]
struct DeploymentMetadata {
    #[serde(default)]
    networks: BTreeMap<String, NetworkDeployment>,
}

#[derive(Deserialize)]
struct NetworkDeployment {
    address: String,
}

/// Resolve the registry contract address.
///
/// `explicit` wins when present. Otherwise the metadata file is consulted
/// and the first network entry (lowest network id) is used.
///
/// # Errors
///
/// `Unresolved` when neither source yields an address; `Io`/`Malformed` for
/// unreadable metadata; `InvalidAddress` when the chosen string does not
/// parse.
pub fn resolve_contract_address(
    explicit: Option<&str>,
    metadata_path: Option<&Path>,
) -> Result<Address, DeploymentError> {
    if let Some(raw) = explicit {
        return Ok(Address::parse(raw)?);
    }

    let path = metadata_path.ok_or(DeploymentError::Unresolved)?;
    let contents = std::fs::read_to_string(path)?;
    let metadata: DeploymentMetadata = serde_json::from_str(&contents)?;

    let deployment = metadata
        .networks
        .into_values()
        .next()
        .ok_or(DeploymentError::Unresolved)?;

    Ok(Address::parse(&deployment.address)?)
}
