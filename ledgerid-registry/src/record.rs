//! On-chain record shapes.

use serde::{Deserialize, Serialize};

/// Profile fields written to the registry contract.
///
/// The role travels as a plain string: the contract stores it opaquely and
/// the local store remains authoritative for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryProfile {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
}

/// The registry contract's view of an identity, keyed by wallet address.
///
/// Advisory only: it may lag the local store or be entirely absent even when
/// a local identity with this wallet exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnChainRecord {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_chain_record_deserializes_from_rpc_shape() {
        let json = r#"{
            "username": "alice",
            "email": "alice@example.com",
            "full_name": "Alice A",
            "role": "user"
        }"#;
        let record: OnChainRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.username, "alice");
        assert_eq!(record.role, "user");
    }
}
