use serde::{Deserialize, Serialize};

/// An authenticated caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    /// The user's login, equal to the certificate common name.
    pub user_id: String,
    #[serde(default)]
    pub role_id: String,
    #[serde(default)]
    pub mspid: String,
}
