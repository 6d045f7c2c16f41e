//! Ledger entity shapes.
//!
//! Every record is a flat JSON object with lower-case field names and a `doctype`
//! discriminator, so several entity kinds can share one store.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub mod doctype {
    pub const USER: &str = "user";
    pub const ROLE: &str = "role";
    pub const FEATURE: &str = "feature";
    pub const ROLE_FEATURE: &str = "rolefeature";
}

/// A typed record stored under its own key.
pub trait Document: Serialize + DeserializeOwned {
    /// Discriminator written to and filtered on the `doctype` field.
    const DOCTYPE: &'static str;

    fn key(&self) -> &str;

    fn doctype(&self) -> &str;
}

/// Ordered permission strength. `Unknown` is a sentinel that never grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum AccessLevel {
    ReadOnly = 0,
    ReadWrite = 1,
    Unknown = 99,
}

impl AccessLevel {
    /// Whether a stored grant of `self` satisfies a request for `requested`.
    pub fn satisfies(self, requested: AccessLevel) -> bool {
        self != AccessLevel::Unknown && requested != AccessLevel::Unknown && self >= requested
    }
}

impl From<i64> for AccessLevel {
    fn from(v: i64) -> Self {
        match v {
            0 => AccessLevel::ReadOnly,
            1 => AccessLevel::ReadWrite,
            _ => AccessLevel::Unknown,
        }
    }
}

impl From<AccessLevel> for i64 {
    fn from(v: AccessLevel) -> Self { v as i64 }
}

impl FromStr for AccessLevel {
    type Err = AppError;

    /// Only the two real levels are accepted from caller input.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0" => Ok(AccessLevel::ReadOnly),
            "1" => Ok(AccessLevel::ReadWrite),
            other => Err(AppError::invalid(format!("unsupported access level '{other}'"))),
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccessLevel::ReadOnly => "ReadOnly",
            AccessLevel::ReadWrite => "ReadWrite",
            AccessLevel::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Fresh record identifier: upper-case UUID v4.
pub fn new_id() -> String { uuid::Uuid::new_v4().to_string().to_uppercase() }

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "adlogin")]
    pub ad_login: String,
    #[serde(rename = "hashedpassword", default)]
    pub hashed_password: String,
    /// Hex of the DER SubjectPublicKeyInfo.
    #[serde(rename = "publickey", default)]
    pub public_key: String,
    #[serde(rename = "roleid", default)]
    pub role_id: String,
    pub doctype: String,
}

impl User {
    pub fn new(ad_login: impl Into<String>, public_key: impl Into<String>, role_id: impl Into<String>, hashed_password: impl Into<String>) -> Self {
        Self {
            ad_login: ad_login.into(),
            hashed_password: hashed_password.into(),
            public_key: public_key.into(),
            role_id: role_id.into(),
            doctype: doctype::USER.to_string(),
        }
    }
}

impl Document for User {
    const DOCTYPE: &'static str = doctype::USER;
    fn key(&self) -> &str { &self.ad_login }
    fn doctype(&self) -> &str { &self.doctype }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    #[serde(rename = "roleid")]
    pub role_id: String,
    #[serde(rename = "rolename")]
    pub role_name: String,
    pub doctype: String,
}

impl Role {
    pub fn new(role_id: impl Into<String>, role_name: impl Into<String>) -> Self {
        Self { role_id: role_id.into(), role_name: role_name.into(), doctype: doctype::ROLE.to_string() }
    }
}

impl Document for Role {
    const DOCTYPE: &'static str = doctype::ROLE;
    fn key(&self) -> &str { &self.role_id }
    fn doctype(&self) -> &str { &self.doctype }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "featureid")]
    pub feature_id: String,
    #[serde(rename = "featurename")]
    pub feature_name: String,
    pub doctype: String,
}

impl Feature {
    pub fn new(feature_id: impl Into<String>, feature_name: impl Into<String>) -> Self {
        Self { feature_id: feature_id.into(), feature_name: feature_name.into(), doctype: doctype::FEATURE.to_string() }
    }
}

impl Document for Feature {
    const DOCTYPE: &'static str = doctype::FEATURE;
    fn key(&self) -> &str { &self.feature_id }
    fn doctype(&self) -> &str { &self.doctype }
}

/// Grant of an access level on a feature to a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleFeature {
    pub id: String,
    #[serde(rename = "roleid")]
    pub role_id: String,
    #[serde(rename = "featureid")]
    pub feature_id: String,
    #[serde(rename = "accesslevel")]
    pub access_level: AccessLevel,
    pub doctype: String,
}

impl RoleFeature {
    pub fn new(role_id: impl Into<String>, feature_id: impl Into<String>, access_level: AccessLevel) -> Self {
        Self {
            id: new_id(),
            role_id: role_id.into(),
            feature_id: feature_id.into(),
            access_level,
            doctype: doctype::ROLE_FEATURE.to_string(),
        }
    }
}

impl Document for RoleFeature {
    const DOCTYPE: &'static str = doctype::ROLE_FEATURE;
    fn key(&self) -> &str { &self.id }
    fn doctype(&self) -> &str { &self.doctype }
}

/// Projection returned by the multi-role grant lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureGrant {
    #[serde(rename = "accesslevel")]
    pub access_level: AccessLevel,
    #[serde(rename = "roleid")]
    pub role_id: String,
    #[serde(rename = "featureid")]
    pub feature_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn access_level_ordering() {
        assert!(AccessLevel::ReadWrite.satisfies(AccessLevel::ReadOnly));
        assert!(AccessLevel::ReadWrite.satisfies(AccessLevel::ReadWrite));
        assert!(AccessLevel::ReadOnly.satisfies(AccessLevel::ReadOnly));
        assert!(!AccessLevel::ReadOnly.satisfies(AccessLevel::ReadWrite));
        assert!(!AccessLevel::Unknown.satisfies(AccessLevel::ReadOnly));
        assert!(!AccessLevel::ReadWrite.satisfies(AccessLevel::Unknown));
    }

    #[test]
    fn access_level_parsing_and_wire_form() {
        assert_eq!("1".parse::<AccessLevel>().unwrap(), AccessLevel::ReadWrite);
        assert_eq!(" 0 ".parse::<AccessLevel>().unwrap(), AccessLevel::ReadOnly);
        assert!("99".parse::<AccessLevel>().is_err());
        assert!("rw".parse::<AccessLevel>().is_err());

        assert_eq!(serde_json::to_value(AccessLevel::Unknown).unwrap(), json!(99));
        assert_eq!(serde_json::from_value::<AccessLevel>(json!(7)).unwrap(), AccessLevel::Unknown);
    }

    #[test]
    fn documents_use_lowercase_wire_names() {
        let u = User::new("alice", "abcd", "R1", "$argon2id$...");
        assert_eq!(
            serde_json::to_value(&u).unwrap(),
            json!({"adlogin":"alice","hashedpassword":"$argon2id$...","publickey":"abcd","roleid":"R1","doctype":"user"})
        );
        let g = RoleFeature::new("R1", "F1", AccessLevel::ReadOnly);
        let v = serde_json::to_value(&g).unwrap();
        assert_eq!(v["accesslevel"], json!(0));
        assert_eq!(v["doctype"], json!("rolefeature"));
        assert_eq!(g.key(), g.id);
    }

    #[test]
    fn ids_are_uppercase_and_unique() {
        let a = new_id();
        let b = new_id();
        assert_ne!(a, b);
        assert_eq!(a, a.to_uppercase());
        assert_eq!(a.len(), 36);
    }
}
