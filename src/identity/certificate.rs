use prost::Message;
use x509_parser::prelude::X509Certificate;

use crate::error::{AppError, AppResult};

/// Wire form of the invocation creator: the member organization id plus the
/// PEM-encoded X.509 certificate of the submitting identity.
#[derive(Clone, PartialEq, Message)]
pub struct SerializedIdentity {
    #[prost(string, tag = "1")]
    pub mspid: String,
    #[prost(bytes = "vec", tag = "2")]
    pub id_bytes: Vec<u8>,
}

impl SerializedIdentity {
    pub fn new(mspid: impl Into<String>, pem: impl Into<Vec<u8>>) -> Self {
        Self { mspid: mspid.into(), id_bytes: pem.into() }
    }

    pub fn decode_creator(bytes: &[u8]) -> AppResult<Self> {
        if bytes.is_empty() {
            return Err(AppError::identity("invocation has no creator"));
        }
        let id = Self::decode(bytes).map_err(|e| AppError::identity(format!("cannot decode creator identity: {e}")))?;
        if id.id_bytes.is_empty() {
            return Err(AppError::identity("creator identity carries no certificate"));
        }
        Ok(id)
    }
}

/// The parts of the caller's certificate the security layer needs, detached from
/// the parsed DER.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerCertificate {
    common_name: String,
    /// DER SubjectPublicKeyInfo.
    public_key: Vec<u8>,
    der: Vec<u8>,
}

impl CallerCertificate {
    pub fn from_pem(pem: &[u8]) -> AppResult<Self> {
        let (_, pem) = x509_parser::pem::parse_x509_pem(pem)
            .map_err(|e| AppError::identity(format!("creator certificate is not valid PEM: {e}")))?;
        if pem.label != "CERTIFICATE" {
            return Err(AppError::identity(format!("expected a CERTIFICATE block, found '{}'", pem.label)));
        }
        Self::from_der(&pem.contents)
    }

    pub fn from_der(der: &[u8]) -> AppResult<Self> {
        let (_, cert) = x509_parser::parse_x509_certificate(der)
            .map_err(|e| AppError::identity(format!("cannot parse creator certificate: {e}")))?;
        Ok(Self {
            common_name: common_name(&cert)?,
            public_key: cert.public_key().raw.to_vec(),
            der: der.to_vec(),
        })
    }

    pub fn common_name(&self) -> &str { &self.common_name }

    pub fn public_key(&self) -> &[u8] { &self.public_key }

    /// Hex form used in the `publickey` field of user records.
    pub fn public_key_hex(&self) -> String { hex::encode(&self.public_key) }

    pub fn der(&self) -> &[u8] { &self.der }
}

fn common_name(cert: &X509Certificate<'_>) -> AppResult<String> {
    let attr = cert
        .subject()
        .iter_common_name()
        .next()
        .ok_or_else(|| AppError::identity("certificate subject has no common name"))?;
    let cn = attr
        .as_str()
        .map_err(|e| AppError::identity(format!("certificate common name is not a string: {e}")))?;
    Ok(cn.to_string())
}
