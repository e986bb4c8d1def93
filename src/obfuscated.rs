//! Base64 indirection for service and archive URLs kept at rest.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Decoded value is not UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub fn decode(encoded: &str) -> Result<String, DecodeError> {
    let bytes = STANDARD.decode(encoded)?;
    Ok(String::from_utf8(bytes)?)
}

pub fn encode(plain: &str) -> String {
    STANDARD.encode(plain)
}
