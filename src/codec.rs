//! Payload encoding and decoding.
//!
//! The wire contract fixes `application/json` as the content type; this
//! module exists as a seam mainly so the dispatcher code reads in terms of
//! "encode"/"decode" rather than spelling out `serde_json` at every call
//! site.

use crate::error::CodecError;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// The content type advertised on every published message.
pub const CONTENT_TYPE: &str = "application/json";

/// Serializes `value` to its wire representation.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(value).map_err(CodecError::Encode)
}

/// Deserializes `bytes` into `T`, applying `#[serde(default)]` for absent
/// fields per the usual `serde_json` rules.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(bytes).map_err(CodecError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        #[serde(default)]
        count: u32,
    }

    #[test]
    fn round_trips_a_struct() {
        let value = Sample {
            name: "widget".into(),
            count: 3,
        };
        let bytes = encode(&value).unwrap();
        let decoded: Sample = decode(&bytes).unwrap();
        assert_eq!(value, decoded);
    }

    #[test]
    fn missing_fields_fall_back_to_default() {
        let decoded: Sample = decode(br#"{"name":"widget"}"#).unwrap();
        assert_eq!(decoded.count, 0);
    }

    #[test]
    fn unit_encodes_to_null() {
        let bytes = encode(&()).unwrap();
        assert_eq!(bytes, b"null");
    }
}
