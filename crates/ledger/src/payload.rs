//! Kind-tagged JSON payloads
//!
//! The ledger treats payloads as opaque bytes. Producers tag their JSON
//! payloads with a `kind` field so audit tooling can tell consent records,
//! TRS snapshots, and friction outcomes apart without a shared enum.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    kind: &'a str,
    #[serde(flatten)]
    body: &'a T,
}

#[derive(Deserialize)]
struct KindOnly {
    kind: String,
}

/// Serialize `body` with a `kind` tag
pub fn encode<T: Serialize>(kind: &str, body: &T) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(&Envelope { kind, body })
}

/// Read the `kind` tag of an encoded payload, if it has one
pub fn kind(payload: &[u8]) -> Option<String> {
    serde_json::from_slice::<KindOnly>(payload)
        .ok()
        .map(|k| k.kind)
}

/// Deserialize the body of an encoded payload
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> serde_json::Result<T> {
    serde_json::from_slice(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        session_id: String,
        value: f64,
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let sample = Sample {
            session_id: "ses_1".into(),
            value: 0.75,
        };

        let bytes = encode("sample", &sample).unwrap();
        assert_eq!(kind(&bytes).as_deref(), Some("sample"));
        assert_eq!(decode::<Sample>(&bytes).unwrap(), sample);
    }

    #[test]
    fn test_kind_of_untagged_payload() {
        assert_eq!(kind(b"not json"), None);
        assert_eq!(kind(b"{\"other\": 1}"), None);
    }
}
