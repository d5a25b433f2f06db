//! Envelope wrapped around each glob before it is put into the stream
//!
//! ```json
//! {"UUID": "6f1c...", "Version": 1, "Data": "<base64 glob>"}
//! ```

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::client::PutRecordEntry;

/// Envelope format version
pub const STREAM_RECORD_VERSION: u32 = 1;

/// One bulk-put entry; the UUID doubles as the partition key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRecord {
    #[serde(rename = "UUID")]
    pub uuid: String,

    #[serde(rename = "Version")]
    pub version: u32,

    #[serde(rename = "Data", serialize_with = "to_base64", deserialize_with = "from_base64")]
    pub data: Bytes,
}

impl StreamRecord {
    /// Wrap a glob with a fresh random UUID
    pub fn new(glob: Bytes) -> Self {
        Self {
            uuid: uuid::Uuid::new_v4().to_string(),
            version: STREAM_RECORD_VERSION,
            data: glob,
        }
    }

    /// JSON-encode into a bulk-put entry
    pub fn into_entry(self) -> Result<PutRecordEntry, serde_json::Error> {
        let data = serde_json::to_vec(&self)?;
        Ok(PutRecordEntry {
            partition_key: self.uuid,
            data: Bytes::from(data),
        })
    }
}

fn to_base64<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(data))
}

fn from_base64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
    let s = String::deserialize(deserializer)?;
    STANDARD
        .decode(s)
        .map(Bytes::from)
        .map_err(serde::de::Error::custom)
}
