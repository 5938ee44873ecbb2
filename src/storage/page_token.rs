// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Stateless pagination cursor.
//!
//! A token names the last id included in the previous page. It is JSON with an
//! explicit version, hex-encoded so it survives any transport:
//!
//! ```text
//! {"v":1,"last_included_id":"IMSI0042"}  ->  7b2276223a312c...
//! ```
//!
//! The empty string is the start-of-set token.

use serde::{Deserialize, Serialize};

use super::traits::StorageError;

const TOKEN_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageToken {
    #[serde(rename = "v")]
    pub version: u32,
    pub last_included_id: String,
}

impl PageToken {
    pub fn after(last_included_id: impl Into<String>) -> Self {
        Self {
            version: TOKEN_VERSION,
            last_included_id: last_included_id.into(),
        }
    }

    pub fn encode(&self) -> String {
        // Serializing a struct of a u32 and a String cannot fail
        let json = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(json)
    }

    /// Decode a token; `Ok(None)` for the empty start token.
    pub fn decode(token: &str) -> Result<Option<Self>, StorageError> {
        if token.is_empty() {
            return Ok(None);
        }
        let bytes = hex::decode(token)
            .map_err(|e| StorageError::InvalidPageToken(format!("not hex: {}", e)))?;
        let parsed: PageToken = serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::InvalidPageToken(format!("malformed: {}", e)))?;
        if parsed.version != TOKEN_VERSION {
            return Err(StorageError::InvalidPageToken(format!(
                "unsupported version {}",
                parsed.version
            )));
        }
        Ok(Some(parsed))
    }
}
