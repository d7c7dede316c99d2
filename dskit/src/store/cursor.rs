use std::fmt::{Debug, Display, Formatter};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::errors::{DsError, DsResult, ErrorKind};

/// Opaque position in a query result stream.
///
/// The bytes are defined by the store that produced the cursor; callers only
/// pass cursors around, typically as the string form from [`Cursor::encode`].
/// The empty cursor means "from the beginning".
#[derive(Clone, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Cursor {
    bytes: Vec<u8>,
}

impl Cursor {
    /// Wraps store-defined cursor bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Cursor { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The URL-safe string form of the cursor.
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.bytes)
    }

    /// Parses the string form produced by [`Cursor::encode`]. Padding is
    /// accepted and ignored; an empty string decodes to the empty cursor.
    pub fn decode(encoded: &str) -> DsResult<Cursor> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded.trim().trim_end_matches('='))
            .map_err(|err| {
                DsError::new_with_cause(
                    &format!("invalid cursor {:?}", encoded),
                    ErrorKind::InvalidCursor,
                    err.into(),
                )
            })?;
        Ok(Cursor { bytes })
    }
}

impl Display for Cursor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl Debug for Cursor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Cursor({})", self.encode())
    }
}
