//! Opaque global identifiers.
//!
//! A global id pairs a schema type name with a tenant-internal id and
//! serializes to a single opaque string that is safe to carry in string
//! literals and URL path segments. The local id is URL-escaped before the
//! two parts are joined, so an escaped local id can never collide with the
//! delimiter, and the joined form is base64-encoded as a whole.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::error::GlobalIdError;

const DELIMITER: char = ':';

/// A decoded global identifier: (type name, local id).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct GlobalId {
    type_name: String,
    local_id: String,
}

impl GlobalId {
    /// Builds a global id from its parts.
    ///
    /// `type_name` must not contain the `:` delimiter; the serialized form
    /// of such an id would not round-trip.
    pub fn new(type_name: impl Into<String>, local_id: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            local_id: local_id.into(),
        }
    }

    /// The schema type this id refers to.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The tenant-internal id, unescaped.
    pub fn local_id(&self) -> &str {
        &self.local_id
    }
}

#[derive(Debug, Error)]
#[error("decoded content does not contain the '{DELIMITER}' delimiter")]
struct MissingDelimiter;

/// Serializes and deserializes [`GlobalId`]s.
#[derive(Clone, Debug, Default)]
pub struct GlobalIdCodec;

impl GlobalIdCodec {
    /// Encodes a global id into its opaque transport form.
    pub fn serialize(&self, id: &GlobalId) -> String {
        let escaped = urlencoding::encode(&id.local_id);
        BASE64.encode(format!("{}{}{}", id.type_name, DELIMITER, escaped))
    }

    /// Decodes an opaque global id string.
    ///
    /// Fails with [`GlobalIdError::InvalidGlobalId`] on malformed base64,
    /// non-UTF-8 payloads, missing delimiter, or bad percent-escapes; the
    /// error carries the raw input, the decoded content recovered so far,
    /// and the underlying failure as its source.
    pub fn deserialize(&self, raw: &str) -> Result<GlobalId, GlobalIdError> {
        let bytes = BASE64
            .decode(raw)
            .map_err(|err| invalid(raw, String::new(), err))?;
        let decoded = String::from_utf8(bytes).map_err(|err| {
            let lossy = String::from_utf8_lossy(err.as_bytes()).into_owned();
            invalid(raw, lossy, err)
        })?;

        // Split on the first delimiter only: escaped local ids may contain
        // further delimiters of their own.
        let (type_name, escaped) = decoded
            .split_once(DELIMITER)
            .ok_or_else(|| invalid(raw, decoded.clone(), MissingDelimiter))?;
        let local_id = urlencoding::decode(escaped)
            .map_err(|err| invalid(raw, decoded.clone(), err))?;

        Ok(GlobalId::new(type_name, local_id.into_owned()))
    }
}

fn invalid(
    raw: &str,
    decoded: String,
    source: impl std::error::Error + Send + Sync + 'static,
) -> GlobalIdError {
    GlobalIdError::InvalidGlobalId {
        raw: raw.to_string(),
        decoded,
        source: Box::new(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_simple_ids() {
        let codec = GlobalIdCodec;
        let id = GlobalId::new("User", "42");
        let serialized = codec.serialize(&id);
        assert_eq!(codec.deserialize(&serialized).unwrap(), id);
    }

    #[test]
    fn round_trips_hostile_local_ids() {
        let codec = GlobalIdCodec;
        for local in ["a:b:c", "with space", "pre%20escaped", "émoji🚀", ""] {
            let id = GlobalId::new("Listing", local);
            let serialized = codec.serialize(&id);
            assert_eq!(codec.deserialize(&serialized).unwrap(), id, "{local}");
        }
    }

    #[test]
    fn malformed_base64_error_names_the_input() {
        let codec = GlobalIdCodec;
        let err = codec.deserialize("!!not-base64!!").unwrap_err();
        assert!(err.to_string().contains("!!not-base64!!"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn missing_delimiter_error_includes_decoded_content() {
        let codec = GlobalIdCodec;
        let raw = BASE64.encode("no-delimiter-here");
        let err = codec.deserialize(&raw).unwrap_err();
        let message = err.to_string();
        assert!(message.contains(&raw), "{message}");
        assert!(message.contains("no-delimiter-here"), "{message}");
    }

    #[test]
    fn serialized_form_is_transport_safe() {
        let codec = GlobalIdCodec;
        let serialized = codec.serialize(&GlobalId::new("User", "a/b?c&d"));
        assert!(serialized
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '='));
    }
}
