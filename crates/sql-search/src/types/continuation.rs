//! Opaque continuation tokens.
//!
//! Tokens are base64url-encoded JSON so clients cannot construct or modify
//! them meaningfully, the same way page cursors are encoded elsewhere in Helios.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

use crate::error::{SqlSearchError, SqlSearchResult};

/// Position of the last row of a page of matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationToken {
    /// Resource type id of the last row, present when the search spans types.
    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    pub resource_type_id: Option<i16>,

    /// Surrogate id of the last row.
    #[serde(rename = "sid")]
    pub resource_surrogate_id: i64,

    /// Sort value of the last row for value-sorted searches.
    #[serde(rename = "sv", default, skip_serializing_if = "Option::is_none")]
    pub sort_value: Option<String>,
}

impl ContinuationToken {
    /// Creates a token resuming after the given surrogate id.
    pub fn new(resource_surrogate_id: i64) -> Self {
        Self {
            resource_type_id: None,
            resource_surrogate_id,
            sort_value: None,
        }
    }

    /// Sets the resource type id.
    pub fn with_resource_type_id(mut self, resource_type_id: i16) -> Self {
        self.resource_type_id = Some(resource_type_id);
        self
    }

    /// Sets the sort value.
    pub fn with_sort_value(mut self, sort_value: impl Into<String>) -> Self {
        self.sort_value = Some(sort_value.into());
        self
    }

    /// Encodes the token to an opaque string.
    pub fn encode(&self) -> String {
        encode_json(self)
    }

    /// Decodes a token produced by [`ContinuationToken::encode`].
    pub fn decode(s: &str) -> SqlSearchResult<Self> {
        decode_json(s)
    }
}

/// Position inside the included resources of one page of matches, used by the
/// `$includes` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludesContinuationToken {
    /// Lowest surrogate id of the page of matches.
    #[serde(rename = "mmin")]
    pub match_min_surrogate_id: i64,

    /// Highest surrogate id of the page of matches.
    #[serde(rename = "mmax")]
    pub match_max_surrogate_id: i64,

    /// Resource type id of the last included resource returned.
    #[serde(rename = "it", default, skip_serializing_if = "Option::is_none")]
    pub include_resource_type_id: Option<i16>,

    /// Surrogate id of the last included resource returned.
    #[serde(rename = "isid", default, skip_serializing_if = "Option::is_none")]
    pub include_resource_surrogate_id: Option<i64>,
}

impl IncludesContinuationToken {
    /// Creates a token for the first page of includes of a page of matches.
    pub fn new(match_min_surrogate_id: i64, match_max_surrogate_id: i64) -> Self {
        Self {
            match_min_surrogate_id,
            match_max_surrogate_id,
            include_resource_type_id: None,
            include_resource_surrogate_id: None,
        }
    }

    /// Sets the position of the last returned include.
    pub fn with_include_position(mut self, resource_type_id: i16, surrogate_id: i64) -> Self {
        self.include_resource_type_id = Some(resource_type_id);
        self.include_resource_surrogate_id = Some(surrogate_id);
        self
    }

    /// Encodes the token to an opaque string.
    pub fn encode(&self) -> String {
        encode_json(self)
    }

    /// Decodes a token produced by [`IncludesContinuationToken::encode`].
    pub fn decode(s: &str) -> SqlSearchResult<Self> {
        decode_json(s)
    }
}

fn encode_json<T: Serialize>(value: &T) -> String {
    let json = serde_json::to_vec(value).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(&json)
}

fn decode_json<T: for<'de> Deserialize<'de>>(s: &str) -> SqlSearchResult<T> {
    let bytes =
        URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|_| SqlSearchError::InvalidContinuationToken {
                token: s.to_string(),
            })?;

    serde_json::from_slice(&bytes).map_err(|_| SqlSearchError::InvalidContinuationToken {
        token: s.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_with_sort_value() {
        let token = ContinuationToken::new(5_000_000)
            .with_resource_type_id(103)
            .with_sort_value("1980-01-01T00:00:00Z");

        let decoded = ContinuationToken::decode(&token.encode()).unwrap();
        assert_eq!(decoded, token);
    }

    #[test]
    fn test_plain_token_omits_optional_fields() {
        let encoded = ContinuationToken::new(42).encode();
        let bytes = URL_SAFE_NO_PAD.decode(&encoded).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), r#"{"sid":42}"#);
    }

    #[test]
    fn test_invalid_token() {
        let err = ContinuationToken::decode("not a token!").unwrap_err();
        assert!(matches!(err, SqlSearchError::InvalidContinuationToken { .. }));

        let garbage = URL_SAFE_NO_PAD.encode(b"[1,2,3]");
        assert!(ContinuationToken::decode(&garbage).is_err());
    }

    #[test]
    fn test_includes_token() {
        let token = IncludesContinuationToken::new(100, 900).with_include_position(7, 555);
        let decoded = IncludesContinuationToken::decode(&token.encode()).unwrap();
        assert_eq!(decoded.include_resource_surrogate_id, Some(555));
        assert_eq!(decoded.match_max_surrogate_id, 900);
    }
}
