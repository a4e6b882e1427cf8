use serde::{Deserialize, Deserializer, Serialize};

/// Parameters for list/query operations.
///
/// Deserialized both from JSON and from query strings (where it is flattened
/// into endpoint-specific filter structs), so the numeric fields must accept
/// the text form query parameters arrive in.
#[derive(Debug, Clone, Deserialize)]
pub struct ListParams {
    /// Maximum number of results to return.
    #[serde(default = "default_limit", deserialize_with = "lenient_usize")]
    pub limit: usize,

    /// Offset for pagination.
    #[serde(default, deserialize_with = "lenient_usize")]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// Accepts a usize given either as a native integer or as a string.
fn lenient_usize<'de, D: Deserializer<'de>>(de: D) -> Result<usize, D::Error> {
    struct AnyUsize;

    impl serde::de::Visitor<'_> for AnyUsize {
        type Value = usize;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("a non-negative integer")
        }

        fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<usize, E> {
            usize::try_from(v).map_err(E::custom)
        }

        fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<usize, E> {
            usize::try_from(v).map_err(E::custom)
        }

        fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<usize, E> {
            v.parse().map_err(E::custom)
        }
    }

    de.deserialize_any(AnyUsize)
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
        }
    }
}

/// Result wrapper for list operations.
#[derive(Debug, Clone, Serialize)]
pub struct ListResult<T: Serialize> {
    pub items: Vec<T>,
    pub total: usize,
}

/// Generate a new random ID (UUIDv4, no dashes).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string().replace('-', "")
}

/// Get the current time as an RFC 3339 string.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Whole minutes between two RFC 3339 timestamps, clamped at zero.
///
/// Time logs keep minute granularity; malformed timestamps count as zero
/// rather than poisoning the aggregate.
pub fn minutes_between(from: &str, to: &str) -> i64 {
    let parse = |s: &str| {
        chrono::DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .ok()
    };
    match (parse(from), parse(to)) {
        (Some(a), Some(b)) => ((b - a).num_seconds() / 60).max(0),
        _ => 0,
    }
}
