//! Asset tag allocation: `{PREFIX}-{TYPE}-{NNNNNN}`, retried on collision.

use crate::CoreError;

pub const MAX_TAG_ATTEMPTS: u32 = 10;

/// Three-letter code for an asset type (`Laptop` -> `LAP`).
pub fn type_code(asset_type: &str) -> String {
    let code: String = asset_type
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(3)
        .collect::<String>()
        .to_ascii_uppercase();
    if code.is_empty() { "GEN".to_string() } else { code }
}

pub fn format_asset_tag(prefix: &str, asset_type: &str, number: u32) -> String {
    format!(
        "{}-{}-{:06}",
        prefix.trim().to_ascii_uppercase(),
        type_code(asset_type),
        number % 1_000_000
    )
}

/// Draw candidate numbers from `next_number` until `exists` reports a free
/// tag. Lookup errors abort immediately.
pub fn generate_asset_tag<E: From<CoreError>>(
    prefix: &str,
    asset_type: &str,
    mut next_number: impl FnMut() -> u32,
    mut exists: impl FnMut(&str) -> Result<bool, E>,
) -> Result<String, E> {
    for _ in 0..MAX_TAG_ATTEMPTS {
        let tag = format_asset_tag(prefix, asset_type, next_number());
        if !exists(&tag)? {
            return Ok(tag);
        }
    }
    Err(CoreError::AssetTagExhausted {
        attempts: MAX_TAG_ATTEMPTS,
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[derive(Debug, PartialEq)]
    enum LookupError {
        Db(&'static str),
        Core(CoreError),
    }

    impl From<CoreError> for LookupError {
        fn from(e: CoreError) -> Self {
            Self::Core(e)
        }
    }

    #[test]
    fn type_codes() {
        assert_eq!(type_code("Laptop"), "LAP");
        assert_eq!(type_code("  fw "), "FW");
        assert_eq!(type_code("---"), "GEN");
    }

    #[test]
    fn formats_zero_padded() {
        assert_eq!(format_asset_tag("ast", "Desktop", 42), "AST-DES-000042");
        assert_eq!(format_asset_tag("AST", "Server", 1_234_567), "AST-SER-234567");
    }

    #[test]
    fn retries_past_collisions() {
        let taken: HashSet<String> = ["AST-LAP-000001", "AST-LAP-000002"]
            .into_iter()
            .map(String::from)
            .collect();
        let mut n = 0;
        let tag = generate_asset_tag(
            "AST",
            "Laptop",
            || {
                n += 1;
                n
            },
            |t| Ok::<_, CoreError>(taken.contains(t)),
        )
        .unwrap();
        assert_eq!(tag, "AST-LAP-000003");
    }

    #[test]
    fn gives_up_after_ten_attempts() {
        let mut calls = 0;
        let result = generate_asset_tag(
            "AST",
            "Laptop",
            || 7,
            |_| {
                calls += 1;
                Ok::<_, CoreError>(true)
            },
        );
        assert_eq!(result, Err(CoreError::AssetTagExhausted { attempts: 10 }));
        assert_eq!(calls, 10);
    }

    #[test]
    fn lookup_errors_propagate() {
        let result = generate_asset_tag("AST", "Laptop", || 1, |_| Err(LookupError::Db("db down")));
        assert_eq!(result, Err(LookupError::Db("db down")));
    }
}
