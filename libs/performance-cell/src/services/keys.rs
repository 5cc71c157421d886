// =====================================================================================
// CACHE KEY DERIVATION
// =====================================================================================

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::PerformanceError;

/// Builds `"{prefix}:{cache_key}:{digest}"` where the digest covers a
/// canonical JSON rendering of `args`.
///
/// Arguments go through `serde_json::Value` first; its object map is ordered
/// by key, so field order and `HashMap` iteration order never leak into the
/// key.
pub fn derive_cache_key<A>(prefix: &str, cache_key: &str, args: &A) -> Result<String, PerformanceError>
where
    A: Serialize + ?Sized,
{
    let canonical = serde_json::to_value(args)?;
    let rendered = serde_json::to_string(&canonical)?;

    let mut hasher = Sha256::new();
    hasher.update(cache_key.as_bytes());
    hasher.update([0u8]);
    hasher.update(rendered.as_bytes());

    Ok(format!("{}:{}:{:x}", prefix, cache_key, hasher.finalize()))
}
