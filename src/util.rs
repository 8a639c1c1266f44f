//! Small shared helpers: random id/token generation and RFC3339 timestamps.

use std::fmt::Write as _;

/// Generate a random lowercase-hex identifier of `len` characters.
/// Backed by the OS RNG; ids are opaque and only need to be unique
/// within one simulator process.
pub fn generate_id(len: usize) -> String {
    let mut bytes = vec![0u8; len / 2 + 1];
    let _ = getrandom::getrandom(&mut bytes);
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in &bytes {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out.truncate(len);
    out
}

/// Current wall-clock time as an RFC3339 string, the format Drive uses
/// for `modifiedTime` and `token_expiry`.
pub fn rfc3339_now() -> String {
    chrono::Utc::now().to_rfc3339()
}
