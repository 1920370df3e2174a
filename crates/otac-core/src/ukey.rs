//! Deterministic unique keys.
//!
//! Every persisted node is addressed by a key derived from the tuple that
//! identifies it (e.g. tenant, target type and target id for a unit), so
//! that "create if absent" and existence lookups never need a secondary
//! index. Keys are URL-safe base64 (no padding) of a BLAKE3 digest and are
//! therefore safe to embed in SurrealQL record literals.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// Length of every key produced by [`unique_key`].
pub const KEY_LEN: usize = 43;

/// Hash `prefix` and `parts` into a stable key.
///
/// Each component is length-prefixed, so `("ab", "c")` and `("a", "bc")`
/// produce different keys.
pub fn unique_key(prefix: &str, parts: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in std::iter::once(&prefix).chain(parts.iter()) {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    URL_SAFE_NO_PAD.encode(hasher.finalize().as_bytes())
}

/// Whether `s` has the shape of a key produced by [`unique_key`].
pub fn is_unique_key(s: &str) -> bool {
    s.len() == KEY_LEN
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

pub fn tenant_key(external_id: &str) -> String {
    unique_key("tenant", &[external_id])
}

pub fn subject_key(external_id: &str) -> String {
    unique_key("subject", &[external_id])
}

pub fn unit_key(tenant: &str, target_type: &str, target_id: &str) -> String {
    unique_key("unit", &[tenant, target_type, target_id])
}

pub fn object_key(tenant: &str, target_type: &str, target_id: &str) -> String {
    unique_key("object", &[tenant, target_type, target_id])
}

pub fn scope_key(tenant: &str, target_type: &str, target_id: &str) -> String {
    unique_key("scope", &[tenant, target_type, target_id])
}

pub fn permission_key(tenant: &str, name: &str) -> String {
    unique_key("permission", &[tenant, name])
}

pub fn org_key(name: &str) -> String {
    unique_key("org", &[name])
}

pub fn ou_key(org: &str, ou: &str) -> String {
    unique_key("ou", &[org, ou])
}

pub fn member_key(org: &str, subject: &str) -> String {
    unique_key("member", &[org, subject])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_stable() {
        assert_eq!(
            unit_key("t1", "dept", "eng"),
            unit_key("t1", "dept", "eng")
        );
        assert_eq!(unit_key("t1", "dept", "eng").len(), KEY_LEN);
    }

    #[test]
    fn kind_prefix_separates_families() {
        assert_ne!(unit_key("t1", "dept", "eng"), object_key("t1", "dept", "eng"));
        assert_ne!(unit_key("t1", "dept", "eng"), scope_key("t1", "dept", "eng"));
    }

    #[test]
    fn component_boundaries_matter() {
        assert_ne!(unique_key("x", &["ab", "c"]), unique_key("x", &["a", "bc"]));
        assert_ne!(unit_key("t1", "dep", "teng"), unit_key("t1", "dept", "eng"));
    }

    #[test]
    fn tenant_is_part_of_the_key() {
        assert_ne!(unit_key("t1", "dept", "eng"), unit_key("t2", "dept", "eng"));
    }

    #[test]
    fn recognises_generated_keys() {
        assert!(is_unique_key(&subject_key("alice")));
        assert!(!is_unique_key("alice"));
        assert!(!is_unique_key(&"a".repeat(42)));
        assert!(!is_unique_key(&format!("{}!", "a".repeat(42))));
    }
}
