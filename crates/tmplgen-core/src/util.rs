use sha2::{Digest, Sha256};

/// Digest over named sources, in order, so a rename of a file also changes it.
pub(crate) fn sha256_hex_sources<'a>(sources: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut h = Sha256::new();
    for (name, text) in sources {
        h.update(name.as_bytes());
        h.update([0u8]);
        h.update(text.as_bytes());
        h.update([0u8]);
    }
    let digest = h.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_depends_on_names_and_text() {
        let a = sha256_hex_sources([("a.rs", "fn f() {}")]);
        let b = sha256_hex_sources([("b.rs", "fn f() {}")]);
        let c = sha256_hex_sources([("a.rs", "fn g() {}")]);
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, sha256_hex_sources([("a.rs", "fn f() {}")]));
    }
}
