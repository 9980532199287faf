//! Stable content keys.
//!
//! The task-queue adapter delivers work at-least-once; it deduplicates on a
//! key derived from the inbound message. The same part-hashing scheme backs
//! the engine's tuple-cache keys, so both live here.

use blake3::Hasher;

const SEP: u8 = 0x1f;

/// Hash a sequence of string parts into a stable hex key.
///
/// Each part is length-delimited by the separator byte, so `["ab", "c"]`
/// and `["a", "bc"]` hash differently.
pub fn hash_parts(parts: &[&str]) -> String {
    let mut hasher = Hasher::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(&[SEP]);
    }
    hasher.finalize().to_hex().to_string()
}

/// Idempotency key for one inbound mail job.
///
/// Components:
/// - message_id (the inbound mail's Message-ID header)
/// - attachment_name
/// - attachment content hash
pub fn job_idempotency_key(message_id: &str, attachment_name: &str, content: &[u8]) -> String {
    let content_hash = blake3::hash(content).to_hex().to_string();
    hash_parts(&[message_id, attachment_name, &content_hash])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts_are_length_delimited() {
        assert_ne!(hash_parts(&["ab", "c"]), hash_parts(&["a", "bc"]));
        assert_ne!(hash_parts(&["ab"]), hash_parts(&["ab", ""]));
    }

    #[test]
    fn job_key_is_stable() {
        let a = job_idempotency_key("<msg-1@example.org>", "occurrences.csv", b"a,b\n1,2\n");
        let b = job_idempotency_key("<msg-1@example.org>", "occurrences.csv", b"a,b\n1,2\n");
        assert_eq!(a, b);
    }

    #[test]
    fn job_key_tracks_content() {
        let a = job_idempotency_key("<msg-1@example.org>", "occurrences.csv", b"a,b\n1,2\n");
        let b = job_idempotency_key("<msg-1@example.org>", "occurrences.csv", b"a,b\n1,3\n");
        assert_ne!(a, b);
    }
}
