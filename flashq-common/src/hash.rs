//! Content hashing for card versioning
//!
//! The digest is SHA-256 over the defining fields of a card, in this exact
//! order, separated by a single NUL byte:
//!
//! ```text
//! module_name \0 course_slug \0 question \0 answer_body \0 tags
//! ```
//!
//! Tags are joined with the ASCII unit separator (0x1F), so `[]` and `[""]`
//! hash alike; the corpus loader rejects empty tags. The result is
//! lowercase hex. Changing the order or the separators invalidates every
//! stored hash and forces a new version of every card on the next ingestion.

use sha2::{Digest, Sha256};

const FIELD_SEPARATOR: &[u8] = &[0x00];
const TAG_SEPARATOR: &[u8] = &[0x1F];

/// Compute the content hash of a card definition
pub fn content_hash(
    module_name: &str,
    course_slug: &str,
    question: &str,
    answer_body: &str,
    tags: &[String],
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(module_name.as_bytes());
    hasher.update(FIELD_SEPARATOR);
    hasher.update(course_slug.as_bytes());
    hasher.update(FIELD_SEPARATOR);
    hasher.update(question.as_bytes());
    hasher.update(FIELD_SEPARATOR);
    hasher.update(answer_body.as_bytes());
    hasher.update(FIELD_SEPARATOR);
    for (i, tag) in tags.iter().enumerate() {
        if i > 0 {
            hasher.update(TAG_SEPARATOR);
        }
        hasher.update(tag.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
