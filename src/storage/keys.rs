//! Key Sanitizer
//!
//! Maps an arbitrary thread id to a file stem that is safe to join onto the
//! storage root. The readable prefix keeps the name recognizable when browsing
//! the directory; the hash suffix makes it unique.
//!
//! ```text
//! "thread:1234/abc"  ──>  thread_1234_abc-5f0c...e91a
//!  └── readable part ──┘   └── xxh3-128 of the raw key ──┘
//! ```
//!
//! Nothing is ever rejected. `../etc/passwd`, absolute paths and NUL bytes all
//! collapse into `[A-Za-z0-9_-]` characters, so a stem can never contain a
//! separator or a dot and can never leave the root directory.
//!
//! The record file and the lock file of a key share the stem, which is how the
//! sweeper (which only sees file names) takes the same lock as a caller (which
//! only knows the key).

use std::fmt;
use xxhash_rust::xxh3::xxh3_128;

/// Longest readable prefix kept before the hash suffix.
pub const MAX_READABLE_LEN: usize = 64;

/// Length of the hex-encoded hash suffix.
const HASH_HEX_LEN: usize = 32;

/// Extension of persisted record files.
pub const RECORD_EXTENSION: &str = "json";

/// Extension of per-key lock files.
pub const LOCK_EXTENSION: &str = "lock";

/// The filesystem-safe name shared by a key's record and lock files.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileStem(String);

impl FileStem {
    /// Sanitizes `key`.
    ///
    /// Pure and deterministic: the same key always yields the same stem, in
    /// every process and on every run.
    pub fn from_key(key: &str) -> Self {
        let mut stem: String = key
            .chars()
            .take(MAX_READABLE_LEN)
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        stem.push('-');
        stem.push_str(&format!("{:032x}", xxh3_128(key.as_bytes())));
        Self(stem)
    }

    /// Recovers the stem from a record file name found in the storage root.
    ///
    /// Returns `None` for anything this crate would not have written
    /// (temp files, foreign files, lock files).
    pub fn from_record_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(RECORD_EXTENSION)?.strip_suffix('.')?;
        let (readable, hash) = stem.rsplit_once('-')?;
        let well_formed = readable.len() <= MAX_READABLE_LEN
            && readable
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            && hash.len() == HASH_HEX_LEN
            && hash.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'));

        well_formed.then(|| Self(stem.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the record for this stem.
    pub fn record_file_name(&self) -> String {
        format!("{}.{}", self.0, RECORD_EXTENSION)
    }

    /// File name of the lock for this stem.
    pub fn lock_file_name(&self) -> String {
        format!("{}.{}", self.0, LOCK_EXTENSION)
    }
}

impl fmt::Display for FileStem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Component, Path};

    fn is_single_normal_component(name: &str) -> bool {
        let mut components = Path::new(name).components();
        matches!(components.next(), Some(Component::Normal(_))) && components.next().is_none()
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(FileStem::from_key("thread-1"), FileStem::from_key("thread-1"));
        assert_ne!(FileStem::from_key("thread-1"), FileStem::from_key("thread-2"));
    }

    #[test]
    fn test_readable_prefix() {
        let stem = FileStem::from_key("thread:12345-abcd/special");
        assert!(stem.as_str().starts_with("thread_12345-abcd_special-"));
    }

    #[test]
    fn test_colliding_readable_parts_stay_unique() {
        // Same readable prefix; the hash keeps them apart.
        assert_ne!(FileStem::from_key("a/b"), FileStem::from_key("a_b"));
        assert_ne!(FileStem::from_key("a:b"), FileStem::from_key("a/b"));
    }

    #[test]
    fn test_path_traversal_payloads() {
        let payloads = [
            "../../etc/passwd",
            "/etc/shadow",
            "..",
            ".",
            "..\\..\\windows\\system32",
            "C:\\Windows\\win.ini",
            "thread\0null",
            "",
        ];

        for key in payloads {
            let name = FileStem::from_key(key).record_file_name();
            assert!(
                is_single_normal_component(&name),
                "unsafe name for {:?}: {}",
                key,
                name
            );
            assert!(!name.contains('/'));
            assert!(!name.contains('\\'));
            assert!(!name.contains('\0'));
            assert!(!name.starts_with('.'));
        }
    }

    #[test]
    fn test_length_is_bounded() {
        let long_key = "x".repeat(10_000);
        let stem = FileStem::from_key(&long_key);
        assert_eq!(stem.as_str().len(), MAX_READABLE_LEN + 1 + HASH_HEX_LEN);
    }

    #[test]
    fn test_unicode_keys() {
        let stem = FileStem::from_key("会话-üñí");
        assert!(stem.as_str().is_ascii());
        assert!(stem.as_str().starts_with("__-___-"));
    }

    #[test]
    fn test_record_file_name_parses_back() {
        let stem = FileStem::from_key("thread:42");
        let parsed = FileStem::from_record_file_name(&stem.record_file_name());
        assert_eq!(parsed, Some(stem));
    }

    #[test]
    fn test_foreign_file_names_ignored() {
        let stem = FileStem::from_key("thread:42");
        let tmp_name = format!("{}.7.3.tmp", stem.record_file_name());

        assert_eq!(FileStem::from_record_file_name(&tmp_name), None);
        assert_eq!(FileStem::from_record_file_name(&stem.lock_file_name()), None);
        assert_eq!(FileStem::from_record_file_name("notes.txt"), None);
        assert_eq!(FileStem::from_record_file_name("short.json"), None);
        assert_eq!(FileStem::from_record_file_name("../evil.json"), None);
    }

    #[test]
    fn test_long_foreign_names_ignored() {
        let hash = "0123456789abcdef0123456789abcdef";
        for name in [
            "operator_export_backup_2026_10_19_full.json".to_string(),
            "0123456789abcdef0123456789abcdef0.json".to_string(),
            format!("notes-{}.json", hash.to_uppercase()),
            format!("notes-{}0.json", hash),
            format!("{}-{}.json", "x".repeat(MAX_READABLE_LEN + 1), hash),
        ] {
            assert_eq!(FileStem::from_record_file_name(&name), None, "{}", name);
        }
    }

    #[test]
    fn test_every_generated_stem_parses_back() {
        for key in ["", "-", "a-b-c", "x".repeat(500).as_str(), "会话-üñí", "../../etc"] {
            let stem = FileStem::from_key(key);
            assert_eq!(
                FileStem::from_record_file_name(&stem.record_file_name()),
                Some(stem)
            );
        }
    }
}
