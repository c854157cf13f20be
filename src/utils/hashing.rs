//! Hashing utilities

use xxhash_rust::xxh3::xxh3_64;

/// Create a case-insensitive, alphanumeric-normalized hash from one or more
/// strings combined together.
///
/// # Arguments
/// * `args` - Strings to hash together
/// * `decode` - Whether to fold unicode down to ASCII before hashing, so
///   visually-equivalent strings in different encodings hash the same.
pub fn create_hash(args: &[&str], decode: bool) -> String {
    let mut combined = String::new();

    for arg in args {
        combined.push_str(&remove_non_alnum(arg));
    }

    if decode {
        combined = deunicode::deunicode(&combined);
    }

    let hash = xxh3_64(combined.as_bytes());
    format!("{:016x}", hash)[..11].to_string()
}

fn remove_non_alnum(token: &str) -> String {
    let lower = token.to_lowercase();
    let trimmed = lower.trim().replace(' ', "");

    let filtered: String = trimmed.chars().filter(|c| c.is_alphanumeric()).collect();

    if filtered.is_empty() {
        trimmed
    } else {
        filtered
    }
}

/// Stable cache-file key for a library-relative path, used to name the
/// attribute analyzer's `<hash>.json[.gz]` cache entries (§4.2).
pub fn path_cache_key(path: &str) -> String {
    format!("{:016x}", xxh3_64(path.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_hash() {
        let hash = create_hash(&["Test", "Artist"], true);
        assert_eq!(hash.len(), 11);

        let hash2 = create_hash(&["Test", "Artist"], true);
        assert_eq!(hash, hash2);

        let hash3 = create_hash(&["test", "artist"], true);
        assert_eq!(hash, hash3);
    }

    #[test]
    fn test_remove_non_alnum() {
        assert_eq!(remove_non_alnum("Test Artist"), "testartist");
        assert_eq!(remove_non_alnum("AC/DC"), "acdc");
        assert_eq!(remove_non_alnum("  Spaces  "), "spaces");
    }

    #[test]
    fn test_path_cache_key_stable() {
        let a = path_cache_key("Artist/Album/01 Track.flac");
        let b = path_cache_key("Artist/Album/01 Track.flac");
        let c = path_cache_key("Artist/Album/02 Track.flac");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
