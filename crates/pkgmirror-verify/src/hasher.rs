use sha2::Digest;

use crate::ContentHash;

/// Incremental digest over a byte stream.
pub trait Hasher: Send {
    fn update(&mut self, data: &[u8]);
    fn finalize(self) -> ContentHash;
}

#[derive(Clone, Default)]
pub struct Sha256Hasher(sha2::Sha256);

impl Sha256Hasher {
    pub fn new() -> Self { Self(sha2::Sha256::new()) }

    pub fn digest(data: &[u8]) -> ContentHash { ContentHash::from_bytes(sha2::Sha256::digest(data).into()) }
}

impl Hasher for Sha256Hasher {
    fn update(&mut self, data: &[u8]) { self.0.update(data); }

    fn finalize(self) -> ContentHash { ContentHash::from_bytes(self.0.finalize().into()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incremental_matches_one_shot() {
        let mut hasher = Sha256Hasher::new();
        hasher.update(b"hello ");
        hasher.update(b"world");

        assert_eq!(hasher.finalize(), Sha256Hasher::digest(b"hello world"));
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            Sha256Hasher::digest(b"hello world").to_string(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }
}
