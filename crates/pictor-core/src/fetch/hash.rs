//! Content and perceptual hashing for downloaded images.

use blake3::Hasher as Blake3Hasher;
use image::DynamicImage;
use image_hasher::{HashAlg, HasherConfig, ImageHash};

/// Content and perceptual hashing for candidate images.
///
/// The perceptual hasher is configured once and reused for every image.
pub struct Hasher {
    phash_hasher: image_hasher::Hasher,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    pub fn new() -> Self {
        let phash_hasher = HasherConfig::new()
            .hash_alg(HashAlg::DoubleGradient)
            .hash_size(16, 16)
            .to_hasher();
        Self { phash_hasher }
    }

    /// BLAKE3 hash of the downloaded bytes, for exact dedup across runs.
    pub fn content_hash(data: &[u8]) -> String {
        let mut hasher = Blake3Hasher::new();
        hasher.update(data);
        hasher.finalize().to_hex().to_string()
    }

    /// Perceptual hash for near-duplicate detection.
    ///
    /// Similar images hash to nearby values, so resized or lightly edited
    /// copies can be detected by Hamming distance.
    pub fn perceptual_hash(&self, image: &DynamicImage) -> String {
        self.phash_hasher.hash_image(image).to_base64()
    }

    /// Hamming distance between two perceptual hashes.
    ///
    /// Returns `None` if either hash is invalid. Distance 0 means
    /// identical; distances under 10 typically indicate near-duplicates.
    pub fn perceptual_distance(hash1: &str, hash2: &str) -> Option<u32> {
        let h1 = ImageHash::<Vec<u8>>::from_base64(hash1).ok()?;
        let h2 = ImageHash::<Vec<u8>>::from_base64(hash2).ok()?;
        Some(h1.dist(&h2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_deterministic() {
        let a = Hasher::content_hash(b"same bytes");
        let b = Hasher::content_hash(b"same bytes");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let c = Hasher::content_hash(b"other bytes");
        assert_ne!(a, c);
    }

    #[test]
    fn test_perceptual_hash_of_identical_images() {
        let hasher = Hasher::new();
        let img = DynamicImage::new_rgb8(64, 64);
        let h1 = hasher.perceptual_hash(&img);
        let h2 = hasher.perceptual_hash(&img);
        assert_eq!(Hasher::perceptual_distance(&h1, &h2), Some(0));
    }

    #[test]
    fn test_perceptual_distance_invalid_hash() {
        assert_eq!(Hasher::perceptual_distance("!!!", "!!!"), None);
    }
}
