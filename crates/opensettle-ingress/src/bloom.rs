//! Lock-free Bloom filter for idempotency-key membership.
//!
//! First tier of the duplicate check: answers "definitely new" without a
//! durable lookup. False positives fall through to the authoritative
//! store; false negatives cannot occur because every successful claim is
//! inserted before the claim is acted on.
//!
//! Bits live in `AtomicU64` words, so concurrent inserts and queries need
//! no lock. Bit positions come from double hashing over a single SHA-256
//! digest of the key.

use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};

/// A fixed-size Bloom filter sized for a target false-positive rate.
pub struct BloomFilter {
    /// Bit array, packed into 64-bit words.
    words: Vec<AtomicU64>,
    /// Total number of bits (`words.len() * 64` rounded from sizing).
    num_bits: u64,
    /// Number of probe positions per key.
    num_hashes: u32,
}

impl BloomFilter {
    /// Size the filter for `expected_items` keys at `false_positive_rate`.
    ///
    /// Uses the standard sizing formulas:
    /// `m = -n·ln(p) / ln(2)²` bits and `k = (m/n)·ln(2)` hashes.
    ///
    /// # Panics
    /// Panics if `false_positive_rate` is not in `(0, 1)`.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn with_rate(expected_items: usize, false_positive_rate: f64) -> Self {
        assert!(
            false_positive_rate > 0.0 && false_positive_rate < 1.0,
            "false_positive_rate must be in (0, 1)"
        );
        let n = expected_items.max(1) as f64;
        let ln2 = std::f64::consts::LN_2;

        let m = (-(n * false_positive_rate.ln()) / (ln2 * ln2)).ceil().max(64.0);
        let k = ((m / n) * ln2).round().max(1.0);

        let num_bits = m as u64;
        let num_words = num_bits.div_ceil(64) as usize;
        let mut words = Vec::with_capacity(num_words);
        words.resize_with(num_words, || AtomicU64::new(0));

        Self {
            words,
            num_bits,
            num_hashes: k as u32,
        }
    }

    /// The two base hashes for double hashing, from one SHA-256 digest.
    fn base_hashes(key: &[u8]) -> (u64, u64) {
        let digest = Sha256::digest(key);
        let h1 = u64::from_le_bytes(digest[0..8].try_into().expect("SHA-256 is 32 bytes"));
        // Force h2 odd so probe positions cycle through the whole bit array.
        let h2 = u64::from_le_bytes(digest[8..16].try_into().expect("SHA-256 is 32 bytes")) | 1;
        (h1, h2)
    }

    /// Insert a key. Safe under concurrent access; bits only ever turn on.
    #[allow(clippy::cast_possible_truncation)]
    pub fn insert(&self, key: &[u8]) {
        let (h1, h2) = Self::base_hashes(key);
        for i in 0..u64::from(self.num_hashes) {
            let bit = h1.wrapping_add(i.wrapping_mul(h2)) % self.num_bits;
            let word = (bit / 64) as usize;
            let mask = 1u64 << (bit % 64);
            self.words[word].fetch_or(mask, Ordering::Relaxed);
        }
    }

    /// Membership query. `false` means **definitely new**; `true` means
    /// possibly seen — the caller must consult the authoritative store.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn contains(&self, key: &[u8]) -> bool {
        let (h1, h2) = Self::base_hashes(key);
        for i in 0..u64::from(self.num_hashes) {
            let bit = h1.wrapping_add(i.wrapping_mul(h2)) % self.num_bits;
            let word = (bit / 64) as usize;
            let mask = 1u64 << (bit % 64);
            if self.words[word].load(Ordering::Relaxed) & mask == 0 {
                return false;
            }
        }
        true
    }

    /// Number of probe positions per key.
    #[must_use]
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Number of bits in the filter.
    #[must_use]
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }
}
