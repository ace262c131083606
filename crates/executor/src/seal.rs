//! Proof-of-work seal verification behind a capability seam.

use crate::{ethash, ValidationError};
use alloy_primitives::U256;
use ember_primitives::Header;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

/// Verifies the seal fields of a header. The block validator holds one of
/// these; tests substitute [NoopSeal] so consensus checks run without mining.
pub trait SealVerifier: Send + Sync {
    /// Checks `mix_hash` and `nonce` against the header's difficulty.
    fn verify(&self, header: &Header) -> Result<(), ValidationError>;
}

/// Accepts every seal. For tests and block assembly previews.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSeal;

impl SealVerifier for NoopSeal {
    fn verify(&self, _header: &Header) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// Number of epoch caches kept resident.
const CACHE_SLOTS: usize = 4;

/// Full Ethash verification from per-epoch light caches. Cache generation is
/// expensive (tens of megabytes of Keccak-512), so caches are built once per
/// epoch and retained in an LRU.
pub struct EthashVerifier {
    caches: Mutex<LruCache<u64, Arc<Vec<u8>>>>,
}

impl core::fmt::Debug for EthashVerifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EthashVerifier").finish_non_exhaustive()
    }
}

impl Default for EthashVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl EthashVerifier {
    /// A verifier with an empty cache set.
    pub fn new() -> Self {
        Self {
            caches: Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_SLOTS).expect("nonzero slot count"),
            )),
        }
    }

    fn epoch_cache(&self, epoch: u64) -> Arc<Vec<u8>> {
        let mut caches = self.caches.lock().expect("ethash cache lock poisoned");
        if let Some(cache) = caches.get(&epoch) {
            return cache.clone();
        }
        let cache = Arc::new(ethash::make_cache(epoch));
        caches.put(epoch, cache.clone());
        cache
    }
}

impl SealVerifier for EthashVerifier {
    fn verify(&self, header: &Header) -> Result<(), ValidationError> {
        if header.difficulty.is_zero() {
            return Err(ValidationError::InvalidSeal);
        }
        let epoch = header.number / ethash::EPOCH_LENGTH;
        let cache = self.epoch_cache(epoch);
        let full_size = ethash::dataset_size(epoch);

        let nonce = u64::from_be_bytes(header.nonce.0);
        let (mix, result) =
            ethash::hashimoto_light(header.seal_hash(), nonce, full_size, &cache);

        if mix != header.mix_hash {
            return Err(ValidationError::InvalidSeal);
        }
        // result · difficulty ≤ 2^256, i.e. result ≤ 2^256 / difficulty.
        let boundary = U256::MAX / header.difficulty;
        if U256::from_be_bytes(result.0) > boundary {
            return Err(ValidationError::InvalidSeal);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_noop_accepts_anything() {
        assert!(NoopSeal.verify(&Header::default()).is_ok());
    }

    #[test]
    fn test_ethash_rejects_zero_difficulty() {
        let verifier = EthashVerifier::new();
        assert_eq!(
            verifier.verify(&Header::default()),
            Err(ValidationError::InvalidSeal)
        );
    }
}
