//! The Ethash light algorithm: epoch caches and hashimoto verification.
//!
//! Only the light path is implemented. Mining, and the full dataset it would
//! need, are outside the node's scope; verification derives each dataset
//! item from the cache on demand.

use alloy_primitives::B256;
use sha3::{Digest, Keccak256, Keccak512};

/// Blocks per epoch.
pub const EPOCH_LENGTH: u64 = 30_000;

/// Bytes per cache hash.
const HASH_BYTES: u64 = 64;

/// Bytes per dataset mix.
const MIX_BYTES: u64 = 128;

/// Words (u32) per hash.
const HASH_WORDS: usize = 16;

/// Cache size at epoch zero.
const CACHE_BYTES_INIT: u64 = 1 << 24;

/// Cache growth per epoch.
const CACHE_BYTES_GROWTH: u64 = 1 << 17;

/// Dataset size at epoch zero.
const DATASET_BYTES_INIT: u64 = 1 << 30;

/// Dataset growth per epoch.
const DATASET_BYTES_GROWTH: u64 = 1 << 23;

/// RandMemoHash rounds during cache generation.
const CACHE_ROUNDS: usize = 3;

/// Cache parents mixed into each dataset item.
const DATASET_PARENTS: u64 = 256;

/// Dataset accesses per hashimoto run.
const ACCESSES: usize = 64;

/// The FNV prime of the Ethash mixing function.
const FNV_PRIME: u32 = 0x0100_0193;

#[inline]
fn fnv(a: u32, b: u32) -> u32 {
    a.wrapping_mul(FNV_PRIME) ^ b
}

/// The cache size for `epoch`: the initial size minus one hash, stepped down
/// until the hash count is prime.
pub fn cache_size(epoch: u64) -> u64 {
    let mut size = CACHE_BYTES_INIT + CACHE_BYTES_GROWTH * epoch - HASH_BYTES;
    while !is_prime(size / HASH_BYTES) {
        size -= 2 * HASH_BYTES;
    }
    size
}

/// The full dataset size for `epoch`, stepped to a prime mix count.
pub fn dataset_size(epoch: u64) -> u64 {
    let mut size = DATASET_BYTES_INIT + DATASET_BYTES_GROWTH * epoch - MIX_BYTES;
    while !is_prime(size / MIX_BYTES) {
        size -= 2 * MIX_BYTES;
    }
    size
}

fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut d = 3;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 2;
    }
    true
}

/// The epoch seed: Keccak-256 iterated `epoch` times over 32 zero bytes.
pub fn seed_hash(epoch: u64) -> B256 {
    let mut seed = B256::ZERO;
    for _ in 0..epoch {
        seed = B256::from_slice(&Keccak256::digest(seed));
    }
    seed
}

fn keccak512(data: &[u8]) -> [u8; 64] {
    Keccak512::digest(data).into()
}

/// Generates the light cache for `epoch`: a Keccak-512 chain over the seed,
/// then [CACHE_ROUNDS] of RandMemoHash.
pub fn make_cache(epoch: u64) -> Vec<u8> {
    let size = cache_size(epoch) as usize;
    let hashes = size / HASH_BYTES as usize;
    let seed = seed_hash(epoch);

    let mut cache = vec![0u8; size];
    let first = keccak512(seed.as_slice());
    cache[..64].copy_from_slice(&first);
    for i in 1..hashes {
        let previous = cache[(i - 1) * 64..i * 64].to_vec();
        cache[i * 64..(i + 1) * 64].copy_from_slice(&keccak512(&previous));
    }

    for _ in 0..CACHE_ROUNDS {
        for i in 0..hashes {
            let v = u32::from_le_bytes(
                cache[i * 64..i * 64 + 4].try_into().expect("sized"),
            ) as usize
                % hashes;
            let left = (i + hashes - 1) % hashes;
            let mut mixed = [0u8; 64];
            for b in 0..64 {
                mixed[b] = cache[left * 64 + b] ^ cache[v * 64 + b];
            }
            cache[i * 64..(i + 1) * 64].copy_from_slice(&keccak512(&mixed));
        }
    }
    cache
}

/// Derives dataset item `index` from the cache.
fn calc_dataset_item(cache: &[u8], index: u64) -> [u8; 64] {
    let hashes = (cache.len() / HASH_BYTES as usize) as u64;
    let base = ((index % hashes) * 64) as usize;

    let mut mix = [0u8; 64];
    mix.copy_from_slice(&cache[base..base + 64]);
    let seeded = u32::from_le_bytes(mix[..4].try_into().expect("sized")) ^ index as u32;
    mix[..4].copy_from_slice(&seeded.to_le_bytes());
    let mut mix = keccak512(&mix);

    let mut mix_words = [0u32; HASH_WORDS];
    for (word, chunk) in mix_words.iter_mut().zip(mix.chunks_exact(4)) {
        *word = u32::from_le_bytes(chunk.try_into().expect("sized"));
    }

    for j in 0..DATASET_PARENTS {
        let parent = fnv(
            (index ^ j) as u32,
            mix_words[(j as usize) % HASH_WORDS],
        ) as u64
            % hashes;
        let parent_base = (parent * 64) as usize;
        for (w, word) in mix_words.iter_mut().enumerate() {
            let cache_word = u32::from_le_bytes(
                cache[parent_base + w * 4..parent_base + w * 4 + 4]
                    .try_into()
                    .expect("sized"),
            );
            *word = fnv(*word, cache_word);
        }
    }

    for (chunk, word) in mix.chunks_exact_mut(4).zip(mix_words) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    keccak512(&mix)
}

/// The hashimoto function over cache-derived dataset items. Returns
/// `(mix_digest, result)`.
pub fn hashimoto_light(
    seal_hash: B256,
    nonce: u64,
    full_size: u64,
    cache: &[u8],
) -> (B256, B256) {
    let mix_hashes = full_size / MIX_BYTES;

    let mut seed_input = [0u8; 40];
    seed_input[..32].copy_from_slice(seal_hash.as_slice());
    seed_input[32..].copy_from_slice(&nonce.to_le_bytes());
    let seed = keccak512(&seed_input);
    let seed_head = u32::from_le_bytes(seed[..4].try_into().expect("sized"));

    // The working mix is two hashes wide.
    let mut mix = [0u32; 32];
    for (w, word) in mix.iter_mut().enumerate() {
        *word = u32::from_le_bytes(
            seed[(w % 16) * 4..(w % 16) * 4 + 4].try_into().expect("sized"),
        );
    }

    for access in 0..ACCESSES {
        let parent =
            (u64::from(fnv(access as u32 ^ seed_head, mix[access % 32])) % mix_hashes) * 2;
        let data = [
            calc_dataset_item(cache, parent),
            calc_dataset_item(cache, parent + 1),
        ];
        for (w, word) in mix.iter_mut().enumerate() {
            let half = &data[w / 16];
            let at = (w % 16) * 4;
            *word = fnv(
                *word,
                u32::from_le_bytes(half[at..at + 4].try_into().expect("sized")),
            );
        }
    }

    // Compress 128 bytes of mix down to 32.
    let mut digest = [0u8; 32];
    for i in 0..8 {
        let compressed = fnv(
            fnv(fnv(mix[i * 4], mix[i * 4 + 1]), mix[i * 4 + 2]),
            mix[i * 4 + 3],
        );
        digest[i * 4..i * 4 + 4].copy_from_slice(&compressed.to_le_bytes());
    }

    let mut result_input = Vec::with_capacity(64 + 32);
    result_input.extend_from_slice(&seed);
    result_input.extend_from_slice(&digest);
    let result = B256::from_slice(&Keccak256::digest(&result_input));
    (B256::from(digest), result)
}
