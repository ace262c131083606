//! The native contracts at addresses `0x01..0x09`.

use crate::{gas, Execution, VmError};
use alloy_primitives::{keccak256, Address, U256};
use ember_genesis::Fork;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use num_bigint::BigUint;
use num_traits::{One, Zero};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// ECDSA public key recovery.
const ECRECOVER: u64 = 1;
/// SHA-256.
const SHA256: u64 = 2;
/// RIPEMD-160.
const RIPEMD160: u64 = 3;
/// The identity function.
const IDENTITY: u64 = 4;
/// Arbitrary-precision modular exponentiation (Byzantium).
const MODEXP: u64 = 5;
/// alt-bn128 point addition (Byzantium).
const BN_ADD: u64 = 6;
/// alt-bn128 scalar multiplication (Byzantium).
const BN_MUL: u64 = 7;
/// alt-bn128 pairing check (Byzantium).
const BN_PAIRING: u64 = 8;
/// BLAKE2b compression (Istanbul).
const BLAKE2F: u64 = 9;

/// True when `address` designates a native contract under `fork`.
pub fn is_precompile(address: Address, fork: Fork) -> bool {
    let Some(index) = precompile_index(address) else {
        return false;
    };
    match index {
        ECRECOVER..=IDENTITY => true,
        MODEXP..=BN_PAIRING => fork.at_least(Fork::Byzantium),
        BLAKE2F => fork.at_least(Fork::Istanbul),
        _ => false,
    }
}

/// The low-byte index of a precompile address, when the high 19 bytes are
/// zero.
fn precompile_index(address: Address) -> Option<u64> {
    address.as_slice()[..19].iter().all(|&byte| byte == 0).then(|| address.as_slice()[19] as u64)
}

/// Runs the precompile at `address`. Every formula is closed-form: gas is
/// charged up front, and a shortfall consumes the whole frame allowance.
pub(crate) fn execute(address: Address, input: &[u8], gas: u64, fork: Fork) -> Execution {
    let index = match precompile_index(address) {
        Some(index) => index,
        None => return Execution::failure(VmError::InvalidOpcode(0)),
    };
    match index {
        ECRECOVER => fixed_cost(gas, 3000, || ecrecover(input)),
        SHA256 => per_word(gas, input, 60, 12, |data| Sha256::digest(data).to_vec()),
        RIPEMD160 => per_word(gas, input, 600, 120, |data| {
            let mut out = vec![0u8; 12];
            out.extend_from_slice(&Ripemd160::digest(data));
            out
        }),
        IDENTITY => per_word(gas, input, 15, 3, <[u8]>::to_vec),
        MODEXP => modexp(input, gas),
        BN_ADD => fixed_cost(gas, if fork.at_least(Fork::Istanbul) { 150 } else { 500 }, || {
            bn_add(input)
        }),
        BN_MUL => {
            fixed_cost(gas, if fork.at_least(Fork::Istanbul) { 6000 } else { 40_000 }, || {
                bn_mul(input)
            })
        }
        BN_PAIRING => bn_pairing(input, gas, fork),
        BLAKE2F => blake2f(input, gas),
        _ => Execution::failure(VmError::InvalidOpcode(0)),
    }
}

/// Charges a flat cost, then runs `f`; `Err` from `f` is a frame fault.
fn fixed_cost(
    gas: u64,
    cost: u64,
    f: impl FnOnce() -> Result<Vec<u8>, VmError>,
) -> Execution {
    if cost > gas {
        return Execution::failure(VmError::OutOfGas);
    }
    match f() {
        Ok(output) => Execution::success(gas - cost, output.into()),
        Err(err) => Execution::failure(err),
    }
}

/// Charges `base + word · words(input)`, then maps the input.
fn per_word(
    gas: u64,
    input: &[u8],
    base: u64,
    word: u64,
    f: impl FnOnce(&[u8]) -> Vec<u8>,
) -> Execution {
    let cost = base + word * gas::words_for(input.len() as u64);
    if cost > gas {
        return Execution::failure(VmError::OutOfGas);
    }
    Execution::success(gas - cost, f(input).into())
}

/// Reads a 32-byte span of `input`, zero-padded past the end.
fn padded_word(input: &[u8], offset: usize) -> [u8; 32] {
    let mut word = [0u8; 32];
    if offset < input.len() {
        let available = (input.len() - offset).min(32);
        word[..available].copy_from_slice(&input[offset..offset + available]);
    }
    word
}

/// Reads an arbitrary span of `input`, zero-padded past the end.
fn padded_slice(input: &[u8], offset: usize, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    if offset < input.len() {
        let available = (input.len() - offset).min(len);
        out[..available].copy_from_slice(&input[offset..offset + available]);
    }
    out
}

/// 0x01: recover the signing address. Unrecoverable inputs yield an empty
/// output, not a fault.
fn ecrecover(input: &[u8]) -> Result<Vec<u8>, VmError> {
    let hash = padded_word(input, 0);
    let v = padded_word(input, 32);
    let r = padded_word(input, 64);
    let s = padded_word(input, 96);

    // v is a 32-byte big-endian 27 or 28.
    if v[..31].iter().any(|&byte| byte != 0) || !matches!(v[31], 27 | 28) {
        return Ok(Vec::new());
    }

    let mut scalars = [0u8; 64];
    scalars[..32].copy_from_slice(&r);
    scalars[32..].copy_from_slice(&s);
    let Ok(signature) = Signature::from_slice(&scalars) else {
        return Ok(Vec::new());
    };
    let Some(recovery_id) = RecoveryId::from_byte(v[31] - 27) else {
        return Ok(Vec::new());
    };
    let Ok(key) = VerifyingKey::recover_from_prehash(&hash, &signature, recovery_id) else {
        return Ok(Vec::new());
    };

    let address = &keccak256(&key.to_encoded_point(false).as_bytes()[1..])[12..];
    let mut output = vec![0u8; 12];
    output.extend_from_slice(address);
    Ok(output)
}

/// 0x05: modular exponentiation with the EIP-198 gas schedule.
fn modexp(input: &[u8], gas: u64) -> Execution {
    let base_len = U256::from_be_bytes(padded_word(input, 0));
    let exp_len = U256::from_be_bytes(padded_word(input, 32));
    let mod_len = U256::from_be_bytes(padded_word(input, 64));

    // Lengths beyond the addressable range price as unpayable.
    let (Ok(base_len), Ok(exp_len), Ok(mod_len)) = (
        usize::try_from(base_len),
        usize::try_from(exp_len),
        usize::try_from(mod_len),
    ) else {
        return Execution::failure(VmError::OutOfGas);
    };

    let exp_head = padded_slice(input, 96 + base_len, exp_len.min(32));
    let adjusted_exp_len = adjusted_exponent_length(exp_len, &exp_head);
    let complexity = mult_complexity(base_len.max(mod_len) as u64);
    let cost = complexity.saturating_mul(adjusted_exp_len.max(1)) / 20;
    if cost > u128::from(gas) {
        return Execution::failure(VmError::OutOfGas);
    }
    let cost = cost as u64;

    let base = BigUint::from_bytes_be(&padded_slice(input, 96, base_len));
    let exponent = BigUint::from_bytes_be(&padded_slice(input, 96 + base_len, exp_len));
    let modulus = BigUint::from_bytes_be(&padded_slice(input, 96 + base_len + exp_len, mod_len));

    let result = if modulus.is_zero() {
        BigUint::zero()
    } else if modulus.is_one() {
        BigUint::zero()
    } else {
        base.modpow(&exponent, &modulus)
    };

    let bytes = result.to_bytes_be();
    let mut output = vec![0u8; mod_len.saturating_sub(bytes.len())];
    output.extend_from_slice(&bytes[bytes.len().saturating_sub(mod_len)..]);
    Execution::success(gas - cost, output.into())
}

/// The EIP-198 multiplication complexity curve.
fn mult_complexity(len: u64) -> u128 {
    let len = u128::from(len);
    if len <= 64 {
        len * len
    } else if len <= 1024 {
        len * len / 4 + 96 * len - 3072
    } else {
        len * len / 16 + 480 * len - 199_680
    }
}

/// The EIP-198 adjusted exponent length.
fn adjusted_exponent_length(exp_len: usize, exp_head: &[u8]) -> u128 {
    let head_bits = BigUint::from_bytes_be(exp_head).bits();
    let head_term = head_bits.saturating_sub(1) as u128;
    if exp_len <= 32 {
        head_term
    } else {
        8 * (exp_len as u128 - 32) + head_term
    }
}

/// Parses an alt-bn128 G1 point from two 32-byte coordinates.
fn read_g1(input: &[u8], offset: usize) -> Result<bn::G1, VmError> {
    use bn::{AffineG1, Fq, Group, G1};
    let x = Fq::from_slice(&padded_word(input, offset)).map_err(|_| VmError::OutOfGas)?;
    let y = Fq::from_slice(&padded_word(input, offset + 32)).map_err(|_| VmError::OutOfGas)?;
    if x == Fq::zero() && y == Fq::zero() {
        Ok(G1::zero())
    } else {
        AffineG1::new(x, y).map(Into::into).map_err(|_| VmError::OutOfGas)
    }
}

/// Writes a G1 point as two 32-byte coordinates, the origin for infinity.
fn write_g1(point: bn::G1) -> Vec<u8> {
    use bn::AffineG1;
    let mut output = vec![0u8; 64];
    if let Some(affine) = AffineG1::from_jacobian(point) {
        // Writing into a 32-byte buffer cannot fail.
        let _ = affine.x().to_big_endian(&mut output[..32]);
        let _ = affine.y().to_big_endian(&mut output[32..]);
    }
    output
}

/// 0x06: alt-bn128 point addition.
fn bn_add(input: &[u8]) -> Result<Vec<u8>, VmError> {
    let a = read_g1(input, 0)?;
    let b = read_g1(input, 64)?;
    Ok(write_g1(a + b))
}

/// 0x07: alt-bn128 scalar multiplication.
fn bn_mul(input: &[u8]) -> Result<Vec<u8>, VmError> {
    use bn::Fr;
    let point = read_g1(input, 0)?;
    let scalar = Fr::from_slice(&padded_word(input, 64)).map_err(|_| VmError::OutOfGas)?;
    Ok(write_g1(point * scalar))
}

/// 0x08: alt-bn128 pairing product check.
fn bn_pairing(input: &[u8], gas: u64, fork: Fork) -> Execution {
    use bn::{AffineG2, Fq, Fq2, Group, G2};

    if input.len() % 192 != 0 {
        return Execution::failure(VmError::OutOfGas);
    }
    let pairs = (input.len() / 192) as u64;
    let cost = if fork.at_least(Fork::Istanbul) {
        45_000 + 34_000 * pairs
    } else {
        100_000 + 80_000 * pairs
    };
    if cost > gas {
        return Execution::failure(VmError::OutOfGas);
    }

    let mut points = Vec::with_capacity(pairs as usize);
    for pair in 0..pairs as usize {
        let offset = pair * 192;
        let g1 = match read_g1(input, offset) {
            Ok(point) => point,
            Err(err) => return Execution::failure(err),
        };

        // G2 coordinates arrive imaginary-part first.
        let read_fq = |at: usize| {
            Fq::from_slice(&padded_word(input, at)).map_err(|_| VmError::OutOfGas)
        };
        let g2 = (|| {
            let x = Fq2::new(read_fq(offset + 96)?, read_fq(offset + 64)?);
            let y = Fq2::new(read_fq(offset + 160)?, read_fq(offset + 128)?);
            if x == Fq2::zero() && y == Fq2::zero() {
                Ok(G2::zero())
            } else {
                AffineG2::new(x, y).map(Into::into).map_err(|_| VmError::OutOfGas)
            }
        })();
        let g2 = match g2 {
            Ok(point) => point,
            Err(err) => return Execution::failure(err),
        };
        points.push((g1, g2));
    }

    let satisfied = bn::pairing_batch(&points) == bn::Gt::one();
    let mut output = vec![0u8; 32];
    output[31] = satisfied as u8;
    Execution::success(gas - cost, output.into())
}

/// The BLAKE2b sigma permutation table.
const SIGMA: [[usize; 16]; 10] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15],
    [14, 10, 4, 8, 9, 15, 13, 6, 1, 12, 0, 2, 11, 7, 5, 3],
    [11, 8, 12, 0, 5, 2, 15, 13, 10, 14, 3, 6, 7, 1, 9, 4],
    [7, 9, 3, 1, 13, 12, 11, 14, 2, 6, 5, 10, 4, 0, 15, 8],
    [9, 0, 5, 7, 2, 4, 10, 15, 14, 1, 11, 12, 6, 8, 3, 13],
    [2, 12, 6, 10, 0, 11, 8, 3, 4, 13, 7, 5, 15, 14, 1, 9],
    [12, 5, 1, 15, 14, 13, 4, 10, 0, 7, 6, 3, 9, 2, 8, 11],
    [13, 11, 7, 14, 12, 1, 3, 9, 5, 0, 15, 4, 8, 6, 2, 10],
    [6, 15, 14, 9, 11, 3, 0, 8, 12, 2, 13, 7, 1, 4, 10, 5],
    [10, 2, 8, 4, 7, 6, 1, 5, 15, 11, 9, 14, 3, 12, 13, 0],
];

/// The BLAKE2b IV.
const IV: [u64; 8] = [
    0x6a09e667f3bcc908,
    0xbb67ae8584caa73b,
    0x3c6ef372fe94f82b,
    0xa54ff53a5f1d36f1,
    0x510e527fade682d1,
    0x9b05688c2b3e6c1f,
    0x1f83d9abfb41bd6b,
    0x5be0cd19137e2179,
];

/// 0x09: the EIP-152 BLAKE2b compression function. Gas is one per round.
fn blake2f(input: &[u8], gas: u64) -> Execution {
    if input.len() != 213 {
        return Execution::failure(VmError::OutOfGas);
    }
    let rounds = u32::from_be_bytes(input[..4].try_into().expect("length checked"));
    let flag = input[212];
    if flag > 1 {
        return Execution::failure(VmError::OutOfGas);
    }
    if u64::from(rounds) > gas {
        return Execution::failure(VmError::OutOfGas);
    }

    let mut h = [0u64; 8];
    for (i, word) in h.iter_mut().enumerate() {
        *word = u64::from_le_bytes(input[4 + i * 8..12 + i * 8].try_into().expect("sized"));
    }
    let mut m = [0u64; 16];
    for (i, word) in m.iter_mut().enumerate() {
        *word = u64::from_le_bytes(input[68 + i * 8..76 + i * 8].try_into().expect("sized"));
    }
    let t = [
        u64::from_le_bytes(input[196..204].try_into().expect("sized")),
        u64::from_le_bytes(input[204..212].try_into().expect("sized")),
    ];

    blake2_compress(&mut h, &m, t, flag == 1, rounds);

    let mut output = Vec::with_capacity(64);
    for word in h {
        output.extend_from_slice(&word.to_le_bytes());
    }
    Execution::success(gas - u64::from(rounds), output.into())
}

/// The BLAKE2b F compression function (RFC 7693).
fn blake2_compress(h: &mut [u64; 8], m: &[u64; 16], t: [u64; 2], last: bool, rounds: u32) {
    let mut v = [0u64; 16];
    v[..8].copy_from_slice(h);
    v[8..].copy_from_slice(&IV);
    v[12] ^= t[0];
    v[13] ^= t[1];
    if last {
        v[14] = !v[14];
    }

    let g = |v: &mut [u64; 16], a: usize, b: usize, c: usize, d: usize, x: u64, y: u64| {
        v[a] = v[a].wrapping_add(v[b]).wrapping_add(x);
        v[d] = (v[d] ^ v[a]).rotate_right(32);
        v[c] = v[c].wrapping_add(v[d]);
        v[b] = (v[b] ^ v[c]).rotate_right(24);
        v[a] = v[a].wrapping_add(v[b]).wrapping_add(y);
        v[d] = (v[d] ^ v[a]).rotate_right(16);
        v[c] = v[c].wrapping_add(v[d]);
        v[b] = (v[b] ^ v[c]).rotate_right(63);
    };

    for round in 0..rounds as usize {
        let s = &SIGMA[round % 10];
        g(&mut v, 0, 4, 8, 12, m[s[0]], m[s[1]]);
        g(&mut v, 1, 5, 9, 13, m[s[2]], m[s[3]]);
        g(&mut v, 2, 6, 10, 14, m[s[4]], m[s[5]]);
        g(&mut v, 3, 7, 11, 15, m[s[6]], m[s[7]]);
        g(&mut v, 0, 5, 10, 15, m[s[8]], m[s[9]]);
        g(&mut v, 1, 6, 11, 12, m[s[10]], m[s[11]]);
        g(&mut v, 2, 7, 8, 13, m[s[12]], m[s[13]]);
        g(&mut v, 3, 4, 9, 14, m[s[14]], m[s[15]]);
    }

    for i in 0..8 {
        h[i] ^= v[i] ^ v[i + 8];
    }
}
