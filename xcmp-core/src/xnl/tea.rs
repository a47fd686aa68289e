//! The 32-round TEA-family block cipher used to compute the authentication
//! response during XNL session establishment. Interoperability-only; no
//! security claim is made about this construction.

/// Key material for the cipher: four 32-bit key words plus the round
/// delta. This is caller-supplied calibration data, not session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeaKey {
    pub k: [u32; 4],
    pub delta: u32,
}

/// Encrypt one 64-bit block, expressed as big-endian (lo, hi) 32-bit
/// halves, running the round in §4.5 of the specification 32 times.
pub fn encrypt(mut lo: u32, mut hi: u32, key: &TeaKey) -> (u32, u32) {
    let mut sum: u32 = 0;
    for _ in 0..32 {
        sum = sum.wrapping_add(key.delta);
        lo = lo.wrapping_add(
            (hi.wrapping_shl(4).wrapping_add(key.k[0]))
                ^ hi.wrapping_add(sum)
                ^ (hi.wrapping_shr(5).wrapping_add(key.k[1])),
        );
        hi = hi.wrapping_add(
            (lo.wrapping_shl(4).wrapping_add(key.k[2]))
                ^ lo.wrapping_add(sum)
                ^ (lo.wrapping_shr(5).wrapping_add(key.k[3])),
        );
    }
    (lo, hi)
}

/// Encrypt an 8-byte plaintext block, each half big-endian, returning the
/// 8-byte ciphertext in the same layout.
pub fn encrypt_block(plaintext: [u8; 8], key: &TeaKey) -> [u8; 8] {
    let lo = u32::from_be_bytes(plaintext[0..4].try_into().unwrap());
    let hi = u32::from_be_bytes(plaintext[4..8].try_into().unwrap());
    let (lo, hi) = encrypt(lo, hi, key);
    let mut out = [0u8; 8];
    out[0..4].copy_from_slice(&lo.to_be_bytes());
    out[4..8].copy_from_slice(&hi.to_be_bytes());
    out
}
