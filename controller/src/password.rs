use rand::TryRngCore;
use rand::rngs::OsRng;

const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Largest multiple of the charset length below 256, for unbiased sampling.
const SAMPLE_LIMIT: u8 = (256 / ALPHANUMERIC.len() * ALPHANUMERIC.len()) as u8;

/// An alphanumeric password drawn from the OS CSPRNG.
pub fn alphanumeric(len: usize) -> String {
    alphanumeric_with(&mut OsRng, len)
}

pub fn alphanumeric_with<R: TryRngCore>(rng: &mut R, len: usize) -> String {
    let mut password = String::with_capacity(len);
    let mut buf = [0u8; 64];
    while password.len() < len {
        if let Err(err) = rng.try_fill_bytes(&mut buf) {
            tracing::warn!("Random source failed, using timestamp-derived password: {err}");
            return timestamp_fallback(len);
        }
        let remaining = len - password.len();
        password.extend(
            buf.iter()
                .filter(|byte| **byte < SAMPLE_LIMIT)
                .map(|byte| ALPHANUMERIC[*byte as usize % ALPHANUMERIC.len()] as char)
                .take(remaining),
        );
    }
    password
}

/// `bytes` random bytes, hex encoded.
pub fn hex_token(bytes: usize) -> String {
    hex_token_with(&mut OsRng, bytes)
}

pub fn hex_token_with<R: TryRngCore>(rng: &mut R, bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    match rng.try_fill_bytes(&mut buf) {
        Ok(()) => hex::encode(buf),
        Err(err) => {
            tracing::warn!("Random source failed, using timestamp-derived password: {err}");
            timestamp_fallback(bytes * 2)
        }
    }
}

/// Weak entropy: only the clock feeds it.
fn timestamp_fallback(len: usize) -> String {
    let seed = chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default()
        .unsigned_abs();
    (0..len as u64)
        .map(|i| {
            let mixed = seed
                .wrapping_add(i.wrapping_mul(0x9E37_79B9_7F4A_7C15))
                .wrapping_mul(0xBF58_476D_1CE4_E5B9);
            ALPHANUMERIC[(mixed >> 32) as usize % ALPHANUMERIC.len()] as char
        })
        .collect()
}
