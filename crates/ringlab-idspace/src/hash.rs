use sha1::{Digest, Sha1};

use crate::{mod_pow2, Id};

/// Hash an opaque key onto the `m`-bit ring: `SHA-1(key)` read as a
/// big-endian unsigned integer, reduced mod `2^m`.
///
/// Only the low 64 bits of the 160-bit digest ever matter here, since `m` is
/// capped at 64 - reducing mod `2^m` for `m <= 64` only ever depends on a
/// number's low 64 bits, whatever its full width.
pub fn hash_key(key: impl AsRef<[u8]>, m: u32) -> Id {
    let digest = Sha1::digest(key.as_ref());
    let low8: [u8; 8] = digest[12..20].try_into().expect("sha1 digest is 20 bytes");
    mod_pow2(u64::from_be_bytes(low8), m)
}
