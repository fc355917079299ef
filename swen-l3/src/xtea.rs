//! ## swen-l3::xtea
//! **XTEA block cipher for the association envelope**
//!
//! 32-round XTEA over 8-byte blocks, little-endian word packing. The
//! association layer encrypts its `{length, header, payload}` envelope as
//! one zero-padded unit, block by block.

const DELTA: u32 = 0x9E37_79B9;
const ROUNDS: u32 = 32;

/// XTEA block size in bytes.
pub const BLOCK: usize = 8;

#[derive(Clone)]
pub struct Xtea {
    key: [u32; 4],
}

impl Xtea {
    pub fn new(key: &[u8; 16]) -> Self {
        let mut words = [0u32; 4];
        for (i, word) in words.iter_mut().enumerate() {
            *word = u32::from_le_bytes(key[i * 4..i * 4 + 4].try_into().expect("4-byte chunk"));
        }
        Self { key: words }
    }

    fn encipher(&self, block: [u32; 2]) -> [u32; 2] {
        let [mut v0, mut v1] = block;
        let mut sum = 0u32;
        for _ in 0..ROUNDS {
            v0 = v0.wrapping_add(
                (((v1 << 4) ^ (v1 >> 5)).wrapping_add(v1))
                    ^ sum.wrapping_add(self.key[(sum & 3) as usize]),
            );
            sum = sum.wrapping_add(DELTA);
            v1 = v1.wrapping_add(
                (((v0 << 4) ^ (v0 >> 5)).wrapping_add(v0))
                    ^ sum.wrapping_add(self.key[((sum >> 11) & 3) as usize]),
            );
        }
        [v0, v1]
    }

    fn decipher(&self, block: [u32; 2]) -> [u32; 2] {
        let [mut v0, mut v1] = block;
        let mut sum = DELTA.wrapping_mul(ROUNDS);
        for _ in 0..ROUNDS {
            v1 = v1.wrapping_sub(
                (((v0 << 4) ^ (v0 >> 5)).wrapping_add(v0))
                    ^ sum.wrapping_add(self.key[((sum >> 11) & 3) as usize]),
            );
            sum = sum.wrapping_sub(DELTA);
            v0 = v0.wrapping_sub(
                (((v1 << 4) ^ (v1 >> 5)).wrapping_add(v1))
                    ^ sum.wrapping_add(self.key[(sum & 3) as usize]),
            );
        }
        [v0, v1]
    }

    /// Encrypts `data` in place. Length must be a multiple of [`BLOCK`].
    pub fn encrypt_in_place(&self, data: &mut [u8]) {
        debug_assert_eq!(data.len() % BLOCK, 0, "unpadded envelope");
        for chunk in data.chunks_exact_mut(BLOCK) {
            let block = [
                u32::from_le_bytes(chunk[..4].try_into().expect("block half")),
                u32::from_le_bytes(chunk[4..].try_into().expect("block half")),
            ];
            let out = self.encipher(block);
            chunk[..4].copy_from_slice(&out[0].to_le_bytes());
            chunk[4..].copy_from_slice(&out[1].to_le_bytes());
        }
    }

    /// Decrypts `data` in place. Returns `false` if the length is not a
    /// whole number of blocks (the frame is then dropped).
    #[must_use]
    pub fn decrypt_in_place(&self, data: &mut [u8]) -> bool {
        if data.len() % BLOCK != 0 || data.is_empty() {
            return false;
        }
        for chunk in data.chunks_exact_mut(BLOCK) {
            let block = [
                u32::from_le_bytes(chunk[..4].try_into().expect("block half")),
                u32::from_le_bytes(chunk[4..].try_into().expect("block half")),
            ];
            let out = self.decipher(block);
            chunk[..4].copy_from_slice(&out[0].to_le_bytes());
            chunk[4..].copy_from_slice(&out[1].to_le_bytes());
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 16] = [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E,
        0x0F,
    ];

    #[test]
    fn roundtrip() {
        let cipher = Xtea::new(&KEY);
        let mut data = *b"sixteen byte msg";
        let original = data;
        cipher.encrypt_in_place(&mut data);
        assert_ne!(data, original);
        assert!(cipher.decrypt_in_place(&mut data));
        assert_eq!(data, original);
    }

    #[test]
    fn deterministic_for_fixed_key() {
        let cipher = Xtea::new(&KEY);
        let mut a = [0u8; 8];
        let mut b = [0u8; 8];
        cipher.encrypt_in_place(&mut a);
        cipher.encrypt_in_place(&mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn blocks_are_independent() {
        // ECB: identical blocks encrypt identically.
        let cipher = Xtea::new(&KEY);
        let mut data = [0x42u8; 16];
        cipher.encrypt_in_place(&mut data);
        assert_eq!(data[..8], data[8..]);
    }

    #[test]
    fn rejects_partial_block() {
        let cipher = Xtea::new(&KEY);
        let mut data = [0u8; 7];
        assert!(!cipher.decrypt_in_place(&mut data));
    }

    #[test]
    fn different_keys_differ() {
        let cipher_a = Xtea::new(&KEY);
        let mut other = KEY;
        other[0] ^= 1;
        let cipher_b = Xtea::new(&other);
        let mut a = [0u8; 8];
        let mut b = [0u8; 8];
        cipher_a.encrypt_in_place(&mut a);
        cipher_b.encrypt_in_place(&mut b);
        assert_ne!(a, b);
    }
}
