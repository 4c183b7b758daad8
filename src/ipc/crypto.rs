/// Placeholder stream cipher for encrypted IPC payloads.
///
/// This is NOT cryptographically secure: an XOR stream keyed by a counter is
/// trivially breakable given any known-plaintext. It exists to give the
/// `encrypted` queue/shm flag real, testable plumbing (key per object,
/// periodic rotation) ahead of a proper AEAD implementation. Must be replaced
/// by an authenticated cipher (e.g. AES-GCM or ChaCha20-Poly1305) before this
/// kernel handles anything security-sensitive.
use alloc::vec::Vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherKey(pub [u8; 16]);

impl CipherKey {
    pub fn from_seed(object_id: u64, generation: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&object_id.to_le_bytes());
        bytes[8..16].copy_from_slice(&generation.to_le_bytes());
        CipherKey(bytes)
    }
}

/// Keystream rotation interval, in number of messages/accesses encrypted
/// under one key before a new generation is derived.
pub const ROTATE_AFTER_USES: u64 = 4096;

pub struct StreamCipher {
    object_id: u64,
    generation: u64,
    uses: u64,
    key: CipherKey,
}

impl StreamCipher {
    pub fn new(object_id: u64) -> Self {
        let key = CipherKey::from_seed(object_id, 0);
        Self { object_id, generation: 0, uses: 0, key }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn maybe_rotate(&mut self) {
        if self.uses >= ROTATE_AFTER_USES {
            self.generation += 1;
            self.key = CipherKey::from_seed(self.object_id, self.generation);
            self.uses = 0;
        }
    }

    /// XOR `data` in place against a keystream derived from the current key
    /// and a running byte index. Symmetric: call again with the same state
    /// to decrypt.
    pub fn apply(&mut self, data: &mut [u8]) {
        for (i, b) in data.iter_mut().enumerate() {
            let k = self.key.0[i % self.key.0.len()];
            let counter_byte = ((i / self.key.0.len()) as u8).wrapping_add(self.generation as u8);
            *b ^= k ^ counter_byte;
        }
        self.uses += 1;
        self.maybe_rotate();
    }

    pub fn encrypt(&mut self, plaintext: &[u8]) -> Vec<u8> {
        let mut buf = plaintext.to_vec();
        self.apply(&mut buf);
        buf
    }

    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Vec<u8> {
        self.encrypt(ciphertext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_recovers_plaintext() {
        let mut enc = StreamCipher::new(1);
        let mut dec = StreamCipher::new(1);
        let msg = b"hello ipc world, this is a test payload".to_vec();
        let ciphertext = enc.encrypt(&msg);
        assert_ne!(ciphertext, msg);
        let plain = dec.decrypt(&ciphertext);
        assert_eq!(plain, msg);
    }

    #[test]
    fn rotation_changes_keystream() {
        let mut cipher = StreamCipher::new(7);
        let msg = [0xAAu8; 8];
        let first = cipher.encrypt(&msg);
        for _ in 0..ROTATE_AFTER_USES {
            cipher.encrypt(&msg);
        }
        assert!(cipher.generation() >= 1);
        let later = cipher.encrypt(&msg);
        assert_ne!(first, later);
    }

    #[test]
    fn different_objects_get_different_keys() {
        let mut a = StreamCipher::new(1);
        let mut b = StreamCipher::new(2);
        let msg = [0x11u8; 16];
        assert_ne!(a.encrypt(&msg), b.encrypt(&msg));
    }
}
