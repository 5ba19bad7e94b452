//! Payload security descriptor and decryption.
//!
//! AES strategies decrypt every 16-byte block independently with the same
//! key and no chaining, which is the mode the device firmware uses.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, KeyInit};
use aes::{Aes128, Aes256};

use crate::error::PmdError;
use crate::settings::PmdSettingType;

const AES_BLOCK: usize = 16;

/// Decryption strategy and its wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PmdSecretStrategy {
    None = 0,
    Xor = 1,
    Aes128 = 2,
    Aes256 = 3,
}

impl PmdSecretStrategy {
    pub fn from_u8(code: u8) -> Result<Self, PmdError> {
        match code {
            0 => Ok(Self::None),
            1 => Ok(Self::Xor),
            2 => Ok(Self::Aes128),
            3 => Ok(Self::Aes256),
            other => Err(PmdError::format(format!("unknown security strategy {other}"))),
        }
    }

    /// Exact key length the strategy requires.
    pub const fn key_size(self) -> usize {
        match self {
            Self::None => 0,
            Self::Xor => 1,
            Self::Aes128 => 16,
            Self::Aes256 => 32,
        }
    }
}

/// Strategy plus key, validated at construction.
#[derive(Clone, PartialEq, Eq)]
pub struct PmdSecret {
    strategy: PmdSecretStrategy,
    key: Vec<u8>,
}

impl std::fmt::Debug for PmdSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PmdSecret")
            .field("strategy", &self.strategy)
            .field("key_len", &self.key.len())
            .finish()
    }
}

impl PmdSecret {
    pub fn new(strategy: PmdSecretStrategy, key: impl Into<Vec<u8>>) -> Result<Self, PmdError> {
        let key: Vec<u8> = key.into();
        if key.len() != strategy.key_size() {
            return Err(PmdError::format(format!(
                "{strategy:?} needs a {}-byte key, got {}",
                strategy.key_size(),
                key.len()
            )));
        }
        Ok(Self { strategy, key })
    }

    pub fn strategy(&self) -> PmdSecretStrategy {
        self.strategy
    }

    /// Decrypt a frame payload.
    pub fn decrypt(&self, cipher: &[u8]) -> Result<Vec<u8>, PmdError> {
        match self.strategy {
            PmdSecretStrategy::None => Ok(cipher.to_vec()),
            PmdSecretStrategy::Xor => Ok(cipher.iter().map(|b| b ^ self.key[0]).collect()),
            PmdSecretStrategy::Aes128 => {
                let aes = Aes128::new_from_slice(&self.key)
                    .map_err(|_| PmdError::format("AES-128 key rejected"))?;
                decrypt_blocks(&aes, cipher)
            }
            PmdSecretStrategy::Aes256 => {
                let aes = Aes256::new_from_slice(&self.key)
                    .map_err(|_| PmdError::format("AES-256 key rejected"))?;
                decrypt_blocks(&aes, cipher)
            }
        }
    }

    /// `[SECURITY type][0x01][strategy] ++ key`
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(3 + self.key.len());
        out.push(PmdSettingType::Security as u8);
        out.push(0x01);
        out.push(self.strategy as u8);
        out.extend_from_slice(&self.key);
        out
    }
}

fn decrypt_blocks<C: BlockDecrypt>(aes: &C, cipher: &[u8]) -> Result<Vec<u8>, PmdError> {
    if cipher.len() % AES_BLOCK != 0 {
        return Err(PmdError::format(format!(
            "AES payload of {} bytes is not a whole number of blocks",
            cipher.len()
        )));
    }
    let mut plain = cipher.to_vec();
    for chunk in plain.chunks_exact_mut(AES_BLOCK) {
        aes.decrypt_block(GenericArray::from_mut_slice(chunk));
    }
    Ok(plain)
}

#[cfg(test)]
mod tests {
    use super::*;

    // FIPS-197 appendix C vectors
    const PLAIN: [u8; 16] = [
        0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE,
        0xFF,
    ];
    const AES128_CIPHER: [u8; 16] = [
        0x69, 0xC4, 0xE0, 0xD8, 0x6A, 0x7B, 0x04, 0x30, 0xD8, 0xCD, 0xB7, 0x80, 0x70, 0xB4, 0xC5,
        0x5A,
    ];
    const AES256_CIPHER: [u8; 16] = [
        0x8E, 0xA2, 0xB7, 0xCA, 0x51, 0x67, 0x45, 0xBF, 0xEA, 0xFC, 0x49, 0x90, 0x4B, 0x49, 0x60,
        0x89,
    ];

    fn key(len: u8) -> Vec<u8> {
        (0..len).collect()
    }

    #[test]
    fn key_length_must_match_strategy() {
        assert!(PmdSecret::new(PmdSecretStrategy::None, vec![]).is_ok());
        assert!(PmdSecret::new(PmdSecretStrategy::None, vec![1]).is_err());
        assert!(PmdSecret::new(PmdSecretStrategy::Xor, vec![]).is_err());
        assert!(PmdSecret::new(PmdSecretStrategy::Aes128, key(15)).is_err());
        assert!(PmdSecret::new(PmdSecretStrategy::Aes256, key(16)).is_err());
        assert!(PmdSecretStrategy::from_u8(4).is_err());
    }

    #[test]
    fn none_is_identity() {
        let s = PmdSecret::new(PmdSecretStrategy::None, vec![]).unwrap();
        assert_eq!(s.decrypt(&[1, 2, 3]).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn xor_is_its_own_inverse() {
        let s = PmdSecret::new(PmdSecretStrategy::Xor, vec![0x5A]).unwrap();
        let plain: Vec<u8> = (0..=255).collect();
        let cipher = s.decrypt(&plain).unwrap();
        assert_ne!(cipher, plain);
        assert_eq!(s.decrypt(&cipher).unwrap(), plain);
    }

    #[test]
    fn aes128_known_answer() {
        let s = PmdSecret::new(PmdSecretStrategy::Aes128, key(16)).unwrap();
        assert_eq!(s.decrypt(&AES128_CIPHER).unwrap(), PLAIN.to_vec());
    }

    #[test]
    fn aes256_known_answer() {
        let s = PmdSecret::new(PmdSecretStrategy::Aes256, key(32)).unwrap();
        assert_eq!(s.decrypt(&AES256_CIPHER).unwrap(), PLAIN.to_vec());
    }

    #[test]
    fn identical_blocks_decrypt_identically() {
        let s = PmdSecret::new(PmdSecretStrategy::Aes128, key(16)).unwrap();
        let mut cipher = AES128_CIPHER.to_vec();
        cipher.extend_from_slice(&[0u8; 16]);
        cipher.extend_from_slice(&AES128_CIPHER);
        let plain = s.decrypt(&cipher).unwrap();
        assert_eq!(&plain[..16], &plain[32..]);
        assert_eq!(&plain[..16], &PLAIN);
        assert!(s.decrypt(&cipher[..20]).is_err());
    }

    #[test]
    fn serialized_descriptor_layout() {
        let s = PmdSecret::new(PmdSecretStrategy::Xor, vec![0xAB]).unwrap();
        assert_eq!(s.serialize(), vec![0x06, 0x01, 0x01, 0xAB]);
        let s = PmdSecret::new(PmdSecretStrategy::Aes256, key(32)).unwrap();
        let bytes = s.serialize();
        assert_eq!(&bytes[..3], &[0x06, 0x01, 0x03]);
        assert_eq!(&bytes[3..], key(32).as_slice());
    }
}
