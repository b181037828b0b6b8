//! AES-256-CFB private-key encryption.
//!
//! Ciphertext is the same length as the plaintext, which keeps the 32-byte
//! private-key slot of the address entry layout exact. The feedback register
//! starts at the entry IV and is fed the previous ciphertext block.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes256;
use rand::RngCore;

use salvage_core::hashes::checksum4;
use salvage_core::SecureBytes;

use crate::error::WalletError;

pub const IV_LEN: usize = 16;
pub const KEY_LEN: usize = 32;

fn cipher_for(key: &SecureBytes) -> Result<Aes256, WalletError> {
    Aes256::new_from_slice(key.as_slice()).map_err(|e| WalletError::Cipher(e.to_string()))
}

fn keystream_block(cipher: &Aes256, feedback: &[u8; 16]) -> [u8; 16] {
    let mut block = GenericArray::clone_from_slice(feedback);
    cipher.encrypt_block(&mut block);
    block.into()
}

pub fn encrypt(
    key: &SecureBytes,
    iv: &[u8; IV_LEN],
    plain: &SecureBytes,
) -> Result<SecureBytes, WalletError> {
    let cipher = cipher_for(key)?;
    let mut feedback = *iv;
    let mut out = Vec::with_capacity(plain.len());
    for chunk in plain.as_slice().chunks(16) {
        let keystream = keystream_block(&cipher, &feedback);
        let mut block = [0u8; 16];
        for (i, byte) in chunk.iter().enumerate() {
            block[i] = byte ^ keystream[i];
        }
        out.extend_from_slice(&block[..chunk.len()]);
        feedback = block;
    }
    Ok(SecureBytes::new(out))
}

pub fn decrypt(
    key: &SecureBytes,
    iv: &[u8; IV_LEN],
    ciphertext: &SecureBytes,
) -> Result<SecureBytes, WalletError> {
    let cipher = cipher_for(key)?;
    let mut feedback = *iv;
    let mut out = Vec::with_capacity(ciphertext.len());
    for chunk in ciphertext.as_slice().chunks(16) {
        let keystream = keystream_block(&cipher, &feedback);
        for (i, byte) in chunk.iter().enumerate() {
            out.push(byte ^ keystream[i]);
        }
        let mut next = [0u8; 16];
        next[..chunk.len()].copy_from_slice(chunk);
        feedback = next;
    }
    Ok(SecureBytes::new(out))
}

/// Fresh IV from the OS cryptographic RNG.
pub fn random_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    rand::rngs::OsRng.fill_bytes(&mut iv);
    iv
}

/// Header verification value for a derived KDF key: the key's own 4-byte
/// checksum. Cheap to compare, reveals nothing usable about the key.
pub fn key_check(kdf_key: &SecureBytes) -> [u8; 4] {
    checksum4(kdf_key.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SecureBytes {
        SecureBytes::from_slice(&[0x7a; KEY_LEN])
    }

    #[test]
    fn roundtrip_32_bytes() {
        let iv = [0x01; IV_LEN];
        let plain = SecureBytes::from_slice(&[0xc5; 32]);
        let encrypted = encrypt(&key(), &iv, &plain).unwrap();
        assert_eq!(encrypted.len(), 32);
        assert_ne!(encrypted.as_slice(), plain.as_slice());
        let decrypted = decrypt(&key(), &iv, &encrypted).unwrap();
        assert_eq!(decrypted, plain);
    }

    #[test]
    fn wrong_key_garbles() {
        let iv = [0x02; IV_LEN];
        let plain = SecureBytes::from_slice(&[0x11; 32]);
        let encrypted = encrypt(&key(), &iv, &plain).unwrap();
        let other = SecureBytes::from_slice(&[0x7b; KEY_LEN]);
        let decrypted = decrypt(&other, &iv, &encrypted).unwrap();
        assert_ne!(decrypted, plain);
    }

    #[test]
    fn iv_matters() {
        let plain = SecureBytes::from_slice(&[0x33; 32]);
        let a = encrypt(&key(), &[0x00; IV_LEN], &plain).unwrap();
        let b = encrypt(&key(), &[0x01; IV_LEN], &plain).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn bad_key_length_rejected() {
        let short = SecureBytes::from_slice(&[0u8; 16]);
        let err = encrypt(&short, &[0; IV_LEN], &SecureBytes::from_slice(&[0; 32]));
        assert!(matches!(err, Err(WalletError::Cipher(_))));
    }

    #[test]
    fn key_check_is_stable_and_key_specific() {
        assert_eq!(key_check(&key()), key_check(&key()));
        assert_ne!(
            key_check(&key()),
            key_check(&SecureBytes::from_slice(&[0x7b; KEY_LEN]))
        );
    }
}
