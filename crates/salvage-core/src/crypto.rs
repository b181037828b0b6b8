//! secp256k1 primitives for Armory-style deterministic wallets.
//!
//! Public keys are 65-byte uncompressed SEC1 points, private keys raw
//! 32-byte scalars. The deterministic chain step multiplies a key by
//! `hash256(parent_pub) XOR chaincode`. The scalar is computed from the
//! parent's *public* key on both sides, so the public and private chains
//! stay in lockstep: `pub(chain(priv)) == chain(pub(priv))`.

use secp256k1::{PublicKey, Scalar, SecretKey, SECP256K1};

use crate::error::CryptoError;
use crate::hashes::hash256;
use crate::secure::SecureBytes;
use crate::types::ChainCode;

/// Uncompressed SEC1 public key length.
pub const PUBKEY_LEN: usize = 65;

/// Raw private key length.
pub const PRIVKEY_LEN: usize = 32;

/// True iff `pub65` is a 65-byte uncompressed encoding of a point on the curve.
pub fn verify_public_key(pub65: &[u8]) -> bool {
    pub65.len() == PUBKEY_LEN && pub65[0] == 0x04 && PublicKey::from_slice(pub65).is_ok()
}

pub fn compute_public_key(priv32: &[u8]) -> Result<[u8; PUBKEY_LEN], CryptoError> {
    let sk = SecretKey::from_slice(priv32).map_err(|_| CryptoError::InvalidPrivateKey)?;
    Ok(PublicKey::from_secret_key(SECP256K1, &sk).serialize_uncompressed())
}

/// True iff `priv32` is a valid private key whose public key is `pub65`.
pub fn check_pub_priv_match(priv32: &[u8], pub65: &[u8]) -> bool {
    match compute_public_key(priv32) {
        Ok(computed) => computed[..] == *pub65,
        Err(_) => false,
    }
}

/// The chain-step scalar: `hash256(pub65) XOR chaincode`.
pub fn chain_scalar(pub65: &[u8], chaincode: &ChainCode) -> [u8; 32] {
    let mut out = hash256(pub65);
    for (byte, code) in out.iter_mut().zip(chaincode.as_bytes()) {
        *byte ^= code;
    }
    out
}

/// One public-key chain step: `scalar(pub, chaincode) · pub`.
pub fn compute_chained_public_key(
    pub65: &[u8],
    chaincode: &ChainCode,
) -> Result<[u8; PUBKEY_LEN], CryptoError> {
    let pk = PublicKey::from_slice(pub65).map_err(|_| CryptoError::InvalidPublicKey)?;
    let scalar = Scalar::from_be_bytes(chain_scalar(pub65, chaincode))
        .map_err(|_| CryptoError::InvalidChainScalar)?;
    let child = pk
        .mul_tweak(SECP256K1, &scalar)
        .map_err(|_| CryptoError::PointArithmetic)?;
    Ok(child.serialize_uncompressed())
}

/// One private-key chain step, using the scalar of the corresponding public key.
pub fn compute_chained_private_key(
    priv32: &SecureBytes,
    chaincode: &ChainCode,
) -> Result<SecureBytes, CryptoError> {
    let sk = SecretKey::from_slice(priv32.as_slice()).map_err(|_| CryptoError::InvalidPrivateKey)?;
    let parent_pub = PublicKey::from_secret_key(SECP256K1, &sk).serialize_uncompressed();
    let scalar = Scalar::from_be_bytes(chain_scalar(&parent_pub, chaincode))
        .map_err(|_| CryptoError::InvalidChainScalar)?;
    let child = sk
        .mul_tweak(&scalar)
        .map_err(|_| CryptoError::PointArithmetic)?;
    Ok(SecureBytes::from_slice(&child.secret_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn privkey(fill: u8) -> SecureBytes {
        SecureBytes::from_slice(&[fill; 32])
    }

    #[test]
    fn generator_from_scalar_one() {
        let mut one = [0u8; 32];
        one[31] = 1;
        let pubkey = compute_public_key(&one).unwrap();
        assert_eq!(
            hex::encode(pubkey),
            "0479be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798\
             483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8"
        );
    }

    #[test]
    fn pub_priv_match() {
        let sk = privkey(0x11);
        let pk = compute_public_key(sk.as_slice()).unwrap();
        assert!(check_pub_priv_match(sk.as_slice(), &pk));
        assert!(!check_pub_priv_match(&[0x22u8; 32], &pk));
    }

    #[test]
    fn rejects_invalid_private_keys() {
        assert!(compute_public_key(&[0u8; 32]).is_err());
        assert!(compute_public_key(&[0u8; 31]).is_err());
        assert!(!check_pub_priv_match(&[0u8; 32], &[4u8; 65]));
    }

    #[test]
    fn verify_public_key_rules() {
        let pk = compute_public_key(privkey(0x33).as_slice()).unwrap();
        assert!(verify_public_key(&pk));

        let mut compressed_prefix = pk;
        compressed_prefix[0] = 0x02;
        assert!(!verify_public_key(&compressed_prefix));

        let mut off_curve = pk;
        off_curve[64] ^= 0x01;
        assert!(!verify_public_key(&off_curve));

        assert!(!verify_public_key(&pk[..64]));
    }

    #[test]
    fn public_and_private_chains_agree() {
        let chaincode = ChainCode::from_bytes([0x5c; 32]);
        let parent_priv = privkey(0x77);
        let parent_pub = compute_public_key(parent_priv.as_slice()).unwrap();

        let child_pub = compute_chained_public_key(&parent_pub, &chaincode).unwrap();
        let child_priv = compute_chained_private_key(&parent_priv, &chaincode).unwrap();
        assert_eq!(compute_public_key(child_priv.as_slice()).unwrap(), child_pub);
    }

    #[test]
    fn chain_step_is_deterministic_and_index_sensitive() {
        let parent = compute_public_key(privkey(0x41).as_slice()).unwrap();
        let cc1 = ChainCode::from_bytes([1; 32]);
        let cc2 = ChainCode::from_bytes([2; 32]);

        assert_eq!(
            compute_chained_public_key(&parent, &cc1).unwrap(),
            compute_chained_public_key(&parent, &cc1).unwrap()
        );
        assert_ne!(
            compute_chained_public_key(&parent, &cc1).unwrap(),
            compute_chained_public_key(&parent, &cc2).unwrap()
        );
    }

    #[test]
    fn chained_key_differs_from_parent() {
        let chaincode = ChainCode::from_bytes([0x99; 32]);
        let parent = compute_public_key(privkey(0x55).as_slice()).unwrap();
        let child = compute_chained_public_key(&parent, &chaincode).unwrap();
        assert_ne!(parent, child);
        assert!(verify_public_key(&child));
    }
}
