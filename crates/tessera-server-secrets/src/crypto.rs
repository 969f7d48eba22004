// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! AES-256-GCM primitives.
//!
//! Used for secret bodies (detached tag, caller-supplied AAD) and for wrapping
//! DEKs inside the local key-management provider.

use aes_gcm::{
	aead::{Aead, AeadInPlace, KeyInit, OsRng, Payload},
	Aes256Gcm, Key, Nonce, Tag,
};
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{CryptoError, CryptoResult};

/// Size of encryption keys in bytes (256 bits for AES-256).
pub const KEY_SIZE: usize = 32;

/// Size of AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Generate a random encryption key.
pub fn generate_key() -> Zeroizing<[u8; KEY_SIZE]> {
	let mut key = Zeroizing::new([0u8; KEY_SIZE]);
	OsRng.fill_bytes(key.as_mut());
	key
}

/// Generate a new Data Encryption Key (DEK).
pub fn generate_dek() -> Zeroizing<[u8; KEY_SIZE]> {
	generate_key()
}

/// Generate a random 96-bit nonce.
///
/// Every DEK encrypts exactly one payload, so a random nonce never repeats under a key.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
	let mut nonce = [0u8; NONCE_SIZE];
	OsRng.fill_bytes(&mut nonce);
	nonce
}

/// Encrypts `plaintext` and returns `(ciphertext, tag)`.
pub fn seal(
	key: &[u8; KEY_SIZE],
	nonce: &[u8; NONCE_SIZE],
	aad: &[u8],
	plaintext: &[u8],
) -> CryptoResult<(Vec<u8>, [u8; TAG_SIZE])> {
	let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
	let mut buffer = plaintext.to_vec();

	let tag = cipher
		.encrypt_in_place_detached(Nonce::from_slice(nonce), aad, &mut buffer)
		.map_err(|e| {
			buffer.zeroize();
			CryptoError::EncryptionFailed(format!("secret encryption failed: {e}"))
		})?;

	let mut tag_bytes = [0u8; TAG_SIZE];
	tag_bytes.copy_from_slice(tag.as_slice());
	Ok((buffer, tag_bytes))
}

/// Decrypts and verifies a detached-tag ciphertext.
///
/// On tag mismatch no plaintext is returned and the working buffer is zeroed.
pub fn open(
	key: &[u8],
	nonce: &[u8],
	aad: &[u8],
	ciphertext: &[u8],
	tag: &[u8],
) -> CryptoResult<Zeroizing<Vec<u8>>> {
	if key.len() != KEY_SIZE {
		return Err(CryptoError::AuthenticationFailed);
	}
	if nonce.len() != NONCE_SIZE {
		return Err(CryptoError::InvalidPayload(format!(
			"nonce must be {NONCE_SIZE} bytes, got {}",
			nonce.len()
		)));
	}
	if tag.len() != TAG_SIZE {
		return Err(CryptoError::InvalidPayload(format!(
			"auth tag must be {TAG_SIZE} bytes, got {}",
			tag.len()
		)));
	}

	let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
	let mut buffer = Zeroizing::new(ciphertext.to_vec());

	cipher
		.decrypt_in_place_detached(
			Nonce::from_slice(nonce),
			aad,
			&mut buffer[..],
			Tag::from_slice(tag),
		)
		.map_err(|_| CryptoError::AuthenticationFailed)?;

	Ok(buffer)
}

/// Wraps a DEK under a KEK. Output layout is `nonce || ciphertext || tag`.
pub fn wrap_key(kek: &[u8; KEY_SIZE], dek: &[u8], aad: &[u8]) -> CryptoResult<Vec<u8>> {
	let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(kek));
	let nonce = generate_nonce();

	let ciphertext = cipher
		.encrypt(Nonce::from_slice(&nonce), Payload { msg: dek, aad })
		.map_err(|e| CryptoError::EncryptionFailed(format!("DEK wrap failed: {e}")))?;

	let mut wrapped = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
	wrapped.extend_from_slice(&nonce);
	wrapped.extend_from_slice(&ciphertext);
	Ok(wrapped)
}

/// Unwraps a DEK produced by [`wrap_key`].
pub fn unwrap_key(
	kek: &[u8; KEY_SIZE],
	wrapped: &[u8],
	aad: &[u8],
) -> CryptoResult<Zeroizing<Vec<u8>>> {
	if wrapped.len() < NONCE_SIZE + TAG_SIZE {
		return Err(CryptoError::AuthenticationFailed);
	}
	let (nonce, ciphertext) = wrapped.split_at(NONCE_SIZE);
	let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(kek));

	let plaintext = cipher
		.decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
		.map_err(|_| CryptoError::AuthenticationFailed)?;

	Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn key_generation_produces_unique_keys() {
		let key1 = generate_key();
		let key2 = generate_key();
		assert_ne!(key1.as_slice(), key2.as_slice());
	}

	#[test]
	fn generate_dek_produces_valid_key() {
		let dek = generate_dek();
		assert_eq!(dek.len(), KEY_SIZE);
	}

	#[test]
	fn seal_open_roundtrip() {
		let dek = generate_key();
		let nonce = generate_nonce();
		let (ciphertext, tag) = seal(&dek, &nonce, b"aad", b"super secret value").unwrap();
		let plaintext = open(dek.as_slice(), &nonce, b"aad", &ciphertext, &tag).unwrap();
		assert_eq!(plaintext.as_slice(), b"super secret value");
	}

	#[test]
	fn wrong_aad_fails() {
		let dek = generate_key();
		let nonce = generate_nonce();
		let (ciphertext, tag) = seal(&dek, &nonce, b"tenant-a", b"secret").unwrap();
		let result = open(dek.as_slice(), &nonce, b"tenant-b", &ciphertext, &tag);
		assert!(matches!(result, Err(CryptoError::AuthenticationFailed)));
	}

	#[test]
	fn tampered_tag_fails() {
		let dek = generate_key();
		let nonce = generate_nonce();
		let (ciphertext, mut tag) = seal(&dek, &nonce, b"", b"secret").unwrap();
		tag[0] ^= 0xFF;
		let result = open(dek.as_slice(), &nonce, b"", &ciphertext, &tag);
		assert!(matches!(result, Err(CryptoError::AuthenticationFailed)));
	}

	#[test]
	fn wrong_key_fails_unwrap() {
		let kek1 = generate_key();
		let kek2 = generate_key();
		let dek = generate_key();

		let wrapped = wrap_key(&kek1, dek.as_slice(), b"kek-1").unwrap();
		assert!(unwrap_key(&kek2, &wrapped, b"kek-1").is_err());
		assert_eq!(
			unwrap_key(&kek1, &wrapped, b"kek-1").unwrap().as_slice(),
			dek.as_slice()
		);
	}

	#[test]
	fn truncated_wrapped_key_fails() {
		let kek = generate_key();
		assert!(matches!(
			unwrap_key(&kek, &[0u8; 8], b""),
			Err(CryptoError::AuthenticationFailed)
		));
	}

	#[test]
	fn short_tag_is_rejected_as_invalid_payload() {
		let dek = generate_key();
		let nonce = generate_nonce();
		let result = open(dek.as_slice(), &nonce, b"", b"abc", &[0u8; 4]);
		assert!(matches!(result, Err(CryptoError::InvalidPayload(_))));
	}

	proptest! {
		#[test]
		fn seal_open_roundtrip_arbitrary(plaintext in proptest::collection::vec(any::<u8>(), 0..512)) {
			let dek = generate_key();
			let nonce = generate_nonce();
			let (ciphertext, tag) = seal(&dek, &nonce, b"aad", &plaintext).unwrap();
			let opened = open(dek.as_slice(), &nonce, b"aad", &ciphertext, &tag).unwrap();
			prop_assert_eq!(opened.as_slice(), plaintext.as_slice());
		}

		#[test]
		fn ciphertext_bit_flip_is_detected(plaintext in proptest::collection::vec(any::<u8>(), 1..128), idx in any::<prop::sample::Index>()) {
			let dek = generate_key();
			let nonce = generate_nonce();
			let (mut ciphertext, tag) = seal(&dek, &nonce, b"", &plaintext).unwrap();
			let i = idx.index(ciphertext.len());
			ciphertext[i] ^= 0x01;
			prop_assert!(open(dek.as_slice(), &nonce, b"", &ciphertext, &tag).is_err());
		}
	}
}
