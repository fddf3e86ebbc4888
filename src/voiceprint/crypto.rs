use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use anyhow::Result;
use rand::{RngCore, rngs::OsRng};
use uuid::Uuid;

/// Encrypts an embedding using the voiceprint key and row context (AAD).
/// Returns `nonce (12 bytes) || ciphertext`.
///
/// # Errors
/// Returns an error if encryption fails.
pub fn encrypt_embedding(
    key: &[u8],
    embedding: &[u8],
    account_id: Uuid,
    voiceprint_id: Uuid,
) -> Result<Vec<u8>> {
    let key = Key::<Aes256Gcm>::from_slice(key); // 32 bytes
    let cipher = Aes256Gcm::new(key);

    let mut nonce_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let aad = construct_aad(account_id, voiceprint_id);
    let payload = Payload {
        msg: embedding,
        aad: &aad,
    };

    let ciphertext = cipher
        .encrypt(nonce, payload)
        .map_err(|e| anyhow::anyhow!("Encryption failure: {e}"))?;

    let mut result = Vec::with_capacity(nonce_bytes.len() + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);

    Ok(result)
}

/// Decrypts a stored embedding blob.
/// Expects `data` to be `nonce (12 bytes) || ciphertext`.
///
/// # Errors
/// Returns an error if decryption fails or if the ciphertext is too short.
pub fn decrypt_embedding(
    key: &[u8],
    data: &[u8],
    account_id: Uuid,
    voiceprint_id: Uuid,
) -> Result<Vec<u8>> {
    if data.len() < 12 {
        return Err(anyhow::anyhow!("Invalid ciphertext length"));
    }

    let (nonce_bytes, ciphertext) = data.split_at(12);
    let nonce = Nonce::from_slice(nonce_bytes);

    let key = Key::<Aes256Gcm>::from_slice(key);
    let cipher = Aes256Gcm::new(key);

    let aad = construct_aad(account_id, voiceprint_id);
    let payload = Payload {
        msg: ciphertext,
        aad: &aad,
    };

    let plaintext = cipher
        .decrypt(nonce, payload)
        .map_err(|e| anyhow::anyhow!("Decryption failure: {e}"))?;

    Ok(plaintext)
}

fn construct_aad(account_id: Uuid, voiceprint_id: Uuid) -> Vec<u8> {
    // AAD = "voiceprint:v1|account_id|voiceprint_id"
    format!("voiceprint:v1|{account_id}|{voiceprint_id}").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_encrypt_decrypt_roundtrip() {
        let key = [42u8; 32];
        let embedding = b"not-really-an-embedding";
        let account_id = Uuid::new_v4();
        let voiceprint_id = Uuid::new_v4();

        let encrypted = encrypt_embedding(&key, embedding, account_id, voiceprint_id).unwrap();
        assert_ne!(encrypted, embedding);
        assert!(encrypted.len() > embedding.len());

        let decrypted = decrypt_embedding(&key, &encrypted, account_id, voiceprint_id).unwrap();
        assert_eq!(decrypted, embedding);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_decrypt_fails_wrong_row_binding() {
        let key = [42u8; 32];
        let account_id = Uuid::new_v4();
        let voiceprint_id = Uuid::new_v4();

        let encrypted = encrypt_embedding(&key, b"secret", account_id, voiceprint_id).unwrap();

        // A blob moved to another account's row must not decrypt.
        let result = decrypt_embedding(&key, &encrypted, Uuid::new_v4(), voiceprint_id);
        assert!(result.is_err());
    }

    #[test]
    #[allow(clippy::unwrap_used, clippy::indexing_slicing)]
    fn test_decrypt_fails_tampered_ciphertext() {
        let key = [42u8; 32];
        let account_id = Uuid::new_v4();
        let voiceprint_id = Uuid::new_v4();

        let mut encrypted = encrypt_embedding(&key, b"secret", account_id, voiceprint_id).unwrap();

        let len = encrypted.len();
        if let Some(byte) = encrypted.get_mut(len - 1) {
            *byte ^= 0xFF;
        }

        let result = decrypt_embedding(&key, &encrypted, account_id, voiceprint_id);
        assert!(result.is_err());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_decrypt_rejects_short_blob() {
        let key = [42u8; 32];
        let result = decrypt_embedding(&key, &[0u8; 5], Uuid::new_v4(), Uuid::new_v4());
        assert!(result.is_err());
    }
}
