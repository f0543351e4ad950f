use std::path::Path;

/// Hybrid file encryption capability.
///
/// `inputs[i]` is encrypted into `outputs[i]` under one symmetric key, and
/// that key is wrapped for `public_key` and written to `key_output`.
pub trait CryptoProvider: Send + Sync {
    fn encrypt(
        &self,
        inputs: &[&Path],
        outputs: &[&Path],
        public_key: &[u8],
        key_output: &Path,
    ) -> Result<(), String>;

    /// Algorithm identifier (e.g., "X25519-HKDF-SHA256+AES-256-GCM").
    fn algorithm(&self) -> &str;
}
