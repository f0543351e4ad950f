use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::traits::crypto_provider::CryptoProvider;

pub const ALGORITHM: &str = "X25519-HKDF-SHA256+AES-256-GCM";

/// Plaintext bytes per encrypted chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

pub const NONCE_SIZE: usize = 12;
pub const TAG_SIZE: usize = 16;
const DATA_KEY_SIZE: usize = 32;

/// `ephemeral public key || nonce || sealed data key (+ tag)`
pub const KEY_FILE_SIZE: usize = 32 + NONCE_SIZE + DATA_KEY_SIZE + TAG_SIZE;

const HKDF_INFO: &[u8] = b"crashcam key wrap v1";

/// Hybrid `CryptoProvider`: AES-256-GCM file encryption under a fresh data
/// key, with the data key sealed for an X25519 public key.
///
/// ## Encrypted file format
/// ```text
/// [Chunk 0: 4-byte LE length | nonce (12) + ciphertext + tag (16)]
/// [Chunk 1: ...]
/// ...
/// ```
/// Each chunk authenticates `index (u64 LE) || last (u8)` as associated
/// data, so reordered or dropped chunks fail to decrypt, and so does a file
/// cut at a chunk boundary. An empty input still produces one (empty) final
/// chunk.
///
/// ## Key file format
/// ```text
/// [ephemeral X25519 public key (32)] [nonce (12)] [sealed data key (32 + 16)]
/// ```
/// The key-encryption key is HKDF-SHA256 over the X25519 shared secret,
/// salted with `ephemeral public || recipient public`.
#[derive(Debug, Clone)]
pub struct HybridEncryptor {
    chunk_size: usize,
}

impl HybridEncryptor {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }
}

impl Default for HybridEncryptor {
    fn default() -> Self {
        Self::new()
    }
}

impl CryptoProvider for HybridEncryptor {
    fn encrypt(
        &self,
        inputs: &[&Path],
        outputs: &[&Path],
        public_key: &[u8],
        key_output: &Path,
    ) -> Result<(), String> {
        if inputs.len() != outputs.len() {
            return Err(format!(
                "{} inputs but {} outputs",
                inputs.len(),
                outputs.len()
            ));
        }
        let recipient: [u8; 32] = public_key
            .try_into()
            .map_err(|_| format!("public key must be 32 bytes, got {}", public_key.len()))?;
        let recipient = PublicKey::from(recipient);

        let data_key = Aes256Gcm::generate_key(&mut OsRng);
        let cipher = Aes256Gcm::new(&data_key);

        for (input, output) in inputs.iter().zip(outputs) {
            encrypt_file(&cipher, input, output, self.chunk_size)?;
        }

        let wrapped = wrap_key(data_key.as_slice(), &recipient)?;
        fs::write(key_output, wrapped).map_err(|e| format!("failed to write key file: {}", e))?;
        Ok(())
    }

    fn algorithm(&self) -> &str {
        ALGORITHM
    }
}

/// Holder of the X25519 secret that recordings are sealed for.
pub struct HybridDecryptor {
    secret: StaticSecret,
}

impl HybridDecryptor {
    pub fn new(secret: [u8; 32]) -> Self {
        Self {
            secret: StaticSecret::from(secret),
        }
    }

    /// Fresh random key pair.
    pub fn generate() -> Self {
        Self {
            secret: StaticSecret::random_from_rng(OsRng),
        }
    }

    pub fn public_key(&self) -> [u8; 32] {
        PublicKey::from(&self.secret).to_bytes()
    }

    /// Recover the data key from a key file written by `HybridEncryptor`.
    pub fn unwrap_key(&self, key_file: &Path) -> Result<Vec<u8>, String> {
        let bytes = fs::read(key_file).map_err(|e| format!("failed to read key file: {}", e))?;
        if bytes.len() != KEY_FILE_SIZE {
            return Err(format!("key file has {} bytes, expected {}", bytes.len(), KEY_FILE_SIZE));
        }

        let mut ephemeral = [0u8; 32];
        ephemeral.copy_from_slice(&bytes[..32]);
        let ephemeral = PublicKey::from(ephemeral);
        let nonce = Nonce::from_slice(&bytes[32..32 + NONCE_SIZE]);

        let shared = self.secret.diffie_hellman(&ephemeral);
        let kek = derive_kek(shared.as_bytes(), ephemeral.as_bytes(), &self.public_key())?;
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&kek))
            .decrypt(nonce, &bytes[32 + NONCE_SIZE..])
            .map_err(|_| "key unwrap failed".to_string())
    }

    /// Decrypt a file written by `HybridEncryptor` using the key in `key_file`.
    pub fn decrypt_file(&self, key_file: &Path, input: &Path, output: &Path) -> Result<(), String> {
        let data_key = self.unwrap_key(key_file)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&data_key));

        let mut reader = BufReader::new(
            File::open(input).map_err(|e| format!("failed to open {}: {}", input.display(), e))?,
        );
        let mut writer = BufWriter::new(
            File::create(output).map_err(|e| format!("failed to create {}: {}", output.display(), e))?,
        );

        let mut index: u64 = 0;
        loop {
            let mut len_bytes = [0u8; 4];
            match read_full(&mut reader, &mut len_bytes)? {
                0 => return Err(format!("missing final chunk after {} chunks", index)),
                4 => {}
                n => return Err(format!("truncated chunk header ({} bytes)", n)),
            }
            let len = u32::from_le_bytes(len_bytes) as usize;
            if len < NONCE_SIZE + TAG_SIZE {
                return Err(format!("chunk {} too short", index));
            }

            let mut sealed = vec![0u8; len];
            if read_full(&mut reader, &mut sealed)? != len {
                return Err(format!("chunk {} truncated", index));
            }

            let last = reader
                .fill_buf()
                .map_err(|e| format!("read failed: {}", e))?
                .is_empty();
            let aad = chunk_aad(index, last);
            let plain = cipher
                .decrypt(
                    Nonce::from_slice(&sealed[..NONCE_SIZE]),
                    Payload {
                        msg: &sealed[NONCE_SIZE..],
                        aad: &aad,
                    },
                )
                .map_err(|_| format!("chunk {} failed authentication", index))?;
            writer.write_all(&plain).map_err(|e| e.to_string())?;
            if last {
                break;
            }
            index += 1;
        }

        writer.flush().map_err(|e| e.to_string())
    }
}

fn encrypt_file(cipher: &Aes256Gcm, input: &Path, output: &Path, chunk_size: usize) -> Result<(), String> {
    let mut reader = BufReader::new(
        File::open(input).map_err(|e| format!("failed to open {}: {}", input.display(), e))?,
    );
    let file = File::create(output).map_err(|e| format!("failed to create {}: {}", output.display(), e))?;
    let mut writer = BufWriter::new(file);

    let mut current = vec![0u8; chunk_size];
    let mut read = read_full(&mut reader, &mut current)?;
    let mut index: u64 = 0;
    loop {
        // Look one chunk ahead so the final chunk can be flagged.
        let mut next = vec![0u8; chunk_size];
        let next_read = if read == chunk_size {
            read_full(&mut reader, &mut next)?
        } else {
            0
        };
        let last = next_read == 0;

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let aad = chunk_aad(index, last);
        let ciphertext = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: &current[..read],
                    aad: &aad,
                },
            )
            .map_err(|e| format!("AES-GCM encryption failed: {}", e))?;

        let chunk_length = ((nonce.len() + ciphertext.len()) as u32).to_le_bytes();
        writer
            .write_all(&chunk_length)
            .and_then(|_| writer.write_all(&nonce))
            .and_then(|_| writer.write_all(&ciphertext))
            .map_err(|e| format!("write failed: {}", e))?;

        if last {
            break;
        }
        current = next;
        read = next_read;
        index += 1;
    }

    let file = writer.into_inner().map_err(|e| format!("flush failed: {}", e))?;
    file.sync_all().map_err(|e| format!("sync failed: {}", e))
}

fn chunk_aad(index: u64, last: bool) -> [u8; 9] {
    let mut aad = [0u8; 9];
    aad[..8].copy_from_slice(&index.to_le_bytes());
    aad[8] = last as u8;
    aad
}

fn wrap_key(data_key: &[u8], recipient: &PublicKey) -> Result<Vec<u8>, String> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(recipient);
    let kek = derive_kek(shared.as_bytes(), ephemeral_public.as_bytes(), recipient.as_bytes())?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&kek));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let sealed = cipher
        .encrypt(&nonce, data_key)
        .map_err(|e| format!("key wrap failed: {}", e))?;

    let mut out = Vec::with_capacity(KEY_FILE_SIZE);
    out.extend_from_slice(ephemeral_public.as_bytes());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

fn derive_kek(shared: &[u8], ephemeral: &[u8], recipient: &[u8]) -> Result<[u8; 32], String> {
    let mut salt = Vec::with_capacity(64);
    salt.extend_from_slice(ephemeral);
    salt.extend_from_slice(recipient);

    let mut kek = [0u8; 32];
    Hkdf::<Sha256>::new(Some(&salt), shared)
        .expand(HKDF_INFO, &mut kek)
        .map_err(|e| format!("key derivation failed: {}", e))?;
    Ok(kek)
}

/// Read until `buf` is full or EOF. Returns the number of bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize, String> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(format!("read failed: {}", e)),
        }
    }
    Ok(filled)
}
