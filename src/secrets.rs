use std::fs;
use std::path::{Path, PathBuf};

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use gavelbet_sdk::KeySigner;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

pub const ENV_KEY_PREFIX: &str = "GAVELBET_KEY_";

#[derive(Error, Debug)]
pub enum SecretError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Wrong password")]
    WrongPassword,

    #[error("no key named {0}")]
    Unknown(String),

    #[error("invalid key {name}: {reason}")]
    Invalid { name: String, reason: String },
}

/// Resolves a named role (`wallet`, `oracle`, `counterparty`, ...) to its
/// signing key.
pub trait SecretProvider: Send + Sync {
    fn signing_key(&self, name: &str) -> Result<KeySigner, SecretError>;
}

fn invalid(name: &str, e: impl std::fmt::Display) -> SecretError {
    SecretError::Invalid {
        name: name.to_string(),
        reason: e.to_string(),
    }
}

fn check_name(name: &str) -> Result<(), SecretError> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(invalid(name, "key names are [A-Za-z0-9_-]+"))
    }
}

// ============================================================================
// Encrypted key store
// ============================================================================

#[derive(Serialize, Deserialize)]
struct EncryptedKeyFile {
    salt: String,
    nonce: String,
    ciphertext: String,
}

/// Password-protected seeds, one `<name>.key.json` per role: argon2 derives
/// the AES-256-GCM key from the password.
pub struct EncryptedKeyStore {
    dir: PathBuf,
}

impl EncryptedKeyStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join("keys"),
        }
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.key.json"))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.file_path(name).exists()
    }

    /// Generate a fresh key for `name` and store it. Returns the new signer.
    pub fn create(&self, name: &str, password: &str) -> Result<KeySigner, SecretError> {
        let seed = Zeroizing::new(rand::random::<[u8; 32]>());
        self.save(name, &seed, password)?;
        Ok(KeySigner::from_seed(&seed))
    }

    pub fn save(&self, name: &str, seed: &[u8; 32], password: &str) -> Result<(), SecretError> {
        check_name(name)?;
        let salt: [u8; 16] = rand::random();
        let cipher = derive_cipher(password, &salt)?;
        let nonce_bytes: [u8; 12] = rand::random();
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, seed.as_slice())
            .map_err(|e| SecretError::Crypto(e.to_string()))?;

        let file = EncryptedKeyFile {
            salt: BASE64.encode(salt),
            nonce: BASE64.encode(nonce_bytes),
            ciphertext: BASE64.encode(ciphertext),
        };

        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(&file)?;
        fs::write(self.file_path(name), json)?;
        tracing::info!(key = name, "stored key");
        Ok(())
    }

    pub fn load(&self, name: &str, password: &str) -> Result<KeySigner, SecretError> {
        check_name(name)?;
        let path = self.file_path(name);
        if !path.exists() {
            return Err(SecretError::Unknown(name.to_string()));
        }
        let contents = fs::read_to_string(path)?;
        let file: EncryptedKeyFile = serde_json::from_str(&contents)?;

        let salt = BASE64
            .decode(&file.salt)
            .map_err(|e| SecretError::Crypto(e.to_string()))?;
        let cipher = derive_cipher(password, &salt)?;
        let nonce_bytes = BASE64
            .decode(&file.nonce)
            .map_err(|e| SecretError::Crypto(e.to_string()))?;
        if nonce_bytes.len() != 12 {
            return Err(SecretError::Crypto("nonce must be 12 bytes".into()));
        }
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = BASE64
            .decode(&file.ciphertext)
            .map_err(|e| SecretError::Crypto(e.to_string()))?;

        let plaintext = Zeroizing::new(
            cipher
                .decrypt(nonce, ciphertext.as_ref())
                .map_err(|_| SecretError::WrongPassword)?,
        );
        let seed: &[u8; 32] = plaintext
            .as_slice()
            .try_into()
            .map_err(|_| invalid(name, "stored seed is not 32 bytes"))?;
        Ok(KeySigner::from_seed(seed))
    }

    /// Bind a password so the store can serve as a [`SecretProvider`].
    pub fn unlock(self, password: &str) -> UnlockedKeyStore {
        UnlockedKeyStore {
            store: self,
            password: Zeroizing::new(password.to_string()),
        }
    }
}

fn derive_cipher(password: &str, salt: &[u8]) -> Result<Aes256Gcm, SecretError> {
    let mut key_bytes = Zeroizing::new([0u8; 32]);
    argon2::Argon2::default()
        .hash_password_into(password.as_bytes(), salt, key_bytes.as_mut_slice())
        .map_err(|e| SecretError::Crypto(e.to_string()))?;
    Aes256Gcm::new_from_slice(key_bytes.as_slice()).map_err(|e| SecretError::Crypto(e.to_string()))
}

pub struct UnlockedKeyStore {
    store: EncryptedKeyStore,
    password: Zeroizing<String>,
}

impl SecretProvider for UnlockedKeyStore {
    fn signing_key(&self, name: &str) -> Result<KeySigner, SecretError> {
        self.store.load(name, &self.password)
    }
}

// ============================================================================
// Environment and cardano-cli key files
// ============================================================================

/// Hex seeds from `GAVELBET_KEY_<NAME>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecretProvider;

impl EnvSecretProvider {
    pub fn var_name(name: &str) -> String {
        format!("{ENV_KEY_PREFIX}{}", name.to_ascii_uppercase().replace('-', "_"))
    }
}

impl SecretProvider for EnvSecretProvider {
    fn signing_key(&self, name: &str) -> Result<KeySigner, SecretError> {
        check_name(name)?;
        let value = std::env::var(Self::var_name(name))
            .map(Zeroizing::new)
            .map_err(|_| SecretError::Unknown(name.to_string()))?;
        KeySigner::from_seed_hex(&value).map_err(|e| invalid(name, e))
    }
}

/// cardano-cli `<name>.skey` files in one directory.
pub struct FileSecretProvider {
    dir: PathBuf,
}

impl FileSecretProvider {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }
}

impl SecretProvider for FileSecretProvider {
    fn signing_key(&self, name: &str) -> Result<KeySigner, SecretError> {
        check_name(name)?;
        let path = self.dir.join(format!("{name}.skey"));
        if !path.exists() {
            return Err(SecretError::Unknown(name.to_string()));
        }
        let envelope = Zeroizing::new(fs::read_to_string(path)?);
        KeySigner::from_text_envelope(&envelope).map_err(|e| invalid(name, e))
    }
}

/// Tries each provider in order; the first one that knows the name wins.
pub struct ChainedSecretProvider {
    providers: Vec<Box<dyn SecretProvider>>,
}

impl ChainedSecretProvider {
    pub fn new(providers: Vec<Box<dyn SecretProvider>>) -> Self {
        Self { providers }
    }
}

impl SecretProvider for ChainedSecretProvider {
    fn signing_key(&self, name: &str) -> Result<KeySigner, SecretError> {
        for provider in &self.providers {
            match provider.signing_key(name) {
                Err(SecretError::Unknown(_)) => continue,
                other => return other,
            }
        }
        Err(SecretError::Unknown(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypted_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = EncryptedKeyStore::new(dir.path());
        assert!(!store.exists("oracle"));

        let created = store.create("oracle", "hunter2").unwrap();
        assert!(store.exists("oracle"));
        let loaded = store.load("oracle", "hunter2").unwrap();
        assert_eq!(loaded.public_key_hash(), created.public_key_hash());

        let provider = store.unlock("hunter2");
        assert_eq!(
            provider.signing_key("oracle").unwrap().public_key_hash(),
            created.public_key_hash()
        );
    }

    #[test]
    fn wrong_password() {
        let dir = tempfile::tempdir().unwrap();
        let store = EncryptedKeyStore::new(dir.path());
        store.create("wallet", "right").unwrap();
        assert!(matches!(
            store.load("wallet", "wrong"),
            Err(SecretError::WrongPassword)
        ));
    }

    #[test]
    fn file_holds_no_plain_seed() {
        let dir = tempfile::tempdir().unwrap();
        let store = EncryptedKeyStore::new(dir.path());
        let seed = rand::random::<[u8; 32]>();
        store.save("counterparty", &seed, "pw").unwrap();
        let raw = fs::read_to_string(dir.path().join("keys/counterparty.key.json")).unwrap();
        assert!(!raw.contains(&hex::encode(seed)));
        assert!(!raw.contains(&BASE64.encode(seed)));
    }

    #[test]
    fn unknown_and_bad_names() {
        let dir = tempfile::tempdir().unwrap();
        let provider = EncryptedKeyStore::new(dir.path()).unlock("pw");
        assert!(matches!(
            provider.signing_key("nobody"),
            Err(SecretError::Unknown(_))
        ));
        assert!(matches!(
            provider.signing_key("../etc"),
            Err(SecretError::Invalid { .. })
        ));
    }

    #[test]
    fn skey_files() {
        let dir = tempfile::tempdir().unwrap();
        let seed = rand::random::<[u8; 32]>();
        let envelope = format!(
            r#"{{"type":"PaymentSigningKeyShelley_ed25519","description":"Payment Signing Key","cborHex":"5820{}"}}"#,
            hex::encode(seed)
        );
        fs::write(dir.path().join("oracle.skey"), envelope).unwrap();

        let provider = FileSecretProvider::new(dir.path());
        let key = provider.signing_key("oracle").unwrap();
        assert_eq!(
            key.public_key_hash(),
            KeySigner::from_seed(&seed).public_key_hash()
        );
    }

    #[test]
    fn env_provider_reads_hex_seed() {
        let seed = rand::random::<[u8; 32]>();
        let name = "env-test-player";
        std::env::set_var(EnvSecretProvider::var_name(name), hex::encode(seed));
        assert_eq!(
            EnvSecretProvider::var_name(name),
            "GAVELBET_KEY_ENV_TEST_PLAYER"
        );
        let key = EnvSecretProvider.signing_key(name).unwrap();
        assert_eq!(
            key.public_key_hash(),
            KeySigner::from_seed(&seed).public_key_hash()
        );
        assert!(matches!(
            EnvSecretProvider.signing_key("env-test-absent"),
            Err(SecretError::Unknown(_))
        ));
    }

    #[test]
    fn chain_falls_through_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let seed = rand::random::<[u8; 32]>();
        let store = EncryptedKeyStore::new(dir.path());
        store.save("oracle", &seed, "pw").unwrap();

        let chained = ChainedSecretProvider::new(vec![
            Box::new(FileSecretProvider::new(dir.path())),
            Box::new(EncryptedKeyStore::new(dir.path()).unlock("pw")),
        ]);
        assert_eq!(
            chained.signing_key("oracle").unwrap().public_key_hash(),
            KeySigner::from_seed(&seed).public_key_hash()
        );
        assert!(matches!(
            chained.signing_key("missing"),
            Err(SecretError::Unknown(_))
        ));
    }
}
