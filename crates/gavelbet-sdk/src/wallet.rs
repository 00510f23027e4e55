use std::sync::Arc;

use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};
use rand::RngCore;
use serde::Deserialize;
use zeroize::{Zeroize, Zeroizing};

use crate::address::Address;
use crate::chain::ChainBackend;
use crate::error::{Error, Result};
use crate::hashing::{KeyHash, TxId};
use crate::ledger::UnspentOutput;
use crate::network::Network;
use crate::tx::{Transaction, VKeyWitness};

/// Anything that can add its witness to a transaction.
#[async_trait]
pub trait TxSigner: Send + Sync {
    /// Sign `tx_bytes` and return the transaction with the new witness
    /// appended. With `partial == false` the signer refuses transactions that
    /// declare signers it cannot provide.
    async fn sign_transaction(&self, tx_bytes: &[u8], partial: bool) -> Result<Vec<u8>>;

    /// Key this signer witnesses with, when known up front.
    fn key_hash(&self) -> Option<KeyHash> {
        None
    }
}

/// The acting party's wallet.
#[async_trait]
pub trait Wallet: TxSigner {
    async fn get_spendable_outputs(&self) -> Result<Vec<UnspentOutput>>;

    async fn get_used_addresses(&self) -> Result<Vec<Address>>;

    async fn submit_transaction(&self, tx_bytes: &[u8]) -> Result<TxId>;

    fn as_signer(&self) -> &dyn TxSigner;

    /// Address that receives change and payouts.
    async fn change_address(&self) -> Result<Address> {
        self.get_used_addresses()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Wallet("wallet has no used address".into()))
    }

    /// Payment key hash of the change address.
    async fn payment_key_hash(&self) -> Result<KeyHash> {
        self.change_address()
            .await?
            .payment_key_hash()
            .ok_or_else(|| Error::Wallet("wallet address is not key-locked".into()))
    }
}

/// cardano-cli text envelope for a payment signing key.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextEnvelope {
    #[serde(rename = "type")]
    kind: String,
    cbor_hex: String,
}

/// ed25519 payment key held in process memory. The secret is wiped on drop.
pub struct KeySigner {
    signing_key: SigningKey,
}

impl KeySigner {
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// 32-byte seed as hex.
    pub fn from_seed_hex(seed_hex: &str) -> Result<Self> {
        let bytes = Zeroizing::new(
            hex::decode(seed_hex.trim()).map_err(|e| Error::Signer(format!("bad key hex: {e}")))?,
        );
        let seed: &[u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::Signer(format!("key must be 32 bytes, got {}", bytes.len())))?;
        Ok(Self::from_seed(seed))
    }

    /// cardano-cli `PaymentSigningKeyShelley_ed25519` envelope.
    pub fn from_text_envelope(json: &str) -> Result<Self> {
        let mut envelope: TextEnvelope = serde_json::from_str(json)
            .map_err(|e| Error::Signer(format!("invalid key envelope: {e}")))?;
        if !envelope.kind.starts_with("PaymentSigningKeyShelley") {
            envelope.cbor_hex.zeroize();
            return Err(Error::Signer(format!(
                "unsupported key type {}",
                envelope.kind
            )));
        }
        // CBOR byte string header 0x5820 followed by the seed.
        let hex_seed = envelope
            .cbor_hex
            .strip_prefix("5820")
            .map(|s| Zeroizing::new(s.to_string()));
        envelope.cbor_hex.zeroize();
        let hex_seed =
            hex_seed.ok_or_else(|| Error::Signer("key envelope is not a 32-byte string".into()))?;
        Self::from_seed_hex(&hex_seed)
    }

    pub fn generate<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut seed = Zeroizing::new([0u8; 32]);
        rng.fill_bytes(&mut *seed);
        Self::from_seed(&seed)
    }

    pub fn verification_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn public_key_hash(&self) -> KeyHash {
        KeyHash::of_verification_key(&self.verification_key())
    }

    pub fn enterprise_address(&self, network: Network) -> Address {
        Address::enterprise_key(network, self.public_key_hash())
    }

    /// Witness over the transaction id.
    pub fn witness(&self, tx_id: &TxId) -> VKeyWitness {
        VKeyWitness {
            vkey: self.verification_key(),
            signature: self.signing_key.sign(tx_id.as_bytes()).to_bytes(),
        }
    }
}

impl std::fmt::Debug for KeySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySigner")
            .field("key_hash", &self.public_key_hash())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TxSigner for KeySigner {
    async fn sign_transaction(&self, tx_bytes: &[u8], partial: bool) -> Result<Vec<u8>> {
        let mut tx = Transaction::from_bytes(tx_bytes)?;
        let me = self.public_key_hash();
        if !partial {
            let others: Vec<String> = tx
                .body()
                .required_signers
                .iter()
                .filter(|k| **k != me)
                .map(|k| k.to_string())
                .collect();
            if !others.is_empty() {
                return Err(Error::Signer(format!(
                    "cannot fully sign, also needs {}",
                    others.join(", ")
                )));
            }
        }
        tx.witnesses.add_vkey_witness(self.witness(&tx.id()));
        log::debug!("{me} signed {}", tx.id());
        tx.to_bytes()
    }

    fn key_hash(&self) -> Option<KeyHash> {
        Some(self.public_key_hash())
    }
}

/// Single-key wallet at the key's enterprise address, backed by a chain
/// provider for its outputs.
pub struct KeyWallet {
    signer: KeySigner,
    address: Address,
    chain: Arc<dyn ChainBackend>,
}

impl KeyWallet {
    pub fn new(signer: KeySigner, network: Network, chain: Arc<dyn ChainBackend>) -> Self {
        let address = signer.enterprise_address(network);
        Self {
            signer,
            address,
            chain,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn signer(&self) -> &KeySigner {
        &self.signer
    }
}

#[async_trait]
impl TxSigner for KeyWallet {
    async fn sign_transaction(&self, tx_bytes: &[u8], partial: bool) -> Result<Vec<u8>> {
        self.signer.sign_transaction(tx_bytes, partial).await
    }

    fn key_hash(&self) -> Option<KeyHash> {
        Some(self.signer.public_key_hash())
    }
}

#[async_trait]
impl Wallet for KeyWallet {
    async fn get_spendable_outputs(&self) -> Result<Vec<UnspentOutput>> {
        self.chain.fetch_outputs_at_address(&self.address).await
    }

    async fn get_used_addresses(&self) -> Result<Vec<Address>> {
        Ok(vec![self.address.clone()])
    }

    async fn submit_transaction(&self, tx_bytes: &[u8]) -> Result<TxId> {
        self.chain.submit_transaction(tx_bytes).await
    }

    fn as_signer(&self) -> &dyn TxSigner {
        self
    }
}
