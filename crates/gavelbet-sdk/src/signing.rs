use std::collections::HashSet;

use ed25519_dalek::{Signature, VerifyingKey};

use crate::error::{Error, Result};
use crate::hashing::KeyHash;
use crate::tx::{SignedTransaction, Transaction, UnsignedTransaction};
use crate::wallet::TxSigner;

/// Pass the transaction through `signers` in order, each one receiving the
/// bytes produced by the previous one, then check that every required key
/// has a valid witness.
pub async fn collect_signatures(
    unsigned: &UnsignedTransaction,
    signers: &[&dyn TxSigner],
) -> Result<SignedTransaction> {
    let mut bytes = unsigned.bytes().to_vec();
    for (i, signer) in signers.iter().enumerate() {
        bytes = signer.sign_transaction(&bytes, true).await?;
        log::debug!("signature {}/{} collected for {}", i + 1, signers.len(), unsigned.tx_id());
    }

    let tx = Transaction::from_bytes(&bytes)?;
    if tx.id() != unsigned.tx_id() {
        return Err(Error::Signer(format!(
            "signer changed the transaction body ({} -> {})",
            unsigned.tx_id(),
            tx.id()
        )));
    }

    let witnessed = verified_key_hashes(&tx)?;
    let missing: Vec<String> = unsigned
        .required_signers()
        .iter()
        .filter(|k| !witnessed.contains(k))
        .map(|k| k.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(Error::MissingSigner(missing));
    }

    Ok(SignedTransaction::new(bytes, unsigned.tx_id()))
}

/// Key hashes of every vkey witness, after checking each signature against
/// the transaction id.
pub fn verified_key_hashes(tx: &Transaction) -> Result<HashSet<KeyHash>> {
    let tx_id = tx.id();
    let mut keys = HashSet::new();
    for w in &tx.witnesses.vkeys {
        let vkey = VerifyingKey::from_bytes(&w.vkey)
            .map_err(|e| Error::Signer(format!("invalid verification key: {e}")))?;
        vkey.verify_strict(tx_id.as_bytes(), &Signature::from_bytes(&w.signature))
            .map_err(|_| Error::Signer(format!("bad signature from {}", w.key_hash())))?;
        keys.insert(w.key_hash());
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::tx::{FeeBreakdown, TxBody, WitnessSet};
    use crate::wallet::KeySigner;

    fn unsigned(required: Vec<KeyHash>) -> UnsignedTransaction {
        let body = TxBody {
            fee: 170_000,
            required_signers: required.clone(),
            ..Default::default()
        };
        let tx = Transaction::new(body, WitnessSet::default()).unwrap();
        UnsignedTransaction::new(tx.to_bytes().unwrap(), tx.id(), required, FeeBreakdown::default())
    }

    struct Tamperer;

    #[async_trait]
    impl TxSigner for Tamperer {
        async fn sign_transaction(&self, _tx: &[u8], _partial: bool) -> Result<Vec<u8>> {
            let body = TxBody {
                fee: 1,
                ..Default::default()
            };
            Transaction::new(body, WitnessSet::default())?.to_bytes()
        }
    }

    #[tokio::test]
    async fn sequential_signers_cover_requirements() {
        let a = KeySigner::generate(&mut rand::thread_rng());
        let b = KeySigner::generate(&mut rand::thread_rng());
        let tx = unsigned(vec![a.public_key_hash(), b.public_key_hash()]);

        let signed = collect_signatures(&tx, &[&a, &b]).await.unwrap();
        assert_eq!(signed.tx_id(), tx.tx_id());
        let decoded = Transaction::from_bytes(signed.bytes()).unwrap();
        assert_eq!(decoded.witnesses.vkeys.len(), 2);
        assert_eq!(verified_key_hashes(&decoded).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_signer_is_named() {
        let a = KeySigner::generate(&mut rand::thread_rng());
        let b = KeySigner::generate(&mut rand::thread_rng());
        let tx = unsigned(vec![a.public_key_hash(), b.public_key_hash()]);

        match collect_signatures(&tx, &[&a]).await {
            Err(Error::MissingSigner(keys)) => assert_eq!(keys, vec![b.public_key_hash().to_string()]),
            other => panic!("expected MissingSigner, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn body_changes_are_rejected() {
        let a = KeySigner::generate(&mut rand::thread_rng());
        let tx = unsigned(vec![a.public_key_hash()]);
        assert!(matches!(
            collect_signatures(&tx, &[&Tamperer, &a]).await,
            Err(Error::Signer(_))
        ));
    }

    #[tokio::test]
    async fn forged_signature_is_rejected() {
        let a = KeySigner::generate(&mut rand::thread_rng());
        let tx = unsigned(vec![a.public_key_hash()]);
        let mut decoded = Transaction::from_bytes(tx.bytes()).unwrap();
        let mut w = a.witness(&decoded.id());
        w.signature[0] ^= 1;
        decoded.witnesses.add_vkey_witness(w);
        assert!(verified_key_hashes(&decoded).is_err());
    }

    #[tokio::test]
    async fn full_signing_refuses_foreign_requirements() {
        let a = KeySigner::generate(&mut rand::thread_rng());
        let tx = unsigned(vec![a.public_key_hash(), KeyHash([1; 28])]);
        assert!(a.sign_transaction(tx.bytes(), false).await.is_err());
        assert!(a.sign_transaction(tx.bytes(), true).await.is_ok());
    }
}
