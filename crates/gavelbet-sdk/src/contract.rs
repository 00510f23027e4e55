use minicbor::Decoder;
use minicbor::data::Type;
use serde::Deserialize;

use crate::address::Address;
use crate::error::{Error, Result};
use crate::hashing::{ScriptHash, blake2b_224};
use crate::network::Network;
use crate::plutus::PlutusData;

/// Language tag prepended to Plutus V3 scripts before hashing.
const PLUTUS_V3_TAG: u8 = 0x03;

/// A compiled Plutus V3 validator, ready for address derivation and spending.
///
/// The validators in this system take no parameters, so every logical auction
/// or bet shares one address per compiled program. Individual instances are
/// told apart only by their datum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledValidator {
    script_bytes: Vec<u8>,
    hash: ScriptHash,
    address: Address,
    network: Network,
}

#[derive(Debug, Deserialize)]
struct Blueprint {
    #[serde(default)]
    preamble: Option<BlueprintPreamble>,
    validators: Vec<BlueprintValidator>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlueprintPreamble {
    #[serde(default)]
    plutus_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlueprintValidator {
    title: String,
    #[serde(default)]
    compiled_code: Option<String>,
    #[serde(default)]
    hash: Option<String>,
    #[serde(default)]
    parameters: Vec<serde_json::Value>,
}

impl CompiledValidator {
    /// Resolve a compiled program and its parameters into the executable form
    /// and the contract address.
    ///
    /// `compiled_code` is hex, either the ledger form (one CBOR byte-string
    /// wrapping the flat program) or the doubly wrapped form some tooling emits.
    pub fn resolve(compiled_code: &str, parameters: &[PlutusData], network: Network) -> Result<Self> {
        if !parameters.is_empty() {
            return Err(Error::Compilation(format!(
                "validator expects no parameters, {} supplied",
                parameters.len()
            )));
        }
        let raw = hex::decode(compiled_code.trim())
            .map_err(|e| Error::Compilation(format!("compiled code is not hex: {e}")))?;
        if raw.is_empty() {
            return Err(Error::Compilation("compiled code is empty".into()));
        }
        let script_bytes = normalize_script_bytes(raw)?;
        let hash = script_hash(&script_bytes);
        Ok(Self {
            address: Address::enterprise_script(network, hash),
            script_bytes,
            hash,
            network,
        })
    }

    /// Load a validator from an Aiken `plutus.json` blueprint by title. A bare
    /// title such as `auction.auction` also matches its `.spend` entry.
    pub fn from_blueprint(blueprint_json: &str, title: &str, network: Network) -> Result<Self> {
        let blueprint: Blueprint = serde_json::from_str(blueprint_json)
            .map_err(|e| Error::Compilation(format!("invalid blueprint: {e}")))?;

        if let Some(version) = blueprint.preamble.and_then(|p| p.plutus_version) {
            if !version.eq_ignore_ascii_case("v3") {
                return Err(Error::Compilation(format!(
                    "unsupported plutus version {version}, expected v3"
                )));
            }
        }

        let spend_title = format!("{title}.spend");
        let entry = blueprint
            .validators
            .iter()
            .find(|v| v.title == title)
            .or_else(|| blueprint.validators.iter().find(|v| v.title == spend_title))
            .ok_or_else(|| Error::Compilation(format!("validator {title} not in blueprint")))?;

        if !entry.parameters.is_empty() {
            return Err(Error::Compilation(format!(
                "validator {} is parameterized ({} parameters)",
                entry.title,
                entry.parameters.len()
            )));
        }
        let code = entry
            .compiled_code
            .as_deref()
            .ok_or_else(|| Error::Compilation(format!("validator {} has no code", entry.title)))?;

        let validator = Self::resolve(code, &[], network)?;

        if let Some(declared) = &entry.hash {
            let declared: ScriptHash = declared
                .parse()
                .map_err(|e| Error::Compilation(format!("bad blueprint hash: {e}")))?;
            if declared != validator.hash {
                return Err(Error::Compilation(format!(
                    "blueprint hash {declared} does not match compiled code hash {}",
                    validator.hash
                )));
            }
        }

        log::debug!("loaded validator {} at {}", entry.title, validator.address);
        Ok(validator)
    }

    /// Script bytes as carried in the witness set.
    pub fn script_bytes(&self) -> &[u8] {
        &self.script_bytes
    }

    pub fn hash(&self) -> ScriptHash {
        self.hash
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn network(&self) -> Network {
        self.network
    }
}

pub fn script_hash(script_bytes: &[u8]) -> ScriptHash {
    let mut tagged = Vec::with_capacity(script_bytes.len() + 1);
    tagged.push(PLUTUS_V3_TAG);
    tagged.extend_from_slice(script_bytes);
    ScriptHash(blake2b_224(&tagged))
}

/// Reduce any of the common serializations to one CBOR byte-string wrap.
fn normalize_script_bytes(raw: Vec<u8>) -> Result<Vec<u8>> {
    match unwrap_bytestring(&raw) {
        Some(inner) if unwrap_bytestring(&inner).is_some() => Ok(inner),
        Some(_) => Ok(raw),
        None => {
            // Bare flat program.
            let mut enc = minicbor::Encoder::new(Vec::new());
            enc.bytes(&raw)?;
            Ok(enc.into_writer())
        }
    }
}

/// Content of `bytes` if it is exactly one CBOR byte string.
fn unwrap_bytestring(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut d = Decoder::new(bytes);
    match d.datatype().ok()? {
        Type::Bytes | Type::BytesIndef => {}
        _ => return None,
    }
    let content = crate::plutus::decode_bytes(&mut d).ok()?;
    (d.position() == bytes.len()).then_some(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    // `(program 1.1.0 (con unit ()))` as flat, wrapped once.
    const SINGLE: &str = "46010100002499";

    #[test]
    fn wrapping_forms_resolve_to_same_hash() {
        let single = CompiledValidator::resolve(SINGLE, &[], Network::Preview).unwrap();
        let double =
            CompiledValidator::resolve(&format!("47{SINGLE}"), &[], Network::Preview).unwrap();
        let bare = CompiledValidator::resolve(&SINGLE[2..], &[], Network::Preview).unwrap();
        assert_eq!(single.hash(), double.hash());
        assert_eq!(single.hash(), bare.hash());
        assert_eq!(single.script_bytes(), hex::decode(SINGLE).unwrap().as_slice());
    }

    #[test]
    fn address_is_deterministic_and_script_locked() {
        let a = CompiledValidator::resolve(SINGLE, &[], Network::Preprod).unwrap();
        let b = CompiledValidator::resolve(SINGLE, &[], Network::Preprod).unwrap();
        assert_eq!(a.address(), b.address());
        assert!(a.address().is_script());
        assert_eq!(a.address().to_bytes()[0], 0x70);
        assert_eq!(
            a.hash(),
            ScriptHash(blake2b_224(&hex::decode(format!("03{SINGLE}")).unwrap()))
        );
    }

    #[test]
    fn parameters_are_rejected() {
        let err =
            CompiledValidator::resolve(SINGLE, &[PlutusData::integer(1)], Network::Preview)
                .unwrap_err();
        assert!(matches!(err, Error::Compilation(_)));
    }

    #[test]
    fn blueprint_lookup_and_hash_check() {
        let hash = script_hash(&hex::decode(SINGLE).unwrap());
        let json = format!(
            r#"{{"preamble":{{"plutusVersion":"v3"}},"validators":[
                {{"title":"auction.auction.spend","compiledCode":"{SINGLE}","hash":"{hash}"}}
            ]}}"#
        );
        let v = CompiledValidator::from_blueprint(&json, "auction.auction", Network::Preview)
            .unwrap();
        assert_eq!(v.hash(), hash);

        let wrong = json.replace(&hash.to_string(), &"00".repeat(28));
        assert!(CompiledValidator::from_blueprint(&wrong, "auction.auction", Network::Preview)
            .is_err());
        assert!(CompiledValidator::from_blueprint(&json, "bet.bet", Network::Preview).is_err());
    }

    #[test]
    fn parameterized_blueprint_rejected() {
        let json = format!(
            r#"{{"validators":[{{"title":"bet.bet.spend","compiledCode":"{SINGLE}",
                "parameters":[{{"title":"oracle"}}]}}]}}"#
        );
        assert!(CompiledValidator::from_blueprint(&json, "bet.bet", Network::Preview).is_err());
    }
}
