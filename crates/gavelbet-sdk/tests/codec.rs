use gavelbet_sdk::plutus::datum_hash;
use gavelbet_sdk::testing::{auction_validator, bet_validator};
use gavelbet_sdk::{
    AuctionAction, AuctionState, AuctionStatus, BetAction, BetState, CompiledValidator,
    FromPlutusData, KeyHash, Network, PlutusData, ToPlutusData,
};

fn hex_of(data: &PlutusData) -> String {
    hex::encode(data.to_cbor().unwrap())
}

#[test]
fn structured_data_vectors() {
    assert_eq!(hex_of(&PlutusData::unit(0)), "d87980");
    assert_eq!(hex_of(&PlutusData::unit(1)), "d87a80");
    assert_eq!(
        hex_of(&PlutusData::constr(0, vec![PlutusData::integer(5)])),
        "d8799f05ff"
    );
    assert_eq!(hex_of(&PlutusData::unit(7)), "d9050080");
    assert_eq!(hex_of(&PlutusData::bytes([0x01])), "4101");
    assert_eq!(hex_of(&PlutusData::integer(1_000_000)), "1a000f4240");
}

#[test]
fn redeemers_are_tagged_constructors() {
    assert_eq!(hex_of(&AuctionAction::bid().to_plutus_data()), "d87a80");
    assert_eq!(hex_of(&BetAction::timeout().to_plutus_data()), "d87b80");
    assert_eq!(
        hex_of(&BetAction::join(1_000_000).to_plutus_data()),
        "d8799f1a000f4240ff"
    );
}

#[test]
fn auction_state_roundtrip_and_hash_identity() {
    let seller = KeyHash([0x11; 28]);
    let deployed = AuctionState::deployed(seller, "Painting#1", 1_800_000_000_000);
    let (live, outbid) = deployed
        .started(100_000_000)
        .outbid_by(KeyHash([0x22; 28]), 150_000_000);

    for state in [&deployed, &live, &outbid] {
        let cbor = state.to_plutus_data().to_cbor().unwrap();
        let back = AuctionState::from_plutus_data(&PlutusData::from_cbor(&cbor).unwrap()).unwrap();
        assert_eq!(&back, state);
        assert_eq!(datum_hash(&back).unwrap(), datum_hash(state).unwrap());
    }

    assert_eq!(outbid.status, AuctionStatus::Outbid);
    assert_ne!(datum_hash(&live).unwrap(), datum_hash(&outbid).unwrap());
    assert_ne!(datum_hash(&deployed).unwrap(), datum_hash(&live).unwrap());
}

#[test]
fn bet_state_boundaries() {
    let zero = BetState::new(
        KeyHash([0; 28]),
        0,
        KeyHash([1; 28]),
        KeyHash([2; 28]),
        0,
    );
    let max = BetState {
        wager: u64::MAX,
        deadline: u64::MAX,
        ..zero.clone()
    };
    for state in [&zero, &max, &zero.joined()] {
        let cbor = state.to_plutus_data().to_cbor().unwrap();
        let back = BetState::from_plutus_data(&PlutusData::from_cbor(&cbor).unwrap()).unwrap();
        assert_eq!(&back, state);
    }
    assert!(max.pot().is_err());
    assert_ne!(datum_hash(&zero).unwrap(), datum_hash(&zero.joined()).unwrap());
}

#[test]
fn boolean_as_plain_integer_is_rejected() {
    let state = BetState::new(
        KeyHash([0; 28]),
        1,
        KeyHash([1; 28]),
        KeyHash([2; 28]),
        10,
    );
    let mut data = state.to_plutus_data();
    if let PlutusData::Constr { fields, .. } = &mut data {
        fields[5] = PlutusData::integer(0);
    }
    assert!(BetState::from_plutus_data(&data).is_err());
}

#[test]
fn validator_addresses_are_deterministic() {
    let a = auction_validator();
    let again = CompiledValidator::resolve("46010100002499", &[], Network::Preview).unwrap();
    assert_eq!(a.address(), again.address());
    assert_eq!(a.hash(), again.hash());
    assert_ne!(a.address(), bet_validator().address());
    assert!(a.address().is_script());
    assert!(a.address().to_bech32().unwrap().starts_with("addr_test1w"));

    let mainnet = CompiledValidator::resolve("46010100002499", &[], Network::Mainnet).unwrap();
    assert_eq!(mainnet.hash(), a.hash());
    assert_ne!(mainnet.address(), a.address());
}

#[test]
fn blueprint_hash_must_match_code() {
    let v = auction_validator();
    let blueprint = format!(
        r#"{{"preamble":{{"plutusVersion":"v3"}},"validators":[{{"title":"auction.auction.spend","compiledCode":"46010100002499","hash":"{}"}}]}}"#,
        v.hash()
    );
    let loaded = CompiledValidator::from_blueprint(&blueprint, "auction.auction", Network::Preview).unwrap();
    assert_eq!(loaded, v);

    let wrong = blueprint.replace(&v.hash().to_string(), &"00".repeat(28));
    assert!(CompiledValidator::from_blueprint(&wrong, "auction.auction", Network::Preview).is_err());
}
