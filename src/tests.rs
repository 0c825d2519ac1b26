use crate::address::{hash_message, EthPublicKey, LOGIN_MESSAGE};
use crate::crypt::{decrypt_entry, encrypt_entry, key_tag};
use crate::protocol::{DataEntry, Transaction, TransactionBody};
use crate::store::Entry;
use crate::token::{token, Token, BACKUP, ENTRY};
use crate::{Error, Url};
use k256::ecdsa::SigningKey;
use proptest::prelude::*;

fn secret_one() -> SigningKey {
    let mut bytes = [0u8; 32];
    bytes[31] = 1;
    SigningKey::from_slice(&bytes).unwrap()
}

fn public_key(secret: &SigningKey) -> EthPublicKey {
    EthPublicKey::new(secret.verifying_key().to_encoded_point(false).as_bytes()).unwrap()
}

fn personal_sign(secret: &SigningKey, message: &[u8]) -> Vec<u8> {
    let (sig, recid) = secret.sign_prehash_recoverable(&hash_message(message)).unwrap();
    let mut out = sig.to_bytes().to_vec();
    out.push(27 + recid.to_byte());
    out
}

fn note(value: &str) -> Entry {
    Entry::Note {
        value: value.to_string(),
    }
}

#[test]
fn address_of_key_one() {
    let key = public_key(&secret_one());
    assert_eq!(key.ethereum(), "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf");
    assert_eq!(key.address(), "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf");
}

#[test]
fn lite_identity_of_key_one() {
    let key = public_key(&secret_one());
    assert_eq!(
        key.lite_identity().to_string(),
        "acc://7e5f4552091a69125d5dfcb7b8c2659029395bdfee94d755"
    );
}

#[test]
fn compressed_and_raw_keys_derive_the_same_identity() {
    let secret = secret_one();
    let point = secret.verifying_key().to_encoded_point(true);
    let compressed = EthPublicKey::new(point.as_bytes()).unwrap();
    let full = public_key(&secret);
    let raw = EthPublicKey::new(&full.public_key()[1..]).unwrap();
    assert_eq!(compressed, full);
    assert_eq!(raw, full);
}

#[test]
fn bad_key_lengths_are_rejected() {
    assert!(matches!(
        EthPublicKey::new(&[4u8; 20]),
        Err(Error::InvalidPublicKeyLength(20))
    ));
}

#[test]
fn backup_url_of_key_one() {
    let key = public_key(&secret_one());
    let token = Token::new(&key);
    assert_eq!(
        hex::encode(token.for_suffix(BACKUP)),
        "256faeb08fa4bf0cb47ce7e996ad7d0480913a5a7b6b1d17330a59991bea6215"
    );
    assert_eq!(
        token.backup_url().to_string(),
        "acc://57a347d651947c65ecc317ee9d108b25e95636e79fd7f20b7cf32db3a302bfe8"
    );
}

#[test]
fn personal_message_hash() {
    assert_eq!(
        hex::encode(hash_message(LOGIN_MESSAGE.as_bytes())),
        "e12f4e788c1b6e30a1f12878bb760efdc1aeb93a295db23c241e8f3936f2a3c0"
    );
}

#[test]
fn recovered_key_matches_signer() {
    let secret = secret_one();
    let sig = personal_sign(&secret, LOGIN_MESSAGE.as_bytes());
    let key = EthPublicKey::recover(&sig, &hash_message(LOGIN_MESSAGE.as_bytes())).unwrap();
    assert_eq!(key, public_key(&secret));

    let verified = EthPublicKey::recover_and_verify(
        &sig,
        LOGIN_MESSAGE.as_bytes(),
        "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf",
    )
    .unwrap();
    assert_eq!(verified, key);
}

#[test]
fn recovery_detects_another_signer() {
    let sig = personal_sign(&secret_one(), LOGIN_MESSAGE.as_bytes());
    let err = EthPublicKey::recover_and_verify(
        &sig,
        LOGIN_MESSAGE.as_bytes(),
        "0x0000000000000000000000000000000000000001",
    )
    .unwrap_err();
    assert!(matches!(err, Error::IdentityMismatch { .. }));
}

#[test]
fn short_signatures_are_rejected() {
    let hash = hash_message(b"x");
    assert!(matches!(
        EthPublicKey::recover(&[0u8; 64], &hash),
        Err(Error::InvalidSignature)
    ));
}

#[test]
fn tokens_are_deterministic_and_distinct() {
    let a = "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf";
    let b = "0x2b5ad5c4795c026514f8317c7a215e218dccd6cf";
    assert_eq!(token(a, ENTRY), token(a, ENTRY));
    assert_eq!(Token::for_address(a).for_suffix(ENTRY), token(a, ENTRY));
    assert_ne!(token(a, ENTRY), token(b, ENTRY));
    assert_ne!(token(a, ENTRY), token(a, BACKUP));

    let t = Token::for_address(a);
    assert!(t.matches(ENTRY, Some(&token(a, ENTRY))));
    assert!(!t.matches(ENTRY, Some(&token(b, ENTRY))));
    assert!(!t.matches(ENTRY, None));
}

#[test]
fn flipped_bit_is_not_mine() {
    let token = Token::for_address("0x7e5f4552091a69125d5dfcb7b8c2659029395bdf");
    let key = [7u8; 32];
    let sealed = encrypt_entry(&token, &key, note("hello")).unwrap();
    let mut parts = sealed.crypt.parts().to_vec();
    let last = parts[2].len() - 1;
    parts[2][last] ^= 1;
    let tampered = DataEntry::double_hash(parts);
    assert!(matches!(decrypt_entry(&token, &key, &tampered), Err(Error::NotMine)));
}

#[test]
fn wrong_part_count_is_malformed() {
    let token = Token::for_address("0x7e5f4552091a69125d5dfcb7b8c2659029395bdf");
    let key = [7u8; 32];
    let entry = DataEntry::double_hash(vec![token.for_suffix(ENTRY).to_vec(), b"x".to_vec()]);
    assert!(matches!(
        decrypt_entry(&token, &key, &entry),
        Err(Error::MalformedEntry(_))
    ));
}

#[test]
fn other_key_or_account_is_not_mine() {
    let mine = Token::for_address("0x7e5f4552091a69125d5dfcb7b8c2659029395bdf");
    let theirs = Token::for_address("0x2b5ad5c4795c026514f8317c7a215e218dccd6cf");
    let key = [7u8; 32];
    let sealed = encrypt_entry(&mine, &key, note("hello")).unwrap();
    assert!(matches!(decrypt_entry(&mine, &[8u8; 32], &sealed.crypt), Err(Error::NotMine)));
    assert!(matches!(decrypt_entry(&theirs, &key, &sealed.crypt), Err(Error::NotMine)));
}

#[test]
fn sealed_entries_are_tagged_with_the_key() {
    let token = Token::for_address("0x7e5f4552091a69125d5dfcb7b8c2659029395bdf");
    let key = [9u8; 32];
    let sealed = encrypt_entry(&token, &key, note("tag")).unwrap();
    assert_eq!(sealed.crypt.parts().len(), 3);
    assert!(token.matches(ENTRY, sealed.crypt.part(0)));
    assert!(token.matches(&key_tag(&key), sealed.crypt.part(1)));
    assert_eq!(sealed.hash, sealed.crypt.hash());
}

#[test]
fn double_hash_entry_hash() {
    let entry = DataEntry::double_hash(vec![b"hello".to_vec()]);
    let leaf = crate::hash::sha256(b"hello");
    assert_eq!(entry.hash(), crate::hash::sha256(crate::hash::sha256(leaf)));

    let empty = DataEntry::double_hash(Vec::new());
    assert_eq!(empty.hash(), crate::hash::sha256(b""));
}

#[test]
fn add_credits_amount_follows_oracle() {
    let lite = Url::parse("acc://7e5f4552091a69125d5dfcb7b8c2659029395bdfee94d755").unwrap();
    let txn = Transaction::add_credits(lite.join("ACME"), lite.clone(), 100, 500);
    match txn.body {
        TransactionBody::AddCredits(body) => {
            assert_eq!(body.amount, 2_000_000_000);
            assert_eq!(body.oracle, 500);
            assert_eq!(body.recipient, lite);
        }
        other => panic!("unexpected body {:?}", other),
    }
}

#[test]
fn write_data_hash_depends_on_entry() {
    let url = Url::parse("acc://example.acme/data").unwrap();
    let a = Transaction::write_data(url.clone(), DataEntry::double_hash(vec![b"a".to_vec()]));
    let b = Transaction::write_data(url, DataEntry::double_hash(vec![b"b".to_vec()]));
    assert_ne!(a.hash().unwrap(), b.hash().unwrap());
    assert_eq!(a.hash().unwrap(), a.clone().hash().unwrap());
}

proptest! {
    #[test]
    fn sealed_entries_open_with_their_key(key in any::<[u8; 32]>(), value in ".*") {
        let token = Token::for_address("0x7e5f4552091a69125d5dfcb7b8c2659029395bdf");
        let sealed = encrypt_entry(&token, &key, note(&value)).unwrap();
        let opened = decrypt_entry(&token, &key, &sealed.crypt).unwrap();
        prop_assert_eq!(opened.plain, note(&value));
        prop_assert_eq!(opened.hash, sealed.hash);
    }
}
