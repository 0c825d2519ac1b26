//! The `x25519-xsalsa20-poly1305` envelope exchanged with wallet providers.
use crate::Error;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use crypto_box::aead::{generic_array::GenericArray, Aead, AeadCore, OsRng};
use crypto_box::{PublicKey, SalsaBox, SecretKey};
use serde::{Deserialize, Serialize};

/// Version tag of the envelope.
pub const VERSION: &str = "x25519-xsalsa20-poly1305";

const NONCE_LENGTH: usize = 24;
const KEY_LENGTH: usize = 32;

/// An asymmetrically encrypted payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedData {
    /// 24-byte nonce.
    pub nonce: Vec<u8>,
    /// Sender's one-time x25519 key.
    pub ephemeral_public_key: Vec<u8>,
    /// Box with the authentication tag in front.
    pub ciphertext: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Wire {
    version: String,
    nonce: String,
    ephem_public_key: String,
    ciphertext: String,
}

impl EncryptedData {
    /// JSON form understood by `eth_decrypt`.
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(&Wire {
            version: VERSION.to_string(),
            nonce: STANDARD.encode(&self.nonce),
            ephem_public_key: STANDARD.encode(&self.ephemeral_public_key),
            ciphertext: STANDARD.encode(&self.ciphertext),
        })?)
    }

    /// `0x`-prefixed hex of the JSON form, the `eth_decrypt` parameter.
    pub fn to_hex_json(&self) -> Result<String, Error> {
        Ok(format!("0x{}", hex::encode(self.to_json()?)))
    }

    /// Parses the JSON form.
    pub fn from_json(s: &str) -> Result<Self, Error> {
        let wire: Wire = serde_json::from_str(s)?;
        if wire.version != VERSION {
            return Err(Error::MalformedEntry(format!("unsupported envelope {}", wire.version)));
        }
        let decode = |field: &str| {
            STANDARD
                .decode(field)
                .map_err(|e| Error::MalformedEntry(format!("envelope field: {}", e)))
        };
        Ok(EncryptedData {
            nonce: decode(&wire.nonce)?,
            ephemeral_public_key: decode(&wire.ephem_public_key)?,
            ciphertext: decode(&wire.ciphertext)?,
        })
    }
}

/// Encrypts `plaintext` to the x25519 key `recipient` with a fresh ephemeral key.
pub fn seal(recipient: &[u8], plaintext: &[u8]) -> Result<EncryptedData, Error> {
    let recipient = public_key(recipient)?;
    let ephemeral = SecretKey::generate(&mut OsRng);
    let nonce = SalsaBox::generate_nonce(&mut OsRng);
    let ciphertext = SalsaBox::new(&recipient, &ephemeral)
        .encrypt(&nonce, plaintext)
        .map_err(|_| Error::MalformedEntry("encryption failed".to_string()))?;
    Ok(EncryptedData {
        nonce: nonce.to_vec(),
        ephemeral_public_key: ephemeral.public_key().as_bytes().to_vec(),
        ciphertext,
    })
}

/// Opens an envelope addressed to `secret`.
pub fn open(secret: &SecretKey, data: &EncryptedData) -> Result<Vec<u8>, Error> {
    if data.nonce.len() != NONCE_LENGTH {
        return Err(Error::MalformedEntry("nonce must be 24 bytes".to_string()));
    }
    let sender = public_key(&data.ephemeral_public_key)?;
    SalsaBox::new(&sender, secret)
        .decrypt(GenericArray::from_slice(&data.nonce), data.ciphertext.as_slice())
        .map_err(|_| Error::NotMine)
}

fn public_key(bytes: &[u8]) -> Result<PublicKey, Error> {
    let key: [u8; KEY_LENGTH] = bytes
        .try_into()
        .map_err(|_| Error::MalformedEntry("x25519 key must be 32 bytes".to_string()))?;
    Ok(PublicKey::from(key))
}
