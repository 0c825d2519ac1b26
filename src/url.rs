//! Accumulate URLs and transaction identifiers.
use crate::Error;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

const SCHEME: &str = "acc";

/// An `acc://authority/path` URL. Comparison ignores case.
#[derive(Clone)]
pub struct Url {
    authority: String,
    path: String,
}

/// Identifies a transaction: `acc://<hash>@<account>`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TxId {
    hash: [u8; 32],
    account: Url,
}

impl Url {
    /// Parses a URL, adding the `acc://` scheme when it is missing.
    pub fn parse(s: &str) -> Result<Url, Error> {
        let (user, url) = Self::parse_with_user(s)?;
        if user.is_some() {
            return Err(Error::InvalidUrl(s.to_string()));
        }
        Ok(url)
    }

    fn parse_with_user(s: &str) -> Result<(Option<String>, Url), Error> {
        let s = s.trim();
        let full = if s.contains("://") {
            s.to_string()
        } else {
            format!("{}://{}", SCHEME, s)
        };
        let parsed = url::Url::parse(&full).map_err(|e| Error::InvalidUrl(format!("{}: {}", s, e)))?;
        if parsed.scheme() != SCHEME {
            return Err(Error::InvalidUrl(s.to_string()));
        }
        let authority = match parsed.host_str() {
            Some(h) if !h.is_empty() => h.to_string(),
            _ => return Err(Error::InvalidUrl(s.to_string())),
        };
        let authority = match parsed.port() {
            Some(port) => format!("{}:{}", authority, port),
            None => authority,
        };
        let user = match parsed.username() {
            "" => None,
            u => Some(u.to_string()),
        };
        let path = parsed.path().trim_end_matches('/').to_string();
        Ok((user, Url { authority, path }))
    }

    /// URL of a bare authority that is known to be valid, such as hex.
    pub(crate) fn from_authority(authority: String) -> Url {
        Url {
            authority,
            path: String::new(),
        }
    }

    /// The authority (identity) part, without the scheme.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// The path, empty or starting with `/`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// URL of the root identity.
    pub fn root(&self) -> Url {
        Url {
            authority: self.authority.clone(),
            path: String::new(),
        }
    }

    /// Appends a path segment.
    pub fn join(&self, segment: impl fmt::Display) -> Url {
        Url {
            authority: self.authority.clone(),
            path: format!("{}/{}", self.path, segment),
        }
    }

    /// Transaction identifier of `hash` on this account.
    pub fn with_txid(&self, hash: [u8; 32]) -> TxId {
        TxId {
            hash,
            account: self.clone(),
        }
    }

    /// Lowercase form used for case-insensitive comparisons.
    pub fn key(&self) -> String {
        self.to_string().to_ascii_lowercase()
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", SCHEME, self.authority, self.path)
    }
}

impl fmt::Debug for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Url({})", self)
    }
}

impl PartialEq for Url {
    fn eq(&self, other: &Url) -> bool {
        self.authority.eq_ignore_ascii_case(&other.authority)
            && self.path.eq_ignore_ascii_case(&other.path)
    }
}

impl Eq for Url {}

impl Hash for Url {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state)
    }
}

impl FromStr for Url {
    type Err = Error;

    fn from_str(s: &str) -> Result<Url, Error> {
        Url::parse(s)
    }
}

impl Serialize for Url {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Url {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Url, D::Error> {
        let s = String::deserialize(deserializer)?;
        Url::parse(&s).map_err(serde::de::Error::custom)
    }
}

impl TxId {
    /// Parses `acc://<64 hex>@<account>`.
    pub fn parse(s: &str) -> Result<TxId, Error> {
        let (user, account) = Url::parse_with_user(s)?;
        let user = user.ok_or_else(|| Error::InvalidUrl(s.to_string()))?;
        let mut hash = [0u8; 32];
        hex::decode_to_slice(&user, &mut hash).map_err(|_| Error::InvalidUrl(s.to_string()))?;
        Ok(TxId { hash, account })
    }

    /// Transaction hash.
    pub fn hash(&self) -> &[u8; 32] {
        &self.hash
    }

    /// Account the transaction was executed on.
    pub fn account(&self) -> &Url {
        &self.account
    }

    /// Abbreviated form for progress lines.
    pub fn short(&self) -> String {
        let account = self.account.to_string();
        let account = account.trim_start_matches("acc://");
        let account: String = if account.chars().count() > 16 {
            account.chars().take(16).chain("…".chars()).collect()
        } else {
            account.to_string()
        };
        format!("{}…@{}", hex::encode(&self.hash[..4]), account)
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}@{}{}",
            SCHEME,
            hex::encode(self.hash),
            self.account.authority,
            self.account.path
        )
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", self)
    }
}

impl FromStr for TxId {
    type Err = Error;

    fn from_str(s: &str) -> Result<TxId, Error> {
        TxId::parse(s)
    }
}

impl Serialize for TxId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TxId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<TxId, D::Error> {
        let s = String::deserialize(deserializer)?;
        TxId::parse(&s).map_err(serde::de::Error::custom)
    }
}
