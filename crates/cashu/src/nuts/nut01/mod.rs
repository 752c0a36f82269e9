//! NUT-01: Mint public key exchange
//!
//! <https://github.com/cashubtc/nuts/blob/main/01.md>

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use bitcoin::secp256k1;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod public_key;
mod secret_key;

pub use self::public_key::PublicKey;
pub use self::secret_key::SecretKey;
use super::nut02::KeySet;
use crate::Amount;

/// Nut01 Error
#[derive(Debug, Error)]
pub enum Error {
    /// Secp256k1 Error
    #[error(transparent)]
    Secp256k1(#[from] secp256k1::Error),
    /// Invalid Pubkey size
    #[error("Invalid public key size: expected={expected}, found={found}")]
    InvalidPublicKeySize {
        /// Expected size
        expected: usize,
        /// Actual size
        found: usize,
    },
}

/// Mint Keys [NUT-01]
///
/// The public key of every denomination of a keyset, keyed by amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keys(BTreeMap<Amount, PublicKey>);

impl From<MintKeys> for Keys {
    fn from(keys: MintKeys) -> Self {
        Self::from(&keys)
    }
}

impl From<&MintKeys> for Keys {
    fn from(keys: &MintKeys) -> Self {
        Self(
            keys.iter()
                .map(|(amount, keypair)| (*amount, keypair.public_key))
                .collect(),
        )
    }
}

impl Keys {
    /// Create new [`Keys`]
    #[inline]
    pub fn new(keys: BTreeMap<Amount, PublicKey>) -> Self {
        Self(keys)
    }

    /// Get [`Keys`]
    #[inline]
    pub fn keys(&self) -> &BTreeMap<Amount, PublicKey> {
        &self.0
    }

    /// Get [`PublicKey`] for [`Amount`]
    #[inline]
    pub fn amount_key(&self, amount: Amount) -> Option<PublicKey> {
        self.0.get(&amount).copied()
    }

    /// Iterate through the (`Amount`, `PublicKey`) entries in the Map
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&Amount, &PublicKey)> {
        self.0.iter()
    }

    /// Public keys as compressed point hex strings, keyed by amount
    pub fn to_hex_map(&self) -> BTreeMap<u64, String> {
        self.0
            .iter()
            .map(|(amount, key)| (amount.to_u64(), key.to_hex()))
            .collect()
    }
}

/// Mint Public Keys [NUT-01]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysResponse {
    /// Keysets
    pub keysets: Vec<KeySet>,
}

/// Mint keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintKeys(BTreeMap<Amount, MintKeyPair>);

impl Deref for MintKeys {
    type Target = BTreeMap<Amount, MintKeyPair>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for MintKeys {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl MintKeys {
    /// Create new [`MintKeys`]
    #[inline]
    pub fn new(map: BTreeMap<Amount, MintKeyPair>) -> Self {
        Self(map)
    }
}

/// Mint Public Private key pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintKeyPair {
    /// Publickey
    pub public_key: PublicKey,
    /// Secretkey
    pub secret_key: SecretKey,
}

impl MintKeyPair {
    /// [`MintKeyPair`] from secret key
    #[inline]
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        Self {
            public_key: secret_key.public_key(),
            secret_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_serialize_with_string_amounts() {
        let keys_json = r#"{"1":"03a40f20667ed53513075dc51e715ff2046cad64eb68960632269ba7f0210e38bc","2":"03fd4ce5a16b65576145949e6f99f445f8249fee17c606b688b504a849cdc452de"}"#;

        let keys: Keys = serde_json::from_str(keys_json).unwrap();

        assert_eq!(keys.keys().len(), 2);
        assert!(keys.amount_key(Amount::from(2)).is_some());
        assert!(keys.amount_key(Amount::from(4)).is_none());

        assert_eq!(serde_json::to_string(&keys).unwrap(), keys_json);
    }

    #[test]
    fn mint_keys_to_public_keys() {
        let secret_key = SecretKey::generate();
        let public_key = secret_key.public_key();

        let mut map = BTreeMap::new();
        map.insert(Amount::from(8), MintKeyPair::from_secret_key(secret_key));

        let keys = Keys::from(MintKeys::new(map));

        assert_eq!(keys.amount_key(Amount::from(8)), Some(public_key));
        assert_eq!(
            keys.to_hex_map().get(&8).cloned(),
            Some(public_key.to_hex())
        );
    }
}
