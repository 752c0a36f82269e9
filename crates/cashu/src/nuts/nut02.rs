//! NUT-02: Keysets and keyset ID
//!
//! <https://github.com/cashubtc/nuts/blob/main/02.md>

use core::fmt;
use core::str::FromStr;
#[cfg(feature = "mint")]
use std::collections::BTreeMap;

use bitcoin::hashes::sha256::Hash as Sha256;
#[cfg(feature = "mint")]
use bitcoin::hashes::HashEngine;
use bitcoin::hashes::Hash;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

#[cfg(feature = "mint")]
use super::nut01::{MintKeyPair, MintKeys, SecretKey};
use super::nut01::{Keys, PublicKey};
use crate::nuts::nut00::CurrencyUnit;
use crate::Amount;

/// Highest number of denominations a keyset can hold (`2^0 .. 2^63`)
pub const MAX_ORDER: u8 = 64;

/// NUT02 Error
#[derive(Debug, Error)]
pub enum Error {
    /// Hex Error
    #[error(transparent)]
    HexError(#[from] hex::FromHexError),
    /// Keyset length error
    #[error("NUT02: ID length invalid")]
    Length,
    /// Unknown version
    #[error("NUT02: Unknown Version")]
    UnknownVersion,
    /// Derivation path does not have the unit selector segment
    #[error("Invalid derivation path: `{0}`")]
    InvalidDerivationPath(String),
    /// Keyset order outside `1..=64`
    #[error("Invalid max order: `{0}`")]
    InvalidMaxOrder(u8),
    /// NUT01 Error
    #[error(transparent)]
    NUT01(#[from] crate::nuts::nut01::Error),
}

/// Keyset version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeySetVersion {
    /// Current Version 00
    Version00,
}

impl KeySetVersion {
    /// [`KeySetVersion`] to byte
    pub fn to_byte(&self) -> u8 {
        match self {
            Self::Version00 => 0,
        }
    }

    /// [`KeySetVersion`] from byte
    pub fn from_byte(byte: &u8) -> Result<Self, Error> {
        match byte {
            0 => Ok(Self::Version00),
            _ => Err(Error::UnknownVersion),
        }
    }
}

impl fmt::Display for KeySetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySetVersion::Version00 => f.write_str("00"),
        }
    }
}

/// A keyset ID is an identifier for a specific keyset. It can be derived by
/// anyone who knows the set of public keys of a mint. The keyset ID **CAN**
/// be stored in a Cashu token such that the token can be used to identify
/// which mint or keyset it was generated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id {
    version: KeySetVersion,
    id: [u8; Self::BYTELEN],
}

impl Id {
    const STRLEN: usize = 14;
    const BYTELEN: usize = 7;

    /// [`Id`] to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        [vec![self.version.to_byte()], self.id.to_vec()].concat()
    }

    /// [`Id`] from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let (version, id) = bytes.split_first().ok_or(Error::Length)?;

        Ok(Self {
            version: KeySetVersion::from_byte(version)?,
            id: id.try_into().map_err(|_| Error::Length)?,
        })
    }

    /// Derive the [`Id`] of a set of `(amount, public key)` pairs
    ///
    /// The pairs are copied and sorted by ascending amount before hashing, so the result does
    /// not depend on the order they are given in.
    pub fn from_public_keys<'a, I>(keys: I) -> Self
    where
        I: IntoIterator<Item = (&'a Amount, &'a PublicKey)>,
    {
        let mut keys: Vec<(&Amount, &PublicKey)> = keys.into_iter().collect();

        keys.sort_by_key(|(amt, _v)| *amt);

        let pubkeys_concat: Vec<u8> = keys
            .iter()
            .map(|(_, pubkey)| pubkey.to_bytes())
            .collect::<Vec<[u8; 33]>>()
            .concat();

        let hash = Sha256::hash(&pubkeys_concat).to_byte_array();

        let mut id = [0u8; Self::BYTELEN];
        id.copy_from_slice(&hash[..Self::BYTELEN]);

        Self {
            version: KeySetVersion::Version00,
            id,
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format!("{}{}", self.version, hex::encode(self.id)))
    }
}

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Byte length alone does not make the slices below char aligned
        if s.len() != Self::STRLEN + 2 || !s.is_ascii() {
            return Err(Error::Length);
        }

        let (version, id) = s.split_at(2);
        let version_byte = hex::decode(version)?;

        Ok(Self {
            version: KeySetVersion::from_byte(&version_byte[0])?,
            id: hex::decode(id)?
                .try_into()
                .map_err(|_| Error::Length)?,
        })
    }
}

impl Serialize for Id {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct IdVisitor;

        impl serde::de::Visitor<'_> for IdVisitor {
            type Value = Id;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("Expecting a 16 char hex string")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Id::from_str(v).map_err(|e| match e {
                    Error::Length => E::custom(format!(
                        "Invalid Length: Expected {}, got {}: {}",
                        Id::STRLEN + 2,
                        v.len(),
                        v
                    )),
                    _ => E::custom(e),
                })
            }
        }

        deserializer.deserialize_str(IdVisitor)
    }
}

impl From<&Keys> for Id {
    fn from(map: &Keys) -> Self {
        Self::from_public_keys(map.iter())
    }
}

/// Mint Keysets [NUT-02]
/// Ids of mints keyset ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysetResponse {
    /// set of public key ids that the mint generates
    pub keysets: Vec<KeySetInfo>,
}

/// Keyset
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct KeySet {
    /// Keyset [`Id`]
    pub id: Id,
    /// Keyset [`CurrencyUnit`]
    pub unit: CurrencyUnit,
    /// Keyset [`Keys`]
    pub keys: Keys,
}

#[cfg(feature = "mint")]
impl From<MintKeySet> for KeySet {
    fn from(keyset: MintKeySet) -> Self {
        Self::from(&keyset)
    }
}

#[cfg(feature = "mint")]
impl From<&MintKeySet> for KeySet {
    fn from(keyset: &MintKeySet) -> Self {
        Self {
            id: keyset.id,
            unit: keyset.unit.clone(),
            keys: Keys::from(&keyset.keys),
        }
    }
}

/// KeySetInfo
#[derive(Debug, Clone, Hash, PartialEq, Eq, Deserialize, Serialize)]
pub struct KeySetInfo {
    /// Keyset [`Id`]
    pub id: Id,
    /// Keyset [`CurrencyUnit`]
    pub unit: CurrencyUnit,
    /// Keyset state
    /// Mint will only sign from an active keyset
    pub active: bool,
    /// Input Fee PPK
    #[serde(default)]
    pub input_fee_ppk: u64,
}

/// MintKeyset
#[cfg(feature = "mint")]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintKeySet {
    /// Keyset [`Id`]
    pub id: Id,
    /// Keyset [`CurrencyUnit`]
    pub unit: CurrencyUnit,
    /// Keyset [`MintKeys`]
    pub keys: MintKeys,
}

#[cfg(feature = "mint")]
impl MintKeySet {
    /// Generate new [`MintKeySet`] from seed and derivation path
    ///
    /// The private key for amount `2^i` is `sha256(seed || derivation_path || "2^i")` with the
    /// amount written in decimal, for `i` in `0..max_order`.
    pub fn generate(seed: &[u8], derivation_path: &str, max_order: u8) -> Result<Self, Error> {
        if max_order == 0 || max_order > MAX_ORDER {
            return Err(Error::InvalidMaxOrder(max_order));
        }

        let unit = derive_unit(derivation_path)?;

        let mut map = BTreeMap::new();
        for i in 0..max_order {
            let amount = 2_u64.pow(i as u32);

            let mut engine = Sha256::engine();
            engine.input(seed);
            engine.input(derivation_path.as_bytes());
            engine.input(amount.to_string().as_bytes());
            let hash = Sha256::from_engine(engine);

            let secret_key = SecretKey::from_slice(hash.as_byte_array())?;
            map.insert(
                Amount::from(amount),
                MintKeyPair::from_secret_key(secret_key),
            );
        }

        let keys = MintKeys::new(map);
        let id = Id::from_public_keys(keys.iter().map(|(amount, pair)| (amount, &pair.public_key)));

        Ok(Self { id, unit, keys })
    }
}

/// Unit of a keyset derivation path
///
/// Paths look like `m/0'/{unit}'/{index}'`; a unit segment of `1'` selects [`CurrencyUnit::Usd`],
/// anything else [`CurrencyUnit::Sat`].
pub fn derive_unit(derivation_path: &str) -> Result<CurrencyUnit, Error> {
    let parts: Vec<&str> = derivation_path.split('/').collect();

    match parts.get(2) {
        Some(&"1'") => Ok(CurrencyUnit::Usd),
        Some(_) => Ok(CurrencyUnit::Sat),
        None => Err(Error::InvalidDerivationPath(derivation_path.to_string())),
    }
}

/// Derivation path used for the keyset of `unit` at rotation `index`
#[cfg(feature = "mint")]
pub fn derivation_path_from_unit(unit: &CurrencyUnit, index: u32) -> Option<String> {
    let unit_index = unit.derivation_index()?;

    Some(format!("m/0'/{unit_index}'/{index}'"))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    const SHORT_KEYSET_ID: &str = "00456a94ab4e1c46";
    const SHORT_KEYSET: &str = r#"
        {
            "1":"03a40f20667ed53513075dc51e715ff2046cad64eb68960632269ba7f0210e38bc",
            "2":"03fd4ce5a16b65576145949e6f99f445f8249fee17c606b688b504a849cdc452de",
            "4":"02648eccfa4c026960966276fa5a4cae46ce0fd432211a4f449bf84f13aa5f8303",
            "8":"02fdfd6796bfeac490cbee12f778f867f0a2c68f6508d17c649759ea0dc3547528"
        }
    "#;

    #[test]
    fn test_deserialization_and_id_generation() {
        let keys: Keys = serde_json::from_str(SHORT_KEYSET).unwrap();

        let id: Id = (&keys).into();

        assert_eq!(id, Id::from_str(SHORT_KEYSET_ID).unwrap());
        assert_eq!(id.to_string(), SHORT_KEYSET_ID);
    }

    #[test]
    fn test_id_invariant_to_key_order() {
        let keys: Keys = serde_json::from_str(SHORT_KEYSET).unwrap();

        let mut pairs: Vec<(&Amount, &PublicKey)> = keys.iter().collect();
        pairs.reverse();
        let reversed = Id::from_public_keys(pairs.clone());

        pairs.swap(0, 2);
        let shuffled = Id::from_public_keys(pairs);

        assert_eq!(reversed, Id::from_str(SHORT_KEYSET_ID).unwrap());
        assert_eq!(shuffled, reversed);
    }

    #[test]
    fn test_id_from_str() {
        assert!(Id::from_str("009a1f293253e41e").is_ok());
        assert!(Id::from_str("009a1f293253e4").is_err());
        assert!(Id::from_str("019a1f293253e41e").is_err());
        assert!(Id::from_str("00zz1f293253e41e").is_err());
    }

    #[test]
    fn test_id_from_non_ascii_str() {
        // 16 bytes, but the second char spans bytes 1..3
        assert!(matches!(Id::from_str("aé0000000000000"), Err(Error::Length)));
        assert!(serde_json::from_str::<Id>("\"aé0000000000000\"").is_err());
        assert!(serde_json::from_str::<Id>("\"00é000000000000\"").is_err());
    }

    #[test]
    fn test_deserialization_keyset_info() {
        let h = r#"{"id":"009a1f293253e41e","unit":"sat","active":true}"#;

        let keyset_info: KeySetInfo = serde_json::from_str(h).unwrap();
        assert_eq!(keyset_info.input_fee_ppk, 0);

        let h = r#"{"keysets":[{"id":"009a1f293253e41e","unit":"sat","active":true, "input_fee_ppk": 100},{"id":"003dfdf4e5e35487","unit":"usd","active":false}]}"#;

        let keyset_response: KeysetResponse = serde_json::from_str(h).unwrap();
        assert_eq!(keyset_response.keysets.len(), 2);
        assert_eq!(keyset_response.keysets[1].unit, CurrencyUnit::Usd);
    }

    #[test]
    fn test_generate_keyset_is_deterministic() {
        let seed = b"correct horse battery staple";

        let keyset = MintKeySet::generate(seed, "m/0'/0'/0'", MAX_ORDER).unwrap();
        let again = MintKeySet::generate(seed, "m/0'/0'/0'", MAX_ORDER).unwrap();

        assert_eq!(keyset, again);
        assert_eq!(keyset.keys.len(), 64);
        assert_eq!(keyset.unit, CurrencyUnit::Sat);
        assert_eq!(keyset.id.to_string().len(), 16);
        assert!(keyset.id.to_string().starts_with("00"));

        let public: KeySet = keyset.clone().into();
        assert_eq!(Id::from(&public.keys), keyset.id);

        for (i, amount) in keyset.keys.keys().enumerate() {
            assert_eq!(amount.to_u64(), 1_u64 << i);
        }
    }

    #[test]
    fn test_generate_keyset_depends_on_inputs() {
        let seed = b"correct horse battery staple";

        let keyset = MintKeySet::generate(seed, "m/0'/0'/0'", 8).unwrap();
        let other_path = MintKeySet::generate(seed, "m/0'/0'/1'", 8).unwrap();
        let other_seed = MintKeySet::generate(b"another seed", "m/0'/0'/0'", 8).unwrap();

        assert_ne!(keyset.id, other_path.id);
        assert_ne!(keyset.id, other_seed.id);
    }

    #[test]
    fn test_generate_keyset_unit() {
        let usd = MintKeySet::generate(b"seed", "m/0'/1'/0'", 4).unwrap();
        assert_eq!(usd.unit, CurrencyUnit::Usd);

        let sat = MintKeySet::generate(b"seed", "m/0'/7'/0'", 4).unwrap();
        assert_eq!(sat.unit, CurrencyUnit::Sat);
    }

    #[test]
    fn test_malformed_derivation_path() {
        assert!(matches!(
            MintKeySet::generate(b"seed", "m/0'", MAX_ORDER),
            Err(Error::InvalidDerivationPath(_))
        ));
        assert!(derive_unit("").is_err());
        assert!(matches!(
            MintKeySet::generate(b"seed", "m/0'/0'/0'", 65),
            Err(Error::InvalidMaxOrder(65))
        ));
    }

    #[test]
    fn test_derivation_path_from_unit() {
        assert_eq!(
            derivation_path_from_unit(&CurrencyUnit::Sat, 3).as_deref(),
            Some("m/0'/0'/3'")
        );
        assert_eq!(
            derivation_path_from_unit(&CurrencyUnit::Usd, 0).as_deref(),
            Some("m/0'/1'/0'")
        );
        assert!(derivation_path_from_unit(&CurrencyUnit::Msat, 0).is_none());
    }
}
