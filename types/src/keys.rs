//! Script key types identifying asset output recipients.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A 33-byte compressed public key.
///
/// The engine treats keys as opaque byte strings; all cryptographic
/// operations live behind the signer and wallet collaborators.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; 33]);

impl PublicKey {
    pub fn new(bytes: [u8; 33]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 33] {
        &self.0
    }

    /// The map-key form of this key.
    pub fn serialized(&self) -> SerializedKey {
        SerializedKey(self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey(")?;
        for b in &self.0[..4] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyVisitor;

        impl<'de> serde::de::Visitor<'de> for KeyVisitor {
            type Value = PublicKey;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "33 bytes")
            }

            fn visit_bytes<E: serde::de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                let arr: [u8; 33] = v
                    .try_into()
                    .map_err(|_| E::invalid_length(v.len(), &self))?;
                Ok(PublicKey(arr))
            }

            fn visit_seq<A: serde::de::SeqAccess<'de>>(
                self,
                mut seq: A,
            ) -> Result<Self::Value, A::Error> {
                let mut arr = [0u8; 33];
                for (i, byte) in arr.iter_mut().enumerate() {
                    *byte = seq
                        .next_element()?
                        .ok_or_else(|| serde::de::Error::invalid_length(i, &self))?;
                }
                Ok(PublicKey(arr))
            }
        }

        deserializer.deserialize_bytes(KeyVisitor)
    }
}

/// The serialized (map-key) form of a script key.
///
/// Used to index sealed proofs and journal records by recipient.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SerializedKey(pub [u8; 33]);

impl SerializedKey {
    pub fn as_bytes(&self) -> &[u8; 33] {
        &self.0
    }

    pub fn to_pub_key(&self) -> PublicKey {
        PublicKey(self.0)
    }
}

impl fmt::Debug for SerializedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SerializedKey(")?;
        for b in &self.0[..4] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for SerializedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl From<PublicKey> for SerializedKey {
    fn from(key: PublicKey) -> Self {
        key.serialized()
    }
}

impl Serialize for SerializedKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        PublicKey(self.0).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SerializedKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        PublicKey::deserialize(deserializer).map(|k| SerializedKey(k.0))
    }
}

/// The declared (pre-tweak) form of a script key.
///
/// Present when the daemon fully describes the key: the raw internal key
/// plus the tweak applied to produce the final output key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredKey {
    /// The raw internal key before the script-key tweak.
    pub raw_key: PublicKey,
    /// The tweak applied to the raw key.
    pub tweak: Vec<u8>,
}

/// The public key identifying an asset output's recipient.
///
/// An output is considered *local* only when the declared form is present
/// and the anchoring wallet's keyring owns the raw key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptKey {
    /// The final (tweaked) output key.
    pub pub_key: PublicKey,
    /// The declared pre-tweak form, if known.
    pub declared: Option<DeclaredKey>,
}

impl ScriptKey {
    /// A bare script key with no declared internals (a remote recipient).
    pub fn bare(pub_key: PublicKey) -> Self {
        Self {
            pub_key,
            declared: None,
        }
    }

    /// A fully described script key (a potentially local recipient).
    pub fn declared(pub_key: PublicKey, raw_key: PublicKey, tweak: Vec<u8>) -> Self {
        Self {
            pub_key,
            declared: Some(DeclaredKey { raw_key, tweak }),
        }
    }

    pub fn serialized(&self) -> SerializedKey {
        self.pub_key.serialized()
    }

    /// Whether the script-key tweak information is present.
    pub fn is_fully_described(&self) -> bool {
        self.declared.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u8) -> PublicKey {
        PublicKey::new([n; 33])
    }

    #[test]
    fn serialized_key_round_trips_through_pub_key() {
        let k = key(7);
        assert_eq!(k.serialized().to_pub_key(), k);
    }

    #[test]
    fn bare_key_is_not_fully_described() {
        assert!(!ScriptKey::bare(key(1)).is_fully_described());
        assert!(ScriptKey::declared(key(1), key(2), vec![3]).is_fully_described());
    }

    #[test]
    fn pub_key_serde_round_trip() {
        let k = key(0x42);
        let bytes = bincode::serialize(&k).unwrap();
        let back: PublicKey = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, k);
    }
}
