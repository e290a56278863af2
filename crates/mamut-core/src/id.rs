//! Component identity types.
//!
//! Every component in a stack is addressed by a typed identifier made of a
//! [`Kind`] tag plus, depending on the shape, a name and/or a [`ChainId`]:
//!
//! | Shape | Type | Text form |
//! |---|---|---|
//! | name only | [`GenericId`] | `<Kind>-<name>` |
//! | chain only | [`ChainIdOf`] | `<Kind>-<chainID>` |
//! | name and chain | [`NameChainId`] | `<Kind>-<name>-<chainID>` |
//!
//! Typed identifiers carry their kind as a zero-sized marker type, so an
//! `L2CLNode` identifier can never be passed where a `Supervisor` one is
//! expected. [`ComponentId`] is the type-erased form used by registries, the
//! control plane and system views.
//!
//! # Examples
//!
//! ```
//! use mamut_core::id::{ChainId, L2CLNodeId};
//!
//! let id = L2CLNodeId::new("sequencer", ChainId::new(901));
//! assert_eq!(id.to_string(), "L2CLNode-sequencer-901");
//!
//! let decoded: L2CLNodeId = "L2CLNode-sequencer-901".parse().unwrap();
//! assert_eq!(decoded, id);
//! assert!("L2ELNode-sequencer-901".parse::<L2CLNodeId>().is_err());
//! ```

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::borrow::Cow;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::str::FromStr;

use crate::error::IdError;

/// Maximum number of characters in the name segment of an identifier.
pub const MAX_NAME_LEN: usize = 100;

/// Tag identifying a component category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Kind(Cow<'static, str>);

impl Kind {
    /// Ethereum-style L1 execution node.
    pub const L1_EL_NODE: Kind = Kind::new("L1ELNode");
    /// L1 consensus node.
    pub const L1_CL_NODE: Kind = Kind::new("L1CLNode");
    /// L2 execution node.
    pub const L2_EL_NODE: Kind = Kind::new("L2ELNode");
    /// L2 consensus node.
    pub const L2_CL_NODE: Kind = Kind::new("L2CLNode");
    /// Batch submitter.
    pub const L2_BATCHER: Kind = Kind::new("L2Batcher");
    /// Output proposer.
    pub const L2_PROPOSER: Kind = Kind::new("L2Proposer");
    /// Fault-proof challenger.
    pub const L2_CHALLENGER: Kind = Kind::new("L2Challenger");
    /// Cross-chain verifier.
    pub const SUPERVISOR: Kind = Kind::new("Supervisor");
    /// Group of chains sharing a dependency set.
    pub const CLUSTER: Kind = Kind::new("Cluster");
    /// Group of chains sharing L1 contracts.
    pub const SUPERCHAIN: Kind = Kind::new("Superchain");
    /// An L1 network.
    pub const L1_NETWORK: Kind = Kind::new("L1Network");
    /// An L2 network.
    pub const L2_NETWORK: Kind = Kind::new("L2Network");
    /// Block-production driver embedded in a node.
    pub const SEQUENCER: Kind = Kind::new("Sequencer");
    /// Standalone sequencing service used by tests.
    pub const TEST_SEQUENCER: Kind = Kind::new("TestSequencer");
    /// Funding service.
    pub const FAUCET: Kind = Kind::new("Faucet");
    /// Sync-testing service.
    pub const SYNC_TESTER: Kind = Kind::new("SyncTester");

    /// Creates a kind from a static tag.
    ///
    /// The tag must be non-empty and must not contain `-`; use [`Kind::parse`]
    /// for untrusted input.
    pub const fn new(tag: &'static str) -> Self {
        Self(Cow::Borrowed(tag))
    }

    /// Parses a kind from owned text, validating it.
    pub fn parse(tag: impl Into<String>) -> Result<Self, IdError> {
        let tag = tag.into();
        if tag.is_empty() || tag.contains('-') {
            return Err(IdError::InvalidKind(tag));
        }
        Ok(Self(Cow::Owned(tag)))
    }

    /// Returns the tag text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Kind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Kind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Kind::parse(text).map_err(de::Error::custom)
    }
}

/// Numeric chain identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl ChainId {
    /// Creates a chain ID.
    #[inline]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the numeric value.
    #[inline]
    pub const fn inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChainId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // u64::from_str accepts a leading '+', which would not round-trip.
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(IdError::invalid_chain(s));
        }
        s.parse::<u64>()
            .map(ChainId)
            .map_err(|_| IdError::invalid_chain(s))
    }
}

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Binds a marker type to a [`Kind`].
///
/// Markers are normally created with [`declare_kind!`](crate::declare_kind).
pub trait KindTag:
    fmt::Debug + Clone + Copy + PartialEq + Eq + Hash + PartialOrd + Ord + Send + Sync + 'static
{
    /// The kind this marker stands for.
    const KIND: Kind;
}

/// Declares a zero-sized kind marker implementing [`KindTag`].
///
/// ```
/// use mamut_core::declare_kind;
/// use mamut_core::id::{GenericId, KindTag};
///
/// declare_kind!(pub Indexer => "Indexer");
///
/// let id = GenericId::<Indexer>::new("main");
/// assert_eq!(id.to_string(), "Indexer-main");
/// assert_eq!(Indexer::KIND.as_str(), "Indexer");
/// ```
#[macro_export]
macro_rules! declare_kind {
    ($(#[$meta:meta])* $vis:vis $marker:ident => $tag:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        $vis struct $marker;

        impl $crate::id::KindTag for $marker {
            const KIND: $crate::id::Kind = $crate::id::Kind::new($tag);
        }
    };
}

/// Kind markers for the well-known component roles.
pub mod kinds {
    crate::declare_kind!(
        /// L1 execution node.
        pub L1ELNode => "L1ELNode"
    );
    crate::declare_kind!(
        /// L1 consensus node.
        pub L1CLNode => "L1CLNode"
    );
    crate::declare_kind!(
        /// L2 execution node.
        pub L2ELNode => "L2ELNode"
    );
    crate::declare_kind!(
        /// L2 consensus node.
        pub L2CLNode => "L2CLNode"
    );
    crate::declare_kind!(
        /// Batch submitter.
        pub L2Batcher => "L2Batcher"
    );
    crate::declare_kind!(
        /// Output proposer.
        pub L2Proposer => "L2Proposer"
    );
    crate::declare_kind!(
        /// Fault-proof challenger.
        pub L2Challenger => "L2Challenger"
    );
    crate::declare_kind!(
        /// Cross-chain verifier.
        pub Supervisor => "Supervisor"
    );
    crate::declare_kind!(
        /// Group of chains sharing a dependency set.
        pub Cluster => "Cluster"
    );
    crate::declare_kind!(
        /// Group of chains sharing L1 contracts.
        pub Superchain => "Superchain"
    );
    crate::declare_kind!(
        /// An L1 network.
        pub L1Network => "L1Network"
    );
    crate::declare_kind!(
        /// An L2 network.
        pub L2Network => "L2Network"
    );
    crate::declare_kind!(
        /// Block-production driver embedded in a node.
        pub Sequencer => "Sequencer"
    );
    crate::declare_kind!(
        /// Standalone sequencing service used by tests.
        pub TestSequencer => "TestSequencer"
    );
    crate::declare_kind!(
        /// Funding service.
        pub Faucet => "Faucet"
    );
    crate::declare_kind!(
        /// Sync-testing service.
        pub SyncTester => "SyncTester"
    );
}

/// L1 execution node identifier.
pub type L1ELNodeId = NameChainId<kinds::L1ELNode>;
/// L1 consensus node identifier.
pub type L1CLNodeId = NameChainId<kinds::L1CLNode>;
/// L2 execution node identifier.
pub type L2ELNodeId = NameChainId<kinds::L2ELNode>;
/// L2 consensus node identifier.
pub type L2CLNodeId = NameChainId<kinds::L2CLNode>;
/// Batcher identifier.
pub type L2BatcherId = NameChainId<kinds::L2Batcher>;
/// Proposer identifier.
pub type L2ProposerId = NameChainId<kinds::L2Proposer>;
/// Challenger identifier.
pub type L2ChallengerId = NameChainId<kinds::L2Challenger>;
/// Sequencer driver identifier.
pub type SequencerId = NameChainId<kinds::Sequencer>;
/// Supervisor identifier.
pub type SupervisorId = GenericId<kinds::Supervisor>;
/// Cluster identifier.
pub type ClusterId = GenericId<kinds::Cluster>;
/// Superchain identifier.
pub type SuperchainId = GenericId<kinds::Superchain>;
/// Test sequencer identifier.
pub type TestSequencerId = GenericId<kinds::TestSequencer>;
/// L1 network identifier.
pub type L1NetworkId = ChainIdOf<kinds::L1Network>;
/// L2 network identifier.
pub type L2NetworkId = ChainIdOf<kinds::L2Network>;

/// Common behaviour of every identifier shape.
pub trait Id:
    Clone + Eq + Hash + Ord + fmt::Debug + fmt::Display + FromStr<Err = IdError> + Send + Sync + 'static
{
    /// Returns the kind of the identified component.
    fn kind(&self) -> Kind;

    /// Returns the type-erased form of this identifier.
    fn erase(&self) -> ComponentId;
}

/// The three identifier layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdShape {
    /// `<Kind>-<name>`.
    Generic,
    /// `<Kind>-<chainID>`.
    Chain,
    /// `<Kind>-<name>-<chainID>`.
    NameChain,
}

impl IdShape {
    /// Returns a human-readable label for the shape.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Generic => "name-only",
            Self::Chain => "chain-only",
            Self::NameChain => "name+chain",
        }
    }
}

fn check_name(name: &str) -> Result<(), IdError> {
    let len = name.chars().count();
    if len > MAX_NAME_LEN {
        return Err(IdError::NameTooLong {
            len,
            max: MAX_NAME_LEN,
        });
    }
    Ok(())
}

fn strip_kind<'a>(kind: &Kind, text: &'a str) -> Result<&'a str, IdError> {
    if let Some(rest) = text
        .strip_prefix(kind.as_str())
        .and_then(|rest| rest.strip_prefix('-'))
    {
        return Ok(rest);
    }
    if text.contains('-') {
        Err(IdError::kind_mismatch(kind.as_str(), text))
    } else {
        Err(IdError::MissingKind {
            text: text.to_string(),
        })
    }
}

fn split_chain(text: &str, rest: &str) -> Result<(String, ChainId), IdError> {
    let (name, chain) = rest.rsplit_once('-').ok_or_else(|| IdError::MissingChain {
        text: text.to_string(),
    })?;
    check_name(name)?;
    Ok((name.to_string(), chain.parse()?))
}

/// Identifier made of a kind and a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GenericId<K> {
    name: String,
    _kind: PhantomData<K>,
}

impl<K: KindTag> GenericId<K> {
    /// Creates an identifier without validating the name length.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            _kind: PhantomData,
        }
    }

    /// Creates an identifier, rejecting oversized names.
    pub fn try_new(name: impl Into<String>) -> Result<Self, IdError> {
        let name = name.into();
        check_name(&name)?;
        Ok(Self::new(name))
    }

    /// Returns the name segment.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<K: KindTag> fmt::Display for GenericId<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", K::KIND, self.name)
    }
}

impl<K: KindTag> FromStr for GenericId<K> {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = strip_kind(&K::KIND, s)?;
        Self::try_new(name)
    }
}

impl<K: KindTag> Id for GenericId<K> {
    fn kind(&self) -> Kind {
        K::KIND
    }

    fn erase(&self) -> ComponentId {
        ComponentId::generic(K::KIND, self.name.clone())
    }
}

/// Identifier made of a kind and a chain ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainIdOf<K> {
    chain: ChainId,
    _kind: PhantomData<K>,
}

impl<K: KindTag> ChainIdOf<K> {
    /// Creates an identifier.
    pub fn new(chain: impl Into<ChainId>) -> Self {
        Self {
            chain: chain.into(),
            _kind: PhantomData,
        }
    }

    /// Returns the chain segment.
    pub fn chain_id(&self) -> ChainId {
        self.chain
    }
}

impl<K: KindTag> fmt::Display for ChainIdOf<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", K::KIND, self.chain)
    }
}

impl<K: KindTag> FromStr for ChainIdOf<K> {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let chain = strip_kind(&K::KIND, s)?;
        if chain.is_empty() {
            return Err(IdError::MissingChain {
                text: s.to_string(),
            });
        }
        Ok(Self::new(chain.parse::<ChainId>()?))
    }
}

impl<K: KindTag> Id for ChainIdOf<K> {
    fn kind(&self) -> Kind {
        K::KIND
    }

    fn erase(&self) -> ComponentId {
        ComponentId::chain(K::KIND, self.chain)
    }
}

/// Identifier made of a kind, a name and a chain ID.
///
/// Most node and service roles use this shape: several named instances may
/// exist per chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameChainId<K> {
    name: String,
    chain: ChainId,
    _kind: PhantomData<K>,
}

impl<K: KindTag> NameChainId<K> {
    /// Creates an identifier without validating the name length.
    pub fn new(name: impl Into<String>, chain: impl Into<ChainId>) -> Self {
        Self {
            name: name.into(),
            chain: chain.into(),
            _kind: PhantomData,
        }
    }

    /// Creates an identifier, rejecting oversized names.
    pub fn try_new(name: impl Into<String>, chain: impl Into<ChainId>) -> Result<Self, IdError> {
        let name = name.into();
        check_name(&name)?;
        Ok(Self::new(name, chain))
    }

    /// Returns the name segment.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the chain segment.
    pub fn chain_id(&self) -> ChainId {
        self.chain
    }
}

impl<K: KindTag> fmt::Display for NameChainId<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", K::KIND, self.name, self.chain)
    }
}

impl<K: KindTag> FromStr for NameChainId<K> {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = strip_kind(&K::KIND, s)?;
        let (name, chain) = split_chain(s, rest)?;
        Ok(Self::new(name, chain))
    }
}

impl<K: KindTag> Id for NameChainId<K> {
    fn kind(&self) -> Kind {
        K::KIND
    }

    fn erase(&self) -> ComponentId {
        ComponentId::name_chain(K::KIND, self.name.clone(), self.chain)
    }
}

macro_rules! impl_text_serde {
    ($ty:ident) => {
        impl<K: KindTag> Serialize for $ty<K> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de, K: KindTag> Deserialize<'de> for $ty<K> {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let text = String::deserialize(deserializer)?;
                text.parse().map_err(de::Error::custom)
            }
        }

        impl<K: KindTag> From<$ty<K>> for ComponentId {
            fn from(id: $ty<K>) -> Self {
                id.erase()
            }
        }

        impl<K: KindTag> From<&$ty<K>> for ComponentId {
            fn from(id: &$ty<K>) -> Self {
                id.erase()
            }
        }

        impl<K: KindTag> TryFrom<&ComponentId> for $ty<K> {
            type Error = IdError;

            fn try_from(id: &ComponentId) -> Result<Self, Self::Error> {
                id.downcast()
            }
        }

        impl<K: KindTag> PartialEq<$ty<K>> for ComponentId {
            fn eq(&self, other: &$ty<K>) -> bool {
                *self == other.erase()
            }
        }
    };
}

impl_text_serde!(GenericId);
impl_text_serde!(ChainIdOf);
impl_text_serde!(NameChainId);

/// Type-erased component identifier.
///
/// Ordered by kind, then name, then chain, which gives registries and system
/// views a deterministic iteration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId {
    kind: Kind,
    name: Option<String>,
    chain: Option<ChainId>,
}

impl ComponentId {
    /// Creates a name-only identifier.
    pub fn generic(kind: Kind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: Some(name.into()),
            chain: None,
        }
    }

    /// Creates a chain-only identifier.
    pub fn chain(kind: Kind, chain: ChainId) -> Self {
        Self {
            kind,
            name: None,
            chain: Some(chain),
        }
    }

    /// Creates a name+chain identifier.
    pub fn name_chain(kind: Kind, name: impl Into<String>, chain: ChainId) -> Self {
        Self {
            kind,
            name: Some(name.into()),
            chain: Some(chain),
        }
    }

    /// Returns the kind.
    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    /// Returns the name segment, if this shape has one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the chain segment, if this shape has one.
    pub fn chain_id(&self) -> Option<ChainId> {
        self.chain
    }

    /// Returns the shape of this identifier.
    pub fn shape(&self) -> IdShape {
        match (&self.name, self.chain) {
            (Some(_), Some(_)) => IdShape::NameChain,
            (None, Some(_)) => IdShape::Chain,
            _ => IdShape::Generic,
        }
    }

    /// Decodes text of a known shape whose kind is read from the text itself.
    pub fn parse_as(shape: IdShape, text: &str) -> Result<Self, IdError> {
        let (kind, rest) = text.split_once('-').ok_or_else(|| IdError::MissingKind {
            text: text.to_string(),
        })?;
        let kind = Kind::parse(kind)?;
        match shape {
            IdShape::Generic => {
                check_name(rest)?;
                Ok(Self::generic(kind, rest))
            }
            IdShape::Chain => Ok(Self::chain(kind, rest.parse()?)),
            IdShape::NameChain => {
                let (name, chain) = split_chain(text, rest)?;
                Ok(Self::name_chain(kind, name, chain))
            }
        }
    }

    /// Recovers a typed identifier, checking kind and shape.
    pub fn downcast<I: Id>(&self) -> Result<I, IdError> {
        let typed: I = self.to_string().parse()?;
        if typed.erase() != *self {
            return Err(IdError::ShapeMismatch {
                id: self.to_string(),
                expected: std::any::type_name::<I>(),
            });
        }
        Ok(typed)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(name) = &self.name {
            write!(f, "-{name}")?;
        }
        if let Some(chain) = self.chain {
            write!(f, "-{chain}")?;
        }
        Ok(())
    }
}

impl Serialize for ComponentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Sorts identifiers into their canonical total order.
pub fn sort_ids<I: Ord>(ids: &mut [I]) {
    ids.sort();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_chain_round_trip() {
        let id = L2CLNodeId::new("sequencer", ChainId::new(901));
        assert_eq!(id.to_string(), "L2CLNode-sequencer-901");
        assert_eq!(id.to_string().parse::<L2CLNodeId>().unwrap(), id);
    }

    #[test]
    fn test_hyphenated_names_round_trip() {
        let id = L2ELNodeId::new("op-reth-2", 902u64);
        let text = id.to_string();
        assert_eq!(text, "L2ELNode-op-reth-2-902");
        let decoded: L2ELNodeId = text.parse().unwrap();
        assert_eq!(decoded.name(), "op-reth-2");
        assert_eq!(decoded.chain_id(), ChainId(902));
    }

    #[test]
    fn test_round_trip_name_lengths() {
        for len in [0usize, 1, 50, MAX_NAME_LEN] {
            let name = "n".repeat(len);
            let id = L2BatcherId::new(name.clone(), 10u64);
            assert_eq!(id.to_string().parse::<L2BatcherId>().unwrap(), id);

            let generic = SupervisorId::new(name);
            assert_eq!(generic.to_string().parse::<SupervisorId>().unwrap(), generic);
        }
    }

    #[test]
    fn test_generic_and_chain_shapes() {
        let sup = SupervisorId::new("main");
        assert_eq!(sup.to_string(), "Supervisor-main");

        let net = L2NetworkId::new(901u64);
        assert_eq!(net.to_string(), "L2Network-901");
        assert_eq!("L2Network-901".parse::<L2NetworkId>().unwrap(), net);
    }

    #[test]
    fn test_decode_missing_kind() {
        let err = "sequencer".parse::<SupervisorId>().unwrap_err();
        assert!(matches!(err, IdError::MissingKind { .. }));
    }

    #[test]
    fn test_decode_kind_mismatch() {
        let err = "L2ELNode-sequencer-901".parse::<L2CLNodeId>().unwrap_err();
        assert!(matches!(err, IdError::KindMismatch { .. }));

        // A kind that is a prefix of another kind must not match it.
        let err = "L2CLNodeX-a-1".parse::<L2CLNodeId>().unwrap_err();
        assert!(matches!(err, IdError::KindMismatch { .. }));
    }

    #[test]
    fn test_decode_oversized_name() {
        let text = format!("L2CLNode-{}-901", "x".repeat(MAX_NAME_LEN + 1));
        let err = text.parse::<L2CLNodeId>().unwrap_err();
        assert_eq!(
            err,
            IdError::NameTooLong {
                len: MAX_NAME_LEN + 1,
                max: MAX_NAME_LEN
            }
        );

        let text = format!("Supervisor-{}", "x".repeat(MAX_NAME_LEN + 1));
        assert!(text.parse::<SupervisorId>().is_err());
        assert!(SupervisorId::try_new("x".repeat(MAX_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_decode_bad_chain() {
        // No chain segment at all.
        assert!(matches!(
            "L2CLNode-sequencer".parse::<L2CLNodeId>(),
            Err(IdError::MissingChain { .. })
        ));
        assert!(matches!(
            "L2Network-".parse::<L2NetworkId>(),
            Err(IdError::MissingChain { .. })
        ));

        // A chain segment that is not a decimal chain ID.
        assert!(matches!(
            "L2CLNode-sequencer-abc".parse::<L2CLNodeId>(),
            Err(IdError::InvalidChain { .. })
        ));
        assert!(matches!(
            "L2CLNode-sequencer-".parse::<L2CLNodeId>(),
            Err(IdError::InvalidChain { .. })
        ));
        assert!(matches!(
            "L2Network-+5".parse::<L2NetworkId>(),
            Err(IdError::InvalidChain { .. })
        ));
    }

    #[test]
    fn test_ordering() {
        let mut ids = vec![
            L2CLNodeId::new("b", 1u64),
            L2CLNodeId::new("a", 10u64),
            L2CLNodeId::new("a", 2u64),
        ];
        sort_ids(&mut ids);
        let text: Vec<_> = ids.iter().map(ToString::to_string).collect();
        assert_eq!(text, ["L2CLNode-a-2", "L2CLNode-a-10", "L2CLNode-b-1"]);
    }

    #[test]
    fn test_erase_and_downcast() {
        let id = L2CLNodeId::new("verifier", 901u64);
        let erased = id.erase();
        assert_eq!(erased.shape(), IdShape::NameChain);
        assert_eq!(erased.kind(), &Kind::L2_CL_NODE);
        assert_eq!(erased, id);
        assert_eq!(erased.downcast::<L2CLNodeId>().unwrap(), id);
        assert!(erased.downcast::<L2ELNodeId>().is_err());
        assert_eq!(L2CLNodeId::try_from(&erased).unwrap(), id);

        let sup = SupervisorId::new("a-1").erase();
        assert!(sup.downcast::<L2CLNodeId>().is_err());
    }

    #[test]
    fn test_parse_as() {
        let id = ComponentId::parse_as(IdShape::NameChain, "L2ELNode-op-geth-901").unwrap();
        assert_eq!(id, L2ELNodeId::new("op-geth", 901u64));
        assert!(ComponentId::parse_as(IdShape::Chain, "L2Network-x").is_err());
        assert!(ComponentId::parse_as(IdShape::Generic, "nokind").is_err());
    }

    #[test]
    fn test_kind_parse() {
        assert!(Kind::parse("Indexer").is_ok());
        assert!(Kind::parse("").is_err());
        assert!(Kind::parse("a-b").is_err());
        assert_eq!(Kind::parse("L2CLNode").unwrap(), Kind::L2_CL_NODE);
    }

    #[test]
    fn test_serde_as_text() {
        let id = L2CLNodeId::new("sequencer", 901u64);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"L2CLNode-sequencer-901\"");
        let back: L2CLNodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<L2CLNodeId>("\"Supervisor-x\"").is_err());
    }
}
