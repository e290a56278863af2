//! Composable selection over component collections.
//!
//! A [`Matcher`] filters a slice of elements into the subset it selects,
//! preserving the input order. The base matcher is an exact identifier:
//! every typed identifier and [`ComponentId`](crate::id::ComponentId) is a
//! matcher for elements whose [`Identifiable::id`] compares equal to it.
//! Everything else is built by composition with [`MatcherExt`] and the free
//! constructors in this module.
//!
//! # Example
//!
//! ```
//! use mamut_core::id::{ComponentId, L2CLNodeId};
//! use mamut_core::matcher::{predicate, Identifiable, Matcher, MatcherExt};
//!
//! #[derive(Clone)]
//! struct Node(L2CLNodeId);
//!
//! impl Identifiable for Node {
//!     type Id = L2CLNodeId;
//!     fn id(&self) -> L2CLNodeId {
//!         self.0.clone()
//!     }
//! }
//!
//! let nodes = vec![
//!     Node(L2CLNodeId::new("a", 901u64)),
//!     Node(L2CLNodeId::new("b", 901u64)),
//!     Node(L2CLNodeId::new("c", 902u64)),
//! ];
//!
//! let on_901 = predicate("chain 901", |n: &Node| n.0.chain_id().inner() == 901);
//! assert_eq!(on_901.matches(&nodes).len(), 2);
//! assert_eq!(on_901.last().one(&nodes).unwrap().0.name(), "b");
//! ```

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;

use crate::error::MatchError;
use crate::id::{ChainIdOf, ComponentId, GenericId, KindTag, NameChainId};

/// An element that can be selected by identifier.
pub trait Identifiable {
    /// Identifier type.
    type Id: Clone + Eq + Hash;

    /// Returns the element's identifier.
    fn id(&self) -> Self::Id;
}

/// An element carrying string labels.
pub trait Labeled {
    /// Returns the label stored under `key`, if any.
    fn label(&self, key: &str) -> Option<String>;
}

/// Selects a subset of elements.
///
/// Implementations must be pure: the same input always yields the same
/// output, in input order.
pub trait Matcher<E: Clone>: fmt::Display + Send + Sync {
    /// Returns the selected elements in input order.
    fn matches(&self, elems: &[E]) -> Vec<E>;

    /// Returns the single selected element.
    ///
    /// Fails with [`MatchError::NotFound`] or [`MatchError::Ambiguous`]
    /// when the selection is not exactly one element.
    fn one(&self, elems: &[E]) -> Result<E, MatchError> {
        let mut found = self.matches(elems);
        match found.len() {
            1 => Ok(found.remove(0)),
            0 => Err(MatchError::NotFound {
                matcher: self.to_string(),
            }),
            count => Err(MatchError::Ambiguous {
                matcher: self.to_string(),
                count,
            }),
        }
    }
}

impl<E: Clone, M: Matcher<E> + ?Sized> Matcher<E> for Box<M> {
    fn matches(&self, elems: &[E]) -> Vec<E> {
        (**self).matches(elems)
    }
}

fn exact<E, I>(elems: &[E], id: &I) -> Vec<E>
where
    E: Identifiable + Clone,
    E::Id: PartialEq<I>,
{
    elems
        .iter()
        .find(|elem| elem.id() == *id)
        .cloned()
        .into_iter()
        .collect()
}

macro_rules! impl_exact_matcher {
    ($ty:ident) => {
        impl<K, E> Matcher<E> for $ty<K>
        where
            K: KindTag,
            E: Identifiable + Clone,
            E::Id: PartialEq<$ty<K>>,
        {
            fn matches(&self, elems: &[E]) -> Vec<E> {
                exact(elems, self)
            }
        }
    };
}

impl_exact_matcher!(GenericId);
impl_exact_matcher!(ChainIdOf);
impl_exact_matcher!(NameChainId);

impl<E> Matcher<E> for ComponentId
where
    E: Identifiable + Clone,
    E::Id: PartialEq<ComponentId>,
{
    fn matches(&self, elems: &[E]) -> Vec<E> {
        exact(elems, self)
    }
}

fn ids_of<E: Identifiable>(elems: &[E]) -> HashSet<E::Id> {
    elems.iter().map(Identifiable::id).collect()
}

/// Selects the first element chosen by the inner matcher.
#[derive(Debug, Clone)]
pub struct First<M>(M);

impl<E: Clone, M: Matcher<E>> Matcher<E> for First<M> {
    fn matches(&self, elems: &[E]) -> Vec<E> {
        self.0.matches(elems).into_iter().take(1).collect()
    }
}

impl<M: fmt::Display> fmt::Display for First<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "first({})", self.0)
    }
}

/// Selects the last element chosen by the inner matcher.
#[derive(Debug, Clone)]
pub struct Last<M>(M);

impl<E: Clone, M: Matcher<E>> Matcher<E> for Last<M> {
    fn matches(&self, elems: &[E]) -> Vec<E> {
        self.0.matches(elems).pop().into_iter().collect()
    }
}

impl<M: fmt::Display> fmt::Display for Last<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "last({})", self.0)
    }
}

/// Selects the n-th (zero-based) element chosen by the inner matcher.
#[derive(Debug, Clone)]
pub struct Nth<M> {
    inner: M,
    index: usize,
}

impl<E: Clone, M: Matcher<E>> Matcher<E> for Nth<M> {
    fn matches(&self, elems: &[E]) -> Vec<E> {
        self.inner
            .matches(elems)
            .into_iter()
            .nth(self.index)
            .into_iter()
            .collect()
    }
}

impl<M: fmt::Display> fmt::Display for Nth<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "nth({}, {})", self.inner, self.index)
    }
}

/// Narrows the selection of `A` with `B`.
#[derive(Debug, Clone)]
pub struct And<A, B>(A, B);

impl<E: Clone, A: Matcher<E>, B: Matcher<E>> Matcher<E> for And<A, B> {
    fn matches(&self, elems: &[E]) -> Vec<E> {
        self.1.matches(&self.0.matches(elems))
    }
}

impl<A: fmt::Display, B: fmt::Display> fmt::Display for And<A, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} and {})", self.0, self.1)
    }
}

/// Selects elements chosen by either matcher, in input order.
#[derive(Debug, Clone)]
pub struct Or<A, B>(A, B);

impl<E, A, B> Matcher<E> for Or<A, B>
where
    E: Identifiable + Clone,
    A: Matcher<E>,
    B: Matcher<E>,
{
    fn matches(&self, elems: &[E]) -> Vec<E> {
        let mut chosen = ids_of(&self.0.matches(elems));
        chosen.extend(ids_of(&self.1.matches(elems)));
        elems
            .iter()
            .filter(|elem| chosen.contains(&elem.id()))
            .cloned()
            .collect()
    }
}

impl<A: fmt::Display, B: fmt::Display> fmt::Display for Or<A, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} or {})", self.0, self.1)
    }
}

/// Selects every element the inner matcher does not.
#[derive(Debug, Clone)]
pub struct Not<M>(M);

impl<E, M> Matcher<E> for Not<M>
where
    E: Identifiable + Clone,
    M: Matcher<E>,
{
    fn matches(&self, elems: &[E]) -> Vec<E> {
        let excluded = ids_of(&self.0.matches(elems));
        elems
            .iter()
            .filter(|elem| !excluded.contains(&elem.id()))
            .cloned()
            .collect()
    }
}

impl<M: fmt::Display> fmt::Display for Not<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not({})", self.0)
    }
}

/// Selects elements satisfying a closure.
pub struct Predicate<F> {
    description: String,
    pred: F,
}

impl<E, F> Matcher<E> for Predicate<F>
where
    E: Clone,
    F: Fn(&E) -> bool + Send + Sync,
{
    fn matches(&self, elems: &[E]) -> Vec<E> {
        elems.iter().filter(|e| (self.pred)(e)).cloned().collect()
    }
}

impl<F> fmt::Display for Predicate<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

impl<F> fmt::Debug for Predicate<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Selects elements whose label `key` equals `value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithLabel {
    key: String,
    value: String,
}

impl<E: Labeled + Clone> Matcher<E> for WithLabel {
    fn matches(&self, elems: &[E]) -> Vec<E> {
        elems
            .iter()
            .filter(|elem| elem.label(&self.key).as_deref() == Some(self.value.as_str()))
            .cloned()
            .collect()
    }
}

impl fmt::Display for WithLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "label({}={})", self.key, self.value)
    }
}

/// Creates a matcher from a closure and a description used in errors.
pub fn predicate<E, F>(description: impl Into<String>, pred: F) -> Predicate<F>
where
    F: Fn(&E) -> bool + Send + Sync,
{
    Predicate {
        description: description.into(),
        pred,
    }
}

/// Creates a label matcher.
pub fn with_label(key: impl Into<String>, value: impl Into<String>) -> WithLabel {
    WithLabel {
        key: key.into(),
        value: value.into(),
    }
}

/// Selects every element.
pub fn any<E>() -> Predicate<fn(&E) -> bool> {
    predicate("any", (|_| true) as fn(&E) -> bool)
}

/// Composition methods available on every matcher.
pub trait MatcherExt: Sized {
    /// Keeps only the first selected element.
    fn first(self) -> First<Self> {
        First(self)
    }

    /// Keeps only the last selected element.
    fn last(self) -> Last<Self> {
        Last(self)
    }

    /// Keeps only the `index`-th selected element.
    fn nth(self, index: usize) -> Nth<Self> {
        Nth { inner: self, index }
    }

    /// Narrows this selection with `other`.
    fn and<B>(self, other: B) -> And<Self, B> {
        And(self, other)
    }

    /// Unions this selection with `other`.
    fn or<B>(self, other: B) -> Or<Self, B> {
        Or(self, other)
    }

    /// Inverts this selection.
    fn not(self) -> Not<Self> {
        Not(self)
    }

    /// Boxes the matcher for storage in heterogeneous collections.
    fn boxed<E: Clone>(self) -> Box<dyn Matcher<E>>
    where
        Self: Matcher<E> + 'static,
    {
        Box::new(self)
    }
}

impl<M> MatcherExt for First<M> {}
impl<M> MatcherExt for Last<M> {}
impl<M> MatcherExt for Nth<M> {}
impl<A, B> MatcherExt for And<A, B> {}
impl<A, B> MatcherExt for Or<A, B> {}
impl<M> MatcherExt for Not<M> {}
impl<F> MatcherExt for Predicate<F> {}
impl MatcherExt for WithLabel {}
impl MatcherExt for ComponentId {}
impl<K: KindTag> MatcherExt for GenericId<K> {}
impl<K: KindTag> MatcherExt for ChainIdOf<K> {}
impl<K: KindTag> MatcherExt for NameChainId<K> {}

/// Sorts elements by identifier.
pub fn sort_by_id<E>(elems: &mut [E])
where
    E: Identifiable,
    E::Id: Ord,
{
    elems.sort_by_key(Identifiable::id);
}
