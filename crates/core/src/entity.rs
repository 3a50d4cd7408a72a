//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Ledger movements and payments are entities: they are looked up and deleted
/// by id, never compared by value.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
