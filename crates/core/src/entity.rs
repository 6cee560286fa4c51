//! Entity traits: identity + continuity across state changes, and logical deletion.

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

/// Entities that are never physically removed, only flagged.
///
/// Every read path in a store applies [`SoftDelete::is_active`] explicitly; nothing is
/// filtered implicitly behind the caller's back.
pub trait SoftDelete: Entity {
    fn is_deleted(&self) -> bool;

    fn mark_deleted(&mut self);

    fn is_active(&self) -> bool {
        !self.is_deleted()
    }
}

/// Find an active entity by id in a slice of rows (store order).
pub fn find_active<E: SoftDelete>(rows: &[E], id: E::Id) -> Option<&E> {
    rows.iter().find(|row| *row.id() == id && row.is_active())
}

/// Mutable variant of [`find_active`].
pub fn find_active_mut<E: SoftDelete>(rows: &mut [E], id: E::Id) -> Option<&mut E> {
    rows.iter_mut().find(|row| *row.id() == id && row.is_active())
}
