//! Variable flagging.
//!
//! A [`crate::Network`] does not decide on its own which physical quantities
//! are optimization variables. Callers flag them with
//! [`crate::Network::set_flags`], choosing an object type, a property selector
//! and a variable kind. Every flagged quantity gets the next free column index,
//! so the order of `set_flags` calls fixes the layout of the variable vector.

use std::collections::HashMap;
use std::ops::BitOr;

use petgraph::graph::NodeIndex;
use serde::Serialize;

/// Component class a flag call applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ObjectType {
    Bus,
    Gen,
}

/// Bit set of flag kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(u8);

impl Flags {
    pub const NONE: Flags = Flags(0);
    /// Quantity becomes a decision variable
    pub const VARS: Flags = Flags(1);
    /// Variable takes its physical limits in the bound constraint
    pub const BOUNDED: Flags = Flags(1 << 1);

    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Self) -> Self::Output {
        Flags(self.0 | rhs.0)
    }
}

/// Property predicate selecting which components of an object type get flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Selector {
    AnyBus,
    BusSlack,
    BusNotSlack,
    AnyGen,
    /// In service and marked adjustable
    GenPAdjust,
}

impl Selector {
    pub fn object_type(self) -> ObjectType {
        match self {
            Selector::AnyBus | Selector::BusSlack | Selector::BusNotSlack => ObjectType::Bus,
            Selector::AnyGen | Selector::GenPAdjust => ObjectType::Gen,
        }
    }
}

/// Physical quantity that can become a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum VarKind {
    /// Bus voltage angle (radians)
    BusAngle,
    /// Generator active power output (per unit)
    GenActivePower,
}

impl VarKind {
    pub fn object_type(self) -> ObjectType {
        match self {
            VarKind::BusAngle => ObjectType::Bus,
            VarKind::GenActivePower => ObjectType::Gen,
        }
    }
}

/// Identifies one variable: the quantity and the graph node it lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarKey {
    pub kind: VarKind,
    pub node: NodeIndex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarEntry {
    pub key: VarKey,
    pub bounded: bool,
}

/// Column layout of the variable vector.
#[derive(Debug, Clone, Default)]
pub struct VarRegistry {
    entries: Vec<VarEntry>,
    index: HashMap<VarKey, usize>,
}

impl VarRegistry {
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Apply `flags` to one quantity. Returns `true` when a new variable was
    /// created.
    pub fn apply(&mut self, key: VarKey, flags: Flags) -> bool {
        let bounded = flags.contains(Flags::BOUNDED);
        if let Some(&idx) = self.index.get(&key) {
            self.entries[idx].bounded |= bounded;
            return false;
        }
        if !flags.contains(Flags::VARS) {
            return false;
        }
        self.index.insert(key, self.entries.len());
        self.entries.push(VarEntry { key, bounded });
        true
    }

    pub fn index_of(&self, key: VarKey) -> Option<usize> {
        self.index.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn num_bounded(&self) -> usize {
        self.entries.iter().filter(|e| e.bounded).count()
    }

    pub fn entries(&self) -> &[VarEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(kind: VarKind, node: usize) -> VarKey {
        VarKey {
            kind,
            node: NodeIndex::new(node),
        }
    }

    #[test]
    fn flags_combine() {
        let both = Flags::VARS | Flags::BOUNDED;
        assert!(both.contains(Flags::VARS));
        assert!(both.contains(Flags::BOUNDED));
        assert!(!Flags::VARS.contains(Flags::BOUNDED));
        assert!(Flags::VARS.contains(Flags::NONE));
    }

    #[test]
    fn registry_assigns_consecutive_indices() {
        let mut reg = VarRegistry::default();
        assert!(reg.apply(key(VarKind::BusAngle, 3), Flags::VARS));
        assert!(reg.apply(key(VarKind::GenActivePower, 1), Flags::VARS | Flags::BOUNDED));
        assert!(!reg.apply(key(VarKind::BusAngle, 3), Flags::VARS));

        assert_eq!(reg.len(), 2);
        assert_eq!(reg.num_bounded(), 1);
        assert_eq!(reg.index_of(key(VarKind::BusAngle, 3)), Some(0));
        assert_eq!(reg.index_of(key(VarKind::GenActivePower, 1)), Some(1));
    }

    #[test]
    fn bounded_without_vars_only_marks_existing() {
        let mut reg = VarRegistry::default();
        assert!(!reg.apply(key(VarKind::BusAngle, 0), Flags::BOUNDED));
        assert!(reg.is_empty());

        reg.apply(key(VarKind::BusAngle, 0), Flags::VARS);
        reg.apply(key(VarKind::BusAngle, 0), Flags::BOUNDED);
        assert_eq!(reg.num_bounded(), 1);

        reg.clear();
        assert!(reg.is_empty());
    }

    #[test]
    fn selectors_know_their_object_type() {
        assert_eq!(Selector::BusNotSlack.object_type(), ObjectType::Bus);
        assert_eq!(Selector::GenPAdjust.object_type(), ObjectType::Gen);
        assert_eq!(VarKind::GenActivePower.object_type(), ObjectType::Gen);
    }
}
