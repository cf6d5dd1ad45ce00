//! Semantic (set-theoretic) type descriptions carried by finite types.
//!
//! Structured subtypes are expressed as binary decision diagrams whose nodes
//! reference atoms. Atom contents live once in the package [`AtomTable`];
//! BDD nodes only hold an [`BddAtom`] key. A recursive type is a BDD whose
//! atom's own contents contain a [`BddAtom::Rec`] back-reference to the atom
//! being defined, so the graph is finite while the type it denotes is not.

use std::collections::BTreeMap;

/// Rec-atom indices at or below this value name built-in atoms and never
/// appear in a package atom table.
pub const MAX_BUILTIN_REC_ATOM: i32 = 1;

/// A semantic type paired with an optional name, as listed by finite types.
#[derive(Debug, Clone, PartialEq)]
pub struct SemNamedType {
    pub semtype: Option<SemType>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SemType {
    /// Union of whole basic types, one bit per basic type.
    Uniform(i32),
    Complex(ComplexSemType),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComplexSemType {
    pub all: i32,
    pub some: i32,
    pub subtypes: Vec<ProperSubtype>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntRange {
    pub min: i64,
    pub max: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecimalValue {
    pub scale: i32,
    pub unscaled: Vec<u8>,
}

/// An allow-list or deny-list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StringSet {
    pub allowed: bool,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProperSubtype {
    Bdd(Bdd),
    Int(Vec<IntRange>),
    Boolean(bool),
    Float { allowed: bool, values: Vec<f64> },
    Decimal { allowed: bool, values: Vec<DecimalValue> },
    String { chars: StringSet, non_chars: StringSet },
    Xml { primitives: i32, sequence: Bdd },
}

impl ProperSubtype {
    pub fn kind(&self) -> i8 {
        match self {
            ProperSubtype::Bdd(_) => 1,
            ProperSubtype::Int(_) => 2,
            ProperSubtype::Boolean(_) => 3,
            ProperSubtype::Float { .. } => 4,
            ProperSubtype::Decimal { .. } => 5,
            ProperSubtype::String { .. } => 6,
            ProperSubtype::Xml { .. } => 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Bdd {
    /// Terminal: `true` is the full set, `false` the empty set.
    AllOrNothing(bool),
    Node(Box<BddNode>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BddNode {
    pub atom: BddAtom,
    pub left: Bdd,
    pub middle: Bdd,
    pub right: Bdd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BddAtom {
    /// Definition site of the atom stored under this index.
    Type(i32),
    /// Back-reference to an atom defined elsewhere (or a built-in when
    /// `index <= MAX_BUILTIN_REC_ATOM`). `kind` is present only for
    /// non-built-in references.
    Rec { index: i32, kind: Option<i32> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AtomicType {
    Mapping {
        names: Vec<String>,
        types: Vec<Option<SemType>>,
        rest: Option<SemType>,
    },
    List {
        initial: Vec<Option<SemType>>,
        fixed_length: i32,
        rest: Option<SemType>,
    },
    Function {
        param: Option<SemType>,
        ret: Option<SemType>,
        qualifier: Option<SemType>,
        is_generic: bool,
    },
    Cell {
        ty: Option<SemType>,
        mutability: i8,
    },
}

impl AtomicType {
    pub fn kind(&self) -> i8 {
        match self {
            AtomicType::Mapping { .. } => 1,
            AtomicType::List { .. } => 2,
            AtomicType::Function { .. } => 3,
            AtomicType::Cell { .. } => 4,
        }
    }
}

/// Why an atom could not be entered into the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomConflict {
    /// The atom is already being defined further up the current decode.
    InProgress,
    /// A completed definition exists and differs from the new one.
    Different,
}

/// Package-wide registry of atom definitions, keyed by atom index.
///
/// During decoding a slot is reserved before the atom's contents are read,
/// which lets a back-reference inside those contents resolve to it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AtomTable {
    atoms: BTreeMap<i32, Option<AtomicType>>,
}

impl AtomTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of atoms, reserved or complete.
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// True when the index is known, either complete or still being defined.
    pub fn contains(&self, index: i32) -> bool {
        self.atoms.contains_key(&index)
    }

    pub fn get(&self, index: i32) -> Option<&AtomicType> {
        self.atoms.get(&index).and_then(|a| a.as_ref())
    }

    /// Inserts a complete definition. Re-inserting an identical atom is a no-op.
    pub fn define(&mut self, index: i32, atom: AtomicType) -> Result<(), AtomConflict> {
        match self.atoms.get(&index) {
            Some(None) => Err(AtomConflict::InProgress),
            Some(Some(existing)) if *existing != atom => Err(AtomConflict::Different),
            Some(Some(_)) => Ok(()),
            None => {
                self.atoms.insert(index, Some(atom));
                Ok(())
            }
        }
    }

    /// Marks `index` as being defined. Returns `Ok(true)` if a completed
    /// definition already exists (the caller should compare rather than insert).
    pub(crate) fn reserve(&mut self, index: i32) -> Result<bool, AtomConflict> {
        match self.atoms.get(&index) {
            Some(None) => Err(AtomConflict::InProgress),
            Some(Some(_)) => Ok(true),
            None => {
                self.atoms.insert(index, None);
                Ok(false)
            }
        }
    }

    /// Fills a slot created by [`AtomTable::reserve`].
    pub(crate) fn complete(&mut self, index: i32, atom: AtomicType) {
        self.atoms.insert(index, Some(atom));
    }

    /// Indices reserved but never completed.
    pub fn incomplete(&self) -> impl Iterator<Item = i32> + '_ {
        self.atoms
            .iter()
            .filter(|(_, a)| a.is_none())
            .map(|(i, _)| *i)
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, &AtomicType)> {
        self.atoms
            .iter()
            .filter_map(|(i, a)| a.as_ref().map(|a| (*i, a)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell() -> AtomicType {
        AtomicType::Cell {
            ty: Some(SemType::Uniform(1)),
            mutability: 0,
        }
    }

    #[test]
    fn test_reserve_blocks_redefinition_until_complete() {
        let mut table = AtomTable::new();
        assert_eq!(table.reserve(3), Ok(false));
        assert!(table.contains(3));
        assert_eq!(table.get(3), None);
        assert_eq!(table.reserve(3), Err(AtomConflict::InProgress));
        assert_eq!(table.incomplete().collect::<Vec<_>>(), vec![3]);

        table.complete(3, cell());
        assert_eq!(table.get(3), Some(&cell()));
        assert_eq!(table.reserve(3), Ok(true));
        assert_eq!(table.incomplete().count(), 0);
    }

    #[test]
    fn test_define_rejects_conflicting_contents() {
        let mut table = AtomTable::new();
        table.define(7, cell()).unwrap();
        table.define(7, cell()).unwrap();
        let other = AtomicType::Cell {
            ty: None,
            mutability: 1,
        };
        assert_eq!(table.define(7, other), Err(AtomConflict::Different));
        assert_eq!(table.len(), 1);
    }
}
