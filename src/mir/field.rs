//! Field and method resolution tables.
//!
//! The bytecode-lowering collaborator resolves field and method references
//! against the class environment and hands the results to this subsystem as
//! read-only tables. Value numbering only needs a small slice of that
//! information: the declaring class identity, whether resolution succeeded,
//! whether the member is static, and (for fields) volatility.
//!
//! Volatile and unresolved fields are excluded from precise memory tracking;
//! unresolved members are conservative sinks that add no equalities and can
//! be clobbered by any unknown-target write.

use std::fmt;

/// Identity of a declaring class.
///
/// Class-initialization facts are keyed by this id and shared across all
/// static fields of the class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

impl ClassId {
    /// Creates a new class identity.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the underlying index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class{}", self.0)
    }
}

/// Index of a field reference in the resolution tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(u32);

impl FieldId {
    /// Creates a new field reference id.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the underlying index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field{}", self.0)
    }
}

/// Index of a method reference in the resolution tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(u32);

impl MethodId {
    /// Creates a new method reference id.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the underlying index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "method{}", self.0)
    }
}

/// Resolution result for one field reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDesc {
    /// Declaring class, when resolution succeeded.
    pub class: Option<ClassId>,
    /// Whether the reference resolved.
    pub resolved: bool,
    /// Whether the field is static.
    pub is_static: bool,
    /// Whether the field is volatile.
    ///
    /// Volatile fields are excluded from precise value tracking.
    pub is_volatile: bool,
}

impl FieldDesc {
    /// Returns `true` if this field participates in precise memory tracking.
    ///
    /// Unresolved and volatile fields do not.
    #[must_use]
    pub const fn is_tracked(&self) -> bool {
        self.resolved && !self.is_volatile
    }
}

/// Resolution result for one method reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodDesc {
    /// Declaring class, when resolution succeeded.
    pub class: Option<ClassId>,
    /// Whether the reference resolved.
    pub resolved: bool,
    /// Whether the method is static.
    pub is_static: bool,
}

/// Read-only field/method resolution tables for one method compilation.
///
/// Built by the lowering collaborator (typically through
/// [`MethodBuilder`](crate::mir::MethodBuilder)); this subsystem never
/// mutates them.
#[derive(Debug, Clone, Default)]
pub struct ResolutionTables {
    classes: u32,
    fields: Vec<FieldDesc>,
    methods: Vec<MethodDesc>,
}

impl ResolutionTables {
    /// Creates empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a class identity.
    pub fn add_class(&mut self) -> ClassId {
        let id = ClassId::new(self.classes);
        self.classes += 1;
        id
    }

    /// Registers a field reference and returns its id.
    pub fn add_field(&mut self, desc: FieldDesc) -> FieldId {
        let id = FieldId::new(u32::try_from(self.fields.len()).unwrap_or(u32::MAX));
        self.fields.push(desc);
        id
    }

    /// Registers a method reference and returns its id.
    pub fn add_method(&mut self, desc: MethodDesc) -> MethodId {
        let id = MethodId::new(u32::try_from(self.methods.len()).unwrap_or(u32::MAX));
        self.methods.push(desc);
        id
    }

    /// Looks up a field reference.
    #[must_use]
    pub fn field(&self, id: FieldId) -> Option<&FieldDesc> {
        self.fields.get(id.index())
    }

    /// Looks up a method reference.
    #[must_use]
    pub fn method(&self, id: MethodId) -> Option<&MethodDesc> {
        self.methods.get(id.index())
    }

    /// Returns the number of registered field references.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Returns the number of registered method references.
    #[must_use]
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_tracking() {
        let resolved = FieldDesc {
            class: Some(ClassId::new(0)),
            resolved: true,
            is_static: false,
            is_volatile: false,
        };
        assert!(resolved.is_tracked());

        let volatile = FieldDesc {
            is_volatile: true,
            ..resolved
        };
        assert!(!volatile.is_tracked());

        let unresolved = FieldDesc {
            class: None,
            resolved: false,
            is_static: false,
            is_volatile: false,
        };
        assert!(!unresolved.is_tracked());
    }

    #[test]
    fn test_tables_registration() {
        let mut tables = ResolutionTables::new();
        let class = tables.add_class();
        let field = tables.add_field(FieldDesc {
            class: Some(class),
            resolved: true,
            is_static: true,
            is_volatile: false,
        });
        let method = tables.add_method(MethodDesc {
            class: Some(class),
            resolved: true,
            is_static: true,
        });

        assert_eq!(tables.field(field).unwrap().class, Some(class));
        assert!(tables.method(method).unwrap().is_static);
        assert_eq!(tables.field_count(), 1);
        assert_eq!(tables.method_count(), 1);
    }
}
