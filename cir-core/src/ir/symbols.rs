//! Canonical IR entities shared by identity
//!
//! Variables, composite types, fields, enums and typedefs are canonical:
//! exactly one descriptor object exists per entity, and every use in the
//! IR refers to that same object. The handles in this module are shared,
//! interior-mutable references whose equality and hashing compare the
//! allocation address, never the contents. Two variables with the same
//! name are still different variables unless they are the same object.
//!
//! The field-to-composite back edge is a weak handle so composite
//! definitions can be dropped without a reference-count knot on that edge.

use crate::attributes::AttrList;
use crate::ir::types::Type;
use cir_common::Location;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

/// Sentinel used as the name of unnamed bitfield members
pub const MISSING_FIELD_NAME: &str = "___missing_field_name";

/// Deterministic name hash used for global variable ids and composite keys
pub fn hash_name(name: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    hasher.finish()
}

/// Storage classes attached to variables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Storage {
    #[default]
    None,
    Static,
    Register,
    Extern,
}

impl fmt::Display for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Storage::None => Ok(()),
            Storage::Static => write!(f, "static"),
            Storage::Register => write!(f, "register"),
            Storage::Extern => write!(f, "extern"),
        }
    }
}

/// Descriptor for a variable (global, local or formal)
///
/// A variable used both by a prototype and a definition shares one
/// `VarInfo`. Globals take their id from `hash_name`; locals are numbered
/// by the owning function with formals starting at 0.
#[derive(Debug, Clone)]
pub struct VarInfo {
    pub name: String,
    pub ty: Type,
    pub attrs: AttrList,
    pub storage: Storage,
    pub is_global: bool,
    pub decl_loc: Location,
    pub id: u64,
    pub address_taken: bool,
    pub referenced: bool,
}

impl VarInfo {
    pub fn new(name: &str, ty: Type) -> Self {
        Self {
            name: name.to_string(),
            ty,
            attrs: AttrList::new(),
            storage: Storage::None,
            is_global: false,
            decl_loc: Location::unknown(),
            id: 0,
            address_taken: false,
            referenced: false,
        }
    }
}

/// Descriptor for a struct or union
///
/// The `key` is the hash of `"struct <name>"` or `"union <name>"`; it is
/// kept consistent with the name, so renaming goes through `set_name`.
#[derive(Debug)]
pub struct CompInfo {
    pub is_struct: bool,
    name: String,
    key: u64,
    pub fields: Vec<FieldRef>,
    pub attrs: AttrList,
    pub referenced: bool,
}

impl CompInfo {
    pub fn new(is_struct: bool, name: &str, attrs: AttrList) -> Self {
        let mut ci = Self {
            is_struct,
            name: String::new(),
            key: 0,
            fields: Vec::new(),
            attrs,
            referenced: false,
        };
        ci.set_name(name);
        ci
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> u64 {
        self.key
    }

    /// Rename the composite, recomputing its key
    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
        let tag = if self.is_struct { "struct" } else { "union" };
        self.key = hash_name(&format!("{} {}", tag, self.name));
    }
}

/// Descriptor for one field of a composite
#[derive(Debug, Clone)]
pub struct FieldInfo {
    /// Back-reference to the owning composite
    pub comp: CompWeak,
    /// Field name; `MISSING_FIELD_NAME` for unnamed bitfields
    pub name: String,
    pub ty: Type,
    /// Bit width when this member is a bitfield
    pub bitfield: Option<u32>,
    pub attrs: AttrList,
}

impl FieldInfo {
    /// True when this member is an unnamed bitfield
    pub fn is_anonymous(&self) -> bool {
        self.name == MISSING_FIELD_NAME
    }
}

/// Descriptor for an enum definition
#[derive(Debug)]
pub struct EnumInfo {
    pub name: String,
    /// Ordered (label, value expression) pairs
    pub items: Vec<(String, crate::ir::expressions::Exp)>,
    pub attrs: AttrList,
    pub referenced: bool,
}

impl EnumInfo {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            items: Vec::new(),
            attrs: AttrList::new(),
            referenced: false,
        }
    }
}

/// Descriptor for a typedef
#[derive(Debug)]
pub struct TypedefInfo {
    pub name: String,
    pub ty: Type,
    pub referenced: bool,
}

impl TypedefInfo {
    pub fn new(name: &str, ty: Type) -> Self {
        Self {
            name: name.to_string(),
            ty,
            referenced: false,
        }
    }
}

macro_rules! shared_handle {
    ($(#[$doc:meta])* $handle:ident, $inner:ty, $label:expr) => {
        $(#[$doc])*
        #[derive(Clone)]
        pub struct $handle(Rc<RefCell<$inner>>);

        impl $handle {
            pub fn new(inner: $inner) -> Self {
                Self(Rc::new(RefCell::new(inner)))
            }

            pub fn borrow(&self) -> Ref<'_, $inner> {
                self.0.borrow()
            }

            pub fn borrow_mut(&self) -> RefMut<'_, $inner> {
                self.0.borrow_mut()
            }

            /// Identity comparison; the same test `PartialEq` performs
            pub fn ptr_eq(&self, other: &Self) -> bool {
                Rc::ptr_eq(&self.0, &other.0)
            }
        }

        impl PartialEq for $handle {
            fn eq(&self, other: &Self) -> bool {
                Rc::ptr_eq(&self.0, &other.0)
            }
        }

        impl Eq for $handle {}

        impl Hash for $handle {
            fn hash<H: Hasher>(&self, state: &mut H) {
                Rc::as_ptr(&self.0).hash(state);
            }
        }

        // Shallow on purpose: the IR is cyclic through these handles
        impl fmt::Debug for $handle {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self.0.try_borrow() {
                    Ok(inner) => write!(f, concat!($label, "({})"), inner.debug_name()),
                    Err(_) => write!(f, concat!($label, "(<borrowed>)")),
                }
            }
        }
    };
}

trait DebugName {
    fn debug_name(&self) -> String;
}

impl DebugName for VarInfo {
    fn debug_name(&self) -> String {
        format!("{}#{}", self.name, self.id)
    }
}

impl DebugName for CompInfo {
    fn debug_name(&self) -> String {
        let tag = if self.is_struct { "struct" } else { "union" };
        format!("{} {}", tag, self.name)
    }
}

impl DebugName for FieldInfo {
    fn debug_name(&self) -> String {
        self.name.clone()
    }
}

impl DebugName for EnumInfo {
    fn debug_name(&self) -> String {
        self.name.clone()
    }
}

impl DebugName for TypedefInfo {
    fn debug_name(&self) -> String {
        self.name.clone()
    }
}

shared_handle!(
    /// Shared handle to a variable descriptor
    VarRef,
    VarInfo,
    "VarRef"
);
shared_handle!(
    /// Shared handle to a composite descriptor
    CompRef,
    CompInfo,
    "CompRef"
);
shared_handle!(
    /// Shared handle to a field descriptor
    FieldRef,
    FieldInfo,
    "FieldRef"
);
shared_handle!(
    /// Shared handle to an enum descriptor
    EnumRef,
    EnumInfo,
    "EnumRef"
);
shared_handle!(
    /// Shared handle to a typedef descriptor
    TypedefRef,
    TypedefInfo,
    "TypedefRef"
);

/// Weak back edge from a field to its composite
#[derive(Clone, Default)]
pub struct CompWeak(Weak<RefCell<CompInfo>>);

impl CompWeak {
    pub fn from_ref(comp: &CompRef) -> Self {
        Self(Rc::downgrade(&comp.0))
    }

    /// Recover the owning composite; panics if the definition is gone,
    /// which would mean a field outlived its composite
    pub fn upgrade(&self) -> CompRef {
        CompRef(self.0.upgrade().expect("field outlived its composite"))
    }

    pub fn points_to(&self, comp: &CompRef) -> bool {
        self.0
            .upgrade()
            .map(|rc| Rc::ptr_eq(&rc, &comp.0))
            .unwrap_or(false)
    }
}

impl fmt::Debug for CompWeak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.upgrade() {
            Some(rc) => match rc.try_borrow() {
                Ok(ci) => write!(f, "CompWeak({})", ci.debug_name()),
                Err(_) => write!(f, "CompWeak(<borrowed>)"),
            },
            None => write!(f, "CompWeak(<dangling>)"),
        }
    }
}
