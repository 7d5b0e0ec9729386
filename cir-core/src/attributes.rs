//! Attribute lists and their classification
//!
//! Attributes decorate types, variables, fields, composites and functions.
//! An attribute list is always kept sorted by attribute name: exact
//! duplicates are suppressed on insertion, while distinct attributes that
//! share a name are all kept, in insertion order within the name group.
//! Keeping the lists sorted makes structural comparison of types
//! insensitive to the order attributes were written in.

use crate::ir::ops::{BinaryOp, UnaryOp};
use crate::ir::types::Type;

/// The parameter sub-language of attributes
#[derive(Debug, Clone, PartialEq)]
pub enum AttrParam {
    /// Integer argument
    Int(i64),
    /// String argument
    Str(String),
    /// Reference to a name (a variable or an enum label)
    Var(String),
    /// Constructed argument: `name(args...)`
    Cons(String, Vec<AttrParam>),
    /// sizeof(type)
    SizeOfType(Box<Type>),
    /// sizeof applied to another parameter
    SizeOfParam(Box<AttrParam>),
    /// Unary operator applied to a parameter
    UnOp(UnaryOp, Box<AttrParam>),
    /// Binary operator applied to two parameters
    BinOp(BinaryOp, Box<AttrParam>, Box<AttrParam>),
}

/// A single attribute: a name plus ordered parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub params: Vec<AttrParam>,
}

impl Attribute {
    pub fn new(name: &str, params: Vec<AttrParam>) -> Self {
        Self {
            name: name.to_string(),
            params,
        }
    }

    /// An attribute with no parameters
    pub fn flag(name: &str) -> Self {
        Self::new(name, Vec::new())
    }
}

/// A name-sorted attribute list
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttrList(Vec<Attribute>);

impl AttrList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Build a list from arbitrary-order attributes
    pub fn from_attrs(attrs: Vec<Attribute>) -> Self {
        let mut list = Self::new();
        for a in attrs {
            list.add(a);
        }
        list
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Attribute> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Attribute] {
        &self.0
    }

    /// Insert one attribute, keeping the list sorted by name.
    ///
    /// An attribute equal to one already present is dropped; an attribute
    /// with the same name but different parameters is inserted after the
    /// existing entries of that name.
    pub fn add(&mut self, a: Attribute) {
        let mut i = 0;
        while i < self.0.len() {
            let cur = &self.0[i];
            if a.name.as_str() < cur.name.as_str() {
                break;
            }
            if *cur == a {
                return;
            }
            i += 1;
        }
        self.0.insert(i, a);
    }

    /// Left-fold `add` over another list
    pub fn add_all(&mut self, other: &AttrList) {
        for a in other.iter() {
            self.add(a.clone());
        }
    }

    /// Merge two lists into a fresh sorted list
    pub fn union(&self, other: &AttrList) -> AttrList {
        let mut out = self.clone();
        out.add_all(other);
        out
    }

    /// Remove all attributes with the given name
    pub fn drop_named(&mut self, name: &str) {
        self.0.retain(|a| a.name != name);
    }

    /// Keep only the attributes with the given name
    pub fn filter_named(&self, name: &str) -> AttrList {
        AttrList(
            self.0
                .iter()
                .filter(|a| a.name == name)
                .cloned()
                .collect(),
        )
    }

    /// Test whether any attribute has the given name
    pub fn has(&self, name: &str) -> bool {
        self.0.iter().any(|a| a.name == name)
    }

    /// First attribute with the given name, if any
    pub fn find(&self, name: &str) -> Option<&Attribute> {
        self.0.iter().find(|a| a.name == name)
    }
}

impl<'a> IntoIterator for &'a AttrList {
    type Item = &'a Attribute;
    type IntoIter = std::slice::Iter<'a, Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<Attribute> for AttrList {
    fn from_iter<T: IntoIterator<Item = Attribute>>(iter: T) -> Self {
        let mut list = Self::new();
        for a in iter {
            list.add(a);
        }
        list
    }
}

/// Where an attribute attaches when a declaration is split into its parts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrClass {
    /// Associates with the declared name; the flag requests MSVC
    /// `__declspec(...)` placement
    Name(bool),
    /// Attaches to the function type; the flag requests placement right
    /// before the function name in MSVC output
    FunType(bool),
    /// Attaches to the underlying type
    Type,
}

/// Classify a known attribute name; `None` for names the registry does
/// not know about
pub fn attribute_class(name: &str) -> Option<AttrClass> {
    match name {
        "section" | "constructor" | "destructor" | "unused" | "weak" | "alias"
        | "no_instrument_function" | "exception" | "model" | "aconst" | "__asm__" => {
            Some(AttrClass::Name(false))
        }
        "thread" | "naked" | "dllimport" | "dllexport" | "noreturn" | "selectany"
        | "nothrow" | "novtable" | "property" | "uuid" => Some(AttrClass::Name(true)),
        "format" | "regparm" | "longcall" => Some(AttrClass::FunType(false)),
        "stdcall" | "cdecl" | "fastcall" => Some(AttrClass::FunType(true)),
        "const" | "volatile" | "restrict" | "mode" => Some(AttrClass::Type),
        _ => None,
    }
}

/// Split a list into (name, function-type, type) classes, classifying
/// unknown names with `default`
pub fn partition_attributes(
    default: AttrClass,
    attrs: &AttrList,
) -> (AttrList, AttrList, AttrList) {
    let mut names = AttrList::new();
    let mut funtype = AttrList::new();
    let mut types = AttrList::new();
    for a in attrs.iter() {
        match attribute_class(&a.name).unwrap_or(default) {
            AttrClass::Name(_) => names.add(a.clone()),
            AttrClass::FunType(_) => funtype.add(a.clone()),
            AttrClass::Type => types.add(a.clone()),
        }
    }
    (names, funtype, types)
}

/// Partition out MSVC storage-modifier attributes, rewrapping them as
/// `declspec(<name>(...))` entries. Outside MSVC mode the input is
/// returned untouched with no modifiers extracted.
pub fn separate_storage_modifiers(msvc: bool, attrs: &AttrList) -> (AttrList, AttrList) {
    if !msvc {
        return (AttrList::new(), attrs.clone());
    }
    let is_storage_mod =
        |a: &Attribute| matches!(attribute_class(&a.name), Some(AttrClass::Name(true)));
    let mut modifiers = AttrList::new();
    let mut rest = AttrList::new();
    for a in attrs.iter() {
        if is_storage_mod(a) {
            modifiers.add(Attribute::new(
                "declspec",
                vec![AttrParam::Cons(a.name.clone(), a.params.clone())],
            ));
        } else {
            rest.add(a.clone());
        }
    }
    (modifiers, rest)
}
