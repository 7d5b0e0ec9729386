//! Canonical type signatures
//!
//! A signature is a sharing-free encoding of a type: typedefs are
//! unrolled, composites and enums are reduced to their tag, and attribute
//! lists stay sorted, so structural equality on signatures is exactly the
//! type equivalence the cast emitter and the folder need.

use crate::attributes::AttrList;
use crate::ir::expressions::Exp;
use crate::ir::types::Type;

/// The signature language
#[derive(Debug, Clone, PartialEq)]
pub enum TypeSig {
    /// A primitive type (void, integer, float, va_list) with its
    /// processed attributes
    Base(Type),
    Ptr(Box<TypeSig>, AttrList),
    Array(Box<TypeSig>, Option<Box<Exp>>, AttrList),
    Comp {
        is_struct: bool,
        name: String,
        attrs: AttrList,
    },
    Enum {
        name: String,
        attrs: AttrList,
    },
    Fun {
        return_sig: Box<TypeSig>,
        params: Vec<TypeSig>,
        variadic: bool,
        attrs: AttrList,
    },
}

impl TypeSig {
    /// Merge attributes into the outermost signature constructor
    fn add_attrs(self, extra: &AttrList) -> TypeSig {
        if extra.is_empty() {
            return self;
        }
        match self {
            TypeSig::Base(t) => TypeSig::Base(t.add_attributes(extra)),
            TypeSig::Ptr(ts, a) => TypeSig::Ptr(ts, a.union(extra)),
            TypeSig::Array(ts, l, a) => TypeSig::Array(ts, l, a.union(extra)),
            TypeSig::Comp {
                is_struct,
                name,
                attrs,
            } => TypeSig::Comp {
                is_struct,
                name,
                attrs: attrs.union(extra),
            },
            TypeSig::Enum { name, attrs } => TypeSig::Enum {
                name,
                attrs: attrs.union(extra),
            },
            TypeSig::Fun {
                return_sig,
                params,
                variadic,
                attrs,
            } => TypeSig::Fun {
                return_sig,
                params,
                variadic,
                attrs: attrs.union(extra),
            },
        }
    }
}

/// Compute a signature, post-processing every attribute list with `doattr`
pub fn type_sig_with_attrs(doattr: &dyn Fn(&AttrList) -> AttrList, t: &Type) -> TypeSig {
    let sig = |t: &Type| type_sig_with_attrs(doattr, t);
    match t {
        Type::Void(a) => TypeSig::Base(Type::Void(doattr(a))),
        Type::Int(ik, a) => TypeSig::Base(Type::Int(*ik, doattr(a))),
        Type::Float(fk, a) => TypeSig::Base(Type::Float(*fk, doattr(a))),
        Type::VaList(a) => TypeSig::Base(Type::VaList(doattr(a))),
        Type::Pointer(base, a) => TypeSig::Ptr(Box::new(sig(base)), doattr(a)),
        Type::Array(base, len, a) => {
            TypeSig::Array(Box::new(sig(base)), len.clone(), doattr(a))
        }
        Type::Comp(comp, a) => {
            let ci = comp.borrow();
            // The use-site attributes join the definition's
            TypeSig::Comp {
                is_struct: ci.is_struct,
                name: ci.name().to_string(),
                attrs: doattr(&ci.attrs.union(a)),
            }
        }
        Type::Enum(en, a) => {
            let ei = en.borrow();
            TypeSig::Enum {
                name: ei.name.clone(),
                attrs: doattr(&ei.attrs.union(a)),
            }
        }
        Type::Function {
            return_type,
            params,
            variadic,
            attrs,
        } => TypeSig::Fun {
            return_sig: Box::new(sig(return_type)),
            params: params
                .as_deref()
                .unwrap_or(&[])
                .iter()
                .map(|p| sig(&p.ty))
                .collect(),
            variadic: *variadic,
            attrs: doattr(attrs),
        },
        Type::Named(td, a) => {
            let inner = sig(&td.borrow().ty);
            inner.add_attrs(&doattr(a))
        }
    }
}

/// The signature of a type, attributes kept as they are
pub fn type_sig(t: &Type) -> TypeSig {
    type_sig_with_attrs(&|a| a.clone(), t)
}

/// Type equivalence: equality of signatures
pub fn types_equal(a: &Type, b: &Type) -> bool {
    type_sig(a) == type_sig(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Attribute;
    use crate::ir::builder::mk_comp_info;
    use crate::ir::symbols::{TypedefInfo, TypedefRef};
    use crate::ir::types::FormalParam;

    #[test]
    fn test_named_types_unroll_in_signatures() {
        let td = TypedefRef::new(TypedefInfo::new("myint", Type::int()));
        let named = Type::Named(td, AttrList::new());
        assert!(types_equal(&named, &Type::int()));
    }

    #[test]
    fn test_attribute_order_does_not_matter() {
        let mut ab = AttrList::new();
        ab.add(Attribute::flag("const"));
        ab.add(Attribute::flag("volatile"));
        let mut ba = AttrList::new();
        ba.add(Attribute::flag("volatile"));
        ba.add(Attribute::flag("const"));

        let mut t1 = Type::int();
        t1.set_attrs(ab);
        let mut t2 = Type::int();
        t2.set_attrs(ba);
        assert!(types_equal(&t1, &t2));
    }

    #[test]
    fn test_attrs_distinguish_types() {
        let mut qualified = Type::int();
        let mut attrs = AttrList::new();
        attrs.add(Attribute::flag("const"));
        qualified.set_attrs(attrs);
        assert!(!types_equal(&qualified, &Type::int()));
    }

    #[test]
    fn test_with_attrs_can_normalize() {
        let mut qualified = Type::int();
        let mut attrs = AttrList::new();
        attrs.add(Attribute::flag("const"));
        qualified.set_attrs(attrs);

        let drop_all = |_: &AttrList| AttrList::new();
        assert_eq!(
            type_sig_with_attrs(&drop_all, &qualified),
            type_sig_with_attrs(&drop_all, &Type::int())
        );
    }

    #[test]
    fn test_comps_compare_by_tag() {
        let c1 = mk_comp_info(true, "s", |_| vec![], AttrList::new());
        let c2 = mk_comp_info(true, "s", |_| vec![], AttrList::new());
        let c3 = mk_comp_info(false, "s", |_| vec![], AttrList::new());

        let t1 = Type::Comp(c1, AttrList::new());
        let t2 = Type::Comp(c2, AttrList::new());
        let t3 = Type::Comp(c3, AttrList::new());
        assert!(types_equal(&t1, &t2));
        assert!(!types_equal(&t1, &t3));
    }

    #[test]
    fn test_function_signatures() {
        let f1 = Type::Function {
            return_type: Box::new(Type::int()),
            params: Some(vec![FormalParam::new("a", Type::int())]),
            variadic: false,
            attrs: AttrList::new(),
        };
        // Same shape, different parameter name
        let f2 = Type::Function {
            return_type: Box::new(Type::int()),
            params: Some(vec![FormalParam::new("b", Type::int())]),
            variadic: false,
            attrs: AttrList::new(),
        };
        let f3 = Type::Function {
            return_type: Box::new(Type::int()),
            params: Some(vec![FormalParam::new("a", Type::int())]),
            variadic: true,
            attrs: AttrList::new(),
        };
        assert!(types_equal(&f1, &f2));
        assert!(!types_equal(&f1, &f3));
    }
}
