//! C source emission
//!
//! Re-emits a module as compilable C text. Expression printing is driven
//! by numeric parenthesization levels; declarations thread the declared
//! name down through the type so pointer, array and function declarators
//! nest the way C wants them. The GCC and MSVC dialects differ in integer
//! suffixes, `long long` vs `__int64`, `__declspec` handling, inline
//! assembly and line-directive spelling.

use crate::attributes::{separate_storage_modifiers, AttrList, AttrParam, Attribute};
use crate::ir::expressions::{type_of, type_of_lval, Constant, Exp, Host, Init, Lval, Offset};
use crate::ir::module::{Global, Module};
use crate::ir::ops::BinaryOp;
use crate::ir::statements::{
    AsmDetails, Block, FunDec, Instr, Label, Stmt, StmtId, StmtKind, StmtPool,
};
use crate::ir::symbols::{Storage, VarRef};
use crate::ir::types::{FloatKind, IntKind, Type};
use crate::typesig::types_equal;
use cir_common::{ErrorReporter, Location};
use std::io::{self, Write};

// Parenthesization levels, loosest binding first
const BITWISE_LEVEL: i32 = 75;
const COMPARATIVE_LEVEL: i32 = 70;
const ADDITIVE_LEVEL: i32 = 60;
const MULTIPLICATIVE_LEVEL: i32 = 40;
const UNARY_LEVEL: i32 = 30;
const POSTFIX_LEVEL: i32 = 20;
const TOP_LEVEL: i32 = 100;

/// Output configuration for one printing run
pub struct PrinterOptions {
    /// Emit the MSVC dialect
    pub msvc: bool,
    /// Emit line directives
    pub print_line_numbers: bool,
    /// Prefix line directives with `//` so they survive as comments
    pub line_as_comment: bool,
    /// Override the rendering of specific attributes; return `None` to
    /// fall back to the default spelling
    pub custom_attr_printer: Option<Box<dyn Fn(&Attribute) -> Option<String>>>,
}

impl Default for PrinterOptions {
    fn default() -> Self {
        Self {
            msvc: false,
            print_line_numbers: false,
            line_as_comment: false,
            custom_attr_printer: None,
        }
    }
}

/// The C emitter; owns the line-directive state and the warning sink
pub struct Printer {
    opts: PrinterOptions,
    last_file: Option<String>,
    warnings: ErrorReporter,
}

impl Printer {
    pub fn new(opts: PrinterOptions) -> Self {
        Self {
            opts,
            last_file: None,
            warnings: ErrorReporter::new(),
        }
    }

    /// Warnings accumulated while printing (missing goto labels)
    pub fn warnings(&self) -> &ErrorReporter {
        &self.warnings
    }

    // -----------------------------------------------------------------
    // Constants
    // -----------------------------------------------------------------

    fn int_kind_name(&self, kind: IntKind) -> &'static str {
        match kind {
            IntKind::Char => "char",
            IntKind::SChar => "signed char",
            IntKind::UChar => "unsigned char",
            IntKind::Int => "int",
            IntKind::UInt => "unsigned int",
            IntKind::Short => "short",
            IntKind::UShort => "unsigned short",
            IntKind::Long => "long",
            IntKind::ULong => "unsigned long",
            IntKind::LongLong => {
                if self.opts.msvc {
                    "__int64"
                } else {
                    "long long"
                }
            }
            IntKind::ULongLong => {
                if self.opts.msvc {
                    "unsigned __int64"
                } else {
                    "unsigned long long"
                }
            }
        }
    }

    fn int_const_to_string(&self, value: i64, kind: IntKind) -> String {
        let suffix = match kind {
            IntKind::UInt => "U",
            IntKind::Long => "L",
            IntKind::ULong => "UL",
            IntKind::LongLong => {
                if self.opts.msvc {
                    "L"
                } else {
                    "LL"
                }
            }
            IntKind::ULongLong => {
                if self.opts.msvc {
                    "UL"
                } else {
                    "ULL"
                }
            }
            _ => "",
        };
        // Kinds without a suffix of their own get a cast prefix instead
        let prefix = if !suffix.is_empty() || kind == IntKind::Int {
            String::new()
        } else {
            format!("({})", self.int_kind_name(kind))
        };

        if value < 0 && !kind.is_signed() {
            // A negative bit pattern in an unsigned kind prints as hex
            format!("{}0x{:x}{}", prefix, value as u64, suffix)
        } else if value == i32::MIN as i64 {
            // The most negative int does not survive as a decimal token
            format!("{}(-0x7FFFFFFF-1)", prefix)
        } else if value == i64::MIN {
            format!("{}(-0x7FFFFFFFFFFFFFFF-1)", prefix)
        } else {
            format!("{}{}{}", prefix, value, suffix)
        }
    }

    fn escape_byte(out: &mut String, b: u8) {
        match b {
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'\r' => out.push_str("\\r"),
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            b'\'' => out.push_str("\\'"),
            0x20..=0x7E => out.push(b as char),
            _ => out.push_str(&format!("\\{:03o}", b)),
        }
    }

    fn string_const_to_string(s: &str) -> String {
        let mut out = String::from("\"");
        for b in s.bytes() {
            Self::escape_byte(&mut out, b);
        }
        out.push('"');
        out
    }

    fn const_to_string(&self, c: &Constant) -> String {
        match c {
            Constant::Int {
                text: Some(text), ..
            } => text.clone(),
            Constant::Int { value, kind, .. } => self.int_const_to_string(*value, *kind),
            Constant::Str(s) => Self::string_const_to_string(s),
            Constant::Chr(b) => {
                let mut out = String::from("'");
                Self::escape_byte(&mut out, *b);
                out.push('\'');
                out
            }
            Constant::Real {
                text: Some(text), ..
            } => text.clone(),
            Constant::Real { value, kind, .. } => {
                let mut body = format!("{}", value);
                if !body.contains('.') && !body.contains('e') && !body.contains("inf")
                    && !body.contains("NaN")
                {
                    body.push_str(".0");
                }
                match kind {
                    FloatKind::Float => format!("{}f", body),
                    FloatKind::Double => body,
                    FloatKind::LongDouble => format!("{}L", body),
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------

    fn exp_level(e: &Exp) -> i32 {
        match e {
            Exp::Binary { op, .. } => match op {
                BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => BITWISE_LEVEL,
                op if op.is_comparison() => COMPARATIVE_LEVEL,
                BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => MULTIPLICATIVE_LEVEL,
                _ => ADDITIVE_LEVEL,
            },
            Exp::Cast { .. } | Exp::AddrOf(_) | Exp::Unary { .. } => UNARY_LEVEL,
            Exp::SizeOfType(_)
            | Exp::SizeOfExpr(_)
            | Exp::AlignOfType(_)
            | Exp::AlignOfExpr(_) => POSTFIX_LEVEL,
            Exp::Lval(lv) | Exp::StartOf(lv) => Self::lval_level(lv),
            Exp::Const(_) => 0,
        }
    }

    fn lval_level(lv: &Lval) -> i32 {
        match (&lv.host, &lv.offset) {
            (Host::Mem(_), _) => POSTFIX_LEVEL,
            (Host::Var(_), Offset::NoOffset) => 0,
            (Host::Var(_), _) => POSTFIX_LEVEL,
        }
    }

    /// Print a subexpression under a context level; parentheses appear
    /// when the subexpression binds no tighter than the context. The one
    /// exception: additive and comparative expressions under a bitwise
    /// operator always parenthesize, which quiets compiler warnings.
    fn exp_prec(&self, context: i32, e: &Exp) -> String {
        let this = Self::exp_level(e);
        let needs_parens = if this >= context {
            true
        } else {
            context == BITWISE_LEVEL
                && (this == ADDITIVE_LEVEL || this == COMPARATIVE_LEVEL)
        };
        if needs_parens {
            format!("({})", self.exp_to_string(e))
        } else {
            self.exp_to_string(e)
        }
    }

    /// Render an expression with no outer context
    pub fn exp_to_string(&self, e: &Exp) -> String {
        match e {
            Exp::Const(c) => self.const_to_string(c),
            Exp::Lval(lv) => self.lval_to_string(lv),
            Exp::SizeOfType(t) => format!("sizeof({})", self.type_decl(t, "")),
            Exp::SizeOfExpr(inner) => format!("sizeof({})", self.exp_to_string(inner)),
            Exp::AlignOfType(t) => {
                let kw = if self.opts.msvc { "__alignof" } else { "__alignof__" };
                format!("{}({})", kw, self.type_decl(t, ""))
            }
            Exp::AlignOfExpr(inner) => {
                let kw = if self.opts.msvc { "__alignof" } else { "__alignof__" };
                format!("{}({})", kw, self.exp_to_string(inner))
            }
            Exp::Unary { op, operand, .. } => {
                format!("{} {}", op, self.exp_prec(UNARY_LEVEL, operand))
            }
            Exp::Binary {
                op, left, right, ..
            } => {
                let level = Self::exp_level(e);
                format!(
                    "{} {} {}",
                    self.exp_prec(level, left),
                    op,
                    self.exp_prec(level, right)
                )
            }
            Exp::Cast { target, operand } => {
                format!(
                    "({}){}",
                    self.type_decl(target, ""),
                    self.exp_prec(UNARY_LEVEL, operand)
                )
            }
            Exp::AddrOf(lv) => format!("& {}", self.lval_prec(UNARY_LEVEL, lv)),
            // Array-to-pointer decay is invisible in C source
            Exp::StartOf(lv) => self.lval_to_string(lv),
        }
    }

    fn lval_prec(&self, context: i32, lv: &Lval) -> String {
        if Self::lval_level(lv) >= context {
            format!("({})", self.lval_to_string(lv))
        } else {
            self.lval_to_string(lv)
        }
    }

    /// Render an lvalue
    pub fn lval_to_string(&self, lv: &Lval) -> String {
        match (&lv.host, &lv.offset) {
            (Host::Var(vi), offset) => {
                self.offset_to_string(vi.borrow().name.clone(), offset)
            }
            (Host::Mem(addr), Offset::Field(f, rest)) => {
                let base = format!(
                    "{}->{}",
                    self.exp_prec(POSTFIX_LEVEL, addr),
                    f.borrow().name
                );
                self.offset_to_string(base, rest)
            }
            (Host::Mem(addr), Offset::NoOffset) => {
                format!("*{}", self.exp_prec(POSTFIX_LEVEL, addr))
            }
            (Host::Mem(addr), offset) => {
                let base = format!("(*{})", self.exp_prec(POSTFIX_LEVEL, addr));
                self.offset_to_string(base, offset)
            }
        }
    }

    fn offset_to_string(&self, base: String, offset: &Offset) -> String {
        match offset {
            Offset::NoOffset => base,
            Offset::Field(f, rest) => {
                self.offset_to_string(format!("{}.{}", base, f.borrow().name), rest)
            }
            Offset::Index(e, rest) => self.offset_to_string(
                format!("{}[{}]", base, self.exp_to_string(e)),
                rest,
            ),
        }
    }

    // -----------------------------------------------------------------
    // Attributes
    // -----------------------------------------------------------------

    fn attr_param_to_string(&self, p: &AttrParam) -> String {
        match p {
            AttrParam::Int(i) => format!("{}", i),
            AttrParam::Str(s) => Self::string_const_to_string(s),
            AttrParam::Var(name) => name.clone(),
            AttrParam::Cons(name, args) if args.is_empty() => name.clone(),
            AttrParam::Cons(name, args) => {
                format!("{}({})", name, self.attr_params_to_string(args))
            }
            AttrParam::SizeOfType(t) => format!("sizeof({})", self.type_decl(t, "")),
            AttrParam::SizeOfParam(inner) => {
                format!("sizeof({})", self.attr_param_to_string(inner))
            }
            AttrParam::UnOp(op, inner) => {
                format!("{}{}", op, self.attr_param_to_string(inner))
            }
            AttrParam::BinOp(op, a, b) => format!(
                "{} {} {}",
                self.attr_param_to_string(a),
                op,
                self.attr_param_to_string(b)
            ),
        }
    }

    fn attr_params_to_string(&self, params: &[AttrParam]) -> String {
        params
            .iter()
            .map(|p| self.attr_param_to_string(p))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Render one attribute; `None` suppresses it entirely. The flag says
    /// whether the rendering still needs an `__attribute__((...))` wrapper.
    fn attr_to_string(&self, a: &Attribute) -> Option<(String, bool)> {
        if let Some(hook) = &self.opts.custom_attr_printer {
            if let Some(rendered) = hook(a) {
                return Some((rendered, false));
            }
        }
        let plain = |s: &str| Some((s.to_string(), false));
        match a.name.as_str() {
            "const" => plain("const"),
            "aconst" if !self.opts.msvc => plain("__const__"),
            "volatile" => plain("volatile"),
            "restrict" => plain("__restrict__"),
            "missingproto" => plain("/* missing proto */"),
            "cdecl" if self.opts.msvc => plain("__cdecl"),
            "stdcall" if self.opts.msvc => plain("__stdcall"),
            "fastcall" if self.opts.msvc => plain("__fastcall"),
            "declspec" if self.opts.msvc => Some((
                format!("__declspec({})", self.attr_params_to_string(&a.params)),
                false,
            )),
            "asm" => Some((
                format!("__asm__({})", self.attr_params_to_string(&a.params)),
                false,
            )),
            // These confuse compilers when echoed back; keep them visible
            // as comments only
            "mode" => Some((
                format!("/* mode({}) */", self.attr_params_to_string(&a.params)),
                false,
            )),
            "format" => plain("/* format attribute */"),
            _ => {
                if self.opts.msvc {
                    // MSVC has no spelling for generic attributes
                    None
                } else if a.params.is_empty() {
                    Some((a.name.clone(), true))
                } else {
                    Some((
                        format!("{}({})", a.name, self.attr_params_to_string(&a.params)),
                        true,
                    ))
                }
            }
        }
    }

    fn attrs_to_string(&self, attrs: &AttrList) -> String {
        let mut parts = Vec::new();
        for a in attrs.iter() {
            if let Some((rendered, wrap)) = self.attr_to_string(a) {
                if wrap {
                    parts.push(format!("__attribute__(({}))", rendered));
                } else {
                    parts.push(rendered);
                }
            }
        }
        parts.join(" ")
    }

    // -----------------------------------------------------------------
    // Types and declarators
    // -----------------------------------------------------------------

    /// Render a declaration of `name` with type `t`; an empty name gives
    /// the bare type, as in casts and sizeof
    pub fn type_decl(&self, t: &Type, name: &str) -> String {
        match t {
            Type::Void(a) => self.base_decl("void", a, name),
            Type::Int(ik, a) => self.base_decl(self.int_kind_name(*ik), a, name),
            Type::Float(fk, a) => {
                let base = match fk {
                    FloatKind::Float => "float",
                    FloatKind::Double => "double",
                    FloatKind::LongDouble => "long double",
                };
                self.base_decl(base, a, name)
            }
            Type::Comp(comp, a) => {
                let ci = comp.borrow();
                let tag = if ci.is_struct { "struct" } else { "union" };
                self.base_decl(&format!("{} {}", tag, ci.name()), a, name)
            }
            Type::Enum(en, a) => {
                self.base_decl(&format!("enum {}", en.borrow().name), a, name)
            }
            Type::Named(td, a) => self.base_decl(&td.borrow().name, a, name),
            Type::VaList(a) => self.base_decl("__builtin_va_list", a, name),
            Type::Pointer(base, a) => {
                let attrs = self.attrs_to_string(a);
                let mut inner = String::from("*");
                if !attrs.is_empty() {
                    inner.push_str(&attrs);
                    inner.push(' ');
                }
                inner.push_str(name);
                // A pointer declarator binds looser than the array or
                // function part of the base, so it needs parentheses
                let inner = match base.as_ref() {
                    Type::Function { .. } | Type::Array(..) => format!("({})", inner),
                    _ => inner,
                };
                self.type_decl(base, &inner)
            }
            Type::Array(elem, len, a) => {
                let attrs = self.attrs_to_string(a);
                let mut inner = if attrs.is_empty() {
                    name.to_string()
                } else if name.is_empty() {
                    attrs
                } else {
                    format!("{} {}", attrs, name)
                };
                inner.push('[');
                if let Some(len) = len {
                    inner.push_str(&self.exp_to_string(len));
                }
                inner.push(']');
                self.type_decl(elem, &inner)
            }
            Type::Function {
                return_type,
                params,
                variadic,
                attrs,
            } => {
                let rendered_attrs = self.attrs_to_string(attrs);
                let mut inner = if rendered_attrs.is_empty() {
                    name.to_string()
                } else if name.is_empty() {
                    rendered_attrs
                } else {
                    format!("{} {}", rendered_attrs, name)
                };
                inner.push('(');
                inner.push_str(&self.params_to_string(params.as_deref(), *variadic));
                inner.push(')');
                self.type_decl(return_type, &inner)
            }
        }
    }

    fn base_decl(&self, base: &str, attrs: &AttrList, name: &str) -> String {
        let rendered = self.attrs_to_string(attrs);
        let mut out = String::from(base);
        if !rendered.is_empty() {
            out.push(' ');
            out.push_str(&rendered);
        }
        if !name.is_empty() {
            out.push(' ');
            out.push_str(name);
        }
        out
    }

    fn params_to_string(
        &self,
        params: Option<&[crate::ir::types::FormalParam]>,
        variadic: bool,
    ) -> String {
        match params {
            None => String::new(),
            Some([]) => {
                if variadic {
                    "...".to_string()
                } else {
                    "void".to_string()
                }
            }
            Some(ps) => {
                let mut parts: Vec<String> = ps
                    .iter()
                    .map(|p| {
                        let ty = p.ty.add_attributes(&p.attrs);
                        self.type_decl(&ty, &p.name)
                    })
                    .collect();
                if variadic {
                    parts.push("...".to_string());
                }
                parts.join(", ")
            }
        }
    }

    /// Render a variable declaration: storage, inline, declarator, and
    /// the attributes that attach to the name
    fn var_decl_to_string(&self, vi: &VarRef, inline: bool) -> String {
        let v = vi.borrow();
        let (storage_mods, rest) = separate_storage_modifiers(self.opts.msvc, &v.attrs);

        let mut out = String::new();
        if inline {
            out.push_str(if self.opts.msvc { "__inline " } else { "__inline__ " });
        }
        match v.storage {
            Storage::None => {}
            s => {
                out.push_str(&format!("{} ", s));
            }
        }
        let mods = self.attrs_to_string(&storage_mods);
        if !mods.is_empty() {
            out.push_str(&mods);
            out.push(' ');
        }
        // Name-class attributes print after the declarator
        let (name_attrs, _, type_attrs) = crate::attributes::partition_attributes(
            crate::attributes::AttrClass::Name(false),
            &rest,
        );
        let ty = v.ty.add_attributes(&type_attrs);
        out.push_str(&self.type_decl(&ty, &v.name));
        let trailing = self.attrs_to_string(&name_attrs);
        if !trailing.is_empty() {
            out.push(' ');
            out.push_str(&trailing);
        }
        out
    }

    // -----------------------------------------------------------------
    // Line directives
    // -----------------------------------------------------------------

    fn line_directive(&mut self, loc: &Location, force_file: bool) -> String {
        if !self.opts.print_line_numbers || !loc.is_known() {
            return String::new();
        }
        let prefix = if self.opts.line_as_comment {
            "//#line "
        } else if self.opts.msvc {
            "#line "
        } else {
            "# "
        };
        let file_changed = self.last_file.as_deref() != Some(loc.file.as_str());
        if file_changed || force_file {
            self.last_file = Some(loc.file.clone());
            format!("{}{} \"{}\"\n", prefix, loc.line, loc.file)
        } else {
            format!("{}{}\n", prefix, loc.line)
        }
    }

    // -----------------------------------------------------------------
    // Instructions
    // -----------------------------------------------------------------

    fn set_to_string(&self, lval: &Lval, value: &Exp) -> String {
        if let Exp::Binary {
            op, left, right, ..
        } = value
        {
            if matches!(left.as_ref(), Exp::Lval(lv) if lv == lval) {
                match op {
                    BinaryOp::Add | BinaryOp::PtrAdd | BinaryOp::PtrIndex
                        if right.is_integer() == Some(1) =>
                    {
                        return format!("{} ++;", self.lval_to_string(lval));
                    }
                    BinaryOp::Sub | BinaryOp::PtrSub if right.is_integer() == Some(1) => {
                        return format!("{} --;", self.lval_to_string(lval));
                    }
                    BinaryOp::Add
                    | BinaryOp::Sub
                    | BinaryOp::Mul
                    | BinaryOp::Div
                    | BinaryOp::Mod
                    | BinaryOp::BitAnd
                    | BinaryOp::BitOr
                    | BinaryOp::BitXor
                    | BinaryOp::Shl
                    | BinaryOp::Shr
                    | BinaryOp::PtrAdd
                    | BinaryOp::PtrIndex
                    | BinaryOp::PtrSub => {
                        return format!(
                            "{} {}= {};",
                            self.lval_to_string(lval),
                            op,
                            self.exp_prec(TOP_LEVEL, right)
                        );
                    }
                    _ => {}
                }
            }
        }
        format!(
            "{} = {};",
            self.lval_to_string(lval),
            self.exp_prec(TOP_LEVEL, value)
        )
    }

    fn call_to_string(&self, dest: &Option<Lval>, callee: &Exp, args: &[Exp]) -> String {
        let mut out = String::new();
        if let Some(lv) = dest {
            out.push_str(&self.lval_to_string(lv));
            out.push_str(" = ");
            // Cast when the function returns something other than what
            // the destination holds
            if let (Ok(callee_ty), Ok(dest_ty)) = (type_of(callee), type_of_lval(lv)) {
                if let Type::Function { return_type, .. } = callee_ty.unroll() {
                    if !types_equal(&return_type, &dest_ty) {
                        out.push_str(&format!("({})", self.type_decl(&dest_ty, "")));
                    }
                }
            }
        }
        match callee {
            Exp::Lval(Lval {
                host: Host::Var(_),
                ..
            }) => out.push_str(&self.exp_to_string(callee)),
            _ => out.push_str(&format!("({})", self.exp_to_string(callee))),
        }
        out.push('(');
        out.push_str(
            &args
                .iter()
                .map(|a| self.exp_prec(TOP_LEVEL, a))
                .collect::<Vec<_>>()
                .join(", "),
        );
        out.push_str(");");
        out
    }

    fn asm_to_string(&self, details: &AsmDetails) -> String {
        if self.opts.msvc {
            let mut out = String::from("__asm {\n");
            for t in &details.templates {
                out.push_str("  ");
                out.push_str(t);
                out.push('\n');
            }
            out.push_str("};");
            return out;
        }
        let mut out = String::from("__asm__ ");
        let attrs = self.attrs_to_string(&details.attrs);
        if !attrs.is_empty() {
            out.push_str(&attrs);
            out.push(' ');
        }
        out.push('(');
        out.push_str(
            &details
                .templates
                .iter()
                .map(|t| Self::string_const_to_string(t))
                .collect::<Vec<_>>()
                .join("\n  "),
        );

        let outputs = details
            .outputs
            .iter()
            .map(|(c, lv)| {
                format!("{} ({})", Self::string_const_to_string(c), self.lval_to_string(lv))
            })
            .collect::<Vec<_>>()
            .join(", ");
        let inputs = details
            .inputs
            .iter()
            .map(|(c, e)| {
                format!("{} ({})", Self::string_const_to_string(c), self.exp_to_string(e))
            })
            .collect::<Vec<_>>()
            .join(", ");
        let clobbers = details
            .clobbers
            .iter()
            .map(|c| Self::string_const_to_string(c))
            .collect::<Vec<_>>()
            .join(", ");

        if !outputs.is_empty() || !inputs.is_empty() || !clobbers.is_empty() {
            out.push_str(&format!(": {}", outputs));
        }
        if !inputs.is_empty() || !clobbers.is_empty() {
            out.push_str(&format!(" : {}", inputs));
        }
        if !clobbers.is_empty() {
            out.push_str(&format!(" : {}", clobbers));
        }
        out.push_str(");");
        out
    }

    fn instr_to_string(&self, i: &Instr) -> String {
        match i {
            Instr::Set { lval, value, .. } => self.set_to_string(lval, value),
            Instr::Call {
                dest, callee, args, ..
            } => self.call_to_string(dest, callee, args),
            Instr::Asm(details) => self.asm_to_string(details),
        }
    }

    // -----------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------

    fn label_to_string(&self, label: &Label) -> String {
        match label {
            Label::Name { name, .. } => format!("{}:", name),
            Label::Case { value, .. } => format!("case {}:", self.exp_to_string(value)),
            Label::Default { .. } => "default:".to_string(),
        }
    }

    /// A statement counts as invisible padding when looking for the
    /// while-loop and if-goto shapes
    fn is_empty_stmt(s: &Stmt) -> bool {
        s.labels.is_empty() && matches!(&s.kind, StmtKind::Instr(is) if is.is_empty())
    }

    fn first_meaningful(pool: &StmtPool, stmts: &[StmtId]) -> Option<usize> {
        stmts.iter().position(|&sid| !Self::is_empty_stmt(pool.get(sid)))
    }

    /// A block whose only content is `goto target`?
    fn is_goto_block(pool: &StmtPool, b: &Block, target: StmtId) -> bool {
        if b.stmts.len() != 1 {
            return false;
        }
        let s = pool.get(b.stmts[0]);
        s.labels.is_empty() && matches!(s.kind, StmtKind::Goto(t, _) if t == target)
    }

    fn goto_to_string(&mut self, pool: &StmtPool, target: StmtId) -> String {
        match pool.get(target).label_name() {
            Some(name) => format!("goto {};", name),
            None => {
                self.warnings.warn(format!(
                    "goto target (statement {}) has no label",
                    target
                ));
                "goto __invalid_label;".to_string()
            }
        }
    }

    fn write_indent(w: &mut dyn Write, indent: usize) -> io::Result<()> {
        write!(w, "{:indent$}", "", indent = indent)
    }

    fn print_block_body(
        &mut self,
        w: &mut dyn Write,
        pool: &StmtPool,
        stmts: &[StmtId],
        indent: usize,
    ) -> io::Result<()> {
        for (i, &sid) in stmts.iter().enumerate() {
            let next = stmts.get(i + 1).copied();
            self.print_stmt(w, pool, sid, next, indent)?;
        }
        Ok(())
    }

    fn print_braced_block(
        &mut self,
        w: &mut dyn Write,
        pool: &StmtPool,
        b: &Block,
        indent: usize,
    ) -> io::Result<()> {
        writeln!(w, "{{")?;
        self.print_block_body(w, pool, &b.stmts, indent + 2)?;
        Self::write_indent(w, indent)?;
        write!(w, "}}")
    }

    fn print_stmt(
        &mut self,
        w: &mut dyn Write,
        pool: &StmtPool,
        sid: StmtId,
        next: Option<StmtId>,
        indent: usize,
    ) -> io::Result<()> {
        let s = pool.get(sid);
        for label in &s.labels {
            Self::write_indent(w, indent)?;
            writeln!(w, "{}", self.label_to_string(label))?;
        }
        match &s.kind {
            StmtKind::Instr(instrs) => {
                if instrs.is_empty() {
                    if !s.labels.is_empty() {
                        Self::write_indent(w, indent)?;
                        writeln!(w, ";")?;
                    }
                    return Ok(());
                }
                for i in instrs {
                    let directive = self.line_directive(i.loc(), false);
                    write!(w, "{}", directive)?;
                    Self::write_indent(w, indent)?;
                    writeln!(w, "{}", self.instr_to_string(i))?;
                }
                Ok(())
            }
            StmtKind::Return(value, loc) => {
                let directive = self.line_directive(loc, false);
                write!(w, "{}", directive)?;
                Self::write_indent(w, indent)?;
                match value {
                    Some(e) => writeln!(w, "return ({});", self.exp_prec(TOP_LEVEL, e)),
                    None => writeln!(w, "return;"),
                }
            }
            StmtKind::Goto(target, loc) => {
                let directive = self.line_directive(loc, false);
                write!(w, "{}", directive)?;
                let rendered = self.goto_to_string(pool, *target);
                Self::write_indent(w, indent)?;
                writeln!(w, "{}", rendered)
            }
            StmtKind::Break(loc) => {
                let directive = self.line_directive(loc, false);
                write!(w, "{}", directive)?;
                Self::write_indent(w, indent)?;
                writeln!(w, "break;")
            }
            StmtKind::Continue(loc) => {
                let directive = self.line_directive(loc, false);
                write!(w, "{}", directive)?;
                Self::write_indent(w, indent)?;
                writeln!(w, "continue;")
            }
            StmtKind::If {
                cond,
                then_blk,
                else_blk,
                loc,
            } => {
                let directive = self.line_directive(loc, false);
                write!(w, "{}", directive)?;
                Self::write_indent(w, indent)?;

                // `if (c) ...; else goto next;` drops the else branch,
                // and `if (c) goto next; else ...;` prints negated
                if let Some(next) = next {
                    if Self::is_goto_block(pool, else_blk, next) {
                        write!(w, "if ({}) ", self.exp_to_string(cond))?;
                        self.print_braced_block(w, pool, then_blk, indent)?;
                        return writeln!(w);
                    }
                    if Self::is_goto_block(pool, then_blk, next) {
                        write!(w, "if (! {}) ", self.exp_prec(UNARY_LEVEL, cond))?;
                        self.print_braced_block(w, pool, else_blk, indent)?;
                        return writeln!(w);
                    }
                }
                write!(w, "if ({}) ", self.exp_to_string(cond))?;
                self.print_braced_block(w, pool, then_blk, indent)?;
                if !else_blk.stmts.is_empty() || !else_blk.attrs.is_empty() {
                    write!(w, " else ")?;
                    self.print_braced_block(w, pool, else_blk, indent)?;
                }
                writeln!(w)
            }
            StmtKind::Switch { cond, body, loc, .. } => {
                let directive = self.line_directive(loc, false);
                write!(w, "{}", directive)?;
                Self::write_indent(w, indent)?;
                write!(w, "switch ({}) ", self.exp_to_string(cond))?;
                self.print_braced_block(w, pool, body, indent)?;
                writeln!(w)
            }
            StmtKind::Loop(body, loc) => {
                let directive = self.line_directive(loc, false);
                write!(w, "{}", directive)?;
                Self::write_indent(w, indent)?;

                // A loop that opens with `if (c) ; else break;` is a
                // while loop; with the branches swapped, while (! c)
                if let Some(head_idx) = Self::first_meaningful(pool, &body.stmts) {
                    let head = pool.get(body.stmts[head_idx]);
                    if head.labels.is_empty() {
                        if let StmtKind::If {
                            cond,
                            then_blk,
                            else_blk,
                            ..
                        } = &head.kind
                        {
                            let then_head = Self::first_meaningful(pool, &then_blk.stmts);
                            let else_head = Self::first_meaningful(pool, &else_blk.stmts);
                            let then_breaks = then_head.is_some_and(|i| {
                                matches!(
                                    pool.get(then_blk.stmts[i]).kind,
                                    StmtKind::Break(_)
                                )
                            });
                            let else_breaks = else_head.is_some_and(|i| {
                                matches!(
                                    pool.get(else_blk.stmts[i]).kind,
                                    StmtKind::Break(_)
                                )
                            });
                            let rest = &body.stmts[head_idx + 1..];
                            if then_head.is_none() && else_breaks {
                                write!(w, "while ({}) {{", self.exp_to_string(cond))?;
                                writeln!(w)?;
                                self.print_block_body(w, pool, rest, indent + 2)?;
                                Self::write_indent(w, indent)?;
                                return writeln!(w, "}}");
                            }
                            if else_head.is_none() && then_breaks {
                                write!(
                                    w,
                                    "while (! {}) {{",
                                    self.exp_prec(UNARY_LEVEL, cond)
                                )?;
                                writeln!(w)?;
                                self.print_block_body(w, pool, rest, indent + 2)?;
                                Self::write_indent(w, indent)?;
                                return writeln!(w, "}}");
                            }
                        }
                    }
                }
                write!(w, "while (1) ")?;
                self.print_braced_block(w, pool, body, indent)?;
                writeln!(w)
            }
            StmtKind::Block(body) => {
                Self::write_indent(w, indent)?;
                self.print_braced_block(w, pool, body, indent)?;
                writeln!(w)
            }
        }
    }

    // -----------------------------------------------------------------
    // Globals
    // -----------------------------------------------------------------

    fn print_init(&self, out: &mut String, init: &Init) {
        match init {
            Init::Single(e) => out.push_str(&self.exp_prec(TOP_LEVEL, e)),
            Init::Compound { items, .. } => {
                out.push('{');
                let rendered: Vec<String> = items
                    .iter()
                    .map(|(designator, sub)| {
                        let mut piece = String::new();
                        if !self.opts.msvc {
                            match designator {
                                Offset::Field(f, _) => {
                                    piece.push_str(&format!(".{} = ", f.borrow().name));
                                }
                                Offset::Index(e, _) => {
                                    piece.push_str(&format!(
                                        "[{}] = ",
                                        self.exp_to_string(e)
                                    ));
                                }
                                Offset::NoOffset => {}
                            }
                        }
                        self.print_init(&mut piece, sub);
                        piece
                    })
                    .collect();
                out.push_str(&rendered.join(", "));
                out.push('}');
            }
        }
    }

    fn print_fundec(&mut self, w: &mut dyn Write, f: &FunDec) -> io::Result<()> {
        writeln!(w, "{}", self.var_decl_to_string(&f.svar, f.is_inline))?;
        writeln!(w, "{{")?;
        for local in &f.locals {
            writeln!(w, "  {};", self.var_decl_to_string(local, false))?;
        }
        if !f.locals.is_empty() {
            writeln!(w)?;
        }
        self.print_block_body(w, &f.stmts, &f.body.stmts, 2)?;
        writeln!(w, "}}")
    }

    /// Names the parser gave to declarations that must not be re-emitted
    fn is_suppressed_decl(&self, vi: &VarRef) -> bool {
        let v = vi.borrow();
        v.name.starts_with("__builtin_") || v.attrs.has("boxmodel")
    }

    /// Print one global
    pub fn print_global(&mut self, w: &mut dyn Write, g: &Global) -> io::Result<()> {
        match g {
            Global::Typedef(td, loc) => {
                let directive = self.line_directive(loc, false);
                write!(w, "{}", directive)?;
                let t = td.borrow();
                writeln!(w, "typedef {};", self.type_decl(&t.ty, &t.name))
            }
            Global::CompTag(comp, loc) => {
                let directive = self.line_directive(loc, false);
                write!(w, "{}", directive)?;
                let ci = comp.borrow();
                let tag = if ci.is_struct { "struct" } else { "union" };
                let (storage_mods, rest) =
                    separate_storage_modifiers(self.opts.msvc, &ci.attrs);
                let leading = self.attrs_to_string(&rest);
                if leading.is_empty() {
                    writeln!(w, "{} {} {{", tag, ci.name())?;
                } else {
                    writeln!(w, "{} {} {} {{", tag, leading, ci.name())?;
                }
                for f in &ci.fields {
                    let field = f.borrow();
                    let shown_name = if field.is_anonymous() {
                        ""
                    } else {
                        field.name.as_str()
                    };
                    let mut line = format!("  {}", self.type_decl(&field.ty, shown_name));
                    if let Some(width) = field.bitfield {
                        line.push_str(&format!(" : {}", width));
                    }
                    let attrs = self.attrs_to_string(&field.attrs);
                    if !attrs.is_empty() {
                        line.push(' ');
                        line.push_str(&attrs);
                    }
                    writeln!(w, "{};", line)?;
                }
                let trailing = self.attrs_to_string(&storage_mods);
                if trailing.is_empty() {
                    writeln!(w, "}};")
                } else {
                    writeln!(w, "}} {};", trailing)
                }
            }
            Global::EnumTag(en, loc) => {
                let directive = self.line_directive(loc, false);
                write!(w, "{}", directive)?;
                let ei = en.borrow();
                writeln!(w, "enum {} {{", ei.name)?;
                for (label, value) in &ei.items {
                    writeln!(w, "  {} = {},", label, self.exp_to_string(value))?;
                }
                let attrs = self.attrs_to_string(&ei.attrs);
                if attrs.is_empty() {
                    writeln!(w, "}};")
                } else {
                    writeln!(w, "}} {};", attrs)
                }
            }
            Global::VarDecl(vi, loc) => {
                if self.is_suppressed_decl(vi) {
                    return writeln!(
                        w,
                        "/* compiler builtin: \n   {}; */",
                        self.var_decl_to_string(vi, false)
                    );
                }
                let directive = self.line_directive(loc, false);
                write!(w, "{}", directive)?;
                writeln!(w, "{};", self.var_decl_to_string(vi, false))
            }
            Global::Var(vi, init, loc) => {
                let directive = self.line_directive(loc, false);
                write!(w, "{}", directive)?;
                let mut out = self.var_decl_to_string(vi, false);
                if let Some(init) = init {
                    out.push_str(" = ");
                    self.print_init(&mut out, init);
                }
                writeln!(w, "{};", out)
            }
            Global::Fun(f, loc) => {
                // Attributes on a definition confuse GCC, so an attributed
                // function gets a separate prototype carrying them
                let has_attrs = !f.svar.borrow().attrs.is_empty();
                if has_attrs {
                    let proto_directive = self.line_directive(loc, false);
                    write!(w, "{}", proto_directive)?;
                    writeln!(w, "{};", self.var_decl_to_string(&f.svar, f.is_inline))?;
                }
                let saved_attrs = if has_attrs {
                    Some(std::mem::take(&mut f.svar.borrow_mut().attrs))
                } else {
                    None
                };
                let directive = self.line_directive(loc, true);
                write!(w, "{}", directive)?;
                let result = self.print_fundec(w, f);
                if let Some(attrs) = saved_attrs {
                    f.svar.borrow_mut().attrs = attrs;
                }
                result
            }
            Global::Asm(text, loc) => {
                let directive = self.line_directive(loc, false);
                write!(w, "{}", directive)?;
                writeln!(w, "__asm__({});", Self::string_const_to_string(text))
            }
            Global::Pragma(attr, loc) => {
                let directive = self.line_directive(loc, false);
                write!(w, "{}", directive)?;
                let body = if attr.params.is_empty() {
                    format!("#pragma {}", attr.name)
                } else {
                    format!(
                        "#pragma {}({})",
                        attr.name,
                        self.attr_params_to_string(&attr.params)
                    )
                };
                // Internal pragmas survive only as comments
                let suppress = attr.name.starts_with("box")
                    || attr.name == "combiner"
                    || attr.name == "cilnoremove";
                if suppress {
                    writeln!(w, "/* {} */", body)
                } else {
                    writeln!(w, "{}", body)
                }
            }
            Global::Text(text) => writeln!(w, "{}", text),
        }
    }

    /// Print a whole module
    pub fn print_module(&mut self, w: &mut dyn Write, m: &Module) -> io::Result<()> {
        self.last_file = None;
        writeln!(w, "/* Generated by cir */")?;
        for g in &m.globals {
            self.print_global(w, g)?;
        }
        if let Some(gi) = &m.global_init {
            writeln!(w)?;
            self.print_fundec(w, gi)?;
        }
        Ok(())
    }

    /// Convenience wrapper collecting the output in a string
    pub fn module_to_string(&mut self, m: &Module) -> String {
        let mut buf = Vec::new();
        self.print_module(&mut buf, m)
            .expect("writing to a Vec cannot fail");
        String::from_utf8(buf).expect("printer emits UTF-8")
    }
}
