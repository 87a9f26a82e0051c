//! Owned, lowered form of a parsed Go file. Produced by the parser on worker
//! threads and consumed by the loader once every file of the program is in.

use std::path::PathBuf;

use super::types::{TypeKind, TypeRef};

#[derive(Debug, Clone)]
pub struct ImportSpec {
    /// Explicit alias; `.` and `_` imports keep their marker here.
    pub alias: Option<String>,
    pub path: String,
    pub line: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Param {
    pub name: Option<String>,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, Default)]
pub struct Signature {
    pub params: Vec<Param>,
    pub results: Vec<Param>,
    pub variadic: bool,
}

impl Signature {
    pub fn arity_matches(&self, args: usize) -> bool {
        if self.variadic {
            args + 1 >= self.params.len()
        } else {
            args == self.params.len()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Receiver {
    pub var: Option<String>,
    pub type_name: String,
    pub pointer: bool,
}

#[derive(Debug, Clone)]
pub struct LoweredFunction {
    pub name: String,
    pub line: usize,
    pub receiver: Option<Receiver>,
    pub signature: Signature,
    pub type_params: Vec<String>,
    pub body: Option<Body>,
    /// Function literals in source order; `Expr::FuncLit(i)` refers to `closures[i]`.
    pub closures: Vec<LoweredFunction>,
}

#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub name: String,
    pub line: usize,
    pub kind: TypeKind,
    /// `type A = B`; `kind` then holds `TypeKind::Defined(B)`.
    pub alias: bool,
}

#[derive(Debug, Clone)]
pub struct GlobalVar {
    pub names: Vec<String>,
    pub ty: Option<TypeRef>,
    pub values: Vec<Expr>,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct FileUnit {
    pub path: PathBuf,
    pub package_name: String,
    pub imports: Vec<ImportSpec>,
    pub types: Vec<TypeDecl>,
    pub functions: Vec<LoweredFunction>,
    pub vars: Vec<GlobalVar>,
    pub consts: Vec<(String, usize)>,
    /// Function literals that appear in package-level variable initializers.
    pub init_closures: Vec<LoweredFunction>,
    pub syntax_errors: Vec<usize>,
    /// Imports whose package name is never referenced in the file.
    pub unused_imports: Vec<ImportSpec>,
}

#[derive(Debug, Clone, Default)]
pub struct Body {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    /// `a, b := ...`
    Define { names: Vec<String>, values: Vec<Expr> },
    /// `var a, b T = ...`
    Var {
        names: Vec<String>,
        ty: Option<TypeRef>,
        values: Vec<Expr>,
    },
    /// `lhs = rhs` and compound assignments.
    Assign { targets: Vec<Expr>, values: Vec<Expr> },
    Range {
        names: Vec<String>,
        define: bool,
        expr: Expr,
    },
    TypeSwitch {
        binding: Option<String>,
        expr: Expr,
        clauses: Vec<TypeClause>,
    },
    /// Names of types declared inside a function body.
    LocalTypes(Vec<String>),
    Return(Vec<Expr>),
    Expr(Expr),
}

/// One `case` of a type switch. `types` is empty for `default`; a `nil` case
/// contributes `TypeRef::Unknown`.
#[derive(Debug, Clone, Default)]
pub struct TypeClause {
    pub types: Vec<TypeRef>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Addr,
    Deref,
    Recv,
    Other,
}

#[derive(Debug, Clone)]
pub struct CallExpr {
    pub func: Expr,
    pub args: Vec<Expr>,
    pub type_args: Vec<TypeRef>,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Ident(String),
    Selector(Box<Expr>, String),
    Call(Box<CallExpr>),
    Composite {
        ty: TypeRef,
        pointer: bool,
        elems: Vec<(Option<String>, Expr)>,
    },
    New(TypeRef),
    FuncLit(usize),
    Assert(Box<Expr>, TypeRef),
    Convert(TypeRef, Box<Expr>),
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
        /// The index read as a type, used when `base` turns out to be generic.
        as_type: TypeRef,
    },
    Unary(UnaryOp, Box<Expr>),
    Lit(TypeRef),
    /// A type in expression position, e.g. the first argument of `make`.
    Type(TypeRef),
    Other(Vec<Expr>),
}

impl Expr {
    pub fn unknown() -> Self {
        Expr::Other(Vec::new())
    }

    /// Offsets every closure reference in this expression.
    pub fn shift_closures(&mut self, offset: usize) {
        match self {
            Expr::FuncLit(index) => *index += offset,
            Expr::Selector(inner, _)
            | Expr::Assert(inner, _)
            | Expr::Convert(_, inner)
            | Expr::Unary(_, inner) => inner.shift_closures(offset),
            Expr::Call(call) => {
                call.func.shift_closures(offset);
                call.args.iter_mut().for_each(|a| a.shift_closures(offset));
            }
            Expr::Composite { elems, .. } => {
                elems.iter_mut().for_each(|(_, e)| e.shift_closures(offset));
            }
            Expr::Index { base, index, .. } => {
                base.shift_closures(offset);
                index.shift_closures(offset);
            }
            Expr::Other(items) => items.iter_mut().for_each(|e| e.shift_closures(offset)),
            Expr::Ident(_) | Expr::New(_) | Expr::Lit(_) | Expr::Type(_) => {}
        }
    }
}
