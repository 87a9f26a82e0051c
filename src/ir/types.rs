use std::collections::BTreeMap;
use std::fmt;

use super::FuncId;

pub type TypeId = usize;

/// Go type expressions, reduced to what call resolution needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum TypeRef {
    /// A declared type; `pkg` is the import path, empty for the universe scope.
    Named { pkg: String, name: String },
    Pointer(Box<TypeRef>),
    Slice(Box<TypeRef>),
    /// Map value type; keys never carry call targets.
    Map(Box<TypeRef>),
    Chan(Box<TypeRef>),
    Func { params: usize, results: usize },
    /// Anonymous interface literal, including `any`.
    Interface,
    /// A type parameter of a generic function or type.
    Param(String),
    Basic(String),
    #[default]
    Unknown,
}

impl TypeRef {
    pub fn named(pkg: impl Into<String>, name: impl Into<String>) -> Self {
        TypeRef::Named {
            pkg: pkg.into(),
            name: name.into(),
        }
    }

    pub fn error() -> Self {
        TypeRef::named("", "error")
    }

    pub fn pointer_to(inner: TypeRef) -> Self {
        TypeRef::Pointer(Box::new(inner))
    }

    /// Strips one level of pointer indirection.
    pub fn deref(&self) -> &TypeRef {
        match self {
            TypeRef::Pointer(inner) => inner,
            other => other,
        }
    }

    /// Element type produced by indexing or ranging.
    pub fn element(&self) -> TypeRef {
        match self.deref() {
            TypeRef::Slice(elem) | TypeRef::Map(elem) | TypeRef::Chan(elem) => (**elem).clone(),
            TypeRef::Basic(name) if name == "string" => TypeRef::Basic("byte".to_string()),
            _ => TypeRef::Unknown,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, TypeRef::Unknown)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named { pkg, name } if pkg.is_empty() => write!(f, "{name}"),
            TypeRef::Named { pkg, name } => write!(f, "{pkg}.{name}"),
            TypeRef::Pointer(inner) => write!(f, "*{inner}"),
            TypeRef::Slice(elem) => write!(f, "[]{elem}"),
            TypeRef::Map(value) => write!(f, "map[_]{value}"),
            TypeRef::Chan(elem) => write!(f, "chan {elem}"),
            TypeRef::Func { .. } => write!(f, "func"),
            TypeRef::Interface => write!(f, "any"),
            TypeRef::Param(name) => write!(f, "{name}"),
            TypeRef::Basic(name) => write!(f, "{name}"),
            TypeRef::Unknown => write!(f, "?"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Field {
    /// `None` for embedded fields.
    pub name: Option<String>,
    pub ty: TypeRef,
}

#[derive(Debug, Clone)]
pub struct InterfaceMethod {
    pub name: String,
    pub params: usize,
    pub results: Vec<TypeRef>,
}

#[derive(Debug, Clone)]
pub enum TypeKind {
    Struct(Vec<Field>),
    Interface {
        methods: Vec<InterfaceMethod>,
        embedded: Vec<TypeRef>,
    },
    /// Any other defined type, with its underlying type expression.
    Defined(TypeRef),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Method {
    pub func: FuncId,
    pub pointer_receiver: bool,
}

#[derive(Debug, Clone)]
pub struct NamedType {
    pub id: TypeId,
    pub pkg: String,
    pub name: String,
    pub kind: TypeKind,
    /// Methods declared directly on this type.
    pub methods: BTreeMap<String, Method>,
}

impl NamedType {
    pub fn is_interface(&self) -> bool {
        matches!(self.kind, TypeKind::Interface { .. })
    }

    pub fn type_ref(&self) -> TypeRef {
        TypeRef::named(self.pkg.clone(), self.name.clone())
    }
}

/// Identifiers that name predeclared non-interface types.
pub const BASIC_TYPES: &[&str] = &[
    "bool", "byte", "complex64", "complex128", "float32", "float64", "int", "int8", "int16",
    "int32", "int64", "rune", "string", "uint", "uint8", "uint16", "uint32", "uint64", "uintptr",
    "comparable",
];

/// Predeclared functions.
pub const BUILTIN_FUNCS: &[&str] = &[
    "append", "cap", "clear", "close", "complex", "copy", "delete", "imag", "len", "make", "max",
    "min", "new", "panic", "print", "println", "real", "recover",
];
