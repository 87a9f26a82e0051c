//! Whole-program intermediate representation of a loaded Go module.
//!
//! Every function, method, closure, external stub and synthetic wrapper gets a
//! [`FuncId`]. Type resolution leaves behind one [`FunctionFacts`] per function:
//! call sites, allocations, address-taken functions and value flows. The call
//! graph algorithms only read these facts.

pub mod loader;
pub mod resolve;
pub mod syntax;
pub mod types;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

pub use loader::ProgramLoader;
pub use syntax::{Body, Receiver, Signature};
pub use types::{NamedType, TypeId, TypeKind, TypeRef};

pub type FuncId = usize;

/// Compiler-synthesized function flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Synthetic {
    PackageInitializer,
    BoundMethod,
    Thunk,
    Instance,
}

impl Synthetic {
    pub fn description(self) -> &'static str {
        match self {
            Synthetic::PackageInitializer => "package initializer",
            Synthetic::BoundMethod => "bound method wrapper",
            Synthetic::Thunk => "method expression thunk",
            Synthetic::Instance => "generic instantiation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    Function,
    Method,
    Closure,
    /// Declared in a package that was not loaded; has no body.
    External,
    Synthetic(Synthetic),
}

#[derive(Debug, Clone)]
pub struct Function {
    pub id: FuncId,
    /// Canonical qualified name, e.g. `(*example.com/m/pkg.T).Run`.
    pub key: String,
    /// Name relative to the package, e.g. `(*T).Run`.
    pub name: String,
    /// Import path of the owning package; synthetic wrappers have none.
    pub package: Option<String>,
    pub kind: FunctionKind,
    pub signature: Signature,
    pub receiver: Option<Receiver>,
    pub recv_type: Option<TypeId>,
    pub type_params: Vec<String>,
    pub parent: Option<FuncId>,
    pub closures: Vec<FuncId>,
    pub body: Option<Body>,
    pub imports: Arc<HashMap<String, String>>,
    pub file: Option<PathBuf>,
    pub line: usize,
}

impl Function {
    pub fn synthetic(&self) -> Option<Synthetic> {
        match self.kind {
            FunctionKind::Synthetic(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.synthetic().is_some()
    }

    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty()
    }

    /// Flow-graph name of the i-th parameter.
    pub fn param_key(&self, index: usize) -> String {
        match self.signature.params.get(index).and_then(|p| p.name.clone()) {
            Some(name) if name != "_" => name,
            _ => format!("$p{index}"),
        }
    }

    pub fn receiver_key(&self) -> String {
        match self.receiver.as_ref().and_then(|r| r.var.clone()) {
            Some(name) if name != "_" => name,
            _ => "$recv".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Package {
    pub path: String,
    pub name: String,
    pub dir: PathBuf,
    pub files: Vec<PathBuf>,
    pub vendored: bool,
    /// Top-level functions (not methods) by name; user `init`s are excluded.
    pub funcs: HashMap<String, FuncId>,
    /// Every top-level identifier declared in the package.
    pub members: BTreeSet<String>,
    /// Import paths referenced by any file of the package.
    pub imports: BTreeSet<String>,
    pub user_inits: Vec<FuncId>,
    pub init: Option<FuncId>,
}

impl Package {
    pub fn is_main(&self) -> bool {
        self.name == "main"
    }
}

/// Abstract value tracked by type propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AbstractValue {
    Type(TypeId),
    Func(FuncId),
    /// A value whose origin the analysis cannot see.
    Opaque,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FlowNode {
    Local(FuncId, String),
    Result(FuncId, usize),
    /// Result `i` of call site `site` in function `f`.
    CallResult(FuncId, usize, usize),
    Field(TypeId, String),
    Global(String, String),
}

/// Where the value of an expression can come from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueFlow {
    pub nodes: Vec<FlowNode>,
    pub values: Vec<AbstractValue>,
}

impl ValueFlow {
    pub fn node(node: FlowNode) -> Self {
        Self {
            nodes: vec![node],
            values: Vec::new(),
        }
    }

    pub fn value(value: AbstractValue) -> Self {
        Self {
            nodes: Vec::new(),
            values: vec![value],
        }
    }

    pub fn opaque() -> Self {
        Self::value(AbstractValue::Opaque)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.values.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Flow {
    pub from: ValueFlow,
    pub to: FlowNode,
}

#[derive(Debug, Clone)]
pub enum CallTarget {
    Static(FuncId),
    Invoke { iface: TypeId, method: String },
    /// Call through a function value.
    Dynamic(ValueFlow),
}

#[derive(Debug, Clone)]
pub struct CallSite {
    pub line: usize,
    pub target: CallTarget,
    pub recv: Option<ValueFlow>,
    pub args: Vec<ValueFlow>,
}

#[derive(Debug, Clone, Default)]
pub struct FunctionFacts {
    pub sites: Vec<CallSite>,
    pub allocations: Vec<TypeId>,
    pub address_taken: Vec<FuncId>,
    pub flows: Vec<Flow>,
}

/// Result of looking up `x.name` on a static type.
#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    Field { owner: TypeId, ty: TypeRef },
    Method(FuncId),
    InterfaceMethod(TypeId),
}

#[derive(Debug, Default)]
pub struct Program {
    pub module: String,
    pub packages: Vec<Package>,
    pub functions: Vec<Function>,
    pub types: Vec<NamedType>,
    pub facts: Vec<FunctionFacts>,
    pub(crate) package_index: HashMap<String, usize>,
    pub(crate) type_index: HashMap<(String, String), TypeId>,
    pub(crate) aliases: HashMap<(String, String), TypeRef>,
    pub(crate) key_index: HashMap<String, FuncId>,
    pub(crate) globals: HashMap<(String, String), TypeRef>,
    pub(crate) method_sets: Vec<BTreeMap<String, FuncId>>,
    pub(crate) interface_methods: Vec<BTreeSet<String>>,
}

const MAX_EMBEDDING_DEPTH: usize = 8;

impl Program {
    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id]
    }

    pub fn function_by_key(&self, key: &str) -> Option<&Function> {
        self.key_index.get(key).map(|&id| &self.functions[id])
    }

    pub fn package(&self, path: &str) -> Option<&Package> {
        self.package_index.get(path).map(|&i| &self.packages[i])
    }

    pub fn named_type(&self, id: TypeId) -> &NamedType {
        &self.types[id]
    }

    pub fn facts(&self, id: FuncId) -> &FunctionFacts {
        &self.facts[id]
    }

    /// Resolves a named type, following aliases.
    pub fn lookup_type(&self, pkg: &str, name: &str) -> Option<TypeId> {
        let mut key = (pkg.to_string(), name.to_string());
        for _ in 0..MAX_EMBEDDING_DEPTH {
            if let Some(&id) = self.type_index.get(&key) {
                return Some(id);
            }
            match self.aliases.get(&key) {
                Some(TypeRef::Named { pkg, name }) => key = (pkg.clone(), name.clone()),
                _ => return None,
            }
        }
        None
    }

    /// Whether `pkg` declares a type or alias called `name`.
    pub fn declares_type(&self, pkg: &str, name: &str) -> bool {
        let key = (pkg.to_string(), name.to_string());
        self.type_index.contains_key(&key) || self.aliases.contains_key(&key)
    }

    /// The named type behind `ty`, looking through one pointer.
    pub fn type_id_of(&self, ty: &TypeRef) -> Option<TypeId> {
        match ty.deref() {
            TypeRef::Named { pkg, name } => self.lookup_type(pkg, name),
            _ => None,
        }
    }

    pub fn is_interface(&self, id: TypeId) -> bool {
        let mut current = id;
        for _ in 0..MAX_EMBEDDING_DEPTH {
            match &self.types[current].kind {
                TypeKind::Interface { .. } => return true,
                TypeKind::Defined(under) => match self.type_id_of(under) {
                    Some(next) if !matches!(under, TypeRef::Pointer(_)) => current = next,
                    _ => return false,
                },
                TypeKind::Struct(_) => return false,
            }
        }
        false
    }

    pub fn interface_methods(&self, iface: TypeId) -> &BTreeSet<String> {
        &self.interface_methods[iface]
    }

    /// Method `name` in the full method set of a concrete type, promoted methods included.
    pub fn method_of(&self, concrete: TypeId, name: &str) -> Option<FuncId> {
        self.method_sets[concrete].get(name).copied()
    }

    pub fn implements(&self, concrete: TypeId, iface: TypeId) -> bool {
        if self.is_interface(concrete) {
            return false;
        }
        let required = &self.interface_methods[iface];
        !required.is_empty()
            && required
                .iter()
                .all(|m| self.method_sets[concrete].contains_key(m))
    }

    /// Methods named `method` on every concrete type implementing `iface`, in type order.
    ///
    /// A method promoted through embedding is listed once, under the first type
    /// that reaches it.
    pub fn implementations(&self, iface: TypeId, method: &str) -> Vec<FuncId> {
        let mut seen = BTreeSet::new();
        (0..self.types.len())
            .filter(|&t| self.implements(t, iface))
            .filter_map(|t| self.method_of(t, method))
            .filter(|&m| seen.insert(m))
            .collect()
    }

    /// `main` functions of every `main` package.
    pub fn main_functions(&self) -> Vec<FuncId> {
        self.packages
            .iter()
            .filter(|p| p.is_main())
            .filter_map(|p| p.funcs.get("main").copied())
            .collect()
    }

    pub fn address_taken(&self) -> BTreeSet<FuncId> {
        self.facts
            .iter()
            .flat_map(|f| f.address_taken.iter().copied())
            .collect()
    }

    /// Field or method selection `x.name` where `x` has static type `ty`.
    pub fn lookup_member(&self, ty: &TypeRef, name: &str) -> Option<Member> {
        let id = self.type_id_of(ty)?;
        self.lookup_member_in(id, name, 0)
    }

    fn lookup_member_in(&self, id: TypeId, name: &str, depth: usize) -> Option<Member> {
        if depth > MAX_EMBEDDING_DEPTH {
            return None;
        }
        let named = &self.types[id];
        if let Some(method) = named.methods.get(name) {
            return Some(Member::Method(method.func));
        }
        match &named.kind {
            TypeKind::Interface { .. } => self.interface_methods[id]
                .contains(name)
                .then_some(Member::InterfaceMethod(id)),
            TypeKind::Struct(fields) => {
                if let Some(field) = fields.iter().find(|f| f.name.as_deref() == Some(name)) {
                    return Some(Member::Field {
                        owner: id,
                        ty: field.ty.clone(),
                    });
                }
                fields
                    .iter()
                    .filter(|f| f.name.is_none())
                    .filter_map(|f| self.type_id_of(&f.ty))
                    .find_map(|embedded| self.lookup_member_in(embedded, name, depth + 1))
            }
            TypeKind::Defined(under) => {
                let under_id = self.type_id_of(under)?;
                // A defined type keeps the fields of its underlying type but not its methods,
                // unless the underlying type is an interface.
                if self.is_interface(under_id) {
                    return self.interface_methods[id]
                        .contains(name)
                        .then_some(Member::InterfaceMethod(id));
                }
                match self.lookup_member_in(under_id, name, depth + 1)? {
                    field @ Member::Field { .. } => Some(field),
                    _ => None,
                }
            }
        }
    }

    /// Whether every field and method selectable on `id` is visible to the
    /// analysis, so a failed lookup is a real type error.
    pub fn has_closed_members(&self, id: TypeId) -> bool {
        self.closed_members_in(id, 0)
    }

    fn closed_members_in(&self, id: TypeId, depth: usize) -> bool {
        if depth > MAX_EMBEDDING_DEPTH {
            return false;
        }
        let closed = |ty: &TypeRef| {
            self.type_id_of(ty)
                .is_some_and(|inner| self.closed_members_in(inner, depth + 1))
        };
        match &self.types[id].kind {
            TypeKind::Struct(fields) => fields
                .iter()
                .filter(|f| f.name.is_none())
                .all(|f| closed(&f.ty)),
            TypeKind::Interface { embedded, .. } => embedded.iter().all(closed),
            TypeKind::Defined(under @ TypeRef::Named { .. }) => closed(under),
            TypeKind::Defined(TypeRef::Pointer(_) | TypeRef::Param(_) | TypeRef::Unknown) => false,
            TypeKind::Defined(_) => true,
        }
    }

    pub(crate) fn compute_method_sets(&mut self) {
        let count = self.types.len();
        let mut method_sets = Vec::with_capacity(count);
        let mut interface_methods = Vec::with_capacity(count);
        for id in 0..count {
            let mut methods = BTreeMap::new();
            self.collect_methods(id, 0, &mut methods);
            method_sets.push(methods);
            let mut iface = BTreeSet::new();
            self.collect_interface_methods(id, 0, &mut iface);
            interface_methods.push(iface);
        }
        self.method_sets = method_sets;
        self.interface_methods = interface_methods;
    }

    fn collect_methods(&self, id: TypeId, depth: usize, out: &mut BTreeMap<String, FuncId>) {
        if depth > MAX_EMBEDDING_DEPTH {
            return;
        }
        let named = &self.types[id];
        for (name, method) in &named.methods {
            out.entry(name.clone()).or_insert(method.func);
        }
        if let TypeKind::Struct(fields) = &named.kind {
            for field in fields.iter().filter(|f| f.name.is_none()) {
                if let Some(embedded) = self.type_id_of(&field.ty) {
                    if !self.is_interface(embedded) {
                        self.collect_methods(embedded, depth + 1, out);
                    }
                }
            }
        }
    }

    fn collect_interface_methods(&self, id: TypeId, depth: usize, out: &mut BTreeSet<String>) {
        if depth > MAX_EMBEDDING_DEPTH {
            return;
        }
        match &self.types[id].kind {
            TypeKind::Interface { methods, embedded } => {
                out.extend(methods.iter().map(|m| m.name.clone()));
                for ty in embedded {
                    if let Some(inner) = self.type_id_of(ty) {
                        self.collect_interface_methods(inner, depth + 1, out);
                    }
                }
            }
            TypeKind::Defined(under) => {
                if let Some(inner) = self.type_id_of(under) {
                    self.collect_interface_methods(inner, depth + 1, out);
                }
            }
            TypeKind::Struct(_) => {}
        }
    }

    /// Result types of a function's signature.
    pub fn result_types(&self, id: FuncId) -> Vec<TypeRef> {
        self.functions[id]
            .signature
            .results
            .iter()
            .map(|p| p.ty.clone())
            .collect()
    }

    /// Result types declared by interface method `method` of `iface`.
    pub fn interface_result_types(&self, iface: TypeId, method: &str) -> Vec<TypeRef> {
        self.find_interface_method(iface, method, 0)
            .map(|m| m.results.clone())
            .unwrap_or_default()
    }

    fn find_interface_method(
        &self,
        iface: TypeId,
        method: &str,
        depth: usize,
    ) -> Option<&types::InterfaceMethod> {
        if depth > MAX_EMBEDDING_DEPTH {
            return None;
        }
        match &self.types[iface].kind {
            TypeKind::Interface { methods, embedded } => methods
                .iter()
                .find(|m| m.name == method)
                .or_else(|| {
                    embedded
                        .iter()
                        .filter_map(|ty| self.type_id_of(ty))
                        .find_map(|inner| self.find_interface_method(inner, method, depth + 1))
                }),
            TypeKind::Defined(under) => self
                .type_id_of(under)
                .and_then(|inner| self.find_interface_method(inner, method, depth + 1)),
            TypeKind::Struct(_) => None,
        }
    }
}
