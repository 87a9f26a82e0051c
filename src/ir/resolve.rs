//! Flow-insensitive type resolution over lowered function bodies.
//!
//! Each body is walked once, in declaration order, inferring local variable
//! types from their initializers and recording call sites, allocations,
//! address-taken functions and value flows. Synthetic wrappers and external
//! stubs are created on demand while walking.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use super::loader::DOT_IMPORT;
use super::syntax::{CallExpr, Expr, Stmt, UnaryOp};
use super::types::{TypeRef, BASIC_TYPES, BUILTIN_FUNCS};
use super::{
    AbstractValue, CallSite, CallTarget, Flow, FlowNode, FuncId, Function, FunctionFacts,
    FunctionKind, Member, Program, Signature, Synthetic, TypeId, ValueFlow,
};
use crate::error::Diagnostic;

/// Type and origin of an evaluated expression.
#[derive(Debug, Clone, Default)]
struct Value {
    ty: TypeRef,
    flow: ValueFlow,
    /// Per-result values of a call expression.
    tuple: Vec<(TypeRef, ValueFlow)>,
}

impl Value {
    fn new(ty: TypeRef, flow: ValueFlow) -> Self {
        Self {
            ty,
            flow,
            tuple: Vec::new(),
        }
    }

    fn unknown() -> Self {
        Self::default()
    }

    fn opaque() -> Self {
        Self::new(TypeRef::Unknown, ValueFlow::opaque())
    }

    fn tuple(results: Vec<(TypeRef, ValueFlow)>) -> Self {
        let (ty, flow) = results.first().cloned().unwrap_or_default();
        Self {
            ty,
            flow,
            tuple: results,
        }
    }
}

/// How a call expression's callee was classified before its arguments are evaluated.
enum Callee {
    Function { id: FuncId, type_args: Vec<TypeRef> },
    Method { id: FuncId, recv: ValueFlow },
    Invoke { iface: TypeId, method: String, recv: ValueFlow },
    Dynamic { callee: ValueFlow, results: usize },
    Unresolved,
}

/// Names declared inside one function body.
#[derive(Debug, Clone, Default)]
struct Scope {
    vars: HashMap<String, TypeRef>,
    types: HashSet<String>,
    /// Variables declared again, in another block, with a different type.
    redeclared: HashSet<String>,
}

struct FnCx {
    id: FuncId,
    pkg: String,
    imports: Arc<HashMap<String, String>>,
    scope: Scope,
    facts: FunctionFacts,
    file: PathBuf,
    line: usize,
    initializer: bool,
}

pub(crate) struct Resolver<'p> {
    program: &'p mut Program,
    scopes: Vec<Scope>,
    diagnostics: Vec<Diagnostic>,
}

impl<'p> Resolver<'p> {
    pub(crate) fn new(program: &'p mut Program) -> Self {
        Self {
            program,
            scopes: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub(crate) fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub(crate) fn run(&mut self) {
        let count = self.program.functions.len();
        self.program.facts = vec![FunctionFacts::default(); count];
        self.scopes = vec![Scope::default(); count];

        // Initializers first, so package-level variable types are known to every body.
        let (inits, rest): (Vec<FuncId>, Vec<FuncId>) = (0..count).partition(|&id| {
            self.program.functions[id].synthetic() == Some(Synthetic::PackageInitializer)
        });
        for id in inits.into_iter().chain(rest) {
            self.resolve_function(id);
        }
    }

    fn resolve_function(&mut self, id: FuncId) {
        let function = &self.program.functions[id];
        let Some(body) = function.body.clone() else {
            return;
        };
        let mut cx = FnCx {
            id,
            pkg: function.package.clone().unwrap_or_default(),
            imports: Arc::clone(&function.imports),
            scope: Scope::default(),
            facts: FunctionFacts::default(),
            file: function.file.clone().unwrap_or_default(),
            line: function.line,
            initializer: function.synthetic() == Some(Synthetic::PackageInitializer),
        };

        if let Some(receiver) = &function.receiver {
            let base = TypeRef::named(cx.pkg.clone(), receiver.type_name.clone());
            let ty = if receiver.pointer {
                TypeRef::pointer_to(base)
            } else {
                base
            };
            cx.scope.vars.insert(function.receiver_key(), ty);
        }
        for (i, param) in function.signature.params.iter().enumerate() {
            cx.scope.vars.insert(function.param_key(i), param.ty.clone());
        }
        for (i, result) in function.signature.results.iter().enumerate() {
            if let Some(name) = result.name.as_ref().filter(|n| n.as_str() != "_") {
                cx.scope.vars.insert(name.clone(), result.ty.clone());
                cx.facts.flows.push(Flow {
                    from: ValueFlow::node(FlowNode::Local(id, name.clone())),
                    to: FlowNode::Result(id, i),
                });
            }
        }
        let declared: Vec<TypeRef> = function
            .signature
            .params
            .iter()
            .chain(&function.signature.results)
            .map(|p| p.ty.clone())
            .collect();
        for ty in &declared {
            self.check_type(&cx, ty);
        }

        if cx.initializer {
            self.push_import_initializers(&mut cx);
        }
        for stmt in &body.stmts {
            self.stmt(&mut cx, stmt);
        }
        if cx.initializer {
            let user_inits = self
                .program
                .package(&cx.pkg)
                .map(|p| p.user_inits.clone())
                .unwrap_or_default();
            for init in user_inits {
                self.push_site(&mut cx, CallTarget::Static(init), None, Vec::new());
            }
        }

        self.scopes[id] = cx.scope;
        self.program.facts[id] = cx.facts;
    }

    fn push_import_initializers(&mut self, cx: &mut FnCx) {
        let Some(package) = self.program.package(&cx.pkg) else {
            return;
        };
        let inits: Vec<FuncId> = package
            .imports
            .iter()
            .filter_map(|path| self.program.package(path).and_then(|p| p.init))
            .collect();
        for init in inits {
            self.push_site(cx, CallTarget::Static(init), None, Vec::new());
        }
    }

    fn push_site(
        &mut self,
        cx: &mut FnCx,
        target: CallTarget,
        recv: Option<ValueFlow>,
        args: Vec<ValueFlow>,
    ) -> usize {
        let index = cx.facts.sites.len();
        cx.facts.sites.push(CallSite {
            line: cx.line,
            target,
            recv,
            args,
        });
        index
    }

    fn diagnose(&mut self, cx: &FnCx, message: String) {
        self.diagnostics
            .push(Diagnostic::new(cx.file.clone(), cx.line, message));
    }

    // --- name resolution -------------------------------------------------

    fn lookup_local(&self, cx: &FnCx, name: &str) -> Option<(FuncId, TypeRef)> {
        if let Some(ty) = cx.scope.vars.get(name) {
            return Some((cx.id, ty.clone()));
        }
        let mut parent = self.program.functions[cx.id].parent;
        while let Some(pid) = parent {
            if let Some(ty) = self.scopes[pid].vars.get(name) {
                return Some((pid, ty.clone()));
            }
            parent = self.program.functions[pid].parent;
        }
        None
    }

    fn is_local(&self, cx: &FnCx, name: &str) -> bool {
        self.lookup_local(cx, name).is_some()
    }

    fn scope_of<'a>(&'a self, cx: &'a FnCx, owner: FuncId) -> &'a Scope {
        if owner == cx.id {
            &cx.scope
        } else {
            &self.scopes[owner]
        }
    }

    fn is_local_type(&self, cx: &FnCx, name: &str) -> bool {
        if cx.scope.types.contains(name) {
            return true;
        }
        let mut parent = self.program.functions[cx.id].parent;
        while let Some(pid) = parent {
            if self.scopes[pid].types.contains(name) {
                return true;
            }
            parent = self.program.functions[pid].parent;
        }
        false
    }

    fn is_type_param(&self, cx: &FnCx, name: &str) -> bool {
        let mut current = Some(cx.id);
        while let Some(id) = current {
            let function = &self.program.functions[id];
            if function.type_params.iter().any(|p| p == name) {
                return true;
            }
            current = function.parent;
        }
        false
    }

    /// Identifiers that are valid without a declaration the analysis can see.
    fn is_implicit(&self, cx: &FnCx, name: &str) -> bool {
        matches!(name, "error" | "any")
            || BASIC_TYPES.contains(&name)
            || BUILTIN_FUNCS.contains(&name)
            || cx.imports.contains_key(DOT_IMPORT)
            || self.is_local_type(cx, name)
            || self.is_type_param(cx, name)
    }

    /// Reports named types that no loaded package declares.
    fn check_type(&mut self, cx: &FnCx, ty: &TypeRef) {
        match ty {
            TypeRef::Named { pkg, name } => {
                if pkg.is_empty() || self.program.declares_type(pkg, name) {
                    return;
                }
                let Some(package) = self.program.package(pkg) else {
                    return;
                };
                let message = if *pkg == cx.pkg {
                    if self.is_implicit(cx, name) {
                        return;
                    }
                    format!("undefined: {name}")
                } else {
                    format!("undefined: {}.{name}", package.name)
                };
                self.diagnose(cx, message);
            }
            TypeRef::Pointer(inner)
            | TypeRef::Slice(inner)
            | TypeRef::Map(inner)
            | TypeRef::Chan(inner) => self.check_type(cx, inner),
            _ => {}
        }
    }

    /// Whether the static type computed for `expr` can be trusted for member lookups.
    fn has_settled_type(&self, cx: &FnCx, expr: &Expr) -> bool {
        match expr {
            Expr::Ident(name) => match self.lookup_local(cx, name) {
                Some((owner, _)) => !self.scope_of(cx, owner).redeclared.contains(name),
                None => self.is_member(&cx.pkg, name),
            },
            Expr::Selector(inner, _) | Expr::Unary(UnaryOp::Addr | UnaryOp::Deref, inner) => {
                self.has_settled_type(cx, inner)
            }
            Expr::Call(_)
            | Expr::Composite { .. }
            | Expr::New(_)
            | Expr::Assert(..)
            | Expr::Convert(..) => true,
            _ => false,
        }
    }

    /// Reports `x.name` when the type of `x` is fully known and has no such member.
    fn check_member(&mut self, cx: &FnCx, operand: &Expr, ty: &TypeRef, name: &str) {
        let Some(id) = self.program.type_id_of(ty) else {
            return;
        };
        if !self.program.has_closed_members(id) || !self.has_settled_type(cx, operand) {
            return;
        }
        let subject = selector_text(operand).unwrap_or_else(|| ty.to_string());
        self.diagnose(
            cx,
            format!("{subject}.{name} undefined (type {ty} has no field or method {name})"),
        );
    }

    /// Import path for `alias`, unless a local variable shadows it.
    fn import_of(&self, cx: &FnCx, alias: &str) -> Option<String> {
        if self.is_local(cx, alias) {
            return None;
        }
        cx.imports.get(alias).cloned()
    }

    fn package_func(&self, pkg: &str, name: &str) -> Option<FuncId> {
        self.program.package(pkg)?.funcs.get(name).copied()
    }

    fn is_member(&self, pkg: &str, name: &str) -> bool {
        self.program
            .package(pkg)
            .is_some_and(|p| p.members.contains(name))
    }

    fn global_value(&self, pkg: &str, name: &str) -> Value {
        let ty = self
            .program
            .globals
            .get(&(pkg.to_string(), name.to_string()))
            .cloned()
            .unwrap_or_default();
        Value::new(
            ty,
            ValueFlow::node(FlowNode::Global(pkg.to_string(), name.to_string())),
        )
    }

    fn func_value(&self, cx: &mut FnCx, id: FuncId) -> Value {
        cx.facts.address_taken.push(id);
        let signature = &self.program.functions[id].signature;
        Value::new(
            TypeRef::Func {
                params: signature.params.len(),
                results: signature.results.len(),
            },
            ValueFlow::value(AbstractValue::Func(id)),
        )
    }

    /// The type named by `expr` when it is used as a conversion or type operand.
    fn type_operand(&self, cx: &FnCx, expr: &Expr) -> Option<TypeRef> {
        match expr {
            Expr::Type(ty) => Some(ty.clone()),
            Expr::Ident(name) if !self.is_local(cx, name) => match name.as_str() {
                "error" => Some(TypeRef::error()),
                "any" => Some(TypeRef::Interface),
                n if BASIC_TYPES.contains(&n) => Some(TypeRef::Basic(n.to_string())),
                n if self.program.lookup_type(&cx.pkg, n).is_some() || self.is_local_type(cx, n) => {
                    Some(TypeRef::named(cx.pkg.clone(), n))
                }
                n if self.is_type_param(cx, n) => Some(TypeRef::Param(n.to_string())),
                _ => None,
            },
            Expr::Selector(operand, name) => match operand.as_ref() {
                Expr::Ident(alias) => {
                    let path = self.import_of(cx, alias)?;
                    self.program
                        .lookup_type(&path, name)
                        .map(|_| TypeRef::named(path, name.clone()))
                }
                _ => None,
            },
            Expr::Unary(UnaryOp::Deref, inner) => {
                self.type_operand(cx, inner).map(TypeRef::pointer_to)
            }
            Expr::Index { base, .. } => self.type_operand(cx, base),
            _ => None,
        }
    }

    /// Whether the current function, or one enclosing it, is a method of the
    /// receiver type of `method`.
    fn within_receiver_type(&self, cx: &FnCx, method: FuncId) -> bool {
        let Some(recv) = self.program.functions[method].recv_type else {
            return false;
        };
        let mut current = Some(cx.id);
        while let Some(id) = current {
            let function = &self.program.functions[id];
            if function.recv_type == Some(recv) {
                return true;
            }
            current = function.parent;
        }
        false
    }

    // --- synthetic functions ---------------------------------------------

    fn add_function(&mut self, mut function: Function) -> FuncId {
        if let Some(&existing) = self.program.key_index.get(&function.key) {
            return existing;
        }
        let id = self.program.functions.len();
        function.id = id;
        self.program.key_index.insert(function.key.clone(), id);
        self.program.functions.push(function);
        self.program.facts.push(FunctionFacts::default());
        self.scopes.push(Scope::default());
        id
    }

    fn synthetic_function(
        &self,
        key: String,
        name: String,
        package: Option<String>,
        kind: FunctionKind,
        signature: Signature,
    ) -> Function {
        Function {
            id: 0,
            key,
            name,
            package,
            kind,
            signature,
            receiver: None,
            recv_type: None,
            type_params: Vec::new(),
            parent: None,
            closures: Vec::new(),
            body: None,
            imports: Arc::default(),
            file: None,
            line: 0,
        }
    }

    /// A wrapper whose only job is to call `target`.
    fn wrapper(&mut self, target: FuncId, suffix: &str, kind: Synthetic, signature: Signature) -> FuncId {
        let origin = &self.program.functions[target];
        let key = format!("{}{suffix}", origin.key);
        if let Some(&existing) = self.program.key_index.get(&key) {
            return existing;
        }
        let name = format!("{}{suffix}", origin.name);
        let function =
            self.synthetic_function(key, name, None, FunctionKind::Synthetic(kind), signature);
        let id = self.add_function(function);
        self.program.facts[id].sites.push(CallSite {
            line: 0,
            target: CallTarget::Static(target),
            recv: None,
            args: Vec::new(),
        });
        id
    }

    fn bound_wrapper(&mut self, method: FuncId) -> FuncId {
        let signature = self.program.functions[method].signature.clone();
        self.wrapper(method, "$bound", Synthetic::BoundMethod, signature)
    }

    fn thunk(&mut self, method: FuncId) -> FuncId {
        let origin = &self.program.functions[method];
        let mut signature = origin.signature.clone();
        if let Some(recv) = origin.recv_type {
            signature.params.insert(
                0,
                super::syntax::Param {
                    name: None,
                    ty: self.program.types[recv].type_ref(),
                },
            );
        }
        self.wrapper(method, "$thunk", Synthetic::Thunk, signature)
    }

    fn instance(&mut self, origin: FuncId, type_args: &[TypeRef], arg_types: &[TypeRef]) -> FuncId {
        let function = &self.program.functions[origin];
        if !function.is_generic() {
            return origin;
        }
        let args: Vec<String> = if !type_args.is_empty() {
            type_args.iter().map(ToString::to_string).collect()
        } else {
            function
                .type_params
                .iter()
                .map(|tp| {
                    function
                        .signature
                        .params
                        .iter()
                        .zip(arg_types)
                        .find_map(|(param, arg)| match &param.ty {
                            TypeRef::Param(p) if p == tp && !arg.is_unknown() => Some(arg.to_string()),
                            TypeRef::Slice(elem) if matches!(elem.as_ref(), TypeRef::Param(p) if p == tp) => {
                                match arg.element() {
                                    TypeRef::Unknown => None,
                                    elem => Some(elem.to_string()),
                                }
                            }
                            _ => None,
                        })
                        .unwrap_or_else(|| tp.clone())
                })
                .collect()
        };
        let suffix = format!("[{}]", args.join(", "));
        let signature = function.signature.clone();
        self.wrapper(origin, &suffix, Synthetic::Instance, signature)
    }

    fn external(&mut self, path: &str, name: &str) -> FuncId {
        let key = format!("{path}.{name}");
        let function = self.synthetic_function(
            key,
            name.to_string(),
            Some(path.to_string()),
            FunctionKind::External,
            Signature::default(),
        );
        self.add_function(function)
    }

    // --- statements -------------------------------------------------------

    fn declare(&mut self, cx: &mut FnCx, name: &str, ty: TypeRef, flow: ValueFlow) {
        if name == "_" {
            return;
        }
        let node = if cx.initializer {
            let key = (cx.pkg.clone(), name.to_string());
            let slot = self.program.globals.entry(key).or_default();
            if slot.is_unknown() {
                *slot = ty;
            }
            FlowNode::Global(cx.pkg.clone(), name.to_string())
        } else {
            let slot = cx.scope.vars.entry(name.to_string()).or_default();
            if slot.is_unknown() {
                *slot = ty;
            } else if !ty.is_unknown() && *slot != ty {
                // The later declaration lives in another block; it wins for
                // the statements that follow it.
                *slot = ty;
                cx.scope.redeclared.insert(name.to_string());
            }
            FlowNode::Local(cx.id, name.to_string())
        };
        if !flow.is_empty() {
            cx.facts.flows.push(Flow { from: flow, to: node });
        }
    }

    fn stmt(&mut self, cx: &mut FnCx, stmt: &Stmt) {
        match stmt {
            Stmt::Define { names, values } => {
                let assigned = self.assign_values(cx, values, names.len());
                for (name, (ty, flow)) in names.iter().zip(assigned) {
                    self.declare(cx, name, ty, flow);
                }
            }
            Stmt::Var { names, ty, values } => {
                if let Some(ty) = ty {
                    self.check_type(cx, ty);
                }
                let assigned = self.assign_values(cx, values, names.len());
                for (name, (value_ty, flow)) in names.iter().zip(assigned) {
                    let declared = ty.clone().unwrap_or(value_ty);
                    self.declare(cx, name, declared, flow);
                }
            }
            Stmt::Assign { targets, values } => {
                let assigned = self.assign_values(cx, values, targets.len());
                for (target, (_, flow)) in targets.iter().zip(assigned) {
                    if let Some(node) = self.sink(cx, target) {
                        if !flow.is_empty() {
                            cx.facts.flows.push(Flow { from: flow, to: node });
                        }
                    }
                }
            }
            Stmt::Range {
                names,
                define,
                expr,
            } => {
                let value = self.eval(cx, expr);
                let types = match value.ty.deref() {
                    TypeRef::Slice(elem) => vec![TypeRef::Basic("int".into()), (**elem).clone()],
                    TypeRef::Map(elem) => vec![TypeRef::Unknown, (**elem).clone()],
                    TypeRef::Chan(elem) => vec![(**elem).clone()],
                    TypeRef::Basic(b) if b == "string" => {
                        vec![TypeRef::Basic("int".into()), TypeRef::Basic("rune".into())]
                    }
                    TypeRef::Basic(_) => vec![TypeRef::Basic("int".into())],
                    _ => Vec::new(),
                };
                for (i, name) in names.iter().enumerate() {
                    let ty = types.get(i).cloned().unwrap_or_default();
                    if *define {
                        self.declare(cx, name, ty, ValueFlow::opaque());
                    } else if let Some(node) = self.sink(cx, &Expr::Ident(name.clone())) {
                        cx.facts.flows.push(Flow {
                            from: ValueFlow::opaque(),
                            to: node,
                        });
                    }
                }
            }
            Stmt::TypeSwitch {
                binding,
                expr,
                clauses,
            } => {
                let value = self.eval(cx, expr);
                let binding = binding.as_deref().filter(|name| *name != "_");
                if let Some(name) = binding {
                    self.declare(cx, name, TypeRef::Unknown, value.flow.clone());
                }
                for clause in clauses {
                    for ty in &clause.types {
                        self.check_type(cx, ty);
                    }
                    // A clause naming exactly one type binds the value at that type.
                    let outer = binding.map(|name| {
                        let ty = match clause.types.as_slice() {
                            [single] if !single.is_unknown() => single.clone(),
                            _ => value.ty.clone(),
                        };
                        (name, cx.scope.vars.insert(name.to_string(), ty))
                    });
                    for stmt in &clause.body {
                        self.stmt(cx, stmt);
                    }
                    if let Some((name, Some(ty))) = outer {
                        cx.scope.vars.insert(name.to_string(), ty);
                    }
                }
            }
            Stmt::LocalTypes(names) => {
                cx.scope.types.extend(names.iter().cloned());
            }
            Stmt::Return(values) => {
                let arity = self.program.functions[cx.id].signature.results.len();
                let assigned = self.assign_values(cx, values, arity);
                for (i, (_, flow)) in assigned.into_iter().enumerate() {
                    if !flow.is_empty() {
                        cx.facts.flows.push(Flow {
                            from: flow,
                            to: FlowNode::Result(cx.id, i),
                        });
                    }
                }
            }
            Stmt::Expr(expr) => {
                self.eval(cx, expr);
            }
        }
    }

    /// Evaluates right-hand sides and spreads them over `arity` targets.
    fn assign_values(&mut self, cx: &mut FnCx, values: &[Expr], arity: usize) -> Vec<(TypeRef, ValueFlow)> {
        let mut assigned: Vec<(TypeRef, ValueFlow)> = if values.len() == 1 && arity > 1 {
            let value = self.eval(cx, &values[0]);
            if value.tuple.len() > 1 {
                value.tuple
            } else {
                // Comma-ok forms: map index, type assertion, channel receive.
                vec![(value.ty, value.flow), (TypeRef::Basic("bool".into()), ValueFlow::default())]
            }
        } else {
            let mut out = Vec::with_capacity(values.len());
            for value in values {
                let value = self.eval(cx, value);
                out.push((value.ty, value.flow));
            }
            out
        };
        while assigned.len() < arity {
            assigned.push((TypeRef::Unknown, ValueFlow::opaque()));
        }
        assigned
    }

    /// Flow node written by an assignment to `target`.
    fn sink(&mut self, cx: &mut FnCx, target: &Expr) -> Option<FlowNode> {
        match target {
            Expr::Ident(name) if name == "_" => None,
            Expr::Ident(name) => {
                if let Some((owner, _)) = self.lookup_local(cx, name) {
                    Some(FlowNode::Local(owner, name.clone()))
                } else if self.is_member(&cx.pkg, name) {
                    Some(FlowNode::Global(cx.pkg.clone(), name.clone()))
                } else {
                    None
                }
            }
            Expr::Selector(operand, name) => {
                if let Expr::Ident(alias) = operand.as_ref() {
                    if let Some(path) = self.import_of(cx, alias) {
                        return self
                            .program
                            .package(&path)
                            .map(|_| FlowNode::Global(path, name.clone()));
                    }
                }
                let value = self.eval(cx, operand);
                match self.program.lookup_member(&value.ty, name) {
                    Some(Member::Field { owner, .. }) => Some(FlowNode::Field(owner, name.clone())),
                    Some(_) => None,
                    None => {
                        self.check_member(cx, operand, &value.ty, name);
                        None
                    }
                }
            }
            other => {
                self.eval(cx, other);
                None
            }
        }
    }

    // --- expressions ------------------------------------------------------

    fn eval(&mut self, cx: &mut FnCx, expr: &Expr) -> Value {
        match expr {
            Expr::Ident(name) => self.eval_ident(cx, name),
            Expr::Selector(operand, name) => self.eval_selector(cx, operand, name),
            Expr::Call(call) => self.eval_call(cx, call),
            Expr::Composite { ty, pointer, elems } => {
                self.check_type(cx, ty);
                let type_id = self.allocate(cx, ty);
                for (i, (key, elem)) in elems.iter().enumerate() {
                    let value = self.eval(cx, elem);
                    let Some(owner) = type_id else {
                        continue;
                    };
                    let field = key.clone().or_else(|| self.positional_field(owner, i));
                    if let Some(field) = field {
                        if let Some(Member::Field { owner, .. }) =
                            self.program.lookup_member(ty, &field)
                        {
                            if !value.flow.is_empty() {
                                cx.facts.flows.push(Flow {
                                    from: value.flow,
                                    to: FlowNode::Field(owner, field),
                                });
                            }
                        }
                    }
                }
                let result_ty = if *pointer {
                    TypeRef::pointer_to(ty.clone())
                } else {
                    ty.clone()
                };
                let flow = type_id
                    .map(|t| ValueFlow::value(AbstractValue::Type(t)))
                    .unwrap_or_default();
                Value::new(result_ty, flow)
            }
            Expr::New(ty) => {
                self.check_type(cx, ty);
                let flow = self
                    .allocate(cx, ty)
                    .map(|t| ValueFlow::value(AbstractValue::Type(t)))
                    .unwrap_or_default();
                Value::new(TypeRef::pointer_to(ty.clone()), flow)
            }
            Expr::FuncLit(index) => {
                match self.program.functions[cx.id].closures.get(*index).copied() {
                    Some(closure) => self.func_value(cx, closure),
                    None => Value::opaque(),
                }
            }
            Expr::Assert(inner, ty) | Expr::Convert(ty, inner) => {
                self.check_type(cx, ty);
                let value = self.eval(cx, inner);
                Value::new(ty.clone(), value.flow)
            }
            Expr::Index { base, index, .. } => {
                let base = self.eval(cx, base);
                self.eval(cx, index);
                Value::new(base.ty.element(), ValueFlow::opaque())
            }
            Expr::Unary(op, inner) => {
                let value = self.eval(cx, inner);
                match op {
                    UnaryOp::Addr => Value::new(TypeRef::pointer_to(value.ty), value.flow),
                    UnaryOp::Deref => match value.ty {
                        TypeRef::Pointer(inner) => Value::new(*inner, value.flow),
                        _ => Value::new(TypeRef::Unknown, value.flow),
                    },
                    UnaryOp::Recv => Value::new(value.ty.element(), ValueFlow::opaque()),
                    UnaryOp::Other => Value::new(value.ty, ValueFlow::default()),
                }
            }
            Expr::Lit(ty) => Value::new(ty.clone(), ValueFlow::default()),
            Expr::Type(ty) => {
                self.check_type(cx, ty);
                Value::unknown()
            }
            Expr::Other(items) => {
                for item in items {
                    self.eval(cx, item);
                }
                Value::unknown()
            }
        }
    }

    fn allocate(&mut self, cx: &mut FnCx, ty: &TypeRef) -> Option<TypeId> {
        let id = match ty {
            TypeRef::Named { .. } => self.program.type_id_of(ty)?,
            _ => return None,
        };
        if self.program.is_interface(id) {
            return None;
        }
        cx.facts.allocations.push(id);
        Some(id)
    }

    fn positional_field(&self, owner: TypeId, index: usize) -> Option<String> {
        match &self.program.types[owner].kind {
            super::TypeKind::Struct(fields) => fields.get(index).and_then(|f| f.name.clone()),
            _ => None,
        }
    }

    fn eval_ident(&mut self, cx: &mut FnCx, name: &str) -> Value {
        if let Some((owner, ty)) = self.lookup_local(cx, name) {
            return Value::new(ty, ValueFlow::node(FlowNode::Local(owner, name.to_string())));
        }
        if matches!(name, "_" | "nil" | "true" | "false" | "iota") {
            return Value::unknown();
        }
        if let Some(id) = self.package_func(&cx.pkg, name) {
            return self.func_value(cx, id);
        }
        if self.is_member(&cx.pkg, name) {
            if self.program.lookup_type(&cx.pkg, name).is_some() {
                return Value::unknown();
            }
            return self.global_value(&cx.pkg, name);
        }
        if !self.is_implicit(cx, name) {
            self.diagnose(cx, format!("undefined: {name}"));
        }
        Value::opaque()
    }

    fn eval_selector(&mut self, cx: &mut FnCx, operand: &Expr, name: &str) -> Value {
        if let Expr::Ident(alias) = operand {
            if let Some(path) = self.import_of(cx, alias) {
                return self.eval_qualified(cx, alias, &path, name);
            }
        }
        if let Some(receiver) = self.type_operand(cx, operand) {
            // Method expression `T.M` used as a value.
            return match self
                .program
                .type_id_of(&receiver)
                .and_then(|t| self.program.method_of(t, name))
            {
                Some(method) => {
                    let thunk = self.thunk(method);
                    self.func_value(cx, thunk)
                }
                None => Value::opaque(),
            };
        }

        let value = self.eval(cx, operand);
        match self.program.lookup_member(&value.ty, name) {
            Some(Member::Field { owner, ty }) => {
                Value::new(ty, ValueFlow::node(FlowNode::Field(owner, name.to_string())))
            }
            Some(Member::Method(method)) => {
                let bound = self.bound_wrapper(method);
                self.func_value(cx, bound)
            }
            Some(Member::InterfaceMethod(_)) => Value::opaque(),
            None => {
                self.check_member(cx, operand, &value.ty, name);
                Value::opaque()
            }
        }
    }

    fn eval_qualified(&mut self, cx: &mut FnCx, alias: &str, path: &str, name: &str) -> Value {
        let Some(package) = self.program.package(path) else {
            return Value::opaque();
        };
        if let Some(&id) = package.funcs.get(name) {
            return self.func_value(cx, id);
        }
        if !package.members.contains(name) {
            self.diagnose(cx, format!("undefined: {alias}.{name}"));
            return Value::opaque();
        }
        if self.program.lookup_type(path, name).is_some() {
            return Value::unknown();
        }
        self.global_value(path, name)
    }

    fn eval_builtin(&mut self, cx: &mut FnCx, name: &str, args: &[Expr]) -> Value {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(cx, arg));
        }
        match name {
            "append" | "min" | "max" => values.into_iter().next().unwrap_or_default(),
            "make" => {
                let ty = args
                    .first()
                    .and_then(|a| self.type_operand(cx, a))
                    .unwrap_or_default();
                Value::new(ty, ValueFlow::default())
            }
            "len" | "cap" | "copy" => Value::new(TypeRef::Basic("int".into()), ValueFlow::default()),
            "recover" => Value::opaque(),
            _ => Value::unknown(),
        }
    }

    fn classify_callee(&mut self, cx: &mut FnCx, func: &Expr) -> Callee {
        match func {
            Expr::Ident(name) if !self.is_local(cx, name) => match self.package_func(&cx.pkg, name) {
                Some(id) => Callee::Function {
                    id,
                    type_args: Vec::new(),
                },
                None => self.dynamic_callee(cx, func),
            },
            Expr::Selector(operand, name) => {
                if let Expr::Ident(alias) = operand.as_ref() {
                    if let Some(path) = self.import_of(cx, alias) {
                        return self.qualified_callee(cx, alias, &path, name);
                    }
                }
                if let Some(receiver) = self.type_operand(cx, operand) {
                    return match self
                        .program
                        .type_id_of(&receiver)
                        .and_then(|t| self.program.method_of(t, name))
                    {
                        Some(method) => Callee::Function {
                            id: self.thunk(method),
                            type_args: Vec::new(),
                        },
                        None => Callee::Unresolved,
                    };
                }
                let value = self.eval(cx, operand);
                match self.program.lookup_member(&value.ty, name) {
                    Some(Member::Method(id)) => Callee::Method {
                        id,
                        recv: value.flow,
                    },
                    Some(Member::InterfaceMethod(iface)) => Callee::Invoke {
                        iface,
                        method: name.to_string(),
                        recv: value.flow,
                    },
                    Some(Member::Field { owner, ty }) => Callee::Dynamic {
                        callee: ValueFlow::node(FlowNode::Field(owner, name.to_string())),
                        results: func_results(&ty),
                    },
                    None => {
                        self.check_member(cx, operand, &value.ty, name);
                        Callee::Unresolved
                    }
                }
            }
            Expr::FuncLit(index) => match self.program.functions[cx.id].closures.get(*index) {
                Some(&id) => Callee::Function {
                    id,
                    type_args: Vec::new(),
                },
                None => Callee::Unresolved,
            },
            Expr::Index { base, as_type, .. } => {
                let generic = match base.as_ref() {
                    Expr::Ident(name) if !self.is_local(cx, name) => self.package_func(&cx.pkg, name),
                    Expr::Selector(operand, name) => match operand.as_ref() {
                        Expr::Ident(alias) => self
                            .import_of(cx, alias)
                            .and_then(|path| self.package_func(&path, name)),
                        _ => None,
                    },
                    _ => None,
                };
                match generic {
                    Some(id) if self.program.functions[id].is_generic() => Callee::Function {
                        id,
                        type_args: vec![as_type.clone()],
                    },
                    _ => self.dynamic_callee(cx, func),
                }
            }
            _ => self.dynamic_callee(cx, func),
        }
    }

    fn dynamic_callee(&mut self, cx: &mut FnCx, func: &Expr) -> Callee {
        let value = self.eval(cx, func);
        let callable = match &value.ty {
            TypeRef::Func { .. } => true,
            TypeRef::Unknown => !value.flow.is_empty(),
            ty @ TypeRef::Named { .. } => self
                .program
                .type_id_of(ty)
                .map(|t| matches!(&self.program.types[t].kind, super::TypeKind::Defined(TypeRef::Func { .. })))
                .unwrap_or(false),
            _ => false,
        };
        if !callable {
            return Callee::Unresolved;
        }
        Callee::Dynamic {
            results: func_results(&value.ty),
            callee: value.flow,
        }
    }

    fn qualified_callee(&mut self, cx: &mut FnCx, alias: &str, path: &str, name: &str) -> Callee {
        let Some(package) = self.program.package(path) else {
            return Callee::Function {
                id: self.external(path, name),
                type_args: Vec::new(),
            };
        };
        if let Some(&id) = package.funcs.get(name) {
            return Callee::Function {
                id,
                type_args: Vec::new(),
            };
        }
        if !package.members.contains(name) {
            self.diagnose(cx, format!("undefined: {alias}.{name}"));
            return Callee::Unresolved;
        }
        let value = self.global_value(path, name);
        Callee::Dynamic {
            results: func_results(&value.ty),
            callee: value.flow,
        }
    }

    fn eval_call(&mut self, cx: &mut FnCx, call: &CallExpr) -> Value {
        cx.line = call.line;

        if let Some(ty) = self.type_operand(cx, &call.func) {
            let mut flow = ValueFlow::default();
            for arg in &call.args {
                flow = self.eval(cx, arg).flow;
            }
            return Value::new(ty, flow);
        }
        if let Expr::Ident(name) = &call.func {
            if BUILTIN_FUNCS.contains(&name.as_str())
                && !self.is_local(cx, name)
                && !self.is_member(&cx.pkg, name)
            {
                return self.eval_builtin(cx, name, &call.args);
            }
        }

        let callee = self.classify_callee(cx, &call.func);

        let mut arg_types = Vec::with_capacity(call.args.len());
        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            let value = self.eval(cx, arg);
            arg_types.push(value.ty);
            args.push(value.flow);
        }
        cx.line = call.line;

        let (target, recv, results, opaque) = match callee {
            Callee::Function { id, type_args } => {
                let type_args = if type_args.is_empty() {
                    call.type_args.clone()
                } else {
                    type_args
                };
                let results = self.program.result_types(id);
                let external = self.program.functions[id].kind == FunctionKind::External;
                let target = self.instance(id, &type_args, &arg_types);
                (CallTarget::Static(target), None, results, external)
            }
            Callee::Method { id, recv } => {
                let results = self.program.result_types(id);
                // Methods of a generic type are instantiated, except when called
                // from the generic type's own code.
                let target = if self.within_receiver_type(cx, id) {
                    id
                } else {
                    self.instance(id, &[], &arg_types)
                };
                (CallTarget::Static(target), Some(recv), results, false)
            }
            Callee::Invoke {
                iface,
                method,
                recv,
            } => {
                let results = self.program.interface_result_types(iface, &method);
                (CallTarget::Invoke { iface, method }, Some(recv), results, false)
            }
            Callee::Dynamic { callee, results } => (
                CallTarget::Dynamic(callee),
                None,
                vec![TypeRef::Unknown; results],
                false,
            ),
            Callee::Unresolved => return Value::opaque(),
        };

        let site = self.push_site(cx, target, recv, args);
        if opaque {
            return Value::opaque();
        }
        let tuple = results
            .into_iter()
            .enumerate()
            .map(|(i, ty)| (ty, ValueFlow::node(FlowNode::CallResult(cx.id, site, i))))
            .collect();
        Value::tuple(tuple)
    }
}

/// Source form of an identifier or selector chain.
fn selector_text(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Ident(name) => Some(name.clone()),
        Expr::Selector(inner, field) => selector_text(inner).map(|s| format!("{s}.{field}")),
        _ => None,
    }
}

fn func_results(ty: &TypeRef) -> usize {
    match ty {
        TypeRef::Func { results, .. } => *results,
        _ => 1,
    }
}
