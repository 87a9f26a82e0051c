use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tree_sitter::Node as TSNode;

use super::common::{
    children_by_field, extract_text, find_child_by_kind, has_child_token, line_of, named_children,
    syntax_error_lines, unquote, TreeSitterParser,
};
use crate::core::filter::is_std_pkg_path;
use crate::ir::syntax::{
    Body, CallExpr, Expr, FileUnit, GlobalVar, ImportSpec, LoweredFunction, Param, Receiver,
    Signature, Stmt, TypeClause, TypeDecl, UnaryOp,
};
use crate::ir::types::{Field, InterfaceMethod, TypeKind, TypeRef, BASIC_TYPES};

const TYPE_KINDS: &[&str] = &[
    "type_identifier",
    "qualified_type",
    "pointer_type",
    "slice_type",
    "array_type",
    "implicit_length_array_type",
    "map_type",
    "channel_type",
    "function_type",
    "interface_type",
    "struct_type",
    "generic_type",
    "parenthesized_type",
];

const EXPRESSION_KINDS: &[&str] = &[
    "call_expression",
    "selector_expression",
    "func_literal",
    "composite_literal",
    "unary_expression",
    "binary_expression",
    "index_expression",
    "slice_expression",
    "type_assertion_expression",
    "type_conversion_expression",
    "parenthesized_expression",
];

/// Package-level facts the lowering needs from outside the file.
pub struct FileContext<'a> {
    /// Import path of the package the file belongs to.
    pub package_path: &'a str,
    /// Declared package names of every loaded package, by import path.
    pub package_names: &'a HashMap<String, String>,
}

/// Name a package is referred to by when imported without an alias.
pub fn default_import_name(path: &str) -> String {
    let is_major = |s: &str| {
        s.len() > 1 && s.starts_with('v') && s[1..].chars().all(|c| c.is_ascii_digit())
    };
    let mut segments = path.rsplit('/');
    let last = segments.next().unwrap_or(path);
    let base = if is_major(last) {
        segments.next().unwrap_or(last)
    } else {
        last
    };
    let base = match base.rsplit_once(".v") {
        Some((head, version)) if !version.is_empty() && version.chars().all(|c| c.is_ascii_digit()) => {
            head
        }
        _ => base,
    };
    base.trim_start_matches("go-").replace(['-', '.'], "_")
}

pub struct GoParser {
    parser: TreeSitterParser,
}

impl GoParser {
    pub fn new() -> Result<Self> {
        let language = tree_sitter_go::language();
        let parser = TreeSitterParser::new(language)?;
        Ok(Self { parser })
    }

    pub fn parse_file(&mut self, file_path: &Path, ctx: &FileContext) -> Result<FileUnit> {
        let source = self.parser.read_source(file_path)?;
        self.parse_source(&source, file_path, ctx)
    }

    pub fn parse_source(&mut self, source: &str, file_path: &Path, ctx: &FileContext) -> Result<FileUnit> {
        let tree = self.parser.parse_source(source, file_path)?;
        let root = tree.root_node();
        let mut lowering = FileLowering::new(source.as_bytes(), ctx);
        Ok(lowering.lower_file(&root, file_path))
    }
}

struct FileLowering<'s, 'c> {
    source: &'s [u8],
    ctx: &'c FileContext<'c>,
    aliases: HashMap<String, String>,
    type_params: Vec<String>,
    closure_stack: Vec<Vec<LoweredFunction>>,
}

impl<'s, 'c> FileLowering<'s, 'c> {
    fn new(source: &'s [u8], ctx: &'c FileContext<'c>) -> Self {
        Self {
            source,
            ctx,
            aliases: HashMap::new(),
            type_params: Vec::new(),
            closure_stack: Vec::new(),
        }
    }

    fn text(&self, node: &TSNode) -> &'s str {
        extract_text(node, self.source)
    }

    fn lower_file(&mut self, root: &TSNode, file_path: &Path) -> FileUnit {
        let mut unit = FileUnit {
            path: file_path.to_path_buf(),
            package_name: String::new(),
            imports: Vec::new(),
            types: Vec::new(),
            functions: Vec::new(),
            vars: Vec::new(),
            consts: Vec::new(),
            init_closures: Vec::new(),
            syntax_errors: syntax_error_lines(root),
            unused_imports: Vec::new(),
        };

        // Closures in package-level initializers land at the bottom of the stack.
        self.closure_stack.push(Vec::new());

        for child in named_children(root) {
            match child.kind() {
                "package_clause" => {
                    if let Some(name) = find_child_by_kind(&child, "package_identifier") {
                        unit.package_name = self.text(&name).to_string();
                    }
                }
                "import_declaration" => self.extract_imports(&child, &mut unit.imports),
                "function_declaration" => {
                    let function = self.lower_function(&child, None);
                    unit.functions.push(function);
                }
                "method_declaration" => {
                    let receiver = child
                        .child_by_field_name("receiver")
                        .and_then(|r| self.extract_receiver(&r));
                    if let Some(receiver) = receiver {
                        let function = self.lower_function(&child, Some(receiver));
                        unit.functions.push(function);
                    }
                }
                "type_declaration" => self.extract_types(&child, &mut unit.types),
                "var_declaration" => {
                    for spec in self.var_specs(&child) {
                        let line = line_of(&spec);
                        let (names, ty, values) = self.lower_var_spec(&spec);
                        unit.vars.push(GlobalVar {
                            names,
                            ty,
                            values,
                            line,
                        });
                    }
                }
                "const_declaration" => {
                    for spec in named_children(&child) {
                        for name in children_by_field(&spec, "name") {
                            unit.consts.push((self.text(&name).to_string(), line_of(&name)));
                        }
                    }
                }
                _ => {}
            }
        }

        unit.init_closures = self.closure_stack.pop().unwrap_or_default();
        unit.unused_imports = self.unused_imports(root, &unit.imports);
        unit
    }

    /// Imports whose name never qualifies a type or selector in the file.
    ///
    /// Only imports with a known package name are checked: loaded packages and
    /// the standard library. Blank, dot and cgo imports are always used.
    fn unused_imports(&self, root: &TSNode, imports: &[ImportSpec]) -> Vec<ImportSpec> {
        let mut used = HashSet::new();
        let mut stack = vec![*root];
        while let Some(node) = stack.pop() {
            let qualifier = match node.kind() {
                "import_declaration" => continue,
                "qualified_type" => node.child_by_field_name("package"),
                "selector_expression" => node
                    .child_by_field_name("operand")
                    .filter(|operand| operand.kind() == "identifier"),
                _ => None,
            };
            if let Some(qualifier) = qualifier {
                used.insert(self.text(&qualifier));
            }
            stack.extend(named_children(&node));
        }

        imports
            .iter()
            .filter(|import| {
                let name = match import.alias.as_deref() {
                    Some("_") | Some(".") => return false,
                    Some(alias) => alias.to_string(),
                    None if import.path == "C" => return false,
                    None => match self.ctx.package_names.get(&import.path) {
                        Some(name) => name.clone(),
                        None if is_std_pkg_path(&import.path) => default_import_name(&import.path),
                        None => return false,
                    },
                };
                !used.contains(name.as_str())
            })
            .cloned()
            .collect()
    }

    fn extract_imports(&mut self, import_decl: &TSNode, imports: &mut Vec<ImportSpec>) {
        let mut specs = Vec::new();
        for child in named_children(import_decl) {
            match child.kind() {
                "import_spec" => specs.push(child),
                "import_spec_list" => specs.extend(
                    named_children(&child)
                        .into_iter()
                        .filter(|s| s.kind() == "import_spec"),
                ),
                _ => {}
            }
        }

        for spec in specs {
            let Some(path_node) = spec.child_by_field_name("path") else {
                continue;
            };
            let path = unquote(self.text(&path_node)).to_string();
            let alias = spec
                .child_by_field_name("name")
                .map(|n| self.text(&n).to_string());

            match alias.as_deref() {
                Some("_") | Some(".") => {}
                Some(name) => {
                    self.aliases.insert(name.to_string(), path.clone());
                }
                None => {
                    let name = self
                        .ctx
                        .package_names
                        .get(&path)
                        .cloned()
                        .unwrap_or_else(|| default_import_name(&path));
                    self.aliases.insert(name, path.clone());
                }
            }

            imports.push(ImportSpec {
                alias,
                path,
                line: line_of(&spec),
            });
        }
    }

    fn extract_receiver(&self, params: &TSNode) -> Option<Receiver> {
        let decl = named_children(params)
            .into_iter()
            .find(|n| n.kind() == "parameter_declaration")?;
        let var = decl
            .child_by_field_name("name")
            .map(|n| self.text(&n).to_string());
        let mut ty = decl.child_by_field_name("type")?;
        let mut pointer = false;
        if ty.kind() == "pointer_type" {
            pointer = true;
            ty = named_children(&ty).into_iter().next()?;
        }
        if ty.kind() == "generic_type" {
            ty = ty.child_by_field_name("type")?;
        }
        Some(Receiver {
            var,
            type_name: self.text(&ty).to_string(),
            pointer,
        })
    }

    fn receiver_type_params(&self, node: &TSNode) -> Vec<String> {
        let Some(receiver) = node.child_by_field_name("receiver") else {
            return Vec::new();
        };
        let mut params = Vec::new();
        let mut stack = vec![receiver];
        while let Some(current) = stack.pop() {
            if current.kind() == "type_arguments" {
                for arg in named_children(&current) {
                    let arg = named_children(&arg).into_iter().next().unwrap_or(arg);
                    if matches!(arg.kind(), "type_identifier" | "identifier") {
                        params.push(self.text(&arg).to_string());
                    }
                }
                continue;
            }
            stack.extend(named_children(&current));
        }
        params
    }

    fn declared_type_params(&self, node: &TSNode) -> Vec<String> {
        let Some(list) = node.child_by_field_name("type_parameters") else {
            return Vec::new();
        };
        named_children(&list)
            .iter()
            .flat_map(|decl| children_by_field(decl, "name"))
            .map(|n| self.text(&n).to_string())
            .collect()
    }

    fn lower_function(&mut self, node: &TSNode, receiver: Option<Receiver>) -> LoweredFunction {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(&n).to_string())
            .unwrap_or_default();

        let mut type_params = self.declared_type_params(node);
        if receiver.is_some() {
            type_params.extend(self.receiver_type_params(node));
        }
        self.type_params = type_params.clone();

        let signature = self.lower_signature(
            node.child_by_field_name("parameters"),
            node.child_by_field_name("result"),
        );

        self.closure_stack.push(Vec::new());
        let body = node
            .child_by_field_name("body")
            .map(|block| self.lower_body(&block));
        let closures = self.closure_stack.pop().unwrap_or_default();
        self.type_params.clear();

        LoweredFunction {
            name,
            line: line_of(node),
            receiver,
            signature,
            type_params,
            body,
            closures,
        }
    }

    fn lower_closure(&mut self, node: &TSNode) -> Expr {
        let signature = self.lower_signature(
            node.child_by_field_name("parameters"),
            node.child_by_field_name("result"),
        );

        self.closure_stack.push(Vec::new());
        let body = node
            .child_by_field_name("body")
            .map(|block| self.lower_body(&block));
        let closures = self.closure_stack.pop().unwrap_or_default();

        let closure = LoweredFunction {
            name: String::new(),
            line: line_of(node),
            receiver: None,
            signature,
            type_params: Vec::new(),
            body,
            closures,
        };

        match self.closure_stack.last_mut() {
            Some(parent) => {
                parent.push(closure);
                Expr::FuncLit(parent.len() - 1)
            }
            None => Expr::unknown(),
        }
    }

    fn lower_signature(&self, params: Option<TSNode>, result: Option<TSNode>) -> Signature {
        let mut signature = Signature::default();
        if let Some(params) = params {
            signature.variadic = self.lower_params(&params, &mut signature.params);
        }
        if let Some(result) = result {
            if result.kind() == "parameter_list" {
                self.lower_params(&result, &mut signature.results);
            } else {
                signature.results.push(Param {
                    name: None,
                    ty: self.lower_type(&result),
                });
            }
        }
        signature
    }

    /// Appends the parameters of a list; returns whether the last one is variadic.
    fn lower_params(&self, list: &TSNode, out: &mut Vec<Param>) -> bool {
        let mut variadic = false;
        for decl in named_children(list) {
            let ty = decl
                .child_by_field_name("type")
                .map(|t| self.lower_type(&t))
                .unwrap_or_default();
            match decl.kind() {
                "parameter_declaration" => {
                    let names = children_by_field(&decl, "name");
                    if names.is_empty() {
                        out.push(Param { name: None, ty });
                    } else {
                        for name in names {
                            out.push(Param {
                                name: Some(self.text(&name).to_string()),
                                ty: ty.clone(),
                            });
                        }
                    }
                }
                "variadic_parameter_declaration" => {
                    variadic = true;
                    out.push(Param {
                        name: decl
                            .child_by_field_name("name")
                            .map(|n| self.text(&n).to_string()),
                        ty: TypeRef::Slice(Box::new(ty)),
                    });
                }
                _ => {}
            }
        }
        variadic
    }

    fn param_count(&self, list: Option<TSNode>) -> usize {
        let Some(list) = list else {
            return 0;
        };
        if list.kind() != "parameter_list" {
            return 1;
        }
        let mut params = Vec::new();
        self.lower_params(&list, &mut params);
        params.len()
    }

    fn extract_types(&mut self, decl: &TSNode, types: &mut Vec<TypeDecl>) {
        for spec in named_children(decl) {
            match spec.kind() {
                "type_spec" | "type_alias" => {
                    if let Some(ty) = self.lower_type_spec(&spec) {
                        types.push(ty);
                    }
                }
                _ => {}
            }
        }
    }

    fn lower_type_spec(&mut self, spec: &TSNode) -> Option<TypeDecl> {
        let name = self.text(&spec.child_by_field_name("name")?).to_string();
        let type_node = spec.child_by_field_name("type")?;
        self.type_params = self.declared_type_params(spec);

        let alias = spec.kind() == "type_alias";
        let kind = match type_node.kind() {
            "struct_type" if !alias => TypeKind::Struct(self.lower_struct_fields(&type_node)),
            "interface_type" if !alias => self.lower_interface(&type_node),
            _ => TypeKind::Defined(self.lower_type(&type_node)),
        };
        self.type_params.clear();

        Some(TypeDecl {
            name,
            line: line_of(spec),
            kind,
            alias,
        })
    }

    fn lower_struct_fields(&self, struct_type: &TSNode) -> Vec<Field> {
        let mut fields = Vec::new();
        let Some(list) = find_child_by_kind(struct_type, "field_declaration_list") else {
            return fields;
        };
        for decl in named_children(&list) {
            if decl.kind() != "field_declaration" {
                continue;
            }
            let ty = decl
                .child_by_field_name("type")
                .map(|t| self.lower_type(&t))
                .unwrap_or_default();
            let names = children_by_field(&decl, "name");
            if names.is_empty() {
                let ty = if has_child_token(&decl, "*") {
                    TypeRef::pointer_to(ty)
                } else {
                    ty
                };
                fields.push(Field { name: None, ty });
            } else {
                for name in names {
                    fields.push(Field {
                        name: Some(self.text(&name).to_string()),
                        ty: ty.clone(),
                    });
                }
            }
        }
        fields
    }

    fn lower_interface(&self, iface: &TSNode) -> TypeKind {
        let mut methods = Vec::new();
        let mut embedded = Vec::new();
        for member in named_children(iface) {
            match member.kind() {
                "method_spec" | "method_elem" => {
                    let Some(name) = member.child_by_field_name("name") else {
                        continue;
                    };
                    let results = match member.child_by_field_name("result") {
                        Some(result) if result.kind() == "parameter_list" => {
                            let mut params = Vec::new();
                            self.lower_params(&result, &mut params);
                            params.into_iter().map(|p| p.ty).collect()
                        }
                        Some(result) => vec![self.lower_type(&result)],
                        None => Vec::new(),
                    };
                    methods.push(InterfaceMethod {
                        name: self.text(&name).to_string(),
                        params: self.param_count(member.child_by_field_name("parameters")),
                        results,
                    });
                }
                "interface_type_name" | "type_elem" | "constraint_elem" => {
                    let inner = named_children(&member);
                    if let [single] = inner.as_slice() {
                        if matches!(single.kind(), "type_identifier" | "qualified_type") {
                            embedded.push(self.lower_type(single));
                        }
                    } else if inner.is_empty() {
                        embedded.push(self.named_or_builtin(self.text(&member)));
                    }
                }
                "type_identifier" | "qualified_type" => embedded.push(self.lower_type(&member)),
                _ => {}
            }
        }
        TypeKind::Interface { methods, embedded }
    }

    fn named_or_builtin(&self, name: &str) -> TypeRef {
        if self.type_params.iter().any(|p| p == name) {
            return TypeRef::Param(name.to_string());
        }
        match name {
            "error" => TypeRef::error(),
            "any" => TypeRef::Interface,
            _ if BASIC_TYPES.contains(&name) => TypeRef::Basic(name.to_string()),
            _ => TypeRef::named(self.ctx.package_path, name),
        }
    }

    fn qualified(&self, package: &str, name: &str) -> TypeRef {
        let path = self
            .aliases
            .get(package)
            .cloned()
            .unwrap_or_else(|| package.to_string());
        TypeRef::named(path, name)
    }

    fn lower_type(&self, node: &TSNode) -> TypeRef {
        match node.kind() {
            "type_identifier" | "identifier" => self.named_or_builtin(self.text(node)),
            "qualified_type" => {
                match (
                    node.child_by_field_name("package"),
                    node.child_by_field_name("name"),
                ) {
                    (Some(pkg), Some(name)) => self.qualified(self.text(&pkg), self.text(&name)),
                    _ => TypeRef::Unknown,
                }
            }
            "selector_expression" => {
                match (
                    node.child_by_field_name("operand"),
                    node.child_by_field_name("field"),
                ) {
                    (Some(pkg), Some(name)) if pkg.kind() == "identifier" => {
                        self.qualified(self.text(&pkg), self.text(&name))
                    }
                    _ => TypeRef::Unknown,
                }
            }
            "pointer_type" => named_children(node)
                .first()
                .map(|inner| TypeRef::pointer_to(self.lower_type(inner)))
                .unwrap_or_default(),
            "slice_type" | "array_type" | "implicit_length_array_type" => node
                .child_by_field_name("element")
                .map(|elem| TypeRef::Slice(Box::new(self.lower_type(&elem))))
                .unwrap_or_default(),
            "map_type" => node
                .child_by_field_name("value")
                .map(|value| TypeRef::Map(Box::new(self.lower_type(&value))))
                .unwrap_or_default(),
            "channel_type" => node
                .child_by_field_name("value")
                .map(|value| TypeRef::Chan(Box::new(self.lower_type(&value))))
                .unwrap_or_default(),
            "function_type" => TypeRef::Func {
                params: self.param_count(node.child_by_field_name("parameters")),
                results: self.param_count(node.child_by_field_name("result")),
            },
            "interface_type" => TypeRef::Interface,
            "generic_type" => node
                .child_by_field_name("type")
                .map(|inner| self.lower_type(&inner))
                .unwrap_or_default(),
            "parenthesized_type" => named_children(node)
                .first()
                .map(|inner| self.lower_type(inner))
                .unwrap_or_default(),
            _ => TypeRef::Unknown,
        }
    }

    fn var_specs<'t>(&self, decl: &TSNode<'t>) -> Vec<TSNode<'t>> {
        let mut specs = Vec::new();
        for child in named_children(decl) {
            match child.kind() {
                "var_spec" => specs.push(child),
                "var_spec_list" => specs.extend(
                    named_children(&child)
                        .into_iter()
                        .filter(|s| s.kind() == "var_spec"),
                ),
                _ => {}
            }
        }
        specs
    }

    fn lower_var_spec(&mut self, spec: &TSNode) -> (Vec<String>, Option<TypeRef>, Vec<Expr>) {
        let names = children_by_field(spec, "name")
            .iter()
            .map(|n| self.text(n).to_string())
            .collect();
        let ty = spec
            .child_by_field_name("type")
            .map(|t| self.lower_type(&t));
        let values = spec
            .child_by_field_name("value")
            .map(|v| self.lower_expr_list(&v))
            .unwrap_or_default();
        (names, ty, values)
    }

    fn lower_body(&mut self, block: &TSNode) -> Body {
        let mut stmts = Vec::new();
        self.lower_block(block, &mut stmts);
        Body { stmts }
    }

    fn lower_block(&mut self, node: &TSNode, out: &mut Vec<Stmt>) {
        for child in named_children(node) {
            self.lower_stmt(&child, out);
        }
    }

    fn identifier_names(&self, list: &TSNode) -> Vec<String> {
        let items = if list.kind() == "expression_list" {
            named_children(list)
        } else {
            vec![*list]
        };
        items
            .iter()
            .map(|n| {
                if n.kind() == "identifier" {
                    self.text(n).to_string()
                } else {
                    "_".to_string()
                }
            })
            .collect()
    }

    fn lower_stmt(&mut self, node: &TSNode, out: &mut Vec<Stmt>) {
        match node.kind() {
            "short_var_declaration" => {
                let names = node
                    .child_by_field_name("left")
                    .map(|l| self.identifier_names(&l))
                    .unwrap_or_default();
                let values = node
                    .child_by_field_name("right")
                    .map(|r| self.lower_expr_list(&r))
                    .unwrap_or_default();
                out.push(Stmt::Define { names, values });
            }
            "assignment_statement" => {
                let targets = node
                    .child_by_field_name("left")
                    .map(|l| self.lower_expr_list(&l))
                    .unwrap_or_default();
                let values = node
                    .child_by_field_name("right")
                    .map(|r| self.lower_expr_list(&r))
                    .unwrap_or_default();
                out.push(Stmt::Assign { targets, values });
            }
            "var_declaration" => {
                for spec in self.var_specs(node) {
                    let (names, ty, values) = self.lower_var_spec(&spec);
                    out.push(Stmt::Var { names, ty, values });
                }
            }
            "return_statement" => {
                let values = named_children(node)
                    .iter()
                    .flat_map(|child| self.lower_expr_list(child))
                    .collect();
                out.push(Stmt::Return(values));
            }
            "expression_statement" | "go_statement" | "defer_statement" => {
                for child in named_children(node) {
                    out.push(Stmt::Expr(self.lower_expr(&child)));
                }
            }
            "range_clause" => {
                let names = node
                    .child_by_field_name("left")
                    .map(|l| self.identifier_names(&l))
                    .unwrap_or_default();
                let define = has_child_token(node, ":=");
                if let Some(right) = node.child_by_field_name("right") {
                    let expr = self.lower_expr(&right);
                    out.push(Stmt::Range {
                        names,
                        define,
                        expr,
                    });
                }
            }
            "receive_statement" => {
                let Some(right) = node.child_by_field_name("right") else {
                    return;
                };
                let value = self.lower_expr(&right);
                match node.child_by_field_name("left") {
                    Some(left) if has_child_token(node, ":=") => out.push(Stmt::Define {
                        names: self.identifier_names(&left),
                        values: vec![value],
                    }),
                    Some(left) => out.push(Stmt::Assign {
                        targets: self.lower_expr_list(&left),
                        values: vec![value],
                    }),
                    None => out.push(Stmt::Expr(value)),
                }
            }
            "type_switch_statement" => self.lower_type_switch(node, out),
            "const_declaration" => {
                for spec in named_children(node) {
                    let (names, ty, values) = self.lower_var_spec(&spec);
                    out.push(Stmt::Var { names, ty, values });
                }
            }
            "type_declaration" => {
                let names = named_children(node)
                    .iter()
                    .filter_map(|spec| spec.child_by_field_name("name"))
                    .map(|name| self.text(&name).to_string())
                    .collect();
                out.push(Stmt::LocalTypes(names));
            }
            "comment" | "inc_statement" | "dec_statement" | "label_name" | "identifier" => {}
            kind if EXPRESSION_KINDS.contains(&kind) => {
                out.push(Stmt::Expr(self.lower_expr(node)));
            }
            _ => self.lower_block(node, out),
        }
    }

    fn lower_type_switch(&mut self, node: &TSNode, out: &mut Vec<Stmt>) {
        if let Some(init) = node.child_by_field_name("initializer") {
            self.lower_stmt(&init, out);
        }
        let binding = node.child_by_field_name("alias").map(|alias| {
            self.identifier_names(&alias)
                .into_iter()
                .next()
                .unwrap_or_else(|| "_".to_string())
        });
        let expr = node
            .child_by_field_name("value")
            .map(|value| self.lower_expr(&value))
            .unwrap_or_else(Expr::unknown);

        let mut clauses = Vec::new();
        for case in named_children(node) {
            if !matches!(case.kind(), "type_case" | "default_case") {
                continue;
            }
            let type_nodes = children_by_field(&case, "type");
            let types = type_nodes
                .iter()
                .map(|ty| match self.text(ty) {
                    "nil" => TypeRef::Unknown,
                    _ => self.lower_type(ty),
                })
                .collect();
            let mut body = Vec::new();
            for stmt in named_children(&case) {
                if !type_nodes.iter().any(|ty| ty.id() == stmt.id()) {
                    self.lower_stmt(&stmt, &mut body);
                }
            }
            clauses.push(TypeClause { types, body });
        }
        out.push(Stmt::TypeSwitch {
            binding,
            expr,
            clauses,
        });
    }

    fn lower_expr_list(&mut self, node: &TSNode) -> Vec<Expr> {
        if node.kind() == "expression_list" {
            named_children(node)
                .iter()
                .map(|child| self.lower_expr(child))
                .collect()
        } else {
            vec![self.lower_expr(node)]
        }
    }

    fn lower_expr(&mut self, node: &TSNode) -> Expr {
        match node.kind() {
            "identifier" => Expr::Ident(self.text(node).to_string()),
            "selector_expression" => {
                match (
                    node.child_by_field_name("operand"),
                    node.child_by_field_name("field"),
                ) {
                    (Some(operand), Some(field)) => {
                        let operand = self.lower_expr(&operand);
                        Expr::Selector(Box::new(operand), self.text(&field).to_string())
                    }
                    _ => Expr::unknown(),
                }
            }
            "call_expression" => self.lower_call(node),
            "composite_literal" => self.lower_composite(node, false),
            "unary_expression" => {
                let op = node
                    .child_by_field_name("operator")
                    .map(|o| self.text(&o))
                    .unwrap_or("");
                let Some(operand) = node.child_by_field_name("operand") else {
                    return Expr::unknown();
                };
                if op == "&" && operand.kind() == "composite_literal" {
                    return self.lower_composite(&operand, true);
                }
                let op = match op {
                    "&" => UnaryOp::Addr,
                    "*" => UnaryOp::Deref,
                    "<-" => UnaryOp::Recv,
                    _ => UnaryOp::Other,
                };
                Expr::Unary(op, Box::new(self.lower_expr(&operand)))
            }
            "func_literal" => self.lower_closure(node),
            "parenthesized_expression" => match named_children(node).first() {
                Some(inner) => self.lower_expr(inner),
                None => Expr::unknown(),
            },
            "type_assertion_expression" => {
                let operand = node
                    .child_by_field_name("operand")
                    .map(|o| self.lower_expr(&o))
                    .unwrap_or_else(Expr::unknown);
                let ty = node
                    .child_by_field_name("type")
                    .map(|t| self.lower_type(&t))
                    .unwrap_or_default();
                Expr::Assert(Box::new(operand), ty)
            }
            "type_conversion_expression" => {
                let ty = node
                    .child_by_field_name("type")
                    .map(|t| self.lower_type(&t))
                    .unwrap_or_default();
                let operand = node
                    .child_by_field_name("operand")
                    .map(|o| self.lower_expr(&o))
                    .unwrap_or_else(Expr::unknown);
                Expr::Convert(ty, Box::new(operand))
            }
            "index_expression" => {
                let base = node
                    .child_by_field_name("operand")
                    .map(|o| self.lower_expr(&o))
                    .unwrap_or_else(Expr::unknown);
                let (index, as_type) = match node.child_by_field_name("index") {
                    Some(index) => (self.lower_expr(&index), self.lower_type(&index)),
                    None => (Expr::unknown(), TypeRef::Unknown),
                };
                Expr::Index {
                    base: Box::new(base),
                    index: Box::new(index),
                    as_type,
                }
            }
            "slice_expression" => node
                .child_by_field_name("operand")
                .map(|o| self.lower_expr(&o))
                .unwrap_or_else(Expr::unknown),
            "int_literal" | "iota" => Expr::Lit(TypeRef::Basic("int".to_string())),
            "float_literal" => Expr::Lit(TypeRef::Basic("float64".to_string())),
            "imaginary_literal" => Expr::Lit(TypeRef::Basic("complex128".to_string())),
            "rune_literal" => Expr::Lit(TypeRef::Basic("rune".to_string())),
            "interpreted_string_literal" | "raw_string_literal" => {
                Expr::Lit(TypeRef::Basic("string".to_string()))
            }
            "true" | "false" => Expr::Lit(TypeRef::Basic("bool".to_string())),
            "nil" => Expr::Lit(TypeRef::Unknown),
            kind if TYPE_KINDS.contains(&kind) => Expr::Type(self.lower_type(node)),
            _ => {
                let children = named_children(node)
                    .iter()
                    .map(|child| self.lower_expr(child))
                    .collect();
                Expr::Other(children)
            }
        }
    }

    fn lower_call(&mut self, node: &TSNode) -> Expr {
        let Some(func_node) = node.child_by_field_name("function") else {
            return Expr::unknown();
        };
        let type_args = node
            .child_by_field_name("type_arguments")
            .map(|list| {
                named_children(&list)
                    .iter()
                    .map(|t| {
                        // Newer grammars wrap each argument in a type_elem.
                        let inner = named_children(t).into_iter().next();
                        match (t.kind(), inner) {
                            ("type_elem", Some(inner)) => self.lower_type(&inner),
                            _ => self.lower_type(t),
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut args = Vec::new();
        if let Some(list) = node.child_by_field_name("arguments") {
            for arg in named_children(&list) {
                let lowered = match arg.kind() {
                    "variadic_argument" => named_children(&arg)
                        .first()
                        .map(|inner| self.lower_expr(inner))
                        .unwrap_or_else(Expr::unknown),
                    kind if TYPE_KINDS.contains(&kind) => Expr::Type(self.lower_type(&arg)),
                    _ => self.lower_expr(&arg),
                };
                args.push(lowered);
            }
        }

        if func_node.kind() == "identifier" && self.text(&func_node) == "new" {
            match args.first() {
                Some(Expr::Type(ty)) => return Expr::New(ty.clone()),
                Some(Expr::Ident(name)) => return Expr::New(self.named_or_builtin(name)),
                Some(Expr::Selector(pkg, name)) => {
                    if let Expr::Ident(pkg) = pkg.as_ref() {
                        return Expr::New(self.qualified(pkg, name));
                    }
                }
                _ => {}
            }
        }

        let func = self.lower_expr(&func_node);
        Expr::Call(Box::new(CallExpr {
            func,
            args,
            type_args,
            line: line_of(node),
        }))
    }

    fn lower_composite(&mut self, node: &TSNode, pointer: bool) -> Expr {
        let ty = node
            .child_by_field_name("type")
            .map(|t| self.lower_type(&t))
            .unwrap_or_default();
        let elems = node
            .child_by_field_name("body")
            .map(|body| self.lower_elements(&body))
            .unwrap_or_default();
        Expr::Composite { ty, pointer, elems }
    }

    fn lower_elements(&mut self, literal_value: &TSNode) -> Vec<(Option<String>, Expr)> {
        let mut elems = Vec::new();
        for element in named_children(literal_value) {
            match element.kind() {
                "keyed_element" => {
                    let parts = named_children(&element);
                    let (Some(key), Some(value)) = (parts.first(), parts.last()) else {
                        continue;
                    };
                    let key = unwrap_element(key);
                    let key_name = matches!(key.kind(), "field_identifier" | "identifier")
                        .then(|| self.text(&key).to_string());
                    let value = self.lower_element_value(&unwrap_element(value));
                    elems.push((key_name, value));
                }
                _ => {
                    let value = self.lower_element_value(&unwrap_element(&element));
                    elems.push((None, value));
                }
            }
        }
        elems
    }

    fn lower_element_value(&mut self, node: &TSNode) -> Expr {
        if node.kind() == "literal_value" {
            let nested = self
                .lower_elements(node)
                .into_iter()
                .map(|(_, e)| e)
                .collect();
            Expr::Other(nested)
        } else {
            self.lower_expr(node)
        }
    }
}

fn unwrap_element<'t>(node: &TSNode<'t>) -> TSNode<'t> {
    if matches!(node.kind(), "literal_element" | "element") {
        if let Some(inner) = named_children(node).into_iter().next() {
            return inner;
        }
    }
    *node
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_import_names() {
        assert_eq!(default_import_name("fmt"), "fmt");
        assert_eq!(default_import_name("net/http"), "http");
        assert_eq!(default_import_name("github.com/acme/lib/v2"), "lib");
        assert_eq!(default_import_name("gopkg.in/yaml.v3"), "yaml");
        assert_eq!(default_import_name("github.com/mattn/go-sqlite3"), "sqlite3");
    }
}
