use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::resolve::Resolver;
use super::syntax::{FileUnit, LoweredFunction, Stmt};
use super::types::{InterfaceMethod, Method, NamedType, TypeKind, TypeRef};
use super::{FuncId, Function, FunctionKind, Package, Program, Signature, Synthetic};
use crate::core::module::ModuleInfo;
use crate::core::scanner::{PackageDir, PackageScanner};
use crate::error::{AnalysisError, Diagnostic, Result};
use crate::parsers::go::{default_import_name, FileContext, GoParser};

/// Import map key recording a dot import.
pub(crate) const DOT_IMPORT: &str = ".";

/// Loads every package under a root into a type-resolved [`Program`].
pub struct ProgramLoader {
    module: ModuleInfo,
}

impl ProgramLoader {
    pub fn new(module: ModuleInfo) -> Self {
        Self { module }
    }

    pub fn load(&self, root: &Path) -> Result<Program> {
        let root = root.canonicalize()?;
        let dirs = PackageScanner::new(&self.module).scan(&root)?;
        info!(packages = dirs.len(), root = %root.display(), "loading Go packages");

        let package_names: HashMap<String, String> = dirs
            .iter()
            .map(|d| (d.import_path.clone(), d.name.clone()))
            .collect();

        let jobs: Vec<(usize, &PathBuf)> = dirs
            .iter()
            .enumerate()
            .flat_map(|(i, d)| d.files.iter().map(move |f| (i, f)))
            .collect();

        let parsed: Vec<(usize, std::result::Result<FileUnit, String>)> = jobs
            .par_iter()
            .map_init(GoParser::new, |parser, &(index, path)| {
                let ctx = FileContext {
                    package_path: &dirs[index].import_path,
                    package_names: &package_names,
                };
                let unit = match parser {
                    Ok(parser) => parser.parse_file(path, &ctx).map_err(|e| e.to_string()),
                    Err(err) => Err(err.to_string()),
                };
                (index, unit)
            })
            .collect();

        let mut units: Vec<Vec<FileUnit>> = vec![Vec::new(); dirs.len()];
        let mut diagnostics = Vec::new();
        for ((_, path), (index, unit)) in jobs.iter().zip(parsed) {
            match unit {
                Ok(unit) => {
                    for line in &unit.syntax_errors {
                        diagnostics.push(Diagnostic::new(unit.path.clone(), *line, "syntax error"));
                    }
                    for import in &unit.unused_imports {
                        diagnostics.push(Diagnostic::new(
                            unit.path.clone(),
                            import.line,
                            format!("\"{}\" imported and not used", import.path),
                        ));
                    }
                    units[index].push(unit);
                }
                Err(message) => diagnostics.push(Diagnostic::new((*path).clone(), 0, message)),
            }
        }

        let root_prefix = dirs
            .iter()
            .find(|d| d.dir == root)
            .map(|d| d.import_path.clone())
            .or_else(|| {
                root.strip_prefix(&self.module.root).ok().map(|rel| {
                    let rel = rel.to_string_lossy().replace('\\', "/");
                    if rel.is_empty() {
                        self.module.path.clone()
                    } else {
                        format!("{}/{}", self.module.path, rel)
                    }
                })
            })
            .unwrap_or_else(|| self.module.path.clone());

        let mut builder = ProgramBuilder::new(&self.module.path, root_prefix, diagnostics);
        for (dir, files) in dirs.iter().zip(units) {
            builder.add_package(dir, files);
        }
        let (program, diagnostics) = builder.finish();

        if !diagnostics.is_empty() {
            for diagnostic in &diagnostics {
                warn!(%diagnostic, "package load error");
            }
            return Err(AnalysisError::PackageLoad { diagnostics });
        }

        info!(
            packages = program.packages.len(),
            functions = program.functions.len(),
            types = program.types.len(),
            "program loaded"
        );
        Ok(program)
    }
}

struct PendingPackage {
    index: usize,
    units: Vec<FileUnit>,
}

pub(crate) struct ProgramBuilder {
    program: Program,
    diagnostics: Vec<Diagnostic>,
    root_prefix: String,
    pending: Vec<PendingPackage>,
}

impl ProgramBuilder {
    pub(crate) fn new(module: &str, root_prefix: String, diagnostics: Vec<Diagnostic>) -> Self {
        let mut program = Program {
            module: module.to_string(),
            ..Program::default()
        };
        program.types.push(NamedType {
            id: 0,
            pkg: String::new(),
            name: "error".to_string(),
            kind: TypeKind::Interface {
                methods: vec![InterfaceMethod {
                    name: "Error".to_string(),
                    params: 0,
                    results: vec![TypeRef::Basic("string".to_string())],
                }],
                embedded: Vec::new(),
            },
            methods: BTreeMap::new(),
        });
        program
            .type_index
            .insert((String::new(), "error".to_string()), 0);

        Self {
            program,
            diagnostics,
            root_prefix,
            pending: Vec::new(),
        }
    }

    /// Registers the package, its declarations and its types.
    pub(crate) fn add_package(&mut self, dir: &PackageDir, mut units: Vec<FileUnit>) {
        units.sort_by(|a, b| a.path.cmp(&b.path));

        let name = units
            .first()
            .map(|u| u.package_name.clone())
            .unwrap_or_else(|| dir.name.clone());
        if let Some(first) = units.first() {
            for unit in units.iter().skip(1) {
                if unit.package_name != name {
                    self.diagnostics.push(Diagnostic::new(
                        unit.path.clone(),
                        1,
                        format!(
                            "found packages {} ({}) and {} ({}) in {}",
                            name,
                            file_name(&first.path),
                            unit.package_name,
                            file_name(&unit.path),
                            dir.dir.display()
                        ),
                    ));
                }
            }
        }

        let mut package = Package {
            path: dir.import_path.clone(),
            name,
            dir: dir.dir.clone(),
            files: units.iter().map(|u| u.path.clone()).collect(),
            vendored: dir.vendored,
            funcs: HashMap::new(),
            members: BTreeSet::new(),
            imports: BTreeSet::new(),
            user_inits: Vec::new(),
            init: None,
        };

        let mut declared: HashMap<String, (PathBuf, usize)> = HashMap::new();
        for unit in &units {
            let names = unit
                .types
                .iter()
                .map(|t| (t.name.as_str(), t.line))
                .chain(unit.consts.iter().map(|(n, l)| (n.as_str(), *l)))
                .chain(
                    unit.vars
                        .iter()
                        .flat_map(|v| v.names.iter().map(move |n| (n.as_str(), v.line))),
                )
                .chain(
                    unit.functions
                        .iter()
                        .filter(|f| f.receiver.is_none() && f.name != "init")
                        .map(|f| (f.name.as_str(), f.line)),
                );
            for (member, line) in names {
                if member == "_" {
                    continue;
                }
                if let Some((previous, previous_line)) = declared.get(member) {
                    self.diagnostics.push(Diagnostic::new(
                        unit.path.clone(),
                        line,
                        format!(
                            "{member} redeclared in this block (other declaration at {}:{})",
                            file_name(previous),
                            previous_line
                        ),
                    ));
                } else {
                    declared.insert(member.to_string(), (unit.path.clone(), line));
                }
                package.members.insert(member.to_string());
            }
            package
                .imports
                .extend(unit.imports.iter().map(|i| i.path.clone()));
        }

        for unit in &units {
            for decl in &unit.types {
                let key = (package.path.clone(), decl.name.clone());
                if decl.alias {
                    if let TypeKind::Defined(target) = &decl.kind {
                        self.program.aliases.insert(key, target.clone());
                    }
                    continue;
                }
                if self.program.type_index.contains_key(&key) {
                    continue;
                }
                let id = self.program.types.len();
                self.program.types.push(NamedType {
                    id,
                    pkg: package.path.clone(),
                    name: decl.name.clone(),
                    kind: decl.kind.clone(),
                    methods: BTreeMap::new(),
                });
                self.program.type_index.insert(key, id);
            }
        }

        let index = self.program.packages.len();
        self.program
            .package_index
            .insert(package.path.clone(), index);
        self.program.packages.push(package);
        self.pending.push(PendingPackage { index, units });
    }

    pub(crate) fn finish(mut self) -> (Program, Vec<Diagnostic>) {
        let pending = std::mem::take(&mut self.pending);
        let package_names: HashMap<String, String> = self
            .program
            .packages
            .iter()
            .map(|p| (p.path.clone(), p.name.clone()))
            .collect();

        for PendingPackage { index, units } in pending {
            self.register_functions(index, units, &package_names);
        }

        self.program.compute_method_sets();

        let diagnostics = {
            let mut resolver = Resolver::new(&mut self.program);
            resolver.run();
            resolver.into_diagnostics()
        };
        self.diagnostics.extend(diagnostics);
        (self.program, self.diagnostics)
    }

    fn import_map(
        &mut self,
        unit: &FileUnit,
        package_names: &HashMap<String, String>,
    ) -> HashMap<String, String> {
        let mut map = HashMap::new();
        for import in &unit.imports {
            let loaded = self.program.package_index.contains_key(&import.path);
            let under_root = import.path == self.root_prefix
                || import.path.starts_with(&format!("{}/", self.root_prefix));
            if !loaded && under_root && import.path != "C" {
                self.diagnostics.push(Diagnostic::new(
                    unit.path.clone(),
                    import.line,
                    format!("could not import {} (no Go files found for package)", import.path),
                ));
            }
            let name = match import.alias.as_deref() {
                Some("_") => continue,
                // Unqualified names in this file may come from another package.
                Some(".") => DOT_IMPORT.to_string(),
                Some(alias) => alias.to_string(),
                None => package_names
                    .get(&import.path)
                    .cloned()
                    .unwrap_or_else(|| default_import_name(&import.path)),
            };
            map.insert(name, import.path.clone());
        }
        map
    }

    fn register_functions(
        &mut self,
        index: usize,
        units: Vec<FileUnit>,
        package_names: &HashMap<String, String>,
    ) {
        let pkg_path = self.program.packages[index].path.clone();
        let mut init_counter = 0usize;
        let mut init_imports: HashMap<String, String> = HashMap::new();
        let mut init_stmts: Vec<Stmt> = Vec::new();
        let mut init_closures: Vec<LoweredFunction> = Vec::new();

        for unit in units {
            let imports = Arc::new(self.import_map(&unit, package_names));
            init_imports.extend(imports.iter().map(|(k, v)| (k.clone(), v.clone())));

            let offset = init_closures.len();
            for var in unit.vars {
                let mut values = var.values;
                values.iter_mut().for_each(|v| v.shift_closures(offset));
                init_stmts.push(Stmt::Var {
                    names: var.names,
                    ty: var.ty,
                    values,
                });
            }
            init_closures.extend(unit.init_closures);

            for function in unit.functions {
                match function.receiver.clone() {
                    Some(receiver) => {
                        let Some(type_id) = self.program.lookup_type(&pkg_path, &receiver.type_name)
                        else {
                            self.diagnostics.push(Diagnostic::new(
                                unit.path.clone(),
                                function.line,
                                format!("undefined: {}", receiver.type_name),
                            ));
                            continue;
                        };
                        if self.program.types[type_id].pkg != pkg_path {
                            self.diagnostics.push(Diagnostic::new(
                                unit.path.clone(),
                                function.line,
                                format!(
                                    "cannot define new methods on non-local type {}",
                                    receiver.type_name
                                ),
                            ));
                            continue;
                        }
                        if self.program.types[type_id]
                            .methods
                            .contains_key(&function.name)
                        {
                            self.diagnostics.push(Diagnostic::new(
                                unit.path.clone(),
                                function.line,
                                format!(
                                    "method {}.{} already declared",
                                    receiver.type_name, function.name
                                ),
                            ));
                            continue;
                        }
                        let type_name = self.program.types[type_id].name.clone();
                        let pointer = receiver.pointer;
                        let star = if pointer { "*" } else { "" };
                        let name = format!("({star}{type_name}).{}", function.name);
                        let key = format!("({star}{pkg_path}.{type_name}).{}", function.name);
                        let method_name = function.name.clone();
                        let id = self.add_lowered(
                            function,
                            key,
                            name,
                            &pkg_path,
                            FunctionKind::Method,
                            None,
                            &imports,
                            &unit.path,
                        );
                        self.program.functions[id].recv_type = Some(type_id);
                        self.program.types[type_id].methods.insert(
                            method_name,
                            Method {
                                func: id,
                                pointer_receiver: pointer,
                            },
                        );
                    }
                    None if function.name == "init" => {
                        init_counter += 1;
                        let name = format!("init#{init_counter}");
                        let key = format!("{pkg_path}.{name}");
                        let id = self.add_lowered(
                            function,
                            key,
                            name,
                            &pkg_path,
                            FunctionKind::Function,
                            None,
                            &imports,
                            &unit.path,
                        );
                        self.program.packages[index].user_inits.push(id);
                    }
                    None => {
                        let name = function.name.clone();
                        let key = format!("{pkg_path}.{name}");
                        if self.program.key_index.contains_key(&key) {
                            continue;
                        }
                        let id = self.add_lowered(
                            function,
                            key,
                            name.clone(),
                            &pkg_path,
                            FunctionKind::Function,
                            None,
                            &imports,
                            &unit.path,
                        );
                        self.program.packages[index].funcs.insert(name, id);
                    }
                }
            }
        }

        let initializer = LoweredFunction {
            name: "init".to_string(),
            line: 0,
            receiver: None,
            signature: Signature::default(),
            type_params: Vec::new(),
            body: Some(super::Body { stmts: init_stmts }),
            closures: init_closures,
        };
        let init_key = format!("{pkg_path}.init");
        let init_file = self.program.packages[index].files.first().cloned().unwrap_or_default();
        let id = self.add_lowered(
            initializer,
            init_key,
            "init".to_string(),
            &pkg_path,
            FunctionKind::Synthetic(Synthetic::PackageInitializer),
            None,
            &Arc::new(init_imports),
            &init_file,
        );
        self.program.packages[index].init = Some(id);
    }

    #[allow(clippy::too_many_arguments)]
    fn add_lowered(
        &mut self,
        function: LoweredFunction,
        key: String,
        name: String,
        pkg_path: &str,
        kind: FunctionKind,
        parent: Option<FuncId>,
        imports: &Arc<HashMap<String, String>>,
        file: &Path,
    ) -> FuncId {
        let id = self.program.functions.len();
        let LoweredFunction {
            line,
            receiver,
            signature,
            type_params,
            body,
            closures,
            ..
        } = function;

        self.program.key_index.insert(key.clone(), id);
        self.program.functions.push(Function {
            id,
            key: key.clone(),
            name: name.clone(),
            package: Some(pkg_path.to_string()),
            kind,
            signature,
            receiver,
            recv_type: None,
            type_params,
            parent,
            closures: Vec::new(),
            body,
            imports: Arc::clone(imports),
            file: Some(file.to_path_buf()),
            line,
        });

        let mut closure_ids = Vec::with_capacity(closures.len());
        for (n, closure) in closures.into_iter().enumerate() {
            let suffix = n + 1;
            let closure_id = self.add_lowered(
                closure,
                format!("{key}${suffix}"),
                format!("{name}${suffix}"),
                pkg_path,
                FunctionKind::Closure,
                Some(id),
                imports,
                file,
            );
            closure_ids.push(closure_id);
        }
        self.program.functions[id].closures = closure_ids;
        id
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
