use rayon::prelude::*;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use super::module::ModuleInfo;
use crate::error::Result;
use crate::parsers::constraints::BuildContext;

/// A directory of Go files that forms one package.
#[derive(Debug, Clone)]
pub struct PackageDir {
    pub dir: PathBuf,
    pub import_path: String,
    /// Package clause of the first file, used for import name resolution.
    pub name: String,
    pub files: Vec<PathBuf>,
    pub vendored: bool,
}

fn package_clause() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^package\s+(\w+)").expect("valid package regex"))
}

pub struct PackageScanner<'a> {
    module: &'a ModuleInfo,
    build: BuildContext,
}

impl<'a> PackageScanner<'a> {
    pub fn new(module: &'a ModuleInfo) -> Self {
        Self {
            module,
            build: BuildContext::host(),
        }
    }

    pub fn with_build_context(mut self, build: BuildContext) -> Self {
        self.build = build;
        self
    }

    /// Finds every buildable package under `root`, sorted by import path.
    pub fn scan(&self, root: &Path) -> Result<Vec<PackageDir>> {
        let candidates: Vec<PathBuf> = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| self.should_descend(entry, root))
            .filter_map(|e| e.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| is_go_source(path))
            .collect();

        let accepted: Vec<(PathBuf, String)> = candidates
            .par_iter()
            .filter_map(|path| self.inspect_file(path))
            .collect();

        let mut by_dir: BTreeMap<PathBuf, Vec<(PathBuf, String)>> = BTreeMap::new();
        for (path, package_name) in accepted {
            if let Some(dir) = path.parent() {
                by_dir
                    .entry(dir.to_path_buf())
                    .or_default()
                    .push((path, package_name));
            }
        }

        let mut packages: Vec<PackageDir> = by_dir
            .into_iter()
            .filter_map(|(dir, mut files)| {
                files.sort();
                let (import_path, vendored) = self.import_path_for(&dir)?;
                let name = files.first().map(|(_, n)| n.clone()).unwrap_or_default();
                Some(PackageDir {
                    dir,
                    import_path,
                    name,
                    files: files.into_iter().map(|(p, _)| p).collect(),
                    vendored,
                })
            })
            .collect();

        packages.sort_by(|a, b| a.import_path.cmp(&b.import_path));
        debug!(count = packages.len(), root = %root.display(), "scanned packages");
        Ok(packages)
    }

    fn should_descend(&self, entry: &DirEntry, root: &Path) -> bool {
        if !entry.file_type().is_dir() || entry.path() == root {
            return true;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') || name.starts_with('_') || name == "testdata" {
            return false;
        }
        // Nested modules are analyzed on their own.
        entry.path() == self.module.root || !entry.path().join("go.mod").is_file()
    }

    /// Reads the file header; returns the package clause when the file is buildable.
    fn inspect_file(&self, path: &Path) -> Option<(PathBuf, String)> {
        let file_name = path.file_name()?.to_string_lossy();
        if !self.build.matches_file_name(&file_name) {
            return None;
        }
        let source = fs::read_to_string(path).ok()?;
        if !self.build.matches_header(&source) {
            return None;
        }
        let name = package_clause()
            .captures(&source)
            .map(|caps| caps[1].to_string())
            .unwrap_or_default();
        Some((path.to_path_buf(), name))
    }

    fn import_path_for(&self, dir: &Path) -> Option<(String, bool)> {
        let relative = dir.strip_prefix(&self.module.root).ok()?;
        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();

        if segments.first().map(String::as_str) == Some("vendor") {
            if segments.len() < 2 {
                return None;
            }
            return Some((segments[1..].join("/"), true));
        }

        if segments.is_empty() {
            Some((self.module.path.clone(), false))
        } else {
            Some((format!("{}/{}", self.module.path, segments.join("/")), false))
        }
    }
}

fn is_go_source(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.ends_with(".go") && !name.ends_with("_test.go")
}
