use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::{AnalysisError, Result};

/// The Go module an analysis root belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    /// Module path as declared in go.mod, e.g. `github.com/acme/service`.
    pub path: String,
    /// Directory holding the go.mod file.
    pub root: PathBuf,
}

fn module_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^\s*module\s+"?([^"\s]+)"?"#).expect("valid module regex"))
}

pub struct ModuleResolver;

impl ModuleResolver {
    /// Walks from `start` towards the filesystem root and returns the first go.mod found.
    pub fn resolve(start: &Path) -> Result<ModuleInfo> {
        let start = start.canonicalize().map_err(|err| AnalysisError::ModuleNotFound {
            dir: start.to_path_buf(),
            reason: err.to_string(),
        })?;

        let mut dir: Option<&Path> = Some(&start);
        while let Some(current) = dir {
            let manifest = current.join("go.mod");
            if manifest.is_file() {
                let content = fs::read_to_string(&manifest)?;
                return match Self::parse_module_path(&content) {
                    Some(path) => Ok(ModuleInfo {
                        path,
                        root: current.to_path_buf(),
                    }),
                    None => Err(AnalysisError::ModuleNotFound {
                        dir: current.to_path_buf(),
                        reason: "go.mod has no module declaration".to_string(),
                    }),
                };
            }
            dir = current.parent();
        }

        Err(AnalysisError::ModuleNotFound {
            dir: start,
            reason: "no go.mod in this directory or any parent".to_string(),
        })
    }

    /// Returns the module path of the first `module` line.
    pub fn parse_module_path(go_mod: &str) -> Option<String> {
        go_mod
            .lines()
            .find_map(|line| module_line().captures(line))
            .map(|caps| caps[1].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_module_line_wins() {
        let content = "// comment\nmodule example.com/one\nmodule example.com/two\n";
        assert_eq!(
            ModuleResolver::parse_module_path(content).as_deref(),
            Some("example.com/one")
        );
    }

    #[test]
    fn quoted_and_commented_module_lines() {
        assert_eq!(
            ModuleResolver::parse_module_path("module \"example.com/q\"\n").as_deref(),
            Some("example.com/q")
        );
        assert_eq!(
            ModuleResolver::parse_module_path("module example // the module\n").as_deref(),
            Some("example")
        );
        assert_eq!(ModuleResolver::parse_module_path("go 1.21\n"), None);
    }
}
