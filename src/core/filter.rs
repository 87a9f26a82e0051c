use crate::ir::Function;

/// Top-level standard library packages; sub-paths (`net/http`, `encoding/json`) match by prefix.
const STD_PACKAGES: &[&str] = &[
    "fmt", "os", "io", "net", "http", "time", "strings", "bytes", "context", "errors", "log",
    "math", "sort", "sync", "unsafe", "runtime", "reflect", "encoding", "crypto", "database",
    "go", "html", "image", "index", "mime", "path", "regexp", "strconv", "testing", "text",
    "unicode", "archive", "bufio", "builtin", "compress", "container", "debug", "expvar", "flag",
    "hash", "heap", "plugin", "syscall",
];

/// Whether an import path belongs to the Go standard library.
pub fn is_std_pkg_path(path: &str) -> bool {
    if path.contains('.') {
        return false;
    }
    if path.is_empty() || path == "command-line-arguments" {
        return false;
    }
    let known = STD_PACKAGES.iter().any(|std| {
        path == *std
            || path
                .strip_prefix(std)
                .is_some_and(|rest| rest.starts_with('/'))
    });
    known || !path.contains('/')
}

/// Decides which raw call edges are kept in the persisted graph.
#[derive(Debug, Clone)]
pub struct EdgeFilter {
    module: String,
    ignore_paths: Vec<String>,
}

impl EdgeFilter {
    pub fn new(module: impl Into<String>, ignore_paths: Vec<String>) -> Self {
        Self {
            module: module.into(),
            ignore_paths,
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// All four checks, cheapest first.
    pub fn accepts(&self, caller: &Function, callee: &Function) -> bool {
        self.is_real_call(caller, callee)
            && !self.touches_std(caller, callee)
            && !self.is_ignored(&caller.key, &callee.key)
            && self.is_internal(&caller.key, &callee.key)
    }

    fn is_real_call(&self, caller: &Function, callee: &Function) -> bool {
        caller.package.is_some() && callee.package.is_some() && !callee.is_synthetic()
    }

    fn touches_std(&self, caller: &Function, callee: &Function) -> bool {
        let std = |f: &Function| f.package.as_deref().is_some_and(is_std_pkg_path);
        std(caller) || std(callee)
    }

    pub fn is_ignored(&self, caller_key: &str, callee_key: &str) -> bool {
        self.ignore_paths
            .iter()
            .any(|prefix| caller_key.starts_with(prefix.as_str()) || callee_key.starts_with(prefix.as_str()))
    }

    pub fn is_internal(&self, caller_key: &str, callee_key: &str) -> bool {
        caller_key.contains(&self.module) || callee_key.contains(&self.module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std_detection() {
        assert!(is_std_pkg_path("fmt"));
        assert!(is_std_pkg_path("net/http"));
        assert!(is_std_pkg_path("encoding/json"));
        assert!(is_std_pkg_path("maps"));
        assert!(!is_std_pkg_path("github.com/x/y"));
        assert!(!is_std_pkg_path("example.com/m"));
        assert!(!is_std_pkg_path(""));
        assert!(!is_std_pkg_path("command-line-arguments"));
        assert!(!is_std_pkg_path("myapp/internal/svc"));
        assert!(!is_std_pkg_path("fmtx/util"));
    }

    #[test]
    fn ignore_and_membership_use_qualified_names() {
        let filter = EdgeFilter::new("example.com/m", vec!["example.com/m/gen".to_string()]);
        assert!(filter.is_ignored("example.com/m/gen.F", "example.com/m.G"));
        assert!(!filter.is_ignored("example.com/m.G", "example.com/m.H"));
        assert!(filter.is_internal("example.com/m.G", "github.com/x/y.Z"));
        assert!(!filter.is_internal("github.com/a.B", "github.com/x/y.Z"));
    }
}
