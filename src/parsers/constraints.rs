//! Go build constraints: `//go:build` lines, legacy `// +build` lines and
//! `_GOOS`/`_GOARCH` file name suffixes, evaluated against the host platform.

const KNOWN_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "js", "linux",
    "nacl", "netbsd", "openbsd", "plan9", "solaris", "wasip1", "windows", "zos",
];

const KNOWN_ARCH: &[&str] = &[
    "386", "amd64", "amd64p32", "arm", "armbe", "arm64", "arm64be", "loong64", "mips", "mipsle",
    "mips64", "mips64le", "mips64p32", "mips64p32le", "ppc", "ppc64", "ppc64le", "riscv",
    "riscv64", "s390", "s390x", "sparc", "sparc64", "wasm",
];

const UNIX_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "linux",
    "netbsd", "openbsd", "solaris",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    pub goos: String,
    pub goarch: String,
}

impl BuildContext {
    pub fn new(goos: &str, goarch: &str) -> Self {
        Self {
            goos: goos.to_string(),
            goarch: goarch.to_string(),
        }
    }

    pub fn host() -> Self {
        let goos = match std::env::consts::OS {
            "macos" => "darwin",
            other => other,
        };
        let goarch = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "x86" => "386",
            "aarch64" => "arm64",
            "powerpc64" => "ppc64le",
            "loongarch64" => "loong64",
            "wasm32" => "wasm",
            other => other,
        };
        Self::new(goos, goarch)
    }

    fn tag_enabled(&self, tag: &str) -> bool {
        tag == self.goos
            || tag == self.goarch
            || tag == "gc"
            || tag == "cgo"
            || tag.starts_with("go1.")
            || (tag == "unix" && UNIX_OS.contains(&self.goos.as_str()))
            || (tag == "linux" && self.goos == "android")
            || (tag == "darwin" && self.goos == "ios")
            || (tag == "solaris" && self.goos == "illumos")
    }

    /// Applies the `name_GOOS_GOARCH.go` convention.
    pub fn matches_file_name(&self, file_name: &str) -> bool {
        let stem = file_name.strip_suffix(".go").unwrap_or(file_name);
        let stem = stem.strip_suffix("_test").unwrap_or(stem);
        let Some(first) = stem.find('_') else {
            return true;
        };
        let parts: Vec<&str> = stem[first..].split('_').filter(|p| !p.is_empty()).collect();
        let n = parts.len();
        if n >= 2 && KNOWN_OS.contains(&parts[n - 2]) && KNOWN_ARCH.contains(&parts[n - 1]) {
            return self.tag_enabled(parts[n - 2]) && self.tag_enabled(parts[n - 1]);
        }
        match parts.last() {
            Some(last) if KNOWN_OS.contains(last) || KNOWN_ARCH.contains(last) => {
                self.tag_enabled(last)
            }
            _ => true,
        }
    }

    /// Evaluates the constraint comments that precede the package clause.
    pub fn matches_header(&self, source: &str) -> bool {
        let mut plus_build = Vec::new();
        for line in source.lines() {
            let line = line.trim();
            if line.starts_with("package ") {
                break;
            }
            if let Some(expr) = line.strip_prefix("//go:build") {
                // `//go:build` supersedes any `// +build` lines.
                return self.eval_expr(expr);
            }
            if let Some(expr) = line.strip_prefix("// +build") {
                plus_build.push(expr.to_string());
            }
        }
        plus_build.iter().all(|line| {
            line.split_whitespace().any(|alternative| {
                alternative.split(',').all(|term| match term.strip_prefix('!') {
                    Some(tag) => !self.tag_enabled(tag),
                    None => self.tag_enabled(term),
                })
            })
        })
    }

    fn eval_expr(&self, expr: &str) -> bool {
        let tokens = tokenize(expr);
        let mut parser = ExprParser {
            tokens: &tokens,
            pos: 0,
            ctx: self,
        };
        match parser.or_expr() {
            Some(value) if parser.pos == tokens.len() => value,
            // Malformed constraints exclude the file, as the go tool does.
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Tag(String),
    Not,
    And,
    Or,
    Open,
    Close,
}

fn tokenize(expr: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            '&' | '|' if chars.get(i + 1) == Some(&c) => {
                tokens.push(if c == '&' { Token::And } else { Token::Or });
                i += 2;
            }
            c if c.is_alphanumeric() || c == '_' || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Tag(chars[start..i].iter().collect()));
            }
            _ => {
                // Unknown character: force a parse failure.
                tokens.push(Token::Close);
                tokens.push(Token::Close);
                break;
            }
        }
    }
    tokens
}

struct ExprParser<'a> {
    tokens: &'a [Token],
    pos: usize,
    ctx: &'a BuildContext,
}

impl ExprParser<'_> {
    fn or_expr(&mut self) -> Option<bool> {
        let mut value = self.and_expr()?;
        while self.tokens.get(self.pos) == Some(&Token::Or) {
            self.pos += 1;
            let rhs = self.and_expr()?;
            value = value || rhs;
        }
        Some(value)
    }

    fn and_expr(&mut self) -> Option<bool> {
        let mut value = self.unary()?;
        while self.tokens.get(self.pos) == Some(&Token::And) {
            self.pos += 1;
            let rhs = self.unary()?;
            value = value && rhs;
        }
        Some(value)
    }

    fn unary(&mut self) -> Option<bool> {
        match self.tokens.get(self.pos)? {
            Token::Not => {
                self.pos += 1;
                self.unary().map(|v| !v)
            }
            Token::Open => {
                self.pos += 1;
                let value = self.or_expr()?;
                if self.tokens.get(self.pos) != Some(&Token::Close) {
                    return None;
                }
                self.pos += 1;
                Some(value)
            }
            Token::Tag(tag) => {
                self.pos += 1;
                Some(self.ctx.tag_enabled(tag))
            }
            Token::And | Token::Or | Token::Close => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linux() -> BuildContext {
        BuildContext::new("linux", "amd64")
    }

    #[test]
    fn file_name_suffixes() {
        let ctx = linux();
        assert!(ctx.matches_file_name("main.go"));
        assert!(ctx.matches_file_name("linux.go"));
        assert!(ctx.matches_file_name("poll_linux.go"));
        assert!(!ctx.matches_file_name("poll_windows.go"));
        assert!(ctx.matches_file_name("asm_linux_amd64.go"));
        assert!(!ctx.matches_file_name("asm_linux_arm64.go"));
        assert!(!ctx.matches_file_name("asm_arm64.go"));
        assert!(ctx.matches_file_name("my_helper.go"));
    }

    #[test]
    fn go_build_expressions() {
        let ctx = linux();
        assert!(ctx.matches_header("//go:build linux && !windows\n\npackage x\n"));
        assert!(ctx.matches_header("//go:build (darwin || unix) && go1.21\npackage x\n"));
        assert!(!ctx.matches_header("//go:build ignore\npackage main\n"));
        assert!(!ctx.matches_header("//go:build windows\npackage x\n"));
        assert!(!ctx.matches_header("//go:build linux &&\npackage x\n"));
        assert!(ctx.matches_header("package x\n//go:build windows\n"));
    }

    #[test]
    fn legacy_plus_build_lines() {
        let ctx = linux();
        assert!(ctx.matches_header("// +build linux darwin\n\npackage x\n"));
        assert!(!ctx.matches_header("// +build linux,386\n\npackage x\n"));
        assert!(!ctx.matches_header("// +build linux\n// +build !amd64\n\npackage x\n"));
    }
}
