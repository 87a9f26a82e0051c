use anyhow::Result;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tree_sitter::{Language, Node as TSNode, Parser, Tree};

pub struct TreeSitterParser {
    parser: Parser,
}

impl TreeSitterParser {
    pub fn new(language: Language) -> Result<Self> {
        let mut parser = Parser::new();
        parser.set_language(language)?;
        Ok(Self { parser })
    }

    pub fn parse_source(&mut self, source: &str, file_path: &Path) -> Result<Tree> {
        self.parser
            .parse(source, None)
            .ok_or_else(|| anyhow::anyhow!("Failed to parse file: {}", file_path.display()))
    }

    /// Buffered read sized to the file.
    pub fn read_source(&self, file_path: &Path) -> Result<String> {
        let file = File::open(file_path)?;
        let file_size = file.metadata()?.len() as usize;

        let mut reader = BufReader::with_capacity(file_size.clamp(1, 8192), file);
        let mut content = String::with_capacity(file_size);
        reader.read_to_string(&mut content)?;
        Ok(content)
    }
}

pub fn extract_text<'a>(node: &TSNode, source: &'a [u8]) -> &'a str {
    std::str::from_utf8(&source[node.byte_range()]).unwrap_or("")
}

pub fn line_of(node: &TSNode) -> usize {
    node.start_position().row + 1
}

pub fn find_child_by_kind<'a>(node: &TSNode<'a>, kind: &str) -> Option<TSNode<'a>> {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).find(|child| child.kind() == kind);
    found
}

pub fn named_children<'a>(node: &TSNode<'a>) -> Vec<TSNode<'a>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect()
}

/// Named children under `field`; separators sharing the field are skipped.
pub fn children_by_field<'a>(node: &TSNode<'a>, field: &str) -> Vec<TSNode<'a>> {
    let mut cursor = node.walk();
    node.children_by_field_name(field, &mut cursor)
        .filter(|child| child.is_named())
        .collect()
}

pub fn has_child_token(node: &TSNode, token: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|child| child.kind() == token);
    found
}

/// Lines of every ERROR or MISSING node in the tree.
pub fn syntax_error_lines(root: &TSNode) -> Vec<usize> {
    let mut lines = Vec::new();
    if !root.has_error() {
        return lines;
    }
    let mut stack = vec![*root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            lines.push(line_of(&node));
            continue;
        }
        if node.has_error() {
            let mut cursor = node.walk();
            stack.extend(node.children(&mut cursor));
        }
    }
    lines.sort_unstable();
    lines.dedup();
    lines
}

/// Strips Go string literal quoting from an import path.
pub fn unquote(literal: &str) -> &str {
    literal.trim_matches(|c| c == '"' || c == '`')
}
