//! Syntax scanner: finds candidate files and parses them into syntax trees
//!
//! Files are parsed with tree-sitter's Rust grammar, which keeps every comment
//! as a node with exact byte offsets. Function declarations are extracted
//! together with the comments attached to them so the marker resolver can
//! decide whether each one still needs a probe.

use std::fmt;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tree_sitter::{Node, Parser, Tree};

use crate::error::{InstrumentError, Result};

/// Directories never descended into by a recursive scan
const SKIPPED_DIRS: &[&str] = &["target", "tests", "benches", "examples"];

/// Inclusion predicate deciding which files take part in a run
#[derive(Clone)]
pub struct FileFilter(Arc<dyn Fn(&Path) -> bool + Send + Sync>);

impl FileFilter {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Path) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    /// Every `.rs` file, test code included
    pub fn all_rust() -> Self {
        Self::new(is_rust_file)
    }

    pub fn accepts(&self, path: &Path) -> bool {
        (self.0)(path)
    }
}

impl Default for FileFilter {
    /// `.rs` files that are neither test code nor a build script
    fn default() -> Self {
        Self::new(|path| is_rust_file(path) && !is_test_file(path) && !is_build_script(path))
    }
}

impl fmt::Debug for FileFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FileFilter(..)")
    }
}

fn is_rust_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "rs")
}

/// `test.rs`, `tests.rs`, `*_test.rs` and `*_tests.rs`
pub fn is_test_file(path: &Path) -> bool {
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return false;
    };
    stem == "test" || stem == "tests" || stem.ends_with("_test") || stem.ends_with("_tests")
}

fn is_build_script(path: &Path) -> bool {
    path.file_name().is_some_and(|name| name == "build.rs")
}

/// List the files under `root` accepted by `filter`, sorted by path
///
/// Rejected files are never opened.
pub fn candidate_files(root: &Path, filter: &FileFilter, recursive: bool) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(InstrumentError::NotADirectory(root.to_path_buf()));
    }

    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir).map_err(|e| InstrumentError::io(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| InstrumentError::io(&dir, e))?;
            let path = entry.path();
            let file_type = entry
                .file_type()
                .map_err(|e| InstrumentError::io(&path, e))?;

            if file_type.is_dir() {
                if recursive && !is_skipped_dir(&path) {
                    pending.push(path);
                }
            } else if file_type.is_file() && filter.accepts(&path) {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

fn is_skipped_dir(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return true;
    };
    name.starts_with('.') || SKIPPED_DIRS.contains(&name)
}

/// Module name used as the package half of a probe label
///
/// The file stem, except that `mod.rs`, `lib.rs` and `main.rs` take the name
/// of their directory, and of the crate directory when that is `src`.
pub fn module_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("main");

    let name = match stem {
        "mod" | "lib" | "main" => {
            let parent = path.parent();
            let parent_name = parent.and_then(dir_name);
            match parent_name {
                Some("src") => parent
                    .and_then(Path::parent)
                    .and_then(dir_name)
                    .unwrap_or(stem),
                Some(name) => name,
                None => stem,
            }
        }
        _ => stem,
    };

    name.replace('-', "_")
}

fn dir_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

/// Create a parser for Rust source
pub fn rust_parser() -> Result<Parser> {
    let mut parser = Parser::new();
    parser.set_language(&tree_sitter_rust::LANGUAGE.into())?;
    Ok(parser)
}

/// One parsed source file
pub struct SourceFile {
    path: PathBuf,
    module: String,
    text: String,
    tree: Tree,
}

impl fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFile")
            .field("path", &self.path)
            .field("module", &self.module)
            .field("len", &self.text.len())
            .finish()
    }
}

impl SourceFile {
    /// Read and parse `path`; the module name defaults to [`module_name`]
    pub fn load(path: &Path, module: Option<&str>, parser: &mut Parser) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| InstrumentError::io(path, e))?;
        let module = match module {
            Some(module) => module.to_string(),
            None => {
                let resolved = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
                module_name(&resolved)
            }
        };
        Self::parse(path, module, text, parser)
    }

    /// Parse in-memory source; any syntax error is fatal
    pub fn parse(
        path: impl Into<PathBuf>,
        module: impl Into<String>,
        text: String,
        parser: &mut Parser,
    ) -> Result<Self> {
        let path = path.into();
        let Some(tree) = parser.parse(&text, None) else {
            return Err(InstrumentError::Parse {
                path,
                line: 1,
                column: 1,
            });
        };

        let root = tree.root_node();
        if root.has_error() {
            let at = first_error(root).unwrap_or(root);
            let position = at.start_position();
            return Err(InstrumentError::Parse {
                path,
                line: position.row + 1,
                column: position.column + 1,
            });
        }

        Ok(Self {
            path,
            module: module.into(),
            text,
            tree,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Every function with a body, in source order
    pub fn functions(&self) -> Vec<FunctionDecl> {
        let mut functions = Vec::new();
        let mut stack = vec![self.tree.root_node()];
        while let Some(node) = stack.pop() {
            if node.kind() == "function_item" {
                if let Some(decl) = FunctionDecl::from_node(node, &self.text) {
                    functions.push(decl);
                }
            }
            let mut cursor = node.walk();
            let children: Vec<_> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }
        functions
    }
}

fn first_error(root: Node<'_>) -> Option<Node<'_>> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        if node.has_error() {
            let mut cursor = node.walk();
            let children: Vec<_> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }
    }
    None
}

/// A function declaration inside a [`SourceFile`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDecl {
    /// Bare identifier
    pub name: String,
    /// `Type::name` for methods, `Trait::name` for default methods
    pub qualified_name: String,
    /// Byte range of the whole item, from visibility to closing brace
    pub item: Range<usize>,
    /// Byte range of the body block, braces included
    pub body: Range<usize>,
    /// First offset in the body where a statement may go, past `{` and any
    /// inner attributes or inner doc comments
    pub body_insert_at: usize,
    /// Comments directly above the item (attributes skipped)
    pub leading_comments: Vec<String>,
    /// Comments inside the body before its first statement
    pub head_comments: Vec<String>,
    pub is_const: bool,
}

impl FunctionDecl {
    fn from_node(node: Node<'_>, text: &str) -> Option<Self> {
        let name_node = node.child_by_field_name("name")?;
        let body = node.child_by_field_name("body")?;

        let raw = &text[name_node.byte_range()];
        let name = raw.strip_prefix("r#").unwrap_or(raw).to_string();
        let qualified_name = match owner_name(node, text) {
            Some(owner) => format!("{}::{}", owner, name),
            None => name.clone(),
        };

        Some(Self {
            name,
            qualified_name,
            item: node.byte_range(),
            body: body.byte_range(),
            body_insert_at: body_insert_at(body, text),
            leading_comments: leading_comments(node, text),
            head_comments: head_comments(body, text),
            is_const: is_const(node),
        })
    }

    /// `<package>/<qualified name>`
    ///
    /// Methods carry their owner, so `impl Foo { fn run() }` is labelled
    /// `pkg/Foo::run` rather than `pkg/run`.
    pub fn label(&self, package: &str) -> String {
        format!("{}/{}", package, self.qualified_name)
    }
}

/// Self type of the enclosing `impl`, or name of the enclosing `trait`
fn owner_name(node: Node<'_>, text: &str) -> Option<String> {
    let mut current = node.parent();
    while let Some(parent) = current {
        match parent.kind() {
            "function_item" => return None,
            "impl_item" => return parent.child_by_field_name("type").map(|t| type_name(t, text)),
            "trait_item" => {
                return parent
                    .child_by_field_name("name")
                    .map(|n| text[n.byte_range()].to_string())
            }
            _ => current = parent.parent(),
        }
    }
    None
}

fn type_name(node: Node<'_>, text: &str) -> String {
    let inner = match node.kind() {
        "generic_type" | "reference_type" | "pointer_type" => node.child_by_field_name("type"),
        "scoped_type_identifier" => node.child_by_field_name("name"),
        _ => None,
    };
    match inner {
        Some(inner) => type_name(inner, text),
        None => text[node.byte_range()]
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect(),
    }
}

fn is_comment(node: Node<'_>) -> bool {
    matches!(node.kind(), "line_comment" | "block_comment")
}

/// Comments and attributes directly above `node`, with no blank line between
fn leading_comments(node: Node<'_>, text: &str) -> Vec<String> {
    let mut comments = Vec::new();
    let mut current = node;
    while let Some(prev) = current.prev_sibling() {
        let attribute = prev.kind() == "attribute_item";
        if !attribute && !is_comment(prev) {
            break;
        }
        if !adjacent(text, prev, current) {
            break;
        }
        if !attribute {
            // A comment trailing code on its own line belongs to that code
            if !starts_line(text, prev.start_byte()) {
                break;
            }
            comments.push(text[prev.byte_range()].to_string());
        }
        current = prev;
    }
    comments.reverse();
    comments
}

fn is_inner_doc(node: Node<'_>, text: &str) -> bool {
    let comment = &text[node.byte_range()];
    is_comment(node) && (comment.starts_with("//!") || comment.starts_with("/*!"))
}

/// Comments at the top of the body, interleaved inner attributes skipped
fn head_comments(body: Node<'_>, text: &str) -> Vec<String> {
    let mut cursor = body.walk();
    let comments = body
        .children(&mut cursor)
        .skip_while(|child| child.kind() == "{")
        .take_while(|child| is_comment(*child) || child.kind() == "inner_attribute_item")
        .filter(|child| is_comment(*child))
        .map(|child| text[child.byte_range()].to_string())
        .collect();
    comments
}

/// End of the last inner attribute or inner doc comment heading the body,
/// or the byte after `{`
fn body_insert_at(body: Node<'_>, text: &str) -> usize {
    let mut cursor = body.walk();
    let last_inner = body
        .children(&mut cursor)
        .skip_while(|child| child.kind() == "{")
        .take_while(|child| is_comment(*child) || child.kind() == "inner_attribute_item")
        .filter(|child| child.kind() == "inner_attribute_item" || is_inner_doc(*child, text))
        .last();

    let Some(inner) = last_inner else {
        return body.start_byte() + 1;
    };
    // Line comments may own their line break
    let end = inner.end_byte();
    let trimmed = text[..end].trim_end_matches(['\n', '\r']);
    trimmed.len().max(inner.start_byte())
}

fn is_const(node: Node<'_>) -> bool {
    let mut cursor = node.walk();
    let modifiers: Vec<_> = node
        .children(&mut cursor)
        .filter(|child| child.kind() == "function_modifiers")
        .collect();
    modifiers.into_iter().any(|modifiers| {
        let mut cursor = modifiers.walk();
        let found = modifiers
            .children(&mut cursor)
            .any(|child| child.kind() == "const");
        found
    })
}

/// Only whitespace and at most one line break separate `prev` from `next`
fn adjacent(text: &str, prev: Node<'_>, next: Node<'_>) -> bool {
    let between = &text[prev.end_byte()..next.start_byte()];
    if !between.chars().all(char::is_whitespace) {
        return false;
    }
    // Line comments may or may not own their trailing newline
    let mut breaks = between.matches('\n').count();
    if text[prev.byte_range()].ends_with('\n') {
        breaks += 1;
    }
    breaks <= 1
}

/// Offset of the first byte of the line containing `offset`
pub(crate) fn line_start(text: &str, offset: usize) -> usize {
    text[..offset].rfind('\n').map_or(0, |i| i + 1)
}

fn starts_line(text: &str, offset: usize) -> bool {
    text[line_start(text, offset)..offset]
        .chars()
        .all(char::is_whitespace)
}
