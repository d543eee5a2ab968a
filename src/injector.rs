//! Probe injector: the pure source-to-source transformation
//!
//! [`instrument`] takes a parsed [`SourceFile`] and returns the new source
//! text without touching the filesystem. Every eligible function receives two
//! insertions and nothing else in the file changes:
//!
//! ```text
//! // wcprof: MARKED                                   <- marker line
//! fn work() {
//!     let _wcprof_timer = ::wcprof::Timer::start("pkg/work");   <- probe
//!     ...
//! }
//! ```
//!
//! The probe is a scope guard, so the timer stops on every exit path.

use std::ops::Range;

use tracing::{debug, warn};

use crate::marker::{self, MarkerState, MARKER};
use crate::scanner::{line_start, FunctionDecl, SourceFile};

/// How the probe statement is spelled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbePolicy {
    /// Path of the runtime crate as seen from instrumented code
    pub runtime_path: String,
    /// Name of the guard binding
    pub binding: String,
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            runtime_path: "::wcprof".to_string(),
            binding: "_wcprof_timer".to_string(),
        }
    }
}

impl ProbePolicy {
    /// The statement inserted at the top of a function body
    pub fn statement(&self, label: &str) -> String {
        format!(
            "let {} = {}::Timer::start({:?});",
            self.binding, self.runtime_path, label
        )
    }
}

/// Result of transforming one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrumented {
    /// New source text (identical to the input when nothing changed)
    pub source: String,
    /// Labels of the probes inserted by this pass
    pub probes: Vec<String>,
    /// Functions that already carried a probe
    pub already_marked: usize,
    /// Functions excluded by an OFF marker, directly or through an enclosing function
    pub excluded: usize,
    /// Labels of `const fn`s that cannot hold a probe
    pub skipped_const: Vec<String>,
}

impl Instrumented {
    pub fn modified(&self) -> bool {
        !self.probes.is_empty()
    }

    /// True once per file that now calls into the runtime crate
    ///
    /// Probes spell the runtime by absolute path, so no `use` item is needed.
    pub fn references_runtime(&self) -> bool {
        self.modified()
    }
}

#[derive(Debug)]
struct Edit {
    at: usize,
    text: String,
}

/// Marker state of a function, including OFF markers at the top of its body
pub fn marker_state(decl: &FunctionDecl) -> MarkerState {
    match marker::resolve(decl.leading_comments.iter().map(String::as_str)) {
        MarkerState::Unmarked
            if decl
                .head_comments
                .iter()
                .any(|c| marker::classify(c) == MarkerState::Off) =>
        {
            MarkerState::Off
        }
        state => state,
    }
}

/// Insert a marker and probe into every unmarked function of `file`
pub fn instrument(file: &SourceFile, policy: &ProbePolicy) -> Instrumented {
    let text = file.text();
    let newline = if text.contains("\r\n") { "\r\n" } else { "\n" };

    let mut result = Instrumented {
        source: String::new(),
        probes: Vec::new(),
        already_marked: 0,
        excluded: 0,
        skipped_const: Vec::new(),
    };
    let mut excluded_ranges: Vec<Range<usize>> = Vec::new();
    let mut edits = Vec::new();

    for decl in file.functions() {
        let label = decl.label(file.module());

        if excluded_ranges
            .iter()
            .any(|r| r.start <= decl.item.start && decl.item.end <= r.end)
        {
            debug!(%label, "inside an excluded function, skipping");
            result.excluded += 1;
            continue;
        }

        match marker_state(&decl) {
            MarkerState::Marked => {
                debug!(%label, "already instrumented");
                result.already_marked += 1;
            }
            MarkerState::Off => {
                debug!(%label, "excluded by marker");
                excluded_ranges.push(decl.item.clone());
                result.excluded += 1;
            }
            MarkerState::Unmarked if decl.is_const => {
                warn!(%label, "const fn cannot hold a timing probe, skipping");
                result.skipped_const.push(label);
            }
            MarkerState::Unmarked => {
                debug!(%label, "injecting probe");
                edits.push(marker_edit(text, &decl, newline));
                edits.push(probe_edit(text, &decl, &policy.statement(&label), newline));
                result.probes.push(label);
            }
        }
    }

    result.source = apply(text, edits);
    result
}

/// Marker line directly above the `fn` item, after its attributes
fn marker_edit(text: &str, decl: &FunctionDecl, newline: &str) -> Edit {
    let start = line_start(text, decl.item.start);
    let prefix = &text[start..decl.item.start];
    if prefix.chars().all(char::is_whitespace) {
        Edit {
            at: start,
            text: format!("{}{}{}", prefix, MARKER, newline),
        }
    } else {
        Edit {
            at: decl.item.start,
            text: format!("{}{}{}", newline, MARKER, newline),
        }
    }
}

/// Probe statement as the first statement of the body, after inner attributes
fn probe_edit(text: &str, decl: &FunctionDecl, statement: &str, newline: &str) -> Edit {
    let from = decl.body_insert_at;
    let rest = &text[from..decl.body.end - 1];

    let Some(first_break) = rest.find('\n') else {
        // Single-line remainder: `{ x }` becomes `{ probe; x }`
        let text = if rest.trim().is_empty() {
            format!(" {} ", statement)
        } else {
            format!(" {}", statement)
        };
        return Edit { at: from, text };
    };

    let indent = body_indent(text, decl);
    let rest_of_line = rest[..first_break].trim();
    // Keep a comment on the `{` line attached to the brace
    let at = if rest_of_line.is_empty() || rest_of_line.starts_with("//") {
        let line_end = from + first_break;
        if rest[..first_break].ends_with('\r') {
            line_end - 1
        } else {
            line_end
        }
    } else {
        from
    };

    Edit {
        at,
        text: format!("{}{}{}", newline, indent, statement),
    }
}

/// Indentation of the first non-blank body line, or the item's plus four spaces
fn body_indent(text: &str, decl: &FunctionDecl) -> String {
    let body = &text[decl.body.start + 1..decl.body.end - 1];
    let first_line = body
        .split('\n')
        .skip(1)
        .find(|line| !line.trim().is_empty());

    match first_line {
        Some(line) => line
            .chars()
            .take_while(|c| *c == ' ' || *c == '\t')
            .collect(),
        None => {
            let start = line_start(text, decl.item.start);
            let item_indent: String = text[start..decl.item.start]
                .chars()
                .take_while(|c| *c == ' ' || *c == '\t')
                .collect();
            format!("{}    ", item_indent)
        }
    }
}

/// Splice insertions into `text`; insertions at the same offset keep their order
fn apply(text: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by_key(|edit| edit.at);
    let extra: usize = edits.iter().map(|edit| edit.text.len()).sum();

    let mut out = String::with_capacity(text.len() + extra);
    let mut cursor = 0;
    for edit in edits {
        out.push_str(&text[cursor..edit.at]);
        out.push_str(&edit.text);
        cursor = edit.at;
    }
    out.push_str(&text[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::rust_parser;

    fn run(module: &str, src: &str) -> Instrumented {
        let mut parser = rust_parser().unwrap();
        let file = SourceFile::parse("test_input.rs", module, src.to_string(), &mut parser).unwrap();
        instrument(&file, &ProbePolicy::default())
    }

    #[test]
    fn test_statement() {
        let policy = ProbePolicy::default();
        assert_eq!(
            policy.statement("pkg/f"),
            r#"let _wcprof_timer = ::wcprof::Timer::start("pkg/f");"#
        );
    }

    #[test]
    fn test_foo_instrumented_bar_excluded() {
        let src = "fn Foo() {\n    println!(\"foo\");\n}\n\n// wcprof: OFF\nfn Bar() {\n    println!(\"bar\");\n}\n";
        let out = run("pkgname", src);

        let expected = "// wcprof: MARKED\nfn Foo() {\n    let _wcprof_timer = ::wcprof::Timer::start(\"pkgname/Foo\");\n    println!(\"foo\");\n}\n\n// wcprof: OFF\nfn Bar() {\n    println!(\"bar\");\n}\n";
        assert_eq!(out.source, expected);
        assert_eq!(out.probes, vec!["pkgname/Foo"]);
        assert_eq!(out.excluded, 1);
        assert!(out.modified());
        assert!(out.references_runtime());
    }

    #[test]
    fn test_off_marker_at_top_of_body() {
        let src = "fn Bar() { // wcprof: OFF\n    work();\n}\n";
        let out = run("pkgname", src);
        assert_eq!(out.source, src);
        assert!(!out.modified());
        assert_eq!(out.excluded, 1);
    }

    #[test]
    fn test_second_pass_is_noop() {
        let src = "pub fn a(x: u32) -> u32 {\n    if x > 3 {\n        return x;\n    }\n    x + 1\n}\n";
        let first = run("pkg", src);
        assert!(first.modified());

        let second = run("pkg", &first.source);
        assert!(!second.modified());
        assert_eq!(second.source, first.source);
        assert_eq!(second.already_marked, 1);
    }

    #[test]
    fn test_method_indentation() {
        let src = "impl Counter {\n    pub fn bump(&mut self) {\n        self.n += 1;\n    }\n}\n";
        let out = run("pkg", src);
        let expected = "impl Counter {\n    // wcprof: MARKED\n    pub fn bump(&mut self) {\n        let _wcprof_timer = ::wcprof::Timer::start(\"pkg/Counter::bump\");\n        self.n += 1;\n    }\n}\n";
        assert_eq!(out.source, expected);
    }

    #[test]
    fn test_empty_body() {
        let out = run("pkg", "fn noop() {}\n");
        assert_eq!(
            out.source,
            "// wcprof: MARKED\nfn noop() { let _wcprof_timer = ::wcprof::Timer::start(\"pkg/noop\"); }\n"
        );
    }

    #[test]
    fn test_single_line_body() {
        let out = run("pkg", "fn one() -> u8 { 1 }\n");
        assert_eq!(
            out.source,
            "// wcprof: MARKED\nfn one() -> u8 { let _wcprof_timer = ::wcprof::Timer::start(\"pkg/one\"); 1 }\n"
        );
    }

    #[test]
    fn test_empty_multiline_body_uses_item_indent() {
        let out = run("pkg", "mod m {\n    fn f() {\n    }\n}\n");
        assert_eq!(
            out.source,
            "mod m {\n    // wcprof: MARKED\n    fn f() {\n        let _wcprof_timer = ::wcprof::Timer::start(\"pkg/f\");\n    }\n}\n"
        );
    }

    #[test]
    fn test_marker_goes_below_attributes_and_docs() {
        let src = "/// Docs.\n#[inline]\npub fn f() -> u8 {\n    1\n}\n";
        let out = run("pkg", src);
        assert_eq!(
            out.source,
            "/// Docs.\n#[inline]\n// wcprof: MARKED\npub fn f() -> u8 {\n    let _wcprof_timer = ::wcprof::Timer::start(\"pkg/f\");\n    1\n}\n"
        );
    }

    #[test]
    fn test_comment_on_brace_line_stays() {
        let src = "fn f() { // keep me\n    g();\n}\n";
        let out = run("pkg", src);
        assert_eq!(
            out.source,
            "// wcprof: MARKED\nfn f() { // keep me\n    let _wcprof_timer = ::wcprof::Timer::start(\"pkg/f\");\n    g();\n}\n"
        );
    }

    #[test]
    fn test_probe_goes_after_inner_attributes() {
        let src = "fn f() {\n    #![allow(unused)]\n    let x = 1;\n}\n";
        let out = run("m", src);
        assert_eq!(
            out.source,
            "// wcprof: MARKED\nfn f() {\n    #![allow(unused)]\n    let _wcprof_timer = ::wcprof::Timer::start(\"m/f\");\n    let x = 1;\n}\n"
        );

        let second = run("m", &out.source);
        assert!(!second.modified());
        assert_eq!(second.source, out.source);
    }

    #[test]
    fn test_probe_goes_after_inner_doc_comments() {
        let src = "fn f() {\n    //! Inner docs.\n    #![allow(unused)]\n    let x = 1;\n}\n";
        let out = run("m", src);
        assert_eq!(
            out.source,
            "// wcprof: MARKED\nfn f() {\n    //! Inner docs.\n    #![allow(unused)]\n    let _wcprof_timer = ::wcprof::Timer::start(\"m/f\");\n    let x = 1;\n}\n"
        );
        assert!(!run("m", &out.source).modified());
    }

    #[test]
    fn test_single_line_body_with_inner_attribute() {
        let out = run("m", "fn f() -> u8 { #![allow(unused)] 1 }\n");
        assert_eq!(
            out.source,
            "// wcprof: MARKED\nfn f() -> u8 { #![allow(unused)] let _wcprof_timer = ::wcprof::Timer::start(\"m/f\"); 1 }\n"
        );
    }

    #[test]
    fn test_off_marker_below_inner_attribute() {
        let src = "fn f() {\n    #![allow(unused)]\n    // wcprof: OFF\n    let x = 1;\n}\n";
        let out = run("m", src);
        assert_eq!(out.source, src);
        assert_eq!(out.excluded, 1);
    }

    #[test]
    fn test_const_fn_skipped() {
        let src = "const fn k() -> u8 {\n    1\n}\n";
        let out = run("pkg", src);
        assert_eq!(out.source, src);
        assert_eq!(out.skipped_const, vec!["pkg/k"]);
    }

    #[test]
    fn test_nested_function_in_excluded_function() {
        let src = "// wcprof: OFF\nfn outer() {\n    fn inner() {\n        work();\n    }\n    inner();\n}\n";
        let out = run("pkg", src);
        assert_eq!(out.source, src);
        assert_eq!(out.excluded, 2);
    }

    #[test]
    fn test_nested_function_instrumented() {
        let src = "fn outer() {\n    fn inner() {\n        work();\n    }\n    inner();\n}\n";
        let out = run("pkg", src);
        assert_eq!(out.probes, vec!["pkg/outer", "pkg/inner"]);
        assert!(!run("pkg", &out.source).modified());
    }

    #[test]
    fn test_crlf_line_endings() {
        let src = "fn f() {\r\n    g();\r\n}\r\n";
        let out = run("pkg", src);
        assert_eq!(
            out.source,
            "// wcprof: MARKED\r\nfn f() {\r\n    let _wcprof_timer = ::wcprof::Timer::start(\"pkg/f\");\r\n    g();\r\n}\r\n"
        );
    }

    #[test]
    fn test_custom_policy() {
        let mut parser = rust_parser().unwrap();
        let file = SourceFile::parse("x.rs", "x", "fn f() {}\n".to_string(), &mut parser).unwrap();
        let policy = ProbePolicy {
            runtime_path: "crate::prof".to_string(),
            binding: "_t".to_string(),
        };
        let out = instrument(&file, &policy);
        assert!(out.source.contains(r#"let _t = crate::prof::Timer::start("x/f");"#));
    }

    #[test]
    fn test_unrelated_code_untouched() {
        let src = "use std::io;\n\n/* block */\nstruct S {\n    a: u8,\n}\n\nconst X: u8 = 3;\n";
        let out = run("pkg", src);
        assert_eq!(out.source, src);
        assert!(!out.modified());
    }
}
