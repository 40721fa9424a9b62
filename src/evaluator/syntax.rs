//! Python source analysis backed by tree-sitter.
//!
//! Covers the two static evaluation levels: whether a candidate parses at
//! all, and whether the parsed module has the shape a harness can call
//! (at least one function definition).
//!
//! The tree-sitter grammar is more permissive than CPython: it keeps
//! Python 2 statements and recovers from stray indentation without an
//! error node. A successful parse is therefore followed by a pass that
//! rejects those shapes the way the interpreter would.

use std::fmt;

use tree_sitter::{Node, Parser, Tree};

/// Exception class the interpreter would raise for an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    Syntax,
    Indentation,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueKind::Syntax => write!(f, "SyntaxError"),
            IssueKind::Indentation => write!(f, "IndentationError"),
        }
    }
}

/// First syntax problem found in a source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxIssue {
    pub kind: IssueKind,
    pub message: String,
    /// 1-based line number.
    pub line: usize,
    /// 1-based column number.
    pub column: usize,
}

impl fmt::Display for SyntaxIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} (line {}, column {})",
            self.kind, self.message, self.line, self.column
        )
    }
}

impl SyntaxIssue {
    fn at(kind: IssueKind, message: impl Into<String>, node: Node<'_>) -> Self {
        let position = node.start_position();
        Self {
            kind,
            message: message.into(),
            line: position.row + 1,
            column: position.column + 1,
        }
    }

    fn at_start(message: impl Into<String>) -> Self {
        Self {
            kind: IssueKind::Syntax,
            message: message.into(),
            line: 1,
            column: 1,
        }
    }
}

/// A function definition found in a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub name: String,
    pub line: usize,
    pub has_return: bool,
}

/// A successfully parsed Python module.
pub struct PythonModule<'a> {
    source: &'a str,
    tree: Tree,
}

impl<'a> PythonModule<'a> {
    /// Parses `source`, failing on the first error or missing token.
    pub fn parse(source: &'a str) -> Result<Self, SyntaxIssue> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| SyntaxIssue::at_start(format!("parser unavailable: {e}")))?;

        let tree = parser
            .parse(source, None)
            .ok_or_else(|| SyntaxIssue::at_start("parse aborted"))?;

        let root = tree.root_node();
        if root.has_error() {
            let issue = first_error(root)
                .map(|node| issue_for(node, source))
                .unwrap_or_else(|| SyntaxIssue::at(IssueKind::Syntax, "invalid syntax", root));
            return Err(issue);
        }
        if let Some(issue) = first_rejected(root, source) {
            return Err(issue);
        }

        Ok(Self { source, tree })
    }

    /// Lists every function definition, nested ones included, in source order.
    pub fn functions(&self) -> Vec<FunctionInfo> {
        let mut out = Vec::new();
        collect_functions(self.tree.root_node(), self.source, &mut out);
        out
    }

    pub fn has_function_definition(&self) -> bool {
        !self.functions().is_empty()
    }
}

/// Checks that `source` parses as Python.
pub fn check_syntax(source: &str) -> Result<(), SyntaxIssue> {
    PythonModule::parse(source).map(|_| ())
}

/// Returns true if `source` parses as Python.
pub fn is_valid_python(source: &str) -> bool {
    check_syntax(source).is_ok()
}

/// Returns true if `source` parses and defines at least one function.
pub fn contains_function_definition(source: &str) -> bool {
    PythonModule::parse(source)
        .map(|module| module.has_function_definition())
        .unwrap_or(false)
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error)
}

fn issue_for(node: Node<'_>, source: &str) -> SyntaxIssue {
    let message = if node.is_missing() {
        format!("expected '{}'", node.kind())
    } else {
        let text = node.utf8_text(source.as_bytes()).unwrap_or("");
        match text.split_whitespace().next() {
            Some(token) => format!("invalid syntax near '{}'", truncate(token, 20)),
            None => "invalid syntax".to_string(),
        }
    };
    SyntaxIssue::at(IssueKind::Syntax, message, node)
}

/// Walks an error-free tree for constructs tree-sitter accepts but
/// CPython 3 rejects, returning the first one in source order.
fn first_rejected(node: Node<'_>, source: &str) -> Option<SyntaxIssue> {
    let rejected = match node.kind() {
        // `print >> f, x` is a valid Python 3 expression statement.
        "print_statement" if !has_child_kind(node, "chevron") => {
            Some("Missing parentheses in call to 'print'")
        }
        "exec_statement" => Some("Missing parentheses in call to 'exec'"),
        "comparison_operator" if has_token(node, "<>") => Some("invalid syntax near '<>'"),
        "except_clause" if has_token(node, ",") => {
            Some("multiple exception types must be parenthesized")
        }
        _ => None,
    };
    if let Some(message) = rejected {
        return Some(SyntaxIssue::at(IssueKind::Syntax, message, node));
    }

    if matches!(node.kind(), "module" | "block") {
        if let Some(issue) = misindented_statement(node, source) {
            return Some(issue);
        }
    }

    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .find_map(|child| first_rejected(child, source))
}

fn has_child_kind(node: Node<'_>, kind: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|child| child.kind() == kind);
    found
}

/// Direct anonymous child with the given token text.
fn has_token(node: Node<'_>, token: &str) -> bool {
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .any(|child| !child.is_named() && child.kind() == token);
    found
}

/// Statements of one suite that start their own line must share one
/// indentation; module-level statements start at column 0.
fn misindented_statement(suite: Node<'_>, source: &str) -> Option<SyntaxIssue> {
    let mut cursor = suite.walk();
    let mut expected = (suite.kind() == "module").then_some(0);

    for statement in suite
        .named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .filter(|child| starts_line(*child, source))
    {
        let column = statement.start_position().column;
        match expected {
            None => expected = Some(column),
            Some(indent) if column > indent => {
                return Some(SyntaxIssue::at(
                    IssueKind::Indentation,
                    "unexpected indent",
                    statement,
                ));
            }
            Some(indent) if column < indent => {
                return Some(SyntaxIssue::at(
                    IssueKind::Indentation,
                    "unindent does not match any outer indentation level",
                    statement,
                ));
            }
            Some(_) => {}
        }
    }
    None
}

/// True when only whitespace precedes `node` on its line.
fn starts_line(node: Node<'_>, source: &str) -> bool {
    let start = node.start_byte();
    let line_start = source[..start].rfind('\n').map_or(0, |i| i + 1);
    source[line_start..start].chars().all(|c| c == ' ' || c == '\t')
}

fn collect_functions(node: Node<'_>, source: &str, out: &mut Vec<FunctionInfo>) {
    if node.kind() == "function_definition" {
        let name = node
            .child_by_field_name("name")
            .and_then(|n| n.utf8_text(source.as_bytes()).ok())
            .unwrap_or("")
            .to_string();
        out.push(FunctionInfo {
            name,
            line: node.start_position().row + 1,
            has_return: contains_kind(node, "return_statement"),
        });
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_functions(child, source, out);
    }
}

fn contains_kind(node: Node<'_>, kind: &str) -> bool {
    if node.kind() == kind {
        return true;
    }
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|child| contains_kind(child, kind));
    found
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
