// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deny-list static validator. A misuse check for trusted lab users, not a
//! security boundary: aliasing or string-built calls can still evade the
//! line-by-line deny-list scan below. Ahead of it, [`check_syntax`] walks the
//! full source tracking string/comment state and delimiter nesting, so
//! malformed submissions (an unclosed paren, an unterminated string) are
//! rejected before a driver process is ever spawned to run them.

use serde::{Deserialize, Serialize};

const DENIED_MODULES: &[&str] = &[
    "subprocess",
    "os.system",
    "shlex",
    "pty",
    "socket",
    "asyncio",
    "requests",
    "urllib",
    "http.client",
    "pickle",
    "marshal",
    "multiprocessing",
    "pdb",
    "ctypes",
    "cffi",
];

const DENIED_CALLS: &[(&str, &str)] = &[
    ("os", "system"),
    ("os", "popen"),
    ("os", "fork"),
    ("os", "spawnl"),
    ("os", "spawnv"),
    ("os", "kill"),
    ("os", "remove"),
    ("os", "unlink"),
    ("os", "rmdir"),
    ("shutil", "rmtree"),
    ("subprocess", "run"),
    ("subprocess", "Popen"),
    ("subprocess", "call"),
];

const DENIED_BUILTINS: &[&str] = &["eval", "exec", "compile", "__import__", "input"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub accepted: bool,
    pub issues: Vec<ValidationIssue>,
}

pub fn validate(source: &str) -> ValidationReport {
    let mut issues = Vec::new();
    check_syntax(source, &mut issues);
    for (idx, raw_line) in source.lines().enumerate() {
        let line_no = idx + 1;
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        check_import(line, line_no, &mut issues);
        check_calls(line, line_no, &mut issues);
        check_builtins(line, line_no, &mut issues);
    }
    ValidationReport { accepted: issues.is_empty(), issues }
}

/// Structural well-formedness: balanced `()`/`[]`/`{}` and closed string
/// literals, tracked across the whole source rather than per line so a
/// paren left open on one line is still caught at end of file.
fn check_syntax(source: &str, issues: &mut Vec<ValidationIssue>) {
    #[derive(Clone, Copy, PartialEq)]
    enum StrKind {
        Single,
        Double,
        TripleSingle,
        TripleDouble,
    }

    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut in_string: Option<StrKind> = None;
    let mut string_start_line = 0usize;
    let mut line_no = 1usize;
    let mut escaped = false;

    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\n' {
            line_no += 1;
            if let Some(kind) = in_string {
                if !matches!(kind, StrKind::TripleSingle | StrKind::TripleDouble) {
                    issues.push(ValidationIssue {
                        line: string_start_line,
                        reason: "unterminated string literal".to_owned(),
                    });
                    in_string = None;
                }
            }
            continue;
        }

        if let Some(kind) = in_string {
            if escaped {
                escaped = false;
                continue;
            }
            match c {
                '\\' => escaped = true,
                '\'' if kind == StrKind::Single => in_string = None,
                '"' if kind == StrKind::Double => in_string = None,
                '\'' if kind == StrKind::TripleSingle && chars.peek() == Some(&'\'') => {
                    chars.next();
                    if chars.peek() == Some(&'\'') {
                        chars.next();
                        in_string = None;
                    }
                }
                '"' if kind == StrKind::TripleDouble && chars.peek() == Some(&'"') => {
                    chars.next();
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        in_string = None;
                    }
                }
                _ => {}
            }
            continue;
        }

        match c {
            '#' => {
                for c2 in chars.by_ref() {
                    if c2 == '\n' {
                        line_no += 1;
                        break;
                    }
                }
            }
            '\'' | '"' => {
                string_start_line = line_no;
                let mut lookahead = chars.clone();
                let is_triple = lookahead.next() == Some(c) && lookahead.next() == Some(c);
                if is_triple {
                    chars.next();
                    chars.next();
                    in_string = Some(if c == '\'' { StrKind::TripleSingle } else { StrKind::TripleDouble });
                } else {
                    in_string = Some(if c == '\'' { StrKind::Single } else { StrKind::Double });
                }
            }
            '(' | '[' | '{' => stack.push((c, line_no)),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match stack.pop() {
                    Some((open, _)) if open == expected => {}
                    Some((open, open_line)) => issues.push(ValidationIssue {
                        line: line_no,
                        reason: format!("`{open}` opened at line {open_line} closed by mismatched `{c}`"),
                    }),
                    None => issues.push(ValidationIssue {
                        line: line_no,
                        reason: format!("unmatched closing `{c}`"),
                    }),
                }
            }
            _ => {}
        }
    }

    if let Some(kind) = in_string {
        let reason = if matches!(kind, StrKind::TripleSingle | StrKind::TripleDouble) {
            "unterminated triple-quoted string literal".to_owned()
        } else {
            "unterminated string literal".to_owned()
        };
        issues.push(ValidationIssue { line: string_start_line, reason });
    }
    for (open, open_line) in stack {
        issues.push(ValidationIssue { line: open_line, reason: format!("unclosed `{open}`") });
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn check_import(line: &str, line_no: usize, issues: &mut Vec<ValidationIssue>) {
    let target = if let Some(rest) = line.strip_prefix("import ") {
        rest.split([',', ' ', '\t']).next().unwrap_or("")
    } else if let Some(rest) = line.strip_prefix("from ") {
        rest.split_whitespace().next().unwrap_or("")
    } else {
        return;
    };
    let target = target.trim();
    if DENIED_MODULES.iter().any(|m| target == *m || target.starts_with(&format!("{m}."))) {
        issues.push(ValidationIssue { line: line_no, reason: format!("import of denied module `{target}`") });
    }
}

fn check_calls(line: &str, line_no: usize, issues: &mut Vec<ValidationIssue>) {
    for (module, func) in DENIED_CALLS {
        let needle = format!("{module}.{func}(");
        if line.contains(&needle) {
            issues.push(ValidationIssue {
                line: line_no,
                reason: format!("call to denied function `{module}.{func}`"),
            });
        }
    }
}

fn check_builtins(line: &str, line_no: usize, issues: &mut Vec<ValidationIssue>) {
    for builtin in DENIED_BUILTINS {
        let needle = format!("{builtin}(");
        if let Some(pos) = line.find(needle.as_str()) {
            let preceded_by_ident =
                line[..pos].chars().next_back().is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '.');
            if !preceded_by_ident {
                issues.push(ValidationIssue { line: line_no, reason: format!("call to denied builtin `{builtin}`") });
            }
        }
    }
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
