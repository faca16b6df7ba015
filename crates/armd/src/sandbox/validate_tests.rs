// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn accepts_plain_robot_script() {
    let report = validate("import arm_sdk\narm_sdk.move_home()\nprint('done')\n");
    assert!(report.accepted);
    assert!(report.issues.is_empty());
}

#[test]
fn rejects_denied_import() {
    let report = validate("import subprocess\nsubprocess.run(['ls'])\n");
    assert!(!report.accepted);
    assert_eq!(report.issues[0].line, 1);
}

#[test]
fn rejects_from_import_of_denied_module() {
    let report = validate("from os import system\n");
    assert!(!report.accepted);
}

#[test]
fn rejects_denied_attribute_call() {
    let report = validate("import os\nos.remove('/tmp/x')\n");
    assert!(!report.accepted);
    assert!(report.issues.iter().any(|i| i.reason.contains("os.remove")));
}

#[test]
fn rejects_bare_eval() {
    let report = validate("result = eval(user_input)\n");
    assert!(!report.accepted);
}

#[test]
fn does_not_flag_method_named_like_a_builtin() {
    // `thing.eval(...)` is a method call, not the builtin `eval`.
    let report = validate("result = thing.eval(x)\n");
    assert!(report.accepted);
}

#[test]
fn ignores_commented_out_denied_import() {
    let report = validate("# import subprocess\nprint('ok')\n");
    assert!(report.accepted);
}

#[test]
fn dry_run_reports_all_issues_with_line_numbers() {
    let report = validate("import subprocess\nx = 1\neval('1')\n");
    assert_eq!(report.issues.len(), 2);
    assert_eq!(report.issues[0].line, 1);
    assert_eq!(report.issues[1].line, 3);
}

#[test]
fn rejects_unclosed_paren_across_lines() {
    let report = validate("def broken(\n    print(\"missing paren\")\n");
    assert!(!report.accepted);
    assert!(report.issues.iter().any(|i| i.reason.contains("unclosed")));
}

#[test]
fn rejects_unterminated_string_literal() {
    let report = validate("x = 'unterminated\n");
    assert!(!report.accepted);
    assert!(report.issues.iter().any(|i| i.reason.contains("unterminated")));
}

#[test]
fn accepts_balanced_nested_delimiters_and_triple_quoted_strings() {
    let report = validate("data = {'a': [1, 2, (3, 4)]}\ns = \"\"\"multi\nline\"\"\"\n");
    assert!(report.accepted);
}

#[test]
fn rejects_mismatched_closing_delimiter() {
    let report = validate("x = (1, 2]\n");
    assert!(!report.accepted);
    assert!(report.issues.iter().any(|i| i.reason.contains("mismatched")));
}
