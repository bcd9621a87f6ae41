use std::io::Write;
use std::process::{Command, Output};

fn actorc() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_actorc"));
    cmd.env_remove("RUST_LOG");
    cmd
}

fn run(args: &[&str]) -> Output {
    actorc().args(args).output().expect("failed to run actorc")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

fn json(out: &Output) -> serde_json::Value {
    serde_json::from_slice(&out.stdout).unwrap_or_else(|e| panic!("bad JSON ({e}): {}", stdout(out)))
}

// --- eval ---

#[test]
fn eval_folds_constants() {
    let out = run(&["eval", "1 + 2 * 5"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out).trim(), "11 : int");
}

#[test]
fn eval_sees_class_constants() {
    let out = run(&["eval", "DEFAULT_HEALTH / 4"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out).trim(), "250 : int");
}

#[test]
fn eval_rejects_runtime_values() {
    let out = run(&["eval", "random(1, 6)"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("ACT-T010"), "stderr: {}", stderr(&out));
}

#[test]
fn eval_json() {
    let out = run(&["--format", "json", "eval", "2.5 * 2"]);
    assert!(out.status.success());
    let v = json(&out);
    assert_eq!(v["ok"], true);
    assert_eq!(v["value"], "5.0");
    assert_eq!(v["type"], "double");
}

// --- compile ---

#[test]
fn compile_inline_prints_disassembly() {
    let out = run(&["compile", "-e", "if (health > 0) A_Chase(); else health = 1;"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let text = stdout(&out);
    assert!(text.starts_with("; Anonymous"), "{text}");
    assert!(text.contains("jmp"), "{text}");
    assert!(text.contains("ret"), "{text}");
}

#[test]
fn compile_file_uses_its_stem() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chase.act");
    std::fs::write(&path, "for (int i = 0; i < 3; i++) {\n    A_Chase();\n}\n").unwrap();
    let out = run(&["compile", path.to_str().unwrap()]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stdout(&out).starts_with("; chase"), "{}", stdout(&out));
}

#[test]
fn compile_missing_file() {
    let out = run(&["compile", "/no/such/file.act"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("cannot read"), "stderr: {}", stderr(&out));
}

#[test]
fn compile_json_dumps_the_chunk() {
    let out = run(&["--format", "json", "compile", "-e", "health = 5;"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let v = json(&out);
    assert_eq!(v["ok"], true);
    assert!(!v["chunk"]["code"].as_array().unwrap().is_empty());
    assert_eq!(v["chunk"]["name"], "Anonymous");
}

#[test]
fn type_errors_exit_nonzero_with_location() {
    let out = run(&["compile", "-e", "return \"5\" * 2;"]);
    assert_eq!(out.status.code(), Some(1));
    let err = stderr(&out);
    assert!(err.contains("error[ACT-T002]"), "stderr: {err}");
    assert!(err.contains("--> 1:"), "stderr: {err}");
    assert!(stdout(&out).is_empty());
}

#[test]
fn type_errors_in_json() {
    let out = run(&["--format", "json", "compile", "-e", "health = hp;"]);
    assert!(!out.status.success());
    let v = json(&out);
    assert_eq!(v["ok"], false);
    let diags = v["diagnostics"].as_array().unwrap();
    let unknown = diags.iter().find(|d| d["code"] == "ACT-R001").expect("ACT-R001 reported");
    assert_eq!(unknown["span"]["line"], 1);
    assert_eq!(unknown["span"]["col"], 10);
}

#[test]
fn syntax_errors_are_reported() {
    let out = run(&["compile", "-e", "health = ;"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("ACT-P001"), "stderr: {}", stderr(&out));
}

#[test]
fn warnings_do_not_fail() {
    let out = run(&["compile", "-e", "while (true) ;"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stderr(&out).contains("warning[ACT-C002]: Infinite empty loop"), "stderr: {}", stderr(&out));
}

#[test]
fn lax_and_strict() {
    let src = "health = int('Fire');";
    assert!(!run(&["compile", "-e", src]).status.success());

    let lax = run(&["compile", "--lax", "-e", src]);
    assert!(lax.status.success(), "stderr: {}", stderr(&lax));
    assert!(stderr(&lax).contains("opt-error[ACT-T013]"), "stderr: {}", stderr(&lax));

    let strict = run(&["compile", "--lax", "--strict", "-e", src]);
    assert!(!strict.status.success());
}

#[test]
fn static_functions_have_no_self() {
    let out = run(&["compile", "--kind", "static", "-e", "health = 1;"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("ACT-R004"), "stderr: {}", stderr(&out));
}

#[test]
fn unknown_class_is_rejected() {
    let out = run(&["compile", "--class", "Nope", "-e", "return;"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("unknown class 'Nope'"), "stderr: {}", stderr(&out));
}

// --- environment files ---

#[test]
fn env_file_adds_symbols() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "constants": {{ "BOSS_HEALTH": 4000 }},
            "classes": [
                {{ "name": "Boss", "parent": "Actor", "fields": [{{ "name": "rage", "type": "int" }}] }}
            ]
        }}"#
    )
    .unwrap();
    let env = file.path().to_str().unwrap();

    let out = run(&["eval", "--env", env, "BOSS_HEALTH / 2"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out).trim(), "2000 : int");

    let out = run(&["compile", "--env", env, "--class", "Boss", "-e", "rage = health;"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
}

#[test]
fn broken_env_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{{ not json").unwrap();
    let out = run(&["eval", "--env", file.path().to_str().unwrap(), "1"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("invalid environment JSON"), "stderr: {}", stderr(&out));
}

// --- damage ---

#[test]
fn damage_returns_value_and_true() {
    let out = run(&["damage", "random(1, 8) * 3"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let text = stdout(&out);
    assert!(text.contains("; returns int"), "{text}");
    assert!(text.contains("reti"), "{text}");
}

#[test]
fn damage_must_be_numeric() {
    let out = run(&["damage", "\"ouch\""]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("Numeric type expected"), "stderr: {}", stderr(&out));
}

// --- explain ---

#[test]
fn explain_known_code() {
    let out = run(&["explain", "ACT-T005"]);
    assert!(out.status.success());
    assert!(stdout(&out).starts_with("## ACT-T005: division by zero"));
}

#[test]
fn explain_list_and_unknown() {
    let out = run(&["explain", "--list"]);
    assert!(out.status.success());
    assert!(stdout(&out).lines().any(|l| l.starts_with("ACT-C002")));

    let out = run(&["explain", "ACT-Z999"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("unknown diagnostic code"));
}
