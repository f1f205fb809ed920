#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    config: PathBuf,
    vertices: PathBuf,
    edges: PathBuf,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().expect("tempdir");
    let write = |name: &str, contents: &str| -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).expect("write fixture");
        path
    };
    let config = write("exec.toml", "");
    let vertices = write(
        "vertices.csv",
        "id,label,name,age\n\
         p1,Person,ann,31\n\
         p2,Person,bob,25\n\
         p3,Person,cid,42\n\
         c1,City,oslo,\n",
    );
    let edges = write(
        "edges.csv",
        "src,dst,type,since\n\
         p1,p2,KNOWS,2001\n\
         p2,p3,KNOWS,2010\n\
         p1,c1,LIVES_IN,\n",
    );
    Fixture {
        _dir: dir,
        config,
        vertices,
        edges,
    }
}

fn penumbra(fx: &Fixture, args: &[&str]) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("penumbra");
    cmd.env("PENUMBRA_CONFIG", &fx.config).args(args);
    cmd
}

fn graph_args<'a>(fx: &'a Fixture) -> [&'a str; 4] {
    ["--vertices", path_str(&fx.vertices), "--edges", path_str(&fx.edges)]
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("utf-8 temp path")
}

fn json_stdout(cmd: &mut assert_cmd::Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("json output")
}

#[test]
fn run_prints_rows_as_json() {
    let fx = fixture();
    let mut cmd = penumbra(&fx, &["--format", "json", "run"]);
    cmd.args(graph_args(&fx)).args([
        "--match",
        "(a:Person)-[:KNOWS]->(b)",
        "--where",
        "a.age > 30",
        "--return",
        "b.name AS friend",
    ]);
    let body = json_stdout(&mut cmd);
    assert_eq!(body["result"], serde_json::json!([{ "friend": "bob" }]));
    assert!(body.get("plan").is_none());
}

#[test]
fn quiet_text_output_is_rows_only() {
    let fx = fixture();
    let mut cmd = penumbra(&fx, &["--quiet", "--theme", "plain", "run"]);
    cmd.args(graph_args(&fx)).args([
        "--match",
        "(p:Person)",
        "--return",
        "p.name",
        "--order-by",
        "p.age:desc",
        "--limit",
        "2",
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let text = String::from_utf8(output).expect("utf-8 stdout");
    let lines: Vec<&str> = text.lines().map(str::trim_end).collect();
    assert_eq!(lines, vec!["cid", "ann"]);
}

#[test]
fn text_output_has_sections_and_header() {
    let fx = fixture();
    let mut cmd = penumbra(&fx, &["--theme", "plain", "run"]);
    cmd.args(graph_args(&fx)).args([
        "--match",
        "(p:Person)-[:LIVES_IN]->(c:City)",
        "--return",
        "c.name AS city",
        "--return",
        "count(*) AS n",
        "--explain",
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let text = String::from_utf8(output).expect("utf-8 stdout");
    assert!(text.contains("Plan"));
    assert!(text.contains("Traversal"));
    assert!(text.contains("- ParallelTraversal"));
    assert!(text.contains("vertices: 4"));
    assert!(text.lines().any(|line| line.split('|').map(str::trim).eq(["city", "n"])));
    assert!(text.lines().any(|line| line.split('|').map(str::trim).eq(["oslo", "1"])));
}

#[test]
fn explain_reports_index_seek() {
    let fx = fixture();
    let mut cmd = penumbra(&fx, &["--format", "json", "explain"]);
    cmd.args(graph_args(&fx)).args([
        "--index",
        "Person.name",
        "--match",
        "(p:Person)",
        "--where",
        "p.name = 'bob'",
    ]);
    let body = json_stdout(&mut cmd);
    assert_eq!(body["plan"]["root"]["op"], "ProduceResults");
    assert_eq!(body["plan"]["root"]["inputs"][0]["op"], "NodeIndexSeek");
    assert_eq!(body["passes"], serde_json::json!(["LocateNodeByIndexedProp"]));
}

#[test]
fn parameters_and_disabled_optimizer() {
    let fx = fixture();
    let mut cmd = penumbra(&fx, &["--format", "json", "run"]);
    cmd.args(graph_args(&fx)).args([
        "--index",
        "Person.name",
        "--match",
        "(p:Person)",
        "--where",
        "p.name = $who",
        "--param",
        "who=cid",
        "--return",
        "p.age",
        "--no-optimize",
        "--explain",
    ]);
    let body = json_stdout(&mut cmd);
    assert_eq!(body["result"], serde_json::json!([{ "p.age": 42 }]));
    assert_eq!(body["passes"], serde_json::json!([]));
    assert_eq!(body["plan"]["root"]["inputs"][0]["inputs"][0]["op"], "Filter");
}

#[test]
fn bad_inputs_fail_with_a_message() {
    let fx = fixture();
    let dangling = fx.edges.with_file_name("dangling.csv");
    fs::write(&dangling, "src,dst,type\np1,p9,KNOWS\n").expect("write fixture");
    let output = penumbra(&fx, &["run", "--vertices", path_str(&fx.vertices), "--edges"])
        .arg(&dangling)
        .args(["--match", "(p:Person)"])
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    assert!(String::from_utf8_lossy(&output).contains("unknown vertex 'p9'"));

    penumbra(&fx, &["run", "--vertices", path_str(&fx.vertices)]).assert().failure();
    penumbra(&fx, &["run", "--vertices", path_str(&fx.vertices), "--match", "(a)-[:X]->(b)", "--where", "???"])
        .assert()
        .failure();
}

#[test]
fn profile_flag_reports_operator_timings() {
    let fx = fixture();
    let mut cmd = penumbra(&fx, &["--format", "json", "run", "--profile"]);
    cmd.args(graph_args(&fx)).args(["--match", "(p:Person)", "--return", "p.name"]);
    let body = json_stdout(&mut cmd);
    assert_eq!(body["result"].as_array().map(Vec::len), Some(3));
    assert!(body["profile"]["scan"]["calls"].as_u64().unwrap_or(0) > 0);
}
