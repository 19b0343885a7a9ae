//! A project opened from its configuration files, one system per runtime.

use std::fs;
use std::path::Path;

use strata_build::{
    OutputFile, PeerAnswer, ProcessContext, ProcessError, ProcessedFile, SystemGroup,
};
use strata_config::load_config;
use strata_diagnostics::DiagnosticSink;
use strata_source::SrcRecord;
use strata_typeindex::TypeIndexEntry;

fn declare(record: &SrcRecord, ctx: &ProcessContext<'_>) -> Result<ProcessedFile, ProcessError> {
    let type_name = record.type_name(&ctx.layer.package);
    let ext = ctx.runtime.source_extension();
    Ok(ProcessedFile::new()
        .with_output(OutputFile::new(
            format!("{}.{ext}", type_name.replace('.', "/")),
            format!("// {type_name} for {}\n", ctx.target.name),
        ))
        .with_type(TypeIndexEntry::new(type_name, record.layer.as_str(), "")))
}

fn write(root: &Path, rel: &str, text: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

fn project(root: &Path) {
    write(
        root,
        "strata.toml",
        r#"
[project]
name = "demo"

[build]
runtimes = ["java", "js"]
mtime_slack_ms = 5000
source_extensions = ["sc"]
"#,
    );
    write(root, "layers/sys/layer.toml", "package = \"sys\"\n");
    write(root, "layers/sys/Core.sc", "");
    write(
        root,
        "layers/jvm/layer.toml",
        "package = \"jvm\"\nextends = [\"sys\"]\n\n[runtimes]\nbound = \"java\"\nexport = true\n",
    );
    write(root, "layers/jvm/Native.sc", "");
}

#[test]
fn each_runtime_builds_its_own_stack() {
    let dir = tempfile::tempdir().unwrap();
    project(dir.path());
    let sink = DiagnosticSink::new();
    let config = load_config(dir.path()).unwrap();

    let group = SystemGroup::open(dir.path(), &config, &sink).unwrap();
    assert_eq!(group.systems().len(), 2);
    let java = group.get("java").unwrap();
    let js = group.get("js").unwrap();
    assert_eq!(java.read_state().graph.names(), ["sys", "jvm"]);
    assert_eq!(js.read_state().graph.names(), ["sys"]);

    let summaries = group.build_all(&declare, &sink).unwrap();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].build_layer, "jvm");
    assert_eq!(summaries[0].processed, 2);
    assert_eq!(summaries[0].to_compile.len(), 2);
    assert_eq!(summaries[1].build_layer, "sys");
    assert_eq!(summaries[1].processed, 1);
    assert!(summaries[1].to_compile.is_empty());

    let build = dir.path().join("build");
    assert!(build.join("java/jvm/jvm/Native.java").is_file());
    assert!(build.join("java/jvm/sys/Core.java").is_file());
    assert!(build.join("js/sys/sys/Core.js").is_file());
    assert!(!build.join("js/jvm").exists());
    assert!(!sink.has_errors());
}

#[test]
fn peers_see_each_others_declarations_after_a_build() {
    let dir = tempfile::tempdir().unwrap();
    project(dir.path());
    let sink = DiagnosticSink::new();
    let config = load_config(dir.path()).unwrap();

    let group = SystemGroup::open(dir.path(), &config, &sink).unwrap();
    group.build_all(&declare, &sink).unwrap();

    let from_js = group.peer_lookup("js", "jvm.Native");
    assert_eq!(from_js.len(), 1);
    assert_eq!(from_js[0].0, "java");
    match &from_js[0].1 {
        PeerAnswer::Declared(entry) => assert_eq!(entry.layer, "jvm"),
        other => panic!("expected a declaration, got {other:?}"),
    }
    assert_eq!(
        group.peer_lookup("java", "jvm.Native"),
        vec![("js".to_string(), PeerAnswer::NotDeclared)]
    );
}

#[test]
fn second_build_of_the_group_skips_everything() {
    let dir = tempfile::tempdir().unwrap();
    project(dir.path());
    let sink = DiagnosticSink::new();
    let config = load_config(dir.path()).unwrap();

    SystemGroup::open(dir.path(), &config, &sink)
        .unwrap()
        .build_all(&declare, &sink)
        .unwrap();

    let group = SystemGroup::open(dir.path(), &config, &sink).unwrap();
    let summaries = group.build_all(&declare, &sink).unwrap();
    assert!(summaries.iter().all(|s| s.processed == 0));
    assert_eq!(summaries.iter().map(|s| s.skipped).sum::<usize>(), 3);
}
