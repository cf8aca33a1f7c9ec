//! End-to-end tests for target builds
//!
//! Tests the complete flow from synthflow.toml to deployment script with a
//! runner that imitates the toolchain's file outputs.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use synthflow_build::{
    BuildError, Builder, ToolInvocation, ToolOutput, ToolRunner, TargetContext, Verdict,
};
use synthflow_config::ConfigLoader;
use tempfile::TempDir;

const PASSING_REPORT: &str = "Info: Quartus Prime Timing Analyzer was successful. 0 errors, 3 warnings\n";
const FAILING_REPORT: &str = "Critical Warning: Timing requirements not met\n";

/// Writes the files each toolchain program would produce
struct FakeQuartus {
    calls: RefCell<Vec<String>>,
    timing_report: &'static str,
}

impl FakeQuartus {
    fn new(timing_report: &'static str) -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            timing_report,
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn outputs(&self, invocation: &ToolInvocation) -> Vec<(PathBuf, String)> {
        let args = &invocation.args;
        let project = args.first().cloned().unwrap_or_default();
        let out = |suffix: &str| PathBuf::from("output_files").join(format!("{}{}", project, suffix));
        let after = |flag: &str| {
            args.iter()
                .position(|a| a == flag)
                .and_then(|i| args.get(i + 1))
                .cloned()
        };

        match invocation.program.as_str() {
            "quartus_map" => vec![(out(".map.rpt"), "map".into())],
            "quartus_cdb" if args.iter().any(|a| a == "--merge=on") => {
                vec![(out(".merge.rpt"), "merge".into())]
            }
            "quartus_cdb" if args.iter().any(|a| a == "--export_block") => {
                vec![(out(".qdb"), "snapshot".into())]
            }
            "quartus_cdb" => {
                let revision = after("-c").unwrap_or(project.clone());
                vec![(
                    PathBuf::from("output_files").join(format!("{}.import.rpt", revision)),
                    "imported".into(),
                )]
            }
            "quartus_fit" => vec![(out(".fit.rpt"), "fit".into())],
            "quartus_asm" => vec![(out(".sof"), "sof".into())],
            "quartus_sta" => vec![(out(".sta.rpt"), self.timing_report.into())],
            "quartus_cpf" => args
                .last()
                .map(|rbf| vec![(PathBuf::from(rbf), "rbf".into())])
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}

impl ToolRunner for FakeQuartus {
    fn run(&self, invocation: &ToolInvocation, workdir: &Path) -> std::io::Result<ToolOutput> {
        self.calls.borrow_mut().push(invocation.to_string());
        for (path, contents) in self.outputs(invocation) {
            let target = workdir.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(target, contents)?;
        }
        Ok(ToolOutput::success("done"))
    }
}

struct Project {
    root: TempDir,
    vendor: TempDir,
}

fn config_text(seed: u32, root_env: &str) -> String {
    format!(
        r#"
[project]
name = "demo"

[[target]]
name = "fpga"
variant = "skx"
workspace = "build/fpga"
parameter-file = "params.tcl"
seed = {seed}
flash-tool = "flash-board"

[target.features]
ccip = true

[target.sources]
rtl = ["hw"]
constraint-headers = ["hw/header.tcl"]
constraints = ["hw/clocks.sdc"]

[target.vendor]
root-env = "{root_env}"
files = ["lib/rom.mif"]
local = ["sys_cfg_pkg.svh", "optional_missing.svh"]
"#
    )
}

fn create_project(with_vendor_file: bool) -> Project {
    let root = TempDir::new().unwrap();
    let vendor = TempDir::new().unwrap();
    let files = [
        ("hw/top.sv", "module top; endmodule"),
        ("hw/core.v", "module core; endmodule"),
        ("hw/header.tcl", "set x 1"),
        ("hw/clocks.sdc", "create_clock"),
        ("params.tcl", "set_parameter"),
        ("sys_cfg_pkg.svh", "package cfg; endpackage"),
    ];
    for (path, contents) in files {
        let full = root.path().join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, contents).unwrap();
    }
    fs::write(
        root.path().join("synthflow.toml"),
        config_text(3, "SYNTHFLOW_TEST_VENDOR_ROOT"),
    )
    .unwrap();

    if with_vendor_file {
        fs::create_dir_all(vendor.path().join("lib")).unwrap();
        fs::write(vendor.path().join("lib/rom.mif"), "DEPTH = 16;").unwrap();
    }

    Project { root, vendor }
}

fn context(project: &Project) -> TargetContext {
    let config = ConfigLoader::new()
        .without_env()
        .load_from_directory(project.root.path())
        .unwrap();
    TargetContext::from_config(&config, "fpga").unwrap()
}

fn builder(project: &Project, report: &'static str) -> Builder<FakeQuartus> {
    Builder::new(context(project))
        .with_runner(FakeQuartus::new(report))
        .with_vendor_root(project.vendor.path())
}

#[test]
fn test_build_skx_target_end_to_end() {
    let project = create_project(true);
    let builder = builder(&project, PASSING_REPORT);

    let outcome = builder.build().unwrap();
    assert_eq!(
        outcome.executed,
        vec![
            "stage-files",
            "synthesize",
            "export",
            "import-base",
            "import-overlay",
            "fit",
            "assemble",
            "timing",
            "convert",
            "deploy"
        ]
    );
    assert!(outcome.status.succeeded);
    assert_eq!(outcome.status.verdict, Verdict::Success);
    assert!(outcome.descriptor_written);
    let staging_log = fs::read_to_string(
        project.root.path().join("build/fpga/output_files/logs/stage-files.log"),
    )
    .unwrap();
    assert!(staging_log.starts_with("$ link rom.mif sys_cfg_pkg.svh\n"));

    let workdir = project.root.path().join("build/fpga");
    assert!(workdir.join("rom.mif").exists());
    assert!(!workdir.join("optional_missing.svh").exists());

    let descriptor = fs::read_to_string(workdir.join("fpga.qsf")).unwrap();
    let lines: Vec<&str> = descriptor.lines().collect();
    assert_eq!(
        lines[..2],
        [
            "set_global_assignment -name VERILOG_MACRO \"PLATFORM_PROVIDES_CCIP=1\"",
            "set_global_assignment -name VERILOG_MACRO \"CCIP_IF_V0_2=1\"",
        ]
    );
    assert!(descriptor.contains("set_global_assignment -name SEED 3\n"));
    let sdc: Vec<&str> = lines.iter().copied().filter(|l| l.contains("SDC_FILE")).collect();
    assert_eq!(
        sdc,
        vec![
            "set_global_assignment -name SDC_FILE ../../params.tcl",
            "set_global_assignment -name SDC_FILE ../../hw/header.tcl",
            "set_global_assignment -name SDC_FILE ../../hw/clocks.sdc",
        ]
    );

    let calls = builder.runner().calls();
    assert!(calls[0].starts_with("quartus_map fpga --verilog_macro=QUARTUS_COMPILATION=1 --lib_path "));
    assert!(calls.iter().any(|c| c.contains("-c fpga_overlay --import_block")));

    let deployment = outcome.deployment.unwrap();
    assert_eq!(deployment.script_path, workdir.join("config/fpga.download"));
    assert_eq!(
        fs::read_to_string(&deployment.script_path).unwrap(),
        format!(
            "#!/bin/sh\nflash-board --bitstream={}\n",
            workdir.join("output_files/fpga.sof").display()
        )
    );

    let errinfo = fs::read_to_string(workdir.join("fpga_hw.errinfo")).unwrap();
    assert!(errinfo.starts_with("timing PASSED"));
    assert!(workdir.join("output_files/logs/synthesize.log").is_file());
}

#[test]
fn test_rebuild_of_unchanged_target_is_a_noop() {
    let project = create_project(true);
    builder(&project, PASSING_REPORT).build().unwrap();

    let second = builder(&project, PASSING_REPORT);
    let outcome = second.build().unwrap();

    assert!(second.runner().calls().is_empty());
    assert!(outcome.executed.is_empty());
    assert_eq!(outcome.skipped.len(), 10);
    assert!(!outcome.descriptor_written);
    assert!(outcome.status.succeeded);
    assert!(outcome.deployment.is_some());
}

#[test]
fn test_changed_seed_reruns_synthesis() {
    let project = create_project(true);
    builder(&project, PASSING_REPORT).build().unwrap();

    fs::write(
        project.root.path().join("synthflow.toml"),
        config_text(4, "SYNTHFLOW_TEST_VENDOR_ROOT"),
    )
    .unwrap();

    let outcome = builder(&project, PASSING_REPORT).build().unwrap();
    assert!(outcome.descriptor_written);
    assert_eq!(outcome.executed.first().map(String::as_str), Some("synthesize"));
    assert!(outcome.skipped.iter().any(|s| s == "stage-files"));
}

#[test]
fn test_missing_vendor_file_aborts_before_any_stage() {
    let project = create_project(false);
    let builder = builder(&project, PASSING_REPORT);

    let err = builder.build().unwrap_err();
    match &err {
        BuildError::MissingRequiredFile { path, .. } => assert!(path.ends_with("lib/rom.mif")),
        other => panic!("expected MissingRequiredFile, got {}", other),
    }
    assert!(err.is_preflight());
    assert!(builder.runner().calls().is_empty());
    assert!(!project.root.path().join("build/fpga").exists());
}

#[test]
fn test_unset_vendor_environment_is_fatal() {
    let project = create_project(true);
    fs::write(
        project.root.path().join("synthflow.toml"),
        config_text(3, "SYNTHFLOW_TEST_ROOT_THAT_IS_NEVER_SET"),
    )
    .unwrap();

    let builder = Builder::new(context(&project)).with_runner(FakeQuartus::new(PASSING_REPORT));
    match builder.build() {
        Err(BuildError::MissingEnvironment { name, .. }) => {
            assert_eq!(name, "SYNTHFLOW_TEST_ROOT_THAT_IS_NEVER_SET")
        }
        other => panic!("expected MissingEnvironment, got {:?}", other.map(|o| o.target)),
    }
    assert!(builder.runner().calls().is_empty());
}

#[test]
fn test_unmet_timing_reports_failure_but_deploys() {
    let project = create_project(true);
    let outcome = builder(&project, FAILING_REPORT).build().unwrap();

    assert!(!outcome.status.succeeded);
    assert_eq!(outcome.status.verdict, Verdict::Failure);
    assert_eq!(
        outcome.status.message,
        "Critical Warning: Timing requirements not met"
    );
    assert!(outcome.deployment.unwrap().script_path.is_file());

    let errinfo = fs::read_to_string(
        project
            .root
            .path()
            .join("build/fpga/fpga_hw.errinfo"),
    )
    .unwrap();
    assert_eq!(
        errinfo,
        "timing FAILED: Critical Warning: Timing requirements not met\n"
    );
}

#[test]
fn test_plan_lists_stale_stages_without_running() {
    let project = create_project(true);
    let builder = builder(&project, PASSING_REPORT);

    let plan = builder.plan().unwrap();
    assert_eq!(plan.len(), 9);
    assert!(plan.iter().all(|p| !p.freshness.is_fresh()));
    assert!(builder.runner().calls().is_empty());
}

#[test]
fn test_outcome_serializes_to_json() {
    let project = create_project(true);
    let outcome = builder(&project, PASSING_REPORT).build().unwrap();

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["target"], "fpga");
    assert_eq!(json["variant"], "skx");
    assert_eq!(json["status"]["succeeded"], true);
    assert_eq!(json["status"]["verdict"], "success");
}
