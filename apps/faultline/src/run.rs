//! `faultline run`: execution setup, worker processes, JUnit import.

use anyhow::{Context, Result, bail};
use faultline_config::FaultlineConfig;
use faultline_ids::WorkerId;
use faultline_ports::TestManagement;
use faultline_reporter::EXECUTION_KEY_ENV;
use faultline_xray::import_junit;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitCode};
use std::sync::LazyLock;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const WORKER_INDEX_ENV: &str = "FAULTLINE_WORKER_INDEX";
pub const WORKER_COUNT_ENV: &str = "FAULTLINE_WORKER_COUNT";
const WORKER_PLACEHOLDER: &str = "{worker}";

static TEST_KEY_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"test_key\s*=\s*"([A-Z][A-Z0-9]*-\d+)""#)
        .unwrap_or_else(|e| panic!("invalid test key marker pattern: {e}"))
});

pub struct RunArgs {
    pub workers: usize,
    pub junit: Option<String>,
    pub no_execution: bool,
    pub keys_from: PathBuf,
    pub command: Vec<String>,
}

/// Test keys named by `test_key = "KEY-1"` markers in text files under `dir`.
pub fn collect_test_keys(dir: &Path) -> Vec<String> {
    let mut keys = BTreeSet::new();
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| match e {
        Ok(entry) => Some(entry),
        Err(err) => {
            warn!(error = %err, "skipping unreadable path");
            None
        }
    }) {
        if !entry.file_type().is_file() {
            continue;
        }
        // Binary and non-UTF-8 files carry no markers.
        let Ok(text) = std::fs::read_to_string(entry.path()) else {
            continue;
        };
        for cap in TEST_KEY_MARKER.captures_iter(&text) {
            keys.insert(cap[1].to_string());
        }
    }
    keys.into_iter().collect()
}

pub fn substitute_worker(arg: &str, worker: &WorkerId) -> String {
    arg.replace(WORKER_PLACEHOLDER, worker.as_str())
}

fn create_execution(mgmt: &dyn TestManagement, keys: &[String]) -> Option<String> {
    if keys.is_empty() {
        println!("No test keys found; running without a test execution");
        return None;
    }
    let summary = format!(
        "Automated Test Execution - {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    match mgmt.create_execution(&summary, "Automated test execution created by faultline run", keys) {
        Ok(exec) => {
            println!("Created test execution {} with {} tests", exec.key, keys.len());
            Some(exec.key)
        }
        Err(e) => {
            warn!(category = %e.category(), error = %e, "could not create test execution");
            None
        }
    }
}

fn spawn_worker(
    command: &[String],
    index: usize,
    count: usize,
    execution: Option<&str>,
) -> Result<(WorkerId, Child)> {
    let worker = WorkerId::indexed(index);
    let args: Vec<String> = command.iter().map(|a| substitute_worker(a, &worker)).collect();
    let Some((program, rest)) = args.split_first() else {
        bail!("no test command given");
    };
    let mut cmd = Command::new(program);
    cmd.args(rest)
        .env(WorkerId::ENV_VAR, worker.as_str())
        .env(WORKER_INDEX_ENV, index.to_string())
        .env(WORKER_COUNT_ENV, count.to_string());
    match execution {
        Some(key) => cmd.env(EXECUTION_KEY_ENV, key),
        None => cmd.env_remove(EXECUTION_KEY_ENV),
    };
    debug!(worker = %worker, command = ?args, "starting worker");
    let child = cmd
        .spawn()
        .with_context(|| format!("start worker {worker}: {program}"))?;
    Ok((worker, child))
}

/// Kill and reap workers that already started.
fn stop_workers(children: &mut [(WorkerId, Child)]) {
    for (worker, child) in children.iter_mut() {
        if let Err(e) = child.kill() {
            debug!(worker = %worker, error = %e, "worker already exited");
        }
        if let Err(e) = child.wait() {
            warn!(worker = %worker, error = %e, "could not reap worker");
        }
    }
}

/// Exit code of the run: the first failing worker's, or success.
fn combine(codes: &[Option<i32>]) -> u8 {
    for code in codes {
        match code {
            Some(0) => {}
            Some(c) => return u8::try_from(*c).ok().filter(|c| *c != 0).unwrap_or(1),
            // killed by a signal
            None => return 1,
        }
    }
    0
}

pub fn run(config: &FaultlineConfig, args: &RunArgs) -> Result<ExitCode> {
    if args.workers == 0 {
        bail!("--workers must be at least 1");
    }
    std::fs::create_dir_all(&config.reports.dir)
        .with_context(|| format!("create {:?}", config.reports.dir))?;

    let xray = crate::junit::test_management(config);
    let execution = match (&xray, args.no_execution) {
        (Some(xray), false) => {
            let keys = collect_test_keys(&args.keys_from);
            create_execution(xray, &keys).or_else(|| config.xray.execution_key.clone())
        }
        _ => config.xray.execution_key.clone(),
    };

    let started = std::time::Instant::now();
    let mut children = Vec::with_capacity(args.workers);
    for index in 0..args.workers {
        match spawn_worker(&args.command, index, args.workers, execution.as_deref()) {
            Ok(spawned) => children.push(spawned),
            Err(e) => {
                stop_workers(&mut children);
                return Err(e);
            }
        }
    }
    let mut codes = Vec::with_capacity(children.len());
    let mut finished = Vec::with_capacity(children.len());
    for (worker, mut child) in children {
        let status = child
            .wait()
            .with_context(|| format!("wait for worker {worker}"))?;
        info!(worker = %worker, code = ?status.code(), "worker finished");
        codes.push(status.code());
        finished.push(worker);
    }
    println!(
        "Tests completed in {:.2} seconds",
        started.elapsed().as_secs_f64()
    );

    if let (Some(xray), Some(exec), Some(pattern)) = (&xray, execution.as_deref(), &args.junit) {
        for worker in &finished {
            let path = PathBuf::from(substitute_worker(pattern, worker));
            if !path.is_file() {
                warn!(worker = %worker, path = %path.display(), "JUnit report not found, skipping import");
                continue;
            }
            match import_junit(xray, &path, Some(exec)) {
                Ok(imported) => println!(
                    "Imported {} results from {} to {exec}",
                    imported.execution.map(|e| e.results.len()).unwrap_or(0),
                    path.display()
                ),
                Err(e) => warn!(path = %path.display(), error = %format!("{e:#}"), "JUnit import failed"),
            }
        }
    }

    Ok(ExitCode::from(combine(&codes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_sorted_unique_keys() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("ui")).unwrap();
        std::fs::write(
            dir.path().join("auth.rs"),
            "#[faultline(test_key = \"QA-17\")]\nfn login() {}\n// test_key=\"QA-3\"\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("ui/checkout.py"),
            "@pytest.mark.xray(test_key=\"QA-17\")\n@pytest.mark.xray(test_key=\"web-1\")",
        )
        .unwrap();
        std::fs::write(dir.path().join("blob.bin"), [0xff, 0xfe, 0x00]).unwrap();

        assert_eq!(collect_test_keys(dir.path()), vec!["QA-17", "QA-3"]);
    }

    #[test]
    fn missing_dir_has_no_keys() {
        let dir = tempfile::tempdir().unwrap();
        assert!(collect_test_keys(&dir.path().join("nope")).is_empty());
    }

    #[test]
    fn worker_placeholder_is_replaced() {
        assert_eq!(
            substitute_worker("reports/junit-{worker}.xml", &WorkerId::indexed(2)),
            "reports/junit-w2.xml"
        );
    }

    #[cfg(unix)]
    #[test]
    fn stopped_workers_are_reaped() {
        let command = ["sleep".to_string(), "30".to_string()];
        let mut children = vec![spawn_worker(&command, 0, 2, None).unwrap()];
        stop_workers(&mut children);
        let (_, child) = &mut children[0];
        assert!(child.try_wait().unwrap().is_some());
    }

    #[test]
    fn exit_code_is_first_failure() {
        assert_eq!(combine(&[Some(0), Some(0)]), 0);
        assert_eq!(combine(&[Some(0), Some(3), Some(1)]), 3);
        assert_eq!(combine(&[Some(0), None]), 1);
        assert_eq!(combine(&[Some(256)]), 1);
    }
}
