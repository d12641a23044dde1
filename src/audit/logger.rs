use super::{AuditRun, PhaseAudit, RunConfig, RunStatus};
use crate::assets::AssetResult;
use crate::issue::Issue;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Writes the audit trail under `<output_root>/audit/`.
///
/// The live run is mirrored to `current-run.json` after every mutation, so a
/// crash leaves a usable record; `finish_run` archives it into `runs/` and
/// removes the live file. Mutations with no active run are errors, never
/// silent no-ops.
pub struct AuditLogger {
    audit_dir: PathBuf,
    current_run: Option<AuditRun>,
    current_run_file: PathBuf,
}

impl AuditLogger {
    pub fn new(audit_dir: &Path) -> Self {
        let current_run_file = audit_dir.join("current-run.json");
        Self {
            audit_dir: audit_dir.to_path_buf(),
            current_run: None,
            current_run_file,
        }
    }

    /// Create `runs/` and `snapshots/` under the audit directory.
    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(self.audit_dir.join("runs"))
            .context("Failed to create audit runs directory")?;
        fs::create_dir_all(self.audit_dir.join("snapshots"))
            .context("Failed to create audit snapshots directory")?;
        Ok(())
    }

    pub fn start_run(&mut self, config: RunConfig) -> Result<()> {
        self.current_run = Some(AuditRun::new(config));
        self.save_current()
    }

    pub fn add_phase(&mut self, phase: PhaseAudit) -> Result<()> {
        let run = self
            .current_run
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("add_phase called with no active run"))?;
        run.phases.push(phase);
        self.save_current()
    }

    /// Apply a mutation to the most recent phase. Errors if there is no
    /// active run or the run has no phases yet.
    pub fn update_last_phase<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut PhaseAudit),
    {
        let run = self
            .current_run
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("update_last_phase called with no active run"))?;
        let phase = run
            .phases
            .last_mut()
            .ok_or_else(|| anyhow::anyhow!("update_last_phase called with no phases in run"))?;
        f(phase);
        self.save_current()
    }

    pub fn record_assets(&mut self, results: &[AssetResult]) -> Result<()> {
        let run = self
            .current_run
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("record_assets called with no active run"))?;
        run.assets.extend(results.iter().cloned());
        self.save_current()
    }

    pub fn record_unresolved(&mut self, issues: &[Issue]) -> Result<()> {
        let run = self
            .current_run
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("record_unresolved called with no active run"))?;
        run.unresolved_issues.extend(issues.iter().cloned());
        self.save_current()
    }

    /// Write a template snapshot into `snapshots/` and record it on the run.
    pub fn write_snapshot(&mut self, label: &str, content: &str) -> Result<PathBuf> {
        let run = self
            .current_run
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("write_snapshot called with no active run"))?;

        let filename = format!(
            "{}_{}_{}.snapshot",
            run.started_at.format("%Y-%m-%dT%H-%M-%S"),
            &run.run_id.to_string()[..8],
            label
        );
        let path = self.audit_dir.join("snapshots").join(filename);
        fs::write(&path, content).context("Failed to write template snapshot")?;
        run.snapshot = Some(path.clone());
        self.save_current()?;
        Ok(path)
    }

    /// Archive the run under `runs/<started-at>_<run-id-prefix>.json` and
    /// remove the live file.
    pub fn finish_run(&mut self, status: RunStatus) -> Result<PathBuf> {
        let run = self
            .current_run
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("No current run to finish"))?;

        run.finish(status);

        let filename = format!(
            "{}_{}.json",
            run.started_at.format("%Y-%m-%dT%H-%M-%S"),
            &run.run_id.to_string()[..8]
        );
        let run_file = self.audit_dir.join("runs").join(&filename);

        let json = serde_json::to_string_pretty(&run).context("Failed to serialize audit run")?;
        fs::write(&run_file, json).context("Failed to write audit run file")?;

        if self.current_run_file.exists() {
            fs::remove_file(&self.current_run_file)
                .context("Failed to remove current-run.json after finishing run")?;
        }

        self.current_run = None;
        Ok(run_file)
    }

    pub fn save_current(&self) -> Result<()> {
        if let Some(ref run) = self.current_run {
            let json =
                serde_json::to_string_pretty(&run).context("Failed to serialize current run")?;
            fs::write(&self.current_run_file, json).context("Failed to write current run file")?;
        }
        Ok(())
    }

    pub fn load_current(&mut self) -> Result<bool> {
        if self.current_run_file.exists() {
            let content = fs::read_to_string(&self.current_run_file)
                .context("Failed to read current run file")?;
            let run: AuditRun =
                serde_json::from_str(&content).context("Failed to parse current run file")?;
            self.current_run = Some(run);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn current_run(&self) -> Option<&AuditRun> {
        self.current_run.as_ref()
    }

    pub fn list_runs(&self) -> Result<Vec<PathBuf>> {
        let runs_dir = self.audit_dir.join("runs");
        if !runs_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs: Vec<PathBuf> = fs::read_dir(&runs_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .collect();

        runs.sort();
        runs.reverse(); // Most recent first
        Ok(runs)
    }

    pub fn load_run(&self, path: &Path) -> Result<AuditRun> {
        let content = fs::read_to_string(path).context("Failed to read audit run file")?;
        let run: AuditRun =
            serde_json::from_str(&content).context("Failed to parse audit run file")?;
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::PhaseOutcome;
    use crate::issue::{Issue, IssueCategory};
    use tempfile::TempDir;

    fn setup_logger() -> (AuditLogger, TempDir) {
        let dir = TempDir::new().expect("failed to create temp dir");
        let logger = AuditLogger::new(dir.path());
        logger.ensure_directories().expect("failed to create dirs");
        (logger, dir)
    }

    fn run_config() -> RunConfig {
        RunConfig {
            plan_file: PathBuf::from("plan.json"),
            template_file: PathBuf::from("index.html"),
            output_root: PathBuf::from("out"),
            max_remediation_rounds: 3,
            worker_timeout_secs: 120,
            max_parallel_workers: 4,
        }
    }

    #[test]
    fn test_add_phase_without_active_run_returns_err() {
        let (mut logger, _dir) = setup_logger();
        let result = logger.add_phase(PhaseAudit::new("engine", "Engine Core"));
        assert!(result.is_err());
    }

    #[test]
    fn test_update_last_phase_with_no_phases_returns_err() {
        let (mut logger, _dir) = setup_logger();
        logger.start_run(run_config()).unwrap();
        let result = logger.update_last_phase(|p| {
            p.remediation_rounds = 1;
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_start_run_creates_current_run_file() {
        let (mut logger, dir) = setup_logger();
        logger.start_run(run_config()).unwrap();
        assert!(dir.path().join("current-run.json").exists());
    }

    #[test]
    fn test_finish_run_archives_and_removes_live_file() {
        let (mut logger, dir) = setup_logger();
        logger.start_run(run_config()).unwrap();
        logger
            .add_phase(PhaseAudit::new("engine", "Engine Core"))
            .unwrap();
        let run_path = logger.finish_run(RunStatus::Succeeded).unwrap();

        assert!(!dir.path().join("current-run.json").exists());

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&run_path).unwrap()).unwrap();
        assert_eq!(value["final_status"], "succeeded");
        assert_eq!(value["run_id"].as_str().unwrap().len(), 36);
        assert!(!value["ended_at"].is_null());
        assert_eq!(value["phases"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_mutations_persist_to_disk() {
        let (mut logger, dir) = setup_logger();
        logger.start_run(run_config()).unwrap();
        logger
            .add_phase(PhaseAudit::new("engine", "Engine Core"))
            .unwrap();
        logger
            .update_last_phase(|p| {
                p.remediation_rounds = 2;
                p.finish(PhaseOutcome::CompletedWithWarnings);
            })
            .unwrap();
        logger
            .record_unresolved(&[Issue::new(IssueCategory::EmptyFragment, "empty")])
            .unwrap();

        // A second logger at the same path sees every mutation
        let mut second = AuditLogger::new(dir.path());
        assert!(second.load_current().unwrap());
        let run = second.current_run().unwrap();
        assert_eq!(run.phases[0].remediation_rounds, 2);
        assert_eq!(run.phases[0].outcome, PhaseOutcome::CompletedWithWarnings);
        assert_eq!(run.unresolved_issues.len(), 1);
    }

    #[test]
    fn test_snapshot_written_and_linked() {
        let (mut logger, _dir) = setup_logger();
        logger.start_run(run_config()).unwrap();

        let path = logger.write_snapshot("pre-abort", "<html></html>").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "<html></html>");
        assert_eq!(logger.current_run().unwrap().snapshot.as_ref(), Some(&path));
    }

    #[test]
    fn test_list_runs_most_recent_first() {
        let (mut logger, _dir) = setup_logger();
        assert!(logger.list_runs().unwrap().is_empty());

        logger.start_run(run_config()).unwrap();
        logger.finish_run(RunStatus::Succeeded).unwrap();
        logger.start_run(run_config()).unwrap();
        logger.finish_run(RunStatus::Aborted).unwrap();

        let runs = logger.list_runs().unwrap();
        assert_eq!(runs.len(), 2);
        let latest = logger.load_run(&runs[0]).unwrap();
        assert_eq!(latest.final_status, RunStatus::Aborted);
    }
}
