//! Report generator invoked as a subprocess.
//!
//! The generator is given a configuration reference and the date through an
//! argument template, e.g. `node src/generator.js {config} --date {date}`. Its
//! stdout/stderr are inherited so its own progress output reaches the
//! terminal.

use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

use kpitree_core::collab::{GenerationError, ReportGenerator};
use kpitree_core::date::TargetDate;

use super::display_command;

#[derive(Debug, Clone)]
pub struct ProcessGenerator {
    program: String,
    args: Vec<String>,
    config_ref: String,
    working_dir: PathBuf,
    artifact: PathBuf,
}

impl ProcessGenerator {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        config_ref: impl Into<String>,
        working_dir: impl Into<PathBuf>,
        artifact: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            config_ref: config_ref.into(),
            working_dir: working_dir.into(),
            artifact: artifact.into(),
        }
    }

    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    /// Arguments with `{config}` and `{date}` substituted.
    pub fn render_args(&self, date: &TargetDate) -> Vec<String> {
        let date = date.to_string();
        self.args
            .iter()
            .map(|a| a.replace("{config}", &self.config_ref).replace("{date}", &date))
            .collect()
    }

    fn clear_stale_artifact(&self) -> Result<(), GenerationError> {
        match std::fs::remove_file(&self.artifact) {
            Ok(()) => {
                debug!(path = %self.artifact.display(), "removed stale artifact");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(GenerationError::StaleArtifact {
                path: self.artifact.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

impl ReportGenerator for ProcessGenerator {
    fn name(&self) -> &str {
        &self.program
    }

    fn generate(&self, date: &TargetDate) -> Result<PathBuf, GenerationError> {
        self.clear_stale_artifact()?;
        if let Some(parent) = self.artifact.parent() {
            // The generator may expect its output directory to exist.
            if let Err(e) = std::fs::create_dir_all(parent) {
                debug!(dir = %parent.display(), error = %e, "could not create artifact directory");
            }
        }

        let args = self.render_args(date);
        info!(command = %display_command(&self.program, &args), "invoking report generator");
        let status = Command::new(&self.program)
            .args(&args)
            .current_dir(&self.working_dir)
            .status()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    GenerationError::ExecutableMissing(self.program.clone())
                }
                _ => GenerationError::Launch(e.to_string()),
            })?;

        if !status.success() {
            return Err(GenerationError::Failed {
                status: status.to_string(),
            });
        }
        Ok(self.artifact.clone())
    }
}
