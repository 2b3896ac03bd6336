use super::{DecodeManifest, Manifest};
use crate::error::ValidatorError;
use crate::github::{ManifestFile, Repository};
use std::process::Stdio;

const LOG_TARGET: &str = "  manifest";

/// Decodes manifests by running an external evaluation tool in a scratch directory.
///
/// Every fetched manifest file is written to the directory first, since the tool picks
/// version-specific manifests from beside the plain one. The tool must print the
/// manifest as JSON on stdout and exit successfully.
#[derive(Debug, Clone)]
pub struct DumpPackage {
    command: Vec<String>,
}

impl Default for DumpPackage {
    fn default() -> Self {
        Self {
            command: vec!["swift".into(), "package".into(), "dump-package".into()],
        }
    }
}

impl DumpPackage {
    /// Use `command` (program then arguments) as the evaluation tool.
    pub fn new(command: Vec<String>) -> crate::Result<Self> {
        if command.is_empty() {
            ohno::bail!("the manifest command must name a program");
        }

        Ok(Self { command })
    }

    #[must_use]
    pub fn command(&self) -> &[String] {
        &self.command
    }
}

impl DecodeManifest for DumpPackage {
    async fn decode(&self, repository: &Repository, manifests: &[ManifestFile]) -> Result<Manifest, ValidatorError> {
        let identity = repository.identity();
        let dump_error = |what: String| ValidatorError::ManifestDump(format!("{what} for '{identity}'"));

        let Some((program, args)) = self.command.split_first() else {
            return Err(dump_error("no manifest command configured".into()));
        };

        let dir = tempfile::tempdir().map_err(|e| dump_error(format!("could not create scratch directory: {e}")))?;
        for file in manifests {
            tokio::fs::write(dir.path().join(&file.name), &file.contents)
                .await
                .map_err(|e| dump_error(format!("could not write '{}': {e}", file.name)))?;
        }

        log::debug!(target: LOG_TARGET, "Running '{}' for '{identity}'", self.command.join(" "));

        let output = tokio::process::Command::new(program)
            .args(args)
            .current_dir(dir.path())
            .env("SPI_PROCESSING", "1")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| dump_error(format!("could not run '{program}': {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(dump_error(format!("'{program}' exited with {}: {}", output.status, stderr.trim())));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| dump_error(format!("malformed output from '{program}': {e}")))
    }
}
