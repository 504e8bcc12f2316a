//! One-time setup for desktop automation: the workflow template shipped next to
//! the binary has placeholders where the binary's absolute path must go.

use std::{
    io,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::info;

pub const BINARY_PLACEHOLDER: &str = "{{QR_SHARE_PATH}}";

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("failed to read workflow template {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write workflow template {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(
        "workflow template {} has no QR_SHARE_PATH placeholder (already configured?)",
        .0.display()
    )]
    MissingPlaceholder(PathBuf),
    #[error("could not determine the qr-share binary path: {0}")]
    CurrentExe(#[source] io::Error),
    #[error("binary path {} is not valid UTF-8", .0.display())]
    NonUtf8Binary(PathBuf),
}

/// Result of patching a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledWorkflow {
    pub template: PathBuf,
    pub binary: PathBuf,
    pub replacements: usize,
}

/// Rewrites `template` in place, substituting every placeholder with `binary` (or the
/// running executable when `None`).
pub fn install_workflow(
    template: &Path,
    binary: Option<PathBuf>,
) -> Result<InstalledWorkflow, WorkflowError> {
    let binary = match binary {
        Some(path) => path,
        None => std::env::current_exe().map_err(WorkflowError::CurrentExe)?,
    };
    let binary_str = binary
        .to_str()
        .ok_or_else(|| WorkflowError::NonUtf8Binary(binary.clone()))?;

    let contents = std::fs::read_to_string(template).map_err(|source| WorkflowError::Read {
        path: template.to_path_buf(),
        source,
    })?;
    let replacements = contents.matches(BINARY_PLACEHOLDER).count();
    if replacements == 0 {
        return Err(WorkflowError::MissingPlaceholder(template.to_path_buf()));
    }

    let patched = contents.replace(BINARY_PLACEHOLDER, binary_str);
    std::fs::write(template, patched).map_err(|source| WorkflowError::Write {
        path: template.to_path_buf(),
        source,
    })?;

    info!(
        template = %template.display(),
        binary = %binary.display(),
        replacements,
        "workflow configured"
    );

    Ok(InstalledWorkflow {
        template: template.to_path_buf(),
        binary,
        replacements,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn replaces_every_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("document.wflow");
        std::fs::write(
            &template,
            "<string>{{QR_SHARE_PATH}} \"$@\"</string>\n<key>{{QR_SHARE_PATH}}</key>",
        )
        .unwrap();

        let installed =
            install_workflow(&template, Some(PathBuf::from("/usr/local/bin/qr-share"))).unwrap();
        assert_eq!(installed.replacements, 2);

        let patched = std::fs::read_to_string(&template).unwrap();
        assert!(!patched.contains(BINARY_PLACEHOLDER));
        assert_eq!(patched.matches("/usr/local/bin/qr-share").count(), 2);
    }

    #[test_timeout::timeout]
    fn second_run_reports_missing_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("document.wflow");
        std::fs::write(&template, "run {{QR_SHARE_PATH}}").unwrap();

        install_workflow(&template, Some(PathBuf::from("/opt/qr-share"))).unwrap();
        let err = install_workflow(&template, Some(PathBuf::from("/opt/qr-share"))).unwrap_err();
        assert!(matches!(err, WorkflowError::MissingPlaceholder(_)));
    }

    #[test_timeout::timeout]
    fn missing_template_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = install_workflow(&dir.path().join("absent.wflow"), None).unwrap_err();
        assert!(matches!(err, WorkflowError::Read { .. }));
    }

    #[test_timeout::timeout]
    fn defaults_to_current_executable() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("document.wflow");
        std::fs::write(&template, "{{QR_SHARE_PATH}}").unwrap();

        let installed = install_workflow(&template, None).unwrap();
        assert_eq!(installed.binary, std::env::current_exe().unwrap());
    }
}
