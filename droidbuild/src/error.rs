use std::path::PathBuf;

/// Goal failures that are not tooling errors.
#[derive(Debug, thiserror::Error)]
pub enum GoalFailure {
    #[error("Tests failed on device.")]
    TestsFailed { output: String },
    #[error("Error installing {} to device: {output}\nYou might want to set android.deploy.undeployBeforeDeploy=true to uninstall the existing package first.", .apk.display())]
    InstallFailed { apk: PathBuf, output: String },
    #[error("Failed to merge {} with library manifests [{}]", .main.display(), display_paths(.libs))]
    MergeFailed { main: PathBuf, libs: Vec<PathBuf> },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
