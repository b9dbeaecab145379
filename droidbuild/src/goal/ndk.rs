use crate::params::Param;
use crate::{BuildEnv, GoalOutput};
use anyhow::Result;
use std::path::{Path, PathBuf};

fn clean(dir: &Path) {
    if !dir.exists() {
        return;
    }
    tracing::info!("Deleting {}", dir.display());
    if let Err(err) = std::fs::remove_dir_all(dir) {
        tracing::warn!("failed to delete {}: {}", dir.display(), err);
    }
}

/// Removes native build outputs.
pub fn ndk_clean(env: &BuildEnv) -> Result<GoalOutput> {
    let h = env.handler("ndk");
    let skip: bool = h.get(&Param::new("skipClean").literal("false"), env)?;
    if skip {
        tracing::info!("Skipping ndk clean");
        return Ok(GoalOutput::default());
    }
    let libs: PathBuf = h.get(
        &Param::new("libsOutputDirectory").literal("${project.basedir}/libs"),
        env,
    )?;
    let skip_libs: bool = h.get(
        &Param::new("skipCleanLibsOutputDirectory").literal("true"),
        env,
    )?;
    let obj: PathBuf = h.get(
        &Param::new("objOutputDirectory").literal("${project.basedir}/obj"),
        env,
    )?;
    let skip_obj: bool = h.get(
        &Param::new("skipCleanObjOutputDirectory").literal("false"),
        env,
    )?;
    if !skip_libs {
        clean(&env.absolute(&libs));
    }
    if !skip_obj {
        clean(&env.absolute(&obj));
    }
    Ok(GoalOutput::default())
}
