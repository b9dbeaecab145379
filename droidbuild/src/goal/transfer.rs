use crate::params::Param;
use crate::{BuildEnv, GoalOutput};
use anyhow::Result;
use droidcommon::Execute;
use std::path::PathBuf;

/// Copies a local file or directory to the device.
pub fn push<E: Execute>(env: &BuildEnv, exec: &mut E) -> Result<GoalOutput> {
    let h = env.handler("push");
    let source: PathBuf = h.get(&Param::new("source").required(), env)?;
    let destination: String = h.get(&Param::new("destination").required(), env)?;
    let source = env.absolute(&source);
    tracing::info!("Pushing {} to {}", source.display(), destination);
    exec.execute(&env.adb()?.push(&source, &destination))?;
    Ok(GoalOutput::default())
}

/// Copies a file or directory from the device.
pub fn pull<E: Execute>(env: &BuildEnv, exec: &mut E) -> Result<GoalOutput> {
    let h = env.handler("pull");
    let source: String = h.get(&Param::new("source").required(), env)?;
    let destination: PathBuf = h.get(&Param::new("destination").required(), env)?;
    let destination = env.absolute(&destination);
    tracing::info!("Pulling {} to {}", source, destination.display());
    exec.execute(&env.adb()?.pull(&source, &destination))?;
    Ok(GoalOutput::default())
}
