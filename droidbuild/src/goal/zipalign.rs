use crate::params::Param;
use crate::{BuildEnv, GoalOutput};
use anyhow::Result;
use droidcommon::{Command, Execute};
use std::path::PathBuf;

/// Aligns the apk on 4 byte boundaries and attaches the result with the
/// `aligned` classifier.
pub fn zipalign<E: Execute>(env: &BuildEnv, exec: &mut E) -> Result<GoalOutput> {
    let h = env.handler("zipalign");
    let skip: bool = h.get(&Param::new("skip").literal("false"), env)?;
    if skip {
        tracing::info!("Skipping zipalign");
        return Ok(GoalOutput::default());
    }
    let verbose: bool = h.get(&Param::new("verbose").literal("false"), env)?;
    let input: PathBuf = h.get(
        &Param::new("inputApk").literal("${project.build.directory}/${project.build.finalName}.apk"),
        env,
    )?;
    let output: PathBuf = h.get(
        &Param::new("outputApk")
            .literal("${project.build.directory}/${project.build.finalName}-aligned.apk"),
        env,
    )?;
    let input = env.absolute(&input);
    let output = env.absolute(&output);
    let cmd = Command::new(env.sdk()?.tool("zipalign")?)
        .args(verbose.then_some("-v"))
        .arg("-f")
        .arg("4")
        .arg(&input)
        .arg(&output)
        .current_dir(env.root_dir());
    exec.execute(&cmd)?;

    let mut goal = GoalOutput::default();
    if output.is_file() {
        tracing::info!("Attach {} to the project", output.display());
        goal.attach_classified("apk", "aligned", output);
    } else {
        tracing::error!(
            "Cannot attach {} to the project - the file does not exist",
            output.display()
        );
    }
    Ok(goal)
}
