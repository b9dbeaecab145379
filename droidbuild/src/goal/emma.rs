use crate::params::Param;
use crate::{sdk, BuildEnv, GoalOutput};
use anyhow::Result;
use droidcommon::{Command, Execute};
use std::path::PathBuf;

fn emma_jar(env: &BuildEnv) -> Result<Option<PathBuf>> {
    Ok(Some(env.sdk()?.emma_jar()))
}

/// Instruments the compiled classes for coverage when enabled.
pub fn emma<E: Execute>(env: &BuildEnv, exec: &mut E) -> Result<GoalOutput> {
    let h = env.handler("emma");
    let enabled: bool = h.get(&Param::new("enable").literal("false"), env)?;
    if !enabled {
        tracing::debug!("emma instrumentation disabled");
        return Ok(GoalOutput::default());
    }
    let class_folders: Vec<PathBuf> = h.get(
        &Param::new("classFolders").literal("${project.build.outputDirectory}"),
        env,
    )?;
    let meta: PathBuf = h.get(
        &Param::new("outputMetaFile").literal("${project.build.directory}/emma/coverage.em"),
        env,
    )?;
    let filters: Option<String> = h.resolve(&Param::new("filters"), env)?;
    let jar: PathBuf = h.get(&Param::new("jar").provider(emma_jar), env)?;

    let folders = class_folders
        .iter()
        .map(|dir| env.absolute(dir).display().to_string())
        .collect::<Vec<_>>()
        .join(",");
    let meta = env.absolute(&meta);
    if let Some(parent) = meta.parent() {
        std::fs::create_dir_all(parent)?;
    }
    tracing::info!("Instrumenting {} for coverage", folders);
    let mut cmd = Command::new(sdk::java())
        .arg("-cp")
        .arg(env.absolute(&jar))
        .arg("emma")
        .arg("instr")
        .arg("-m")
        .arg("overwrite")
        .arg("-ip")
        .arg(folders)
        .arg("-out")
        .arg(&meta)
        .arg("-merge")
        .arg("yes");
    if let Some(filters) = filters {
        cmd = cmd.arg("-ix").arg(filters);
    }
    exec.execute(&cmd.current_dir(env.root_dir()))?;
    Ok(GoalOutput::default())
}
