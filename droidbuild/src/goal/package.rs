use crate::params::Param;
use crate::{BuildEnv, GoalOutput};
use anyhow::Result;
use droidcommon::{Command, Execute};

/// Compiles resources and assets into `<final>.ap_`.
pub fn package_resources<E: Execute>(env: &BuildEnv, exec: &mut E) -> Result<GoalOutput> {
    let sdk = env.sdk()?;
    let output = env.output("ap_");
    std::fs::create_dir_all(env.build_dir())?;
    let mut cmd = Command::new(sdk.tool("aapt")?)
        .arg("package")
        .arg("-f")
        .arg("-M")
        .arg(env.manifest());
    let res = env.res_dir();
    if res.is_dir() {
        cmd = cmd.arg("-S").arg(res);
    }
    let assets = env.assets_dir();
    if assets.is_dir() {
        cmd = cmd.arg("-A").arg(assets);
    }
    let cmd = cmd
        .arg("-I")
        .arg(sdk.android_jar())
        .arg("-F")
        .arg(&output)
        .current_dir(env.root_dir());
    tracing::info!("Packaging resources into {}", output.display());
    exec.execute(&cmd)?;
    let mut goal = GoalOutput::default();
    goal.attach("ap_", output);
    Ok(goal)
}

/// Builds `<final>.apk` from the packaged resources and `classes.dex`.
pub fn apk<E: Execute>(env: &BuildEnv, exec: &mut E) -> Result<GoalOutput> {
    let delay_signed: bool = env
        .handler("apk")
        .get(&Param::new("delaySigned").literal("false"), env)?;
    let output = env.output("apk");
    let unsigned = delay_signed.then_some("-u");
    let cmd = Command::new(env.sdk()?.tool("apkbuilder")?)
        .arg(&output)
        .args(unsigned)
        .arg("-z")
        .arg(env.output("ap_"))
        .arg("-f")
        .arg(env.build_dir().join("classes.dex"))
        .arg("-rf")
        .arg(env.source_dir())
        .current_dir(env.root_dir());
    exec.execute(&cmd)?;
    let mut goal = GoalOutput::default();
    goal.attach("apk", output);
    Ok(goal)
}
