use crate::adb::{check_install, Adb};
use crate::artifact::ArtifactType;
use crate::manifest::package_from_xmltree;
use crate::params::Param;
use crate::{BuildEnv, GoalOutput};
use anyhow::{Context, Result};
use droidcommon::{Command, Execute};
use std::path::{Path, PathBuf};

fn built_apk(env: &BuildEnv) -> Result<Option<PathBuf>> {
    Ok(Some(env.output("apk")))
}

fn install<E: Execute>(exec: &mut E, adb: &Adb, apk: &Path) -> Result<()> {
    tracing::info!("Deploying {} to device", apk.display());
    let result = exec.execute(&adb.install(apk))?;
    check_install(apk, &result.stdout)?;
    Ok(())
}

/// Installs the built apk, uninstalling the old package first on request.
pub fn deploy<E: Execute>(env: &BuildEnv, exec: &mut E) -> Result<GoalOutput> {
    let h = env.handler("deploy");
    let apk: PathBuf = h.get(&Param::new("apk").provider(built_apk), env)?;
    let apk = env.absolute(&apk);
    let undeploy_first: bool = h.get(&Param::new("undeployBeforeDeploy").literal("false"), env)?;
    let adb = env.adb()?;
    if undeploy_first {
        uninstall(env, exec, &adb, &apk, false);
    }
    install(exec, &adb, &apk)?;
    Ok(GoalOutput::default())
}

/// Installs every apk the project depends on.
pub fn deploy_dependencies<E: Execute>(env: &BuildEnv, exec: &mut E) -> Result<GoalOutput> {
    let adb = env.adb()?;
    for dependency in env.dependencies() {
        if dependency.kind == ArtifactType::Apk {
            install(exec, &adb, &env.absolute(&dependency.file))?;
        }
    }
    Ok(GoalOutput::default())
}

fn package_of_apk<E: Execute>(env: &BuildEnv, exec: &mut E, apk: &Path) -> Result<String> {
    let cmd = Command::new(env.sdk()?.tool("aapt")?)
        .arg("dump")
        .arg("xmltree")
        .arg(apk)
        .arg("AndroidManifest.xml");
    let result = exec.execute(&cmd)?;
    package_from_xmltree(&result.stdout)
        .with_context(|| format!("no package found in the manifest of {}", apk.display()))
}

/// Runs `adb uninstall` and reports failures without propagating them.
fn uninstall<E: Execute>(env: &BuildEnv, exec: &mut E, adb: &Adb, apk: &Path, keep_data: bool) -> bool {
    let h = env.handler("undeploy");
    let package: Result<String> = match h.resolve::<_, String>(&Param::new("package"), env) {
        Ok(Some(package)) => Ok(package),
        Ok(None) => package_of_apk(env, exec, apk),
        Err(err) => Err(err.into()),
    };
    let package = match package {
        Ok(package) => package,
        Err(err) => {
            tracing::error!("Unable to determine the package to undeploy: {:#}", err);
            return false;
        }
    };
    tracing::info!("Undeploying {} from device", package);
    match exec.execute(&adb.uninstall(&package, keep_data)) {
        Ok(result) => {
            tracing::info!("{}", result.stdout.trim());
            true
        }
        Err(err) => {
            tracing::error!("{}", err);
            false
        }
    }
}

/// Removes the package from the device. Failures are logged, the goal
/// itself only fails on invalid settings.
pub fn undeploy<E: Execute>(env: &BuildEnv, exec: &mut E) -> Result<GoalOutput> {
    let h = env.handler("undeploy");
    let apk: PathBuf = h.get(&Param::new("apk").provider(built_apk), env)?;
    let keep_data: bool = h.get(&Param::new("keepData").literal("false"), env)?;
    let adb = env.adb()?;
    if !uninstall(env, exec, &adb, &env.absolute(&apk), keep_data) {
        tracing::warn!("undeploy did not succeed");
    }
    Ok(GoalOutput::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal::tests::Recorder;
    use crate::tests::TestProject;
    use crate::GoalFailure;

    const XMLTREE: &str = "N: android=http://schemas.android.com/apk/res/android\n  E: manifest (line=2)\n    A: package=\"com.example.apidemos\" (Raw: \"com.example.apidemos\")\n";

    #[test]
    fn installs_built_apk() -> Result<()> {
        let project = TestProject::new("name: demo\nversion: \"1.0\"\n");
        let env = crate::BuildEnv::new(project.args().define("android.device", "emulator-5554"))?;
        let mut exec = Recorder::default().respond("Success\n");
        deploy(&env, &mut exec)?;
        let apk = env.output("apk").display().to_string();
        assert_eq!(exec.args(0), ["-s", "emulator-5554", "install", "-r", apk.as_str()]);
        Ok(())
    }

    #[test]
    fn failure_on_stdout_fails_deploy() {
        let project = TestProject::new("");
        let mut exec = Recorder::default().respond("Failure [INSTALL_FAILED_ALREADY_EXISTS]\n");
        let err = deploy(&project.env(), &mut exec).unwrap_err();
        let failure = err.downcast_ref::<GoalFailure>();
        assert!(matches!(failure, Some(GoalFailure::InstallFailed { .. })));
        assert!(err.to_string().contains("android.deploy.undeployBeforeDeploy=true"));
    }

    #[test]
    fn undeploys_before_deploy() -> Result<()> {
        let project = TestProject::new("deploy:\n  undeployBeforeDeploy: true\n");
        let env = project.env();
        let mut exec = Recorder::default().respond(XMLTREE).respond("Success");
        deploy(&env, &mut exec)?;
        assert_eq!(exec.commands.len(), 3);
        assert_eq!(exec.args(0)[..2], ["dump", "xmltree"]);
        assert_eq!(exec.args(1), ["uninstall", "com.example.apidemos"]);
        assert_eq!(exec.args(2)[0], "install");
        Ok(())
    }

    #[test]
    fn undeploy_failures_are_not_fatal() -> Result<()> {
        let project = TestProject::new("undeploy:\n  package: com.example\n  keepData: true\n");
        let mut exec = Recorder::default().fail(1, "device offline");
        undeploy(&project.env(), &mut exec)?;
        assert_eq!(exec.args(0), ["uninstall", "-k", "com.example"]);

        let mut exec = Recorder::default().respond("no manifest here");
        undeploy(&TestProject::new("").env(), &mut exec)?;
        assert_eq!(exec.commands.len(), 1);
        Ok(())
    }

    #[test]
    fn deploys_apk_dependencies() -> Result<()> {
        let project = TestProject::new(
            "dependencies:\n  - coordinates: com.example:app:1.0:apk\n    file: libs/app.apk\n  - coordinates: com.example:util:1.0\n    file: libs/util.jar\n",
        );
        let apk = project.write("libs/app.apk", "");
        let mut exec = Recorder::default();
        deploy_dependencies(&project.env(), &mut exec)?;
        assert_eq!(exec.commands.len(), 1);
        assert_eq!(exec.args(0)[2], dunce::canonicalize(apk)?.display().to_string());
        Ok(())
    }
}
