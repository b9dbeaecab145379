use crate::params::Param;
use crate::{manifest, BuildEnv, GoalFailure, GoalOutput};
use anyhow::Result;
use droidcommon::Execute;
use regex::Regex;
use std::sync::OnceLock;

fn manifest_package(env: &BuildEnv) -> Result<Option<String>> {
    Ok(Some(manifest::package_name(&env.manifest())?))
}

fn passed_pattern() -> Option<&'static Regex> {
    static PASSED: OnceLock<Option<Regex>> = OnceLock::new();
    PASSED
        .get_or_init(|| {
            Regex::new(r"(?s)\A.*?OK \([0-9]+ tests?\)\s*\z")
                .map_err(|err| tracing::error!("invalid test result pattern: {}", err))
                .ok()
        })
        .as_ref()
}

/// Whether `am instrument -w` output reports a passing run.
pub fn tests_passed(stdout: &str) -> bool {
    passed_pattern()
        .map(|re| re.is_match(stdout))
        .unwrap_or_default()
}

/// Runs the instrumentation tests of this project on the device.
pub fn instrument<E: Execute>(env: &BuildEnv, exec: &mut E) -> Result<GoalOutput> {
    let h = env.handler("test");
    let skip: bool = h.get(&Param::new("skip").literal("false"), env)?;
    let enabled: bool = h.get(&Param::new("enableIntegrationTest").literal("true"), env)?;
    if skip || !enabled || env.properties().is_true("test.skip") {
        tracing::info!("Skipping instrumentation tests");
        return Ok(GoalOutput::default());
    }
    let package: String = h.get(
        &Param::new("instrumentationPackage").provider(manifest_package),
        env,
    )?;
    let runner: String = h.get(
        &Param::new("instrumentationRunner").literal("android.test.InstrumentationTestRunner"),
        env,
    )?;
    tracing::info!("Running instrumentation tests in {}", package);
    let result = exec.execute(&env.adb()?.instrument(&package, &runner))?;
    let output = result.stdout.clone();
    for line in output.lines() {
        tracing::info!("{}", line);
    }
    if !tests_passed(&output) {
        return Err(GoalFailure::TestsFailed { output }.into());
    }
    Ok(GoalOutput::default())
}
