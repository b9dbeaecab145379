use crate::{artifact, BuildEnv, GoalOutput};
use anyhow::Result;
use droidcommon::Execute;

mod deploy;
mod dex;
mod doctor;
mod emma;
mod instrument;
mod merge;
mod ndk;
mod package;
mod par;
mod proguard;
mod sources;
mod transfer;
mod zipalign;

pub use deploy::{deploy, deploy_dependencies, undeploy};
pub use dex::{dex, dex_command, dex_inputs, DexConfig};
pub use doctor::doctor;
pub use emma::emma;
pub use instrument::{instrument, tests_passed};
pub use merge::merge_manifests;
pub use ndk::ndk_clean;
pub use package::{apk, package_resources};
pub use par::{par_deploy, par_package, par_resources};
pub use proguard::{obfuscated_jar, proguard, proguard_command, ProguardConfig};
pub use sources::generate_sources;
pub use transfer::{pull, push};
pub use zipalign::zipalign;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Goal {
    GenerateSources,
    Proguard,
    Emma,
    Dex,
    PackageResources,
    Apk,
    Zipalign,
    MergeManifests,
    Deploy,
    DeployDependencies,
    Undeploy,
    Instrument,
    Push,
    Pull,
    NdkClean,
    ParResources,
    ParPackage,
    ParDeploy,
}

impl std::fmt::Display for Goal {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            Self::GenerateSources => "generate-sources",
            Self::Proguard => "proguard",
            Self::Emma => "emma",
            Self::Dex => "dex",
            Self::PackageResources => "package-resources",
            Self::Apk => "apk",
            Self::Zipalign => "zipalign",
            Self::MergeManifests => "merge-manifests",
            Self::Deploy => "deploy",
            Self::DeployDependencies => "deploy-dependencies",
            Self::Undeploy => "undeploy",
            Self::Instrument => "instrument",
            Self::Push => "push",
            Self::Pull => "pull",
            Self::NdkClean => "ndk-clean",
            Self::ParResources => "par-resources",
            Self::ParPackage => "par-package",
            Self::ParDeploy => "par-deploy",
        };
        write!(f, "{}", name)
    }
}

impl Goal {
    /// Runs the goal and records the artifacts it attached.
    pub fn run<E: Execute>(self, env: &BuildEnv, exec: &mut E) -> Result<GoalOutput> {
        tracing::debug!("running goal {}", self);
        let output = match self {
            Self::GenerateSources => generate_sources(env, exec)?,
            Self::Proguard => proguard(env, exec)?,
            Self::Emma => emma(env, exec)?,
            Self::Dex => dex(env, exec)?,
            Self::PackageResources => package_resources(env, exec)?,
            Self::Apk => apk(env, exec)?,
            Self::Zipalign => zipalign(env, exec)?,
            Self::MergeManifests => merge_manifests(env, exec)?,
            Self::Deploy => deploy(env, exec)?,
            Self::DeployDependencies => deploy_dependencies(env, exec)?,
            Self::Undeploy => undeploy(env, exec)?,
            Self::Instrument => instrument(env, exec)?,
            Self::Push => push(env, exec)?,
            Self::Pull => pull(env, exec)?,
            Self::NdkClean => ndk_clean(env)?,
            Self::ParResources => par_resources(env)?,
            Self::ParPackage => par_package(env)?,
            Self::ParDeploy => par_deploy(env)?,
        };
        for root in &output.source_roots {
            tracing::info!("added source root {}", root.display());
        }
        artifact::record(&env.build_dir(), &output.attached)?;
        Ok(output)
    }
}

/// Lists the devices adb can see.
pub fn devices<E: Execute>(env: &BuildEnv, exec: &mut E) -> Result<()> {
    let adb = env.adb()?;
    let result = exec.execute(&adb.devices().fail_on_stderr(false))?;
    for (serial, state) in crate::adb::parse_devices(&result.stdout) {
        println!("{:30}{}", serial, state);
    }
    Ok(())
}
