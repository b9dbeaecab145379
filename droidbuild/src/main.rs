use anyhow::Result;
use clap::{Parser, Subcommand};
use droidbuild::goal::{self, Goal};
use droidbuild::lifecycle::{self, Phase};
use droidbuild::{BuildArgs, BuildEnv};
use droidcommon::CommandExecutor;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Commands,
}

fn main() -> Result<()> {
    use tracing_subscriber::EnvFilter;
    let args = Args::parse();
    tracing_log::LogTracer::init().ok();
    let default = if args.command.verbose() { "debug" } else { "info" };
    let env = std::env::var("DROID_LOG").unwrap_or_else(|_| default.into());
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(env))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
    log_panics::init();
    args.command.run()
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about the installed tooling
    Doctor {
        #[clap(flatten)]
        args: BuildArgs,
    },
    /// List all connected devices
    Devices {
        #[clap(flatten)]
        args: BuildArgs,
    },
    /// Run every goal bound to a lifecycle phase and the phases before it
    Phase {
        /// generate-sources, process-classes, prepare-package, package,
        /// pre-integration-test or integration-test
        phase: Phase,
        #[clap(flatten)]
        args: BuildArgs,
    },
    /// Generate R.java and the java interfaces of aidl files
    GenerateSources {
        #[clap(flatten)]
        args: BuildArgs,
    },
    /// Shrink and obfuscate the compiled classes with ProGuard
    Proguard {
        #[clap(flatten)]
        args: BuildArgs,
    },
    /// Instrument compiled classes for emma coverage
    Emma {
        #[clap(flatten)]
        args: BuildArgs,
    },
    /// Convert compiled classes to classes.dex
    Dex {
        #[clap(flatten)]
        args: BuildArgs,
    },
    /// Package resources and assets into an .ap_ file
    PackageResources {
        #[clap(flatten)]
        args: BuildArgs,
    },
    /// Build the apk
    Apk {
        #[clap(flatten)]
        args: BuildArgs,
    },
    /// Align the apk on 4 byte boundaries
    Zipalign {
        #[clap(flatten)]
        args: BuildArgs,
    },
    /// Merge the manifests of apklib and aar dependencies
    MergeManifests {
        #[clap(flatten)]
        args: BuildArgs,
    },
    /// Install the apk on a device
    Deploy {
        #[clap(flatten)]
        args: BuildArgs,
    },
    /// Install every apk dependency on a device
    DeployDependencies {
        #[clap(flatten)]
        args: BuildArgs,
    },
    /// Uninstall the package from a device
    Undeploy {
        #[clap(flatten)]
        args: BuildArgs,
    },
    /// Run instrumentation tests on a device
    Instrument {
        #[clap(flatten)]
        args: BuildArgs,
    },
    /// Copy a file to a device
    Push {
        #[clap(flatten)]
        args: BuildArgs,
    },
    /// Copy a file from a device
    Pull {
        #[clap(flatten)]
        args: BuildArgs,
    },
    /// Delete native build outputs
    NdkClean {
        #[clap(flatten)]
        args: BuildArgs,
    },
    /// Collect resources for a provisioning archive
    ParResources {
        #[clap(flatten)]
        args: BuildArgs,
    },
    /// Create the provisioning archive
    ParPackage {
        #[clap(flatten)]
        args: BuildArgs,
    },
    /// Upload the provisioning archive
    ParDeploy {
        #[clap(flatten)]
        args: BuildArgs,
    },
}

impl Commands {
    fn args(&self) -> &BuildArgs {
        match self {
            Self::Doctor { args }
            | Self::Devices { args }
            | Self::Phase { args, .. }
            | Self::GenerateSources { args }
            | Self::Proguard { args }
            | Self::Emma { args }
            | Self::Dex { args }
            | Self::PackageResources { args }
            | Self::Apk { args }
            | Self::Zipalign { args }
            | Self::MergeManifests { args }
            | Self::Deploy { args }
            | Self::DeployDependencies { args }
            | Self::Undeploy { args }
            | Self::Instrument { args }
            | Self::Push { args }
            | Self::Pull { args }
            | Self::NdkClean { args }
            | Self::ParResources { args }
            | Self::ParPackage { args }
            | Self::ParDeploy { args } => args,
        }
    }

    fn verbose(&self) -> bool {
        self.args().verbose()
    }

    fn goal(&self) -> Option<Goal> {
        Some(match self {
            Self::GenerateSources { .. } => Goal::GenerateSources,
            Self::Proguard { .. } => Goal::Proguard,
            Self::Emma { .. } => Goal::Emma,
            Self::Dex { .. } => Goal::Dex,
            Self::PackageResources { .. } => Goal::PackageResources,
            Self::Apk { .. } => Goal::Apk,
            Self::Zipalign { .. } => Goal::Zipalign,
            Self::MergeManifests { .. } => Goal::MergeManifests,
            Self::Deploy { .. } => Goal::Deploy,
            Self::DeployDependencies { .. } => Goal::DeployDependencies,
            Self::Undeploy { .. } => Goal::Undeploy,
            Self::Instrument { .. } => Goal::Instrument,
            Self::Push { .. } => Goal::Push,
            Self::Pull { .. } => Goal::Pull,
            Self::NdkClean { .. } => Goal::NdkClean,
            Self::ParResources { .. } => Goal::ParResources,
            Self::ParPackage { .. } => Goal::ParPackage,
            Self::ParDeploy { .. } => Goal::ParDeploy,
            Self::Doctor { .. } | Self::Devices { .. } | Self::Phase { .. } => return None,
        })
    }

    fn run(self) -> Result<()> {
        let mut exec = CommandExecutor::new();
        let single = self.goal();
        match self {
            Self::Doctor { args } => {
                let env = BuildEnv::new(args)?;
                goal::doctor(env.sdk(), &mut exec);
            }
            Self::Devices { args } => {
                let env = BuildEnv::new(args)?;
                goal::devices(&env, &mut exec)?;
            }
            Self::Phase { phase, args } => {
                let env = BuildEnv::new(args)?;
                lifecycle::run_phase(&env, &mut exec, phase)?;
            }
            other => {
                let env = BuildEnv::new(other.args().clone())?;
                if let Some(goal) = single {
                    goal.run(&env, &mut exec)?;
                }
            }
        }
        Ok(())
    }
}
