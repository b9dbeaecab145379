use crate::goal::Goal;
use crate::task::TaskRunner;
use crate::{BuildEnv, GoalOutput};
use anyhow::Result;
use droidcommon::Execute;

/// Build lifecycle phases with Android goals bound to them.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum Phase {
    GenerateSources,
    ProcessClasses,
    PreparePackage,
    Package,
    PreIntegrationTest,
    IntegrationTest,
}

impl Phase {
    const ALL: [Phase; 6] = [
        Phase::GenerateSources,
        Phase::ProcessClasses,
        Phase::PreparePackage,
        Phase::Package,
        Phase::PreIntegrationTest,
        Phase::IntegrationTest,
    ];

    fn bound_goals(self) -> &'static [Goal] {
        match self {
            Self::GenerateSources => &[Goal::GenerateSources],
            Self::ProcessClasses => &[Goal::Proguard, Goal::Emma],
            Self::PreparePackage => &[Goal::Dex],
            Self::Package => &[Goal::PackageResources, Goal::Apk],
            Self::PreIntegrationTest => &[Goal::DeployDependencies, Goal::Deploy],
            Self::IntegrationTest => &[Goal::Instrument],
        }
    }

    /// Goals of this phase and every phase before it, in order.
    pub fn goals(self) -> Vec<Goal> {
        Self::ALL
            .iter()
            .filter(|phase| **phase <= self)
            .flat_map(|phase| phase.bound_goals().iter().copied())
            .collect()
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            Self::GenerateSources => "generate-sources",
            Self::ProcessClasses => "process-classes",
            Self::PreparePackage => "prepare-package",
            Self::Package => "package",
            Self::PreIntegrationTest => "pre-integration-test",
            Self::IntegrationTest => "integration-test",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for Phase {
    type Err = anyhow::Error;

    fn from_str(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|phase| phase.to_string() == name)
            .ok_or_else(|| anyhow::anyhow!("unknown phase {}", name))
    }
}

/// Runs every goal up to and including `phase`, one numbered task each.
pub fn run_phase<E: Execute>(env: &BuildEnv, exec: &mut E, phase: Phase) -> Result<GoalOutput> {
    let goals = phase.goals();
    let mut runner = TaskRunner::new(goals.len() as u32, env.verbose());
    let mut output = GoalOutput::default();
    for goal in goals {
        runner.start_task(goal.to_string());
        match goal.run(env, exec) {
            Ok(goal_output) => {
                runner.end_task();
                output.extend(goal_output);
            }
            Err(err) => {
                runner.fail_task();
                return Err(err.context(format!("goal {} failed", goal)));
            }
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal::tests::Recorder;
    use crate::tests::TestProject;

    #[test]
    fn phases_accumulate_goals() {
        assert_eq!(Phase::GenerateSources.goals(), [Goal::GenerateSources]);
        assert_eq!(
            Phase::Package.goals(),
            [
                Goal::GenerateSources,
                Goal::Proguard,
                Goal::Emma,
                Goal::Dex,
                Goal::PackageResources,
                Goal::Apk
            ]
        );
        assert_eq!(
            Phase::IntegrationTest.goals(),
            [
                Goal::GenerateSources,
                Goal::Proguard,
                Goal::Emma,
                Goal::Dex,
                Goal::PackageResources,
                Goal::Apk,
                Goal::DeployDependencies,
                Goal::Deploy,
                Goal::Instrument
            ]
        );
    }

    #[test]
    fn parses_phase_names() {
        for phase in Phase::ALL {
            assert_eq!(phase.to_string().parse::<Phase>().unwrap(), phase);
        }
        assert!("compile".parse::<Phase>().is_err());
    }

    #[test]
    fn runs_goals_in_order() -> Result<()> {
        let project = TestProject::new("name: demo\nversion: \"1.0\"\ndex:\n  attachJar: false\n");
        let env = project.env();
        let mut exec = Recorder::default();
        let output = run_phase(&env, &mut exec, Phase::Package)?;
        // aapt for R.java, dx, aapt package, apkbuilder; proguard is skipped
        assert_eq!(exec.commands.len(), 4);
        assert_eq!(exec.args(2)[..2], ["package", "-f"]);
        let kinds: Vec<_> = output.attached.iter().map(|a| a.kind.as_str()).collect();
        assert_eq!(kinds, ["ap_", "apk"]);
        let registry = crate::artifact::load(&env.build_dir())?;
        assert_eq!(registry.len(), 2);
        Ok(())
    }

    #[test]
    fn proguard_runs_before_dex() -> Result<()> {
        let project = TestProject::new("name: demo\nversion: \"1.0\"\nproguard:\n  skip: false\ndex:\n  attachJar: false\n");
        project.write("proguard.cfg", "-keep class *");
        let env = project.env();
        let mut exec = Recorder::default();
        run_phase(&env, &mut exec, Phase::PreparePackage)?;
        assert_eq!(exec.commands.len(), 3);
        assert!(exec.args(1).iter().any(|arg| arg == "-outjars"));
        assert!(exec.args(2).contains(&"--dex".to_string()));
        Ok(())
    }

    #[test]
    fn failing_goal_stops_the_phase() {
        let project = TestProject::new("");
        let mut exec = Recorder::default().fail(1, "ERROR: no manifest");
        let err = run_phase(&project.env(), &mut exec, Phase::Package).unwrap_err();
        assert_eq!(exec.commands.len(), 1);
        assert!(err.to_string().contains("generate-sources"));
    }
}
