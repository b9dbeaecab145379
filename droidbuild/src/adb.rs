use crate::error::GoalFailure;
use droidcommon::Command;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct Adb {
    path: PathBuf,
    serial: Option<String>,
}

impl Adb {
    pub fn new(path: PathBuf, serial: Option<String>) -> Self {
        Self { path, serial }
    }

    pub fn which() -> anyhow::Result<PathBuf> {
        Ok(which::which(exe!("adb"))?)
    }

    fn adb(&self) -> Command {
        let cmd = Command::new(&self.path);
        match &self.serial {
            Some(serial) => cmd.arg("-s").arg(serial),
            None => cmd,
        }
    }

    pub fn devices(&self) -> Command {
        Command::new(&self.path).arg("devices")
    }

    /// `adb install -r`. Failures are reported on stdout, so stderr is not
    /// fatal here; check the output with [`check_install`].
    pub fn install(&self, apk: &Path) -> Command {
        self.adb()
            .arg("install")
            .arg("-r")
            .arg(apk)
            .fail_on_stderr(false)
    }

    pub fn uninstall(&self, package: &str, keep_data: bool) -> Command {
        let cmd = self.adb().arg("uninstall");
        let cmd = if keep_data { cmd.arg("-k") } else { cmd };
        cmd.arg(package)
    }

    pub fn push(&self, source: &Path, destination: &str) -> Command {
        self.adb().arg("push").arg(source).arg(destination)
    }

    pub fn pull(&self, source: &str, destination: &Path) -> Command {
        self.adb().arg("pull").arg(source).arg(destination)
    }

    pub fn instrument(&self, package: &str, runner: &str) -> Command {
        self.adb()
            .arg("shell")
            .arg("am")
            .arg("instrument")
            .arg("-w")
            .arg(format!("{}/{}", package, runner))
    }
}

pub fn check_install(apk: &Path, stdout: &str) -> Result<(), GoalFailure> {
    if stdout.contains("Failure") {
        return Err(GoalFailure::InstallFailed {
            apk: apk.to_path_buf(),
            output: stdout.trim().to_string(),
        });
    }
    Ok(())
}

/// Serial and state of every device in `adb devices` output.
pub fn parse_devices(stdout: &str) -> Vec<(String, String)> {
    stdout
        .lines()
        .skip_while(|line| !line.starts_with("List of devices"))
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            let state = parts.next().unwrap_or("unknown");
            Some((serial.to_string(), state.to_string()))
        })
        .collect()
}
