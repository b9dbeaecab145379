use crate::adb::Adb;
use crate::sdk::{self, AndroidSdk};
use anyhow::{anyhow, Result};
use droidcommon::{Command, Execute};
use std::fmt::Write;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct Doctor {
    groups: Vec<Group>,
}

impl Doctor {
    pub fn new(sdk: Result<&AndroidSdk>) -> Self {
        let sdk = sdk.map_err(|err| format!("{:#}", err));
        let tool = |name: &str| match &sdk {
            Ok(sdk) => sdk.tool(name),
            Err(err) => Err(anyhow!("{}", err)),
        };
        let adb = tool("adb").or_else(|_| Adb::which());
        let dx = match &sdk {
            Ok(sdk) => sdk.dx_jar(),
            Err(err) => Err(anyhow!("{}", err)),
        };
        let mut groups = vec![Group {
            name: "java",
            checks: vec![
                Check::with_path("java", Ok(sdk::java()), Some(VersionCheck::new("--version", 0, 1))),
                Check::new("javac", Some(VersionCheck::new("--version", 0, 1))),
            ],
        }];
        groups.push(Group {
            name: "android sdk",
            checks: vec![
                Check::with_path("adb", adb, Some(VersionCheck::new("--version", 0, 4))),
                Check::with_path("aapt", tool("aapt"), Some(VersionCheck::new("version", 0, 4))),
                Check::with_path("aidl", tool("aidl"), None),
                Check::with_path("apkbuilder", tool("apkbuilder"), None),
                Check::with_path("zipalign", tool("zipalign"), None),
                Check::with_path("dx.jar", dx, None),
            ],
        });
        Self { groups }
    }

    /// Runs the version checks and renders the report.
    pub fn report<E: Execute>(&self, exec: &mut E) -> String {
        let mut out = String::new();
        for group in &self.groups {
            group.report(exec, &mut out).ok();
        }
        out
    }
}

#[derive(Debug)]
struct Group {
    name: &'static str,
    checks: Vec<Check>,
}

impl Group {
    fn report<E: Execute>(&self, exec: &mut E, f: &mut String) -> std::fmt::Result {
        writeln!(f, "{:-^1$}", self.name, 60)?;
        for check in &self.checks {
            write!(f, "{:20} ", check.name)?;
            if let Ok(path) = check.path() {
                let version = match check.version(exec, &path) {
                    Ok(Some(version)) => version,
                    _ => "unknown".into(),
                };
                write!(f, "{:20}", version)?;
                write!(f, "{}", path.display())?;
            } else {
                write!(f, "not found")?;
            }
            writeln!(f)?;
        }
        writeln!(f)
    }
}

#[derive(Debug)]
struct Check {
    name: &'static str,
    location: Option<Result<PathBuf>>,
    version: Option<VersionCheck>,
}

impl Check {
    const fn new(name: &'static str, version: Option<VersionCheck>) -> Self {
        Self {
            name,
            location: None,
            version,
        }
    }

    const fn with_path(name: &'static str, path: Result<PathBuf>, version: Option<VersionCheck>) -> Self {
        Self {
            name,
            location: Some(path),
            version,
        }
    }

    fn path(&self) -> Result<PathBuf> {
        Ok(match &self.location {
            Some(Ok(path)) => path.clone(),
            Some(Err(err)) => anyhow::bail!("{:#}", err),
            None => which::which(self.name)?,
        })
    }

    fn version<E: Execute>(&self, exec: &mut E, path: &Path) -> Result<Option<String>> {
        let Some(version) = self.version else {
            return Ok(None);
        };
        let cmd = Command::new(path)
            .args(version.arg.split(' '))
            .fail_on_stderr(false);
        let result = exec.execute(&cmd)?;
        // Some JDKs print their version on stderr.
        let output = if result.stdout.trim().is_empty() {
            &result.stderr
        } else {
            &result.stdout
        };
        version
            .parse(output)
            .map(Some)
            .ok_or_else(|| anyhow!("failed to parse version: {:?}", output))
    }
}

#[derive(Clone, Copy, Debug)]
struct VersionCheck {
    arg: &'static str,
    row: u8,
    col: u8,
}

impl VersionCheck {
    const fn new(arg: &'static str, row: u8, col: u8) -> Self {
        Self { arg, row, col }
    }

    fn parse(&self, output: &str) -> Option<String> {
        let line = output.lines().nth(self.row as _)?;
        line.split(' ').nth(self.col as _).map(str::to_string)
    }
}

/// Prints the java and Android SDK tools that were found.
pub fn doctor<E: Execute>(sdk: Result<&AndroidSdk>, exec: &mut E) {
    print!("{}", Doctor::new(sdk).report(exec));
}
