use crate::adb::Adb;
use crate::artifact::{Artifact, AttachedArtifact};
use crate::config::Config;
use crate::params::{ConfigHandler, Properties};
use crate::sdk::AndroidSdk;
use anyhow::{Context, Result};
use clap::Parser;
use std::cell::OnceCell;
use std::path::{Path, PathBuf};

#[macro_export]
macro_rules! exe {
    ($name:expr) => {
        if cfg!(target_os = "windows") {
            concat!($name, ".exe")
        } else {
            $name
        }
    };
}

pub mod adb;
pub mod artifact;
pub mod config;
pub mod error;
pub mod goal;
pub mod lifecycle;
pub mod manifest;
pub mod params;
pub mod sdk;
mod task;

pub use error::GoalFailure;

fn parse_define(define: &str) -> Result<(String, String)> {
    let (key, value) = define
        .split_once('=')
        .with_context(|| format!("expected KEY=VALUE, found `{}`", define))?;
    anyhow::ensure!(!key.is_empty(), "empty property name in `{}`", define);
    Ok((key.to_string(), value.to_string()))
}

#[derive(Clone, Debug, Default, Parser)]
pub struct BuildArgs {
    /// Project directory containing android.yaml
    #[clap(long, short = 'C')]
    project_dir: Option<PathBuf>,
    /// Project file, relative to the project directory
    #[clap(long, default_value = "android.yaml")]
    project_file: PathBuf,
    /// Set a property, e.g. -D android.dex.coreLibrary=true
    #[clap(short = 'D', value_parser = parse_define)]
    define: Vec<(String, String)>,
    /// Path to the Android SDK
    #[clap(long)]
    sdk: Option<PathBuf>,
    /// Serial of the device adb talks to
    #[clap(long, short)]
    device: Option<String>,
    /// Use verbose output
    #[clap(long, short)]
    verbose: bool,
}

impl BuildArgs {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: Some(project_dir.into()),
            project_file: "android.yaml".into(),
            ..Default::default()
        }
    }

    pub fn define(mut self, key: &str, value: &str) -> Self {
        self.define.push((key.to_string(), value.to_string()));
        self
    }

    pub fn sdk(mut self, sdk: impl Into<PathBuf>) -> Self {
        self.sdk = Some(sdk.into());
        self
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }
}

/// Everything produced by one goal.
#[derive(Debug, Default)]
pub struct GoalOutput {
    pub attached: Vec<AttachedArtifact>,
    pub source_roots: Vec<PathBuf>,
}

impl GoalOutput {
    pub fn attach(&mut self, kind: &str, file: PathBuf) {
        self.attached.push(AttachedArtifact::new(kind, file));
    }

    pub fn attach_classified(&mut self, kind: &str, classifier: &str, file: PathBuf) {
        let mut artifact = AttachedArtifact::new(kind, file);
        artifact.classifier = Some(classifier.to_string());
        self.attached.push(artifact);
    }

    pub fn extend(&mut self, other: GoalOutput) {
        self.attached.extend(other.attached);
        self.source_roots.extend(other.source_roots);
    }
}

pub struct BuildEnv {
    root_dir: PathBuf,
    config: Config,
    properties: Properties,
    sdk_path: Option<PathBuf>,
    sdk: OnceCell<AndroidSdk>,
    device: Option<String>,
    verbose: bool,
}

impl BuildEnv {
    pub fn new(args: BuildArgs) -> Result<Self> {
        let root_dir = match args.project_dir {
            Some(dir) => dir,
            None => std::env::current_dir()?,
        };
        let root_dir = dunce::canonicalize(&root_dir)
            .with_context(|| format!("project directory {} not found", root_dir.display()))?;
        let default_name = root_dir
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "app".to_string());
        let config = Config::parse(root_dir.join(&args.project_file), &default_name)?;
        let sdk_path = args
            .sdk
            .or_else(|| config.sdk.path.as_ref().map(|path| root_dir.join(path)))
            .or_else(AndroidSdk::path_from_env);

        let mut properties = Properties::new();
        for (key, value) in &config.properties {
            properties.set(key, value);
        }
        for (key, value) in args.define {
            properties.set(key, value);
        }
        let device = args
            .device
            .or_else(|| properties.get("android.device").map(str::to_string));
        let mut env = Self {
            root_dir,
            config,
            properties,
            sdk_path,
            sdk: OnceCell::new(),
            device,
            verbose: args.verbose,
        };
        env.set_builtin_properties();
        Ok(env)
    }

    fn set_builtin_properties(&mut self) {
        let builtins = [
            ("project.basedir", self.root_dir.display().to_string()),
            ("project.build.directory", self.build_dir().display().to_string()),
            (
                "project.build.outputDirectory",
                self.classes_dir().display().to_string(),
            ),
            ("project.build.finalName", self.config.final_name.clone()),
            ("project.artifactId", self.config.name.clone()),
            ("project.version", self.config.version.clone()),
            ("file.separator", std::path::MAIN_SEPARATOR.to_string()),
        ];
        for (key, value) in builtins {
            self.properties.set(key, value);
        }
        if let Some(sdk) = &self.sdk_path {
            self.properties
                .set("android.sdk.path", sdk.display().to_string());
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn final_name(&self) -> &str {
        &self.config.final_name
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Settings resolver for the goal group `group`.
    pub fn handler<'a>(&'a self, group: &'a str) -> ConfigHandler<'a> {
        ConfigHandler::new(group, self.config.section(group), &self.properties)
    }

    /// Resolves `path` against the project directory.
    pub fn absolute(&self, path: &Path) -> PathBuf {
        let path = self.root_dir.join(path);
        dunce::canonicalize(&path).unwrap_or(path)
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn build_dir(&self) -> PathBuf {
        self.root_dir.join(&self.config.layout.build)
    }

    pub fn classes_dir(&self) -> PathBuf {
        match &self.config.layout.classes {
            Some(classes) => self.root_dir.join(classes),
            None => self.build_dir().join("classes"),
        }
    }

    pub fn source_dir(&self) -> PathBuf {
        self.root_dir.join(&self.config.layout.source)
    }

    pub fn resource_dirs(&self) -> Vec<PathBuf> {
        self.config
            .layout
            .resources
            .iter()
            .map(|dir| self.root_dir.join(dir))
            .collect()
    }

    pub fn res_dir(&self) -> PathBuf {
        self.root_dir.join(&self.config.layout.res)
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.root_dir.join(&self.config.layout.assets)
    }

    pub fn manifest(&self) -> PathBuf {
        self.root_dir.join(&self.config.layout.manifest)
    }

    /// `<build>/<finalName>.<extension>`
    pub fn output(&self, extension: &str) -> PathBuf {
        self.build_dir()
            .join(format!("{}.{}", self.final_name(), extension))
    }

    pub fn dependencies(&self) -> &[Artifact] {
        &self.config.dependencies
    }

    pub fn sdk(&self) -> Result<&AndroidSdk> {
        if let Some(sdk) = self.sdk.get() {
            return Ok(sdk);
        }
        let path = self.sdk_path.as_ref().context(
            "Android SDK not found. Set ANDROID_HOME, sdk.path in android.yaml or pass --sdk",
        )?;
        let sdk = AndroidSdk::new(path, self.config.sdk.platform.as_deref())?;
        Ok(self.sdk.get_or_init(|| sdk))
    }

    pub fn adb(&self) -> Result<Adb> {
        let path = match self.sdk().and_then(|sdk| sdk.tool("adb")) {
            Ok(path) => path,
            Err(err) => {
                tracing::debug!("{:#}, looking for adb on the PATH", err);
                Adb::which()?
            }
        };
        Ok(Adb::new(path, self.device.clone()))
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A scratch project with a fake SDK next to it.
    pub struct TestProject {
        pub dir: tempfile::TempDir,
        pub sdk: PathBuf,
    }

    impl TestProject {
        pub fn new(android_yaml: &str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let sdk = crate::sdk::tests::fake_sdk(dir.path());
            let root = dir.path().join("app");
            std::fs::create_dir_all(&root).unwrap();
            std::fs::write(root.join("android.yaml"), android_yaml).unwrap();
            Self { dir, sdk }
        }

        pub fn root(&self) -> PathBuf {
            self.dir.path().join("app")
        }

        pub fn write(&self, path: &str, contents: &str) -> PathBuf {
            let path = self.root().join(path);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, contents).unwrap();
            path
        }

        pub fn args(&self) -> BuildArgs {
            BuildArgs::new(self.root()).sdk(&self.sdk)
        }

        pub fn env(&self) -> BuildEnv {
            BuildEnv::new(self.args()).unwrap()
        }
    }

    #[test]
    fn builtin_properties() {
        let project = TestProject::new("name: demo\nversion: \"1.2\"\nproperties:\n  android.device: emulator-5554\n");
        let env = project.env();
        let root = dunce::canonicalize(project.root()).unwrap();
        assert_eq!(env.final_name(), "demo-1.2");
        assert_eq!(env.output("apk"), root.join("target").join("demo-1.2.apk"));
        assert_eq!(
            env.properties().get("project.build.outputDirectory"),
            Some(root.join("target").join("classes").to_str().unwrap())
        );
        assert_eq!(env.device(), Some("emulator-5554"));
        assert_eq!(env.sdk().unwrap().platform().api_level, "8");
    }

    #[test]
    fn defines_override_project_properties() {
        let project = TestProject::new("properties:\n  android.dex.coreLibrary: false\n");
        let env = BuildEnv::new(project.args().define("android.dex.coreLibrary", "true")).unwrap();
        assert_eq!(env.properties().get("android.dex.coreLibrary"), Some("true"));
    }

    #[test]
    fn parses_defines() {
        assert_eq!(
            parse_define("a.b=c=d").unwrap(),
            ("a.b".to_string(), "c=d".to_string())
        );
        assert!(parse_define("novalue").is_err());
        assert!(parse_define("=x").is_err());
    }
}
