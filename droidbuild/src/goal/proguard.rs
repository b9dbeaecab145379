use crate::artifact::{Artifact, Scope};
use crate::params::{ConfigError, Param};
use crate::{sdk, BuildEnv, GoalOutput};
use anyhow::Result;
use droidcommon::{Command, Execute};
use std::path::{Path, PathBuf};

const OBFUSCATED_JAR: &str = "${project.build.directory}/${project.build.finalName}_obfuscated.jar";

const ANDROID_LIBRARY_EXCLUDES: [&str; 4] = ["org/xml/**", "org/w3c/**", "java/**", "javax/**"];
const MANIFEST_EXCLUDE: &str = "META-INF/MANIFEST.MF";
const MAVEN_DESCRIPTOR_EXCLUDE: &str = "META-INF/maven/**";

fn proguard_jar(env: &BuildEnv) -> Result<Option<PathBuf>> {
    Ok(Some(env.sdk()?.proguard_jar()))
}

/// Settings of the `proguard` goal.
#[derive(Clone, Debug)]
pub struct ProguardConfig {
    pub skip: bool,
    pub config: PathBuf,
    pub configs: Vec<PathBuf>,
    pub options: Vec<String>,
    pub proguard_jar: PathBuf,
    pub output_directory: PathBuf,
    pub obfuscated_jar: PathBuf,
    pub jvm_arguments: Vec<String>,
    pub filter_maven_descriptor: bool,
    pub filter_manifest: bool,
    pub include_jdk_libs: bool,
    pub attach_map: bool,
}

impl ProguardConfig {
    pub fn resolve(env: &BuildEnv) -> Result<Self, ConfigError> {
        let h = env.handler("proguard");
        let flag = |name: &'static str, default: &'static str| {
            h.get(&Param::new(name).literal(default), env)
        };
        let path = |name: &'static str, default: &'static str| -> Result<PathBuf, ConfigError> {
            let path: PathBuf = h.get(&Param::new(name).literal(default), env)?;
            Ok(env.absolute(&path))
        };
        let configs: Vec<PathBuf> = h.resolve(&Param::new("configs"), env)?.unwrap_or_default();
        Ok(Self {
            skip: flag("skip", "true")?,
            config: path("config", "${project.basedir}/proguard.cfg")?,
            configs: configs.iter().map(|config| env.absolute(config)).collect(),
            options: h.resolve(&Param::new("options"), env)?.unwrap_or_default(),
            proguard_jar: env.absolute(&h.get::<_, PathBuf>(
                &Param::new("proguardJarPath").provider(proguard_jar),
                env,
            )?),
            output_directory: path("outputDirectory", "${project.build.directory}/proguard")?,
            obfuscated_jar: path("obfuscatedJar", OBFUSCATED_JAR)?,
            jvm_arguments: h.get(&Param::new("jvmArguments").literal("-Xmx512M"), env)?,
            filter_maven_descriptor: flag("filterMavenDescriptor", "true")?,
            filter_manifest: flag("filterManifest", "true")?,
            include_jdk_libs: flag("includeJdkLibs", "true")?,
            attach_map: flag("attachMap", "false")?,
        })
    }

    fn jvm_args(&self) -> impl Iterator<Item = String> + '_ {
        self.jvm_arguments.iter().map(|arg| {
            if arg.starts_with('-') {
                arg.clone()
            } else {
                format!("-{}", arg)
            }
        })
    }

    fn program_excludes(&self) -> Vec<&'static str> {
        let mut excludes = vec![];
        if self.filter_manifest {
            excludes.push(MANIFEST_EXCLUDE);
        }
        if self.filter_maven_descriptor {
            excludes.push(MAVEN_DESCRIPTOR_EXCLUDE);
        }
        excludes
    }
}

/// The jar produced by proguard when it runs, or the one configured with
/// `android.proguard.obfuscatedJar`.
pub fn obfuscated_jar(env: &BuildEnv) -> Result<Option<PathBuf>> {
    let h = env.handler("proguard");
    if let Some(jar) = h.resolve::<_, PathBuf>(&Param::new("obfuscatedJar"), env)? {
        return Ok(Some(env.absolute(&jar)));
    }
    let skip: bool = h.get(&Param::new("skip").literal("true"), env)?;
    if skip {
        return Ok(None);
    }
    let jar: PathBuf = h.get(&Param::new("obfuscatedJar").literal(OBFUSCATED_JAR), env)?;
    Ok(Some(env.absolute(&jar)))
}

/// A jar or class folder handed to proguard, optionally with entries
/// filtered out.
fn input(path: &Path, excludes: &[&str]) -> String {
    if excludes.is_empty() {
        return quoted(path);
    }
    let filter = excludes
        .iter()
        .map(|exclude| format!("!{}", exclude))
        .collect::<Vec<_>>()
        .join(",");
    format!("{}({})", quoted(path), filter)
}

fn quoted(path: &Path) -> String {
    format!("\"{}\"", path.display())
}

/// commons-logging breaks shrinking, it is passed as a library instead.
fn is_shifted(artifact: &Artifact) -> bool {
    artifact.group_id == "commons-logging" && artifact.artifact_id == "commons-logging"
}

/// Class libraries of pre-modular JDKs.
fn jdk_libraries() -> Vec<PathBuf> {
    let Some(home) = std::env::var_os("JAVA_HOME").map(PathBuf::from) else {
        return vec![];
    };
    let dirs = [home.join("jre").join("lib"), home.join("lib")];
    let find = |name: &str| dirs.iter().map(|dir| dir.join(name)).find(|lib| lib.is_file());
    let runtime = find("rt.jar").or_else(|| find("classes.jar"));
    runtime
        .into_iter()
        .chain(find("jsse.jar"))
        .chain(find("jce.jar"))
        .collect()
}

fn program_inputs(env: &BuildEnv, config: &ProguardConfig) -> Vec<String> {
    let excludes = config.program_excludes();
    let mut inputs = vec![input(&env.classes_dir(), &[])];
    for dependency in env.dependencies() {
        if !dependency.is_dex_input() || is_shifted(dependency) {
            tracing::debug!("Excluding dependency as input jar : {}", dependency);
            continue;
        }
        tracing::debug!("Including dependency as input jar : {}", dependency);
        inputs.push(input(&env.absolute(&dependency.file), &excludes));
    }
    inputs
}

fn library_inputs(env: &BuildEnv, config: &ProguardConfig) -> Result<Vec<String>> {
    let mut libraries = vec![];
    if config.include_jdk_libs {
        libraries.extend(jdk_libraries().iter().map(|lib| input(lib, &[])));
    }
    let android_excludes: &[&str] = if config.include_jdk_libs {
        &ANDROID_LIBRARY_EXCLUDES
    } else {
        &[]
    };
    libraries.push(input(&env.sdk()?.android_jar(), android_excludes));
    for dependency in env.dependencies() {
        // the platform android.jar above stands in for the android artifact
        let provided = dependency.scope == Scope::Provided && dependency.artifact_id != "android";
        if provided || is_shifted(dependency) {
            tracing::debug!("Including dependency as library jar : {}", dependency);
            libraries.push(input(&env.absolute(&dependency.file), &[]));
        }
    }
    Ok(libraries)
}

pub fn proguard_command(
    env: &BuildEnv,
    config: &ProguardConfig,
    java: &Path,
) -> Result<Command> {
    let dir = &config.output_directory;
    let mut cmd = Command::new(java)
        .args(config.jvm_args())
        .arg("-jar")
        .arg(&config.proguard_jar)
        .arg(format!("@{}", quoted(&config.config)));
    for extra in &config.configs {
        cmd = cmd.arg(format!("@{}", quoted(extra)));
    }
    for injar in program_inputs(env, config) {
        cmd = cmd.arg("-injars").arg(injar);
    }
    for libraryjar in library_inputs(env, config)? {
        cmd = cmd.arg("-libraryjars").arg(libraryjar);
    }
    Ok(cmd
        .arg("-outjars")
        .arg(quoted(&config.obfuscated_jar))
        .arg("-dump")
        .arg(quoted(&dir.join("dump.txt")))
        .arg("-printseeds")
        .arg(quoted(&dir.join("seeds.txt")))
        .arg("-printusage")
        .arg(quoted(&dir.join("usage.txt")))
        .arg("-printmapping")
        .arg(quoted(&dir.join("mapping.txt")))
        .args(&config.options)
        .current_dir(env.root_dir())
        .fail_on_stderr(false))
}

/// Shrinks and obfuscates the compiled classes and their dependencies into
/// one jar that `dex` picks up.
pub fn proguard<E: Execute>(env: &BuildEnv, exec: &mut E) -> Result<GoalOutput> {
    let config = ProguardConfig::resolve(env)?;
    if config.skip {
        tracing::debug!("Skipping proguard");
        return Ok(GoalOutput::default());
    }
    if !config.config.is_file() {
        tracing::info!(
            "Proguard skipped because the configuration file doesn't exist: {}",
            config.config.display()
        );
        return Ok(GoalOutput::default());
    }
    anyhow::ensure!(
        !config.output_directory.exists() || config.output_directory.is_dir(),
        "Non-directory exists at {}",
        config.output_directory.display()
    );
    std::fs::create_dir_all(&config.output_directory)?;
    tracing::info!("Proguarding output");
    let cmd = proguard_command(env, &config, &sdk::java())?;
    exec.execute(&cmd)?;
    let mut goal = GoalOutput::default();
    if config.attach_map {
        goal.attach("map", config.output_directory.join("mapping.txt"));
    }
    Ok(goal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal::tests::Recorder;
    use crate::tests::TestProject;

    const PROJECT: &str = r#"
name: demo
version: "1.0"
dependencies:
  - coordinates: com.google.android:android:2.2.1
    scope: provided
    file: libs/android.jar
  - coordinates: com.example:util:1.0
    file: libs/util.jar
  - coordinates: commons-logging:commons-logging:1.1
    file: libs/commons-logging.jar
  - coordinates: com.example:servlet:1.0
    scope: provided
    file: libs/servlet.jar
proguard:
  skip: false
  includeJdkLibs: false
  attachMap: true
  options: [-dontwarn]
"#;

    #[test]
    fn skipped_by_default() -> Result<()> {
        let project = TestProject::new("");
        project.write("proguard.cfg", "-keep class *");
        let env = project.env();
        let mut exec = Recorder::default();
        let output = proguard(&env, &mut exec)?;
        assert!(exec.commands.is_empty());
        assert!(output.attached.is_empty());
        assert_eq!(obfuscated_jar(&env)?, None);
        Ok(())
    }

    #[test]
    fn missing_config_file_skips() -> Result<()> {
        let project = TestProject::new("proguard:\n  skip: false\n");
        let mut exec = Recorder::default();
        proguard(&project.env(), &mut exec)?;
        assert!(exec.commands.is_empty());
        Ok(())
    }

    #[test]
    fn shrinks_classes_and_dependencies() -> Result<()> {
        let project = TestProject::new(PROJECT);
        let config_file = project.write("proguard.cfg", "-keep class *");
        let env = project.env();
        let mut exec = Recorder::default();
        let output = proguard(&env, &mut exec)?;
        assert_eq!(exec.commands.len(), 1);
        assert!(!exec.commands[0].is_stderr_fatal());

        let build = env.build_dir();
        let dir = build.join("proguard");
        let sdk = dunce::canonicalize(&project.sdk)?;
        let lib = |name: &str| format!("\"{}\"", env.root_dir().join("libs").join(name).display());
        let expected = [
            "-Xmx512M".to_string(),
            "-jar".into(),
            sdk.join("tools/proguard/lib/proguard.jar").display().to_string(),
            format!("@\"{}\"", dunce::canonicalize(config_file)?.display()),
            "-injars".into(),
            format!("\"{}\"", env.classes_dir().display()),
            "-injars".into(),
            format!("{}(!META-INF/MANIFEST.MF,!META-INF/maven/**)", lib("util.jar")),
            "-libraryjars".into(),
            format!("\"{}\"", sdk.join("platforms/android-8/android.jar").display()),
            "-libraryjars".into(),
            lib("commons-logging.jar"),
            "-libraryjars".into(),
            lib("servlet.jar"),
            "-outjars".into(),
            format!("\"{}\"", build.join("demo-1.0_obfuscated.jar").display()),
            "-dump".into(),
            format!("\"{}\"", dir.join("dump.txt").display()),
            "-printseeds".into(),
            format!("\"{}\"", dir.join("seeds.txt").display()),
            "-printusage".into(),
            format!("\"{}\"", dir.join("usage.txt").display()),
            "-printmapping".into(),
            format!("\"{}\"", dir.join("mapping.txt").display()),
            "-dontwarn".into(),
        ];
        assert_eq!(exec.args(0), expected);
        assert!(dir.is_dir());
        assert_eq!(output.attached[0].kind, "map");
        assert_eq!(output.attached[0].file, dir.join("mapping.txt"));
        assert_eq!(obfuscated_jar(&env)?, Some(build.join("demo-1.0_obfuscated.jar")));
        Ok(())
    }

    #[test]
    fn jdk_libraries_filter_android_jar() -> Result<()> {
        let project = TestProject::new("proguard:\n  skip: false\n  filterManifest: false\n  jvmArguments: Xmx1G\n");
        project.write("proguard.cfg", "");
        let env = BuildEnv::new(project.args().define("android.proguard.filterMavenDescriptor", "false"))?;
        let config = ProguardConfig::resolve(&env)?;
        assert!(config.program_excludes().is_empty());
        let args = crate::goal::tests::args(&proguard_command(&env, &config, Path::new("java"))?);
        assert_eq!(args[0], "-Xmx1G");
        let android = args
            .iter()
            .find(|arg| arg.contains("android.jar"))
            .cloned()
            .unwrap_or_default();
        assert!(android.ends_with("(!org/xml/**,!org/w3c/**,!java/**,!javax/**)"));
        Ok(())
    }

    #[test]
    fn formats_filtered_inputs() {
        assert_eq!(input(Path::new("a.jar"), &[]), "\"a.jar\"");
        assert_eq!(
            input(Path::new("a.jar"), &[MANIFEST_EXCLUDE]),
            "\"a.jar\"(!META-INF/MANIFEST.MF)"
        );
    }
}
