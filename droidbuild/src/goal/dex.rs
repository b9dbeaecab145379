use crate::params::{ConfigError, Param};
use crate::sdk;
use crate::{BuildEnv, GoalOutput};
use anyhow::Result;
use droidcommon::{Archive, Command, Execute};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Settings of the `dex` goal.
#[derive(Clone, Debug)]
pub struct DexConfig {
    pub jvm_arguments: Vec<String>,
    pub core_library: bool,
    pub no_locals: bool,
    pub optimize: bool,
    pub pre_dex: bool,
    pub pre_dex_lib_location: PathBuf,
    pub incremental: bool,
    pub force_jumbo: bool,
    pub multi_dex: bool,
    pub main_dex_list: Option<PathBuf>,
    pub minimal_main_dex: bool,
    pub dex_arguments: Vec<String>,
    pub attach_jar: bool,
    pub attach_sources: bool,
}

impl DexConfig {
    pub fn resolve(env: &BuildEnv) -> Result<Self, ConfigError> {
        let h = env.handler("dex");
        let flag = |name: &'static str, default: &'static str| {
            h.get(&Param::new(name).literal(default), env)
        };
        Ok(Self {
            jvm_arguments: h.get(&Param::new("jvmArguments").literal("-Xmx1024M"), env)?,
            core_library: flag("coreLibrary", "false")?,
            no_locals: flag("noLocals", "false")?,
            optimize: flag("optimize", "true")?,
            pre_dex: flag("preDex", "false")?,
            pre_dex_lib_location: env.absolute(&h.get::<_, PathBuf>(
                &Param::new("preDexLibLocation")
                    .literal("${project.build.directory}${file.separator}dexedLibs"),
                env,
            )?),
            incremental: flag("incremental", "false")?,
            force_jumbo: flag("forceJumbo", "false")?,
            multi_dex: flag("multiDex", "false")?,
            main_dex_list: h
                .resolve::<_, PathBuf>(&Param::new("mainDexList"), env)?
                .map(|list| env.absolute(&list)),
            minimal_main_dex: flag("minimalMainDex", "false")?,
            dex_arguments: h
                .resolve(&Param::new("dexArguments"), env)?
                .unwrap_or_default(),
            attach_jar: flag("attachJar", "true")?,
            attach_sources: flag("attachSources", "false")?,
        })
    }

    /// JVM options for running `dx.jar`, each with a leading `-`.
    fn jvm_args(&self) -> impl Iterator<Item = String> + '_ {
        self.jvm_arguments.iter().map(|arg| {
            if arg.starts_with('-') {
                arg.clone()
            } else {
                format!("-{}", arg)
            }
        })
    }

    fn flags(&self) -> Vec<OsString> {
        let mut flags: Vec<OsString> = vec![];
        if !self.optimize {
            flags.push("--no-optimize".into());
        }
        if self.core_library {
            flags.push("--core-library".into());
        }
        if self.incremental {
            flags.push("--incremental".into());
        }
        if self.no_locals {
            flags.push("--no-locals".into());
        }
        if self.force_jumbo {
            flags.push("--force-jumbo".into());
        }
        if self.multi_dex {
            flags.push("--multi-dex".into());
            if let Some(list) = &self.main_dex_list {
                let mut arg = OsString::from("--main-dex-list=");
                arg.push(list);
                flags.push(arg);
            }
            if self.minimal_main_dex {
                flags.push("--minimal-main-dex".into());
            }
        }
        flags.extend(self.dex_arguments.iter().map(OsString::from));
        flags
    }
}

fn output_arg(output: &Path) -> OsString {
    let mut arg = OsString::from("--output=");
    arg.push(output);
    arg
}

/// Files to dex: the obfuscated jar when there is one, otherwise the
/// compiled classes and every jar dependency the device does not provide.
pub fn dex_inputs(env: &BuildEnv) -> Result<Vec<PathBuf>> {
    if let Some(jar) = super::proguard::obfuscated_jar(env)? {
        if jar.is_file() {
            return Ok(vec![jar]);
        }
        tracing::debug!("obfuscated jar {} not found", jar.display());
    }
    let mut inputs = vec![env.classes_dir()];
    for dependency in env.dependencies() {
        if !dependency.is_dex_input() {
            tracing::debug!("not dexing {}", dependency);
            continue;
        }
        let file = env.absolute(&dependency.file);
        if !inputs.contains(&file) {
            tracing::debug!("adding dex input {}", file.display());
            inputs.push(file);
        }
    }
    Ok(inputs)
}

pub fn dex_command(
    config: &DexConfig,
    java: &Path,
    dx_jar: &Path,
    inputs: &[PathBuf],
    output: &Path,
) -> Command {
    Command::new(java)
        .args(config.jvm_args())
        .arg("-jar")
        .arg(dx_jar)
        .arg("--dex")
        .args(config.flags())
        .arg(output_arg(output))
        .args(inputs)
        .fail_on_stderr(false)
}

fn is_stale(source: &Path, target: &Path) -> bool {
    let modified = |path: &Path| std::fs::metadata(path).and_then(|m| m.modified()).ok();
    match (modified(source), modified(target)) {
        (_, None) => true,
        (Some(source), Some(target)) => source > target,
        (None, Some(_)) => false,
    }
}

/// Dexes every jar input on its own into the pre-dex location and returns
/// the inputs with those jars replaced.
fn pre_dex<E: Execute>(
    exec: &mut E,
    config: &DexConfig,
    java: &Path,
    dx_jar: &Path,
    inputs: Vec<PathBuf>,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(&config.pre_dex_lib_location)?;
    let mut dexed = Vec::with_capacity(inputs.len());
    for input in inputs {
        let name = match input.file_name() {
            Some(name) if input.extension().map(|e| e == "jar").unwrap_or_default() => {
                name.to_owned()
            }
            _ => {
                dexed.push(input);
                continue;
            }
        };
        let target = config.pre_dex_lib_location.join(name);
        if is_stale(&input, &target) {
            tracing::info!("pre-dexing {}", input.display());
            let core_library = config.core_library.then_some("--core-library");
            let cmd = Command::new(java)
                .args(config.jvm_args())
                .arg("-jar")
                .arg(dx_jar)
                .arg("--dex")
                .args(core_library)
                .arg(output_arg(&target))
                .arg(&input)
                .fail_on_stderr(false);
            exec.execute(&cmd)?;
        } else {
            tracing::debug!("{} is up to date", target.display());
        }
        dexed.push(target);
    }
    Ok(dexed)
}

fn create_sources_archive(env: &BuildEnv, path: &Path) -> Result<()> {
    let mut archive = Archive::create(path)?;
    archive.add_directory(&env.assets_dir(), "assets")?;
    archive.add_directory(&env.res_dir(), "res")?;
    archive.add_directory(&env.source_dir(), "src/main/java")?;
    for dir in env.resource_dirs() {
        archive.add_directory(&dir, "src/main/resources")?;
    }
    archive.finish()
}

/// Converts the compiled classes into `classes.dex`.
pub fn dex<E: Execute>(env: &BuildEnv, exec: &mut E) -> Result<GoalOutput> {
    let config = DexConfig::resolve(env)?;
    let dx_jar = env.sdk()?.dx_jar()?;
    let java = sdk::java();
    let mut inputs = dex_inputs(env)?;
    if config.pre_dex {
        inputs = pre_dex(exec, &config, &java, &dx_jar, inputs)?;
    }
    let build_dir = env.build_dir();
    std::fs::create_dir_all(&build_dir)?;
    let output = build_dir.join("classes.dex");
    tracing::info!("Convert classes to Dex : {}", output.display());
    let cmd = dex_command(&config, &java, &dx_jar, &inputs, &output).current_dir(env.root_dir());
    exec.execute(&cmd)?;

    let mut goal = GoalOutput::default();
    if config.attach_jar {
        let jar = env.output("jar");
        let mut archive = Archive::create(&jar)?;
        archive.add_directory(&env.classes_dir(), "")?;
        archive.finish()?;
        goal.attach("jar", jar);
    }
    if config.attach_sources {
        let sources = env.output("apksources");
        create_sources_archive(env, &sources)?;
        goal.attach("apksources", sources);
    }
    Ok(goal)
}
