use crate::params::{ConfigError, Param};
use crate::{BuildEnv, GoalOutput};
use anyhow::{Context, Result};
use droidcommon::{Command, Execute};
use std::path::{Path, PathBuf};

struct SourcesConfig {
    delete_conflicting_files: bool,
    create_package_directories: bool,
}

impl SourcesConfig {
    fn resolve(env: &BuildEnv) -> Result<Self, ConfigError> {
        let h = env.handler("sources");
        Ok(Self {
            delete_conflicting_files: h.get(
                &Param::new("deleteConflictingFiles").literal("true"),
                env,
            )?,
            create_package_directories: h.get(
                &Param::new("createPackageDirectories").literal("true"),
                env,
            )?,
        })
    }
}

/// Files below `dir` matching `pattern`, relative to `dir` and sorted.
fn find(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(vec![]);
    }
    let pattern = format!(
        "{}/{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        pattern
    );
    let mut files = vec![];
    for entry in glob::glob(&pattern)? {
        let path = entry?;
        if path.is_file() {
            files.push(path.strip_prefix(dir)?.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

fn remove(path: &Path) -> Result<()> {
    if path.is_file() {
        tracing::info!("deleting conflicting file {}", path.display());
        std::fs::remove_file(path)
            .with_context(|| format!("failed to delete {}", path.display()))?;
    }
    Ok(())
}

/// Removes stale generated files that would clash with the ones generated
/// from resources and aidl interfaces.
fn delete_conflicting_files(env: &BuildEnv, aidl_files: &[PathBuf]) -> Result<()> {
    let source_dir = env.source_dir();
    for r_java in find(&source_dir, "**/R.java")? {
        remove(&source_dir.join(r_java))?;
    }
    remove(&env.res_dir().join("drawable").join("Thumbs.db"))?;
    for aidl in aidl_files {
        remove(&source_dir.join(aidl.with_extension("java")))?;
    }
    Ok(())
}

fn r_java_command(env: &BuildEnv, aapt: &Path, out: &Path, create_package_dirs: bool) -> Result<Command> {
    let mut flags = vec![];
    if create_package_dirs {
        flags.push("-m");
    }
    let mut cmd = Command::new(aapt)
        .arg("package")
        .args(flags)
        .arg("-J")
        .arg(out)
        .arg("-M")
        .arg(env.manifest());
    let res = env.res_dir();
    if res.is_dir() {
        cmd = cmd.arg("-S").arg(res);
    }
    let assets = env.assets_dir();
    if assets.is_dir() {
        cmd = cmd.arg("-A").arg(assets);
    }
    Ok(cmd
        .arg("-I")
        .arg(env.sdk()?.android_jar())
        .current_dir(env.root_dir()))
}

fn aidl_command(env: &BuildEnv, aidl: &Path, file: &Path, out_dir: &Path) -> Result<Command> {
    let source_dir = env.source_dir();
    let java = file
        .file_stem()
        .map(|stem| format!("{}.java", stem.to_string_lossy()))
        .with_context(|| format!("invalid aidl file name {}", file.display()))?;
    let target_dir = match file.parent() {
        Some(parent) => out_dir.join(parent),
        None => out_dir.to_path_buf(),
    };
    std::fs::create_dir_all(&target_dir)?;
    let mut framework = std::ffi::OsString::from("-p");
    framework.push(env.sdk()?.framework_aidl());
    let mut include = std::ffi::OsString::from("-I");
    include.push(&source_dir);
    Ok(Command::new(aidl)
        .arg(framework)
        .arg(include)
        .arg(source_dir.join(file))
        .arg(target_dir.join(java))
        .current_dir(env.root_dir())
        .fail_on_stderr(false))
}

pub fn generate_sources<E: Execute>(env: &BuildEnv, exec: &mut E) -> Result<GoalOutput> {
    let config = SourcesConfig::resolve(env)?;
    let sdk = env.sdk()?;
    let aidl_files = find(&env.source_dir(), "**/*.aidl")?;
    if config.delete_conflicting_files {
        delete_conflicting_files(env, &aidl_files)?;
    }
    let mut output = GoalOutput::default();

    let r_dir = env.build_dir().join("generated-sources").join("r");
    std::fs::create_dir_all(&r_dir)?;
    let aapt = sdk.tool("aapt")?;
    exec.execute(&r_java_command(
        env,
        &aapt,
        &r_dir,
        config.create_package_directories,
    )?)?;
    output.source_roots.push(r_dir);

    if aidl_files.is_empty() {
        tracing::debug!("No aidl files found");
        return Ok(output);
    }
    tracing::info!("Found aidl files: Count = {}", aidl_files.len());
    let aidl_dir = env.build_dir().join("generated-sources").join("aidl");
    let aidl = sdk.tool("aidl")?;
    for file in &aidl_files {
        exec.execute(&aidl_command(env, &aidl, file, &aidl_dir)?)?;
    }
    output.source_roots.push(aidl_dir);
    Ok(output)
}
