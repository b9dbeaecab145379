//! Provisioning archives: a `.par` bundles resources and dependent apks
//! for upload to a provisioning server.
use crate::artifact::ArtifactType;
use crate::params::Param;
use crate::{BuildEnv, GoalOutput};
use anyhow::{Context, Result};
use droidcommon::Archive;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use std::path::{Path, PathBuf};

const BOUNDARY: &str = "parfile";
const FIELD: &str = "parfile";

fn par_dir(env: &BuildEnv) -> PathBuf {
    env.build_dir().join("par-archive")
}

fn is_newer(source: &Path, target: &Path) -> bool {
    let modified = |path: &Path| std::fs::metadata(path).and_then(|m| m.modified()).ok();
    match (modified(source), modified(target)) {
        (Some(source), Some(target)) => source > target,
        _ => true,
    }
}

fn copy_file(source: &Path, target: &Path) -> Result<()> {
    if !is_newer(source, target) {
        tracing::debug!("{} is up to date", target.display());
        return Ok(());
    }
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(source, target).with_context(|| {
        format!("failed to copy {} to {}", source.display(), target.display())
    })?;
    Ok(())
}

fn copy_dir(source: &Path, target: &Path) -> Result<()> {
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let path = entry.path();
        let dest = target.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&path, &dest)?;
        } else {
            copy_file(&path, &dest)?;
        }
    }
    Ok(())
}

/// Collects resources and apk dependencies into `<build>/par-archive`.
pub fn par_resources(env: &BuildEnv) -> Result<GoalOutput> {
    let dir = par_dir(env);
    std::fs::create_dir_all(&dir)?;
    for resources in env.resource_dirs() {
        if resources.is_dir() {
            copy_dir(&resources, &dir)?;
        }
    }
    for dependency in env.dependencies() {
        if dependency.kind != ArtifactType::Apk {
            continue;
        }
        let apk = env.absolute(&dependency.file);
        let name = apk
            .file_name()
            .with_context(|| format!("invalid apk path {}", apk.display()))?;
        copy_file(&apk, &dir.join(name))?;
    }
    Ok(GoalOutput::default())
}

/// Zips `<build>/par-archive` into `<final>.par`.
pub fn par_package(env: &BuildEnv) -> Result<GoalOutput> {
    let par = env.output("par");
    let mut archive = Archive::create(&par)?;
    archive.add_directory(&par_dir(env), "")?;
    archive.finish()?;
    tracing::info!("Created {}", par.display());
    let mut output = GoalOutput::default();
    output.attach("par", par);
    Ok(output)
}

/// A `multipart/form-data` body with the single zip field `parfile`.
fn multipart_body(file_name: &str, contents: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(contents.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            FIELD, file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/x-zip-compressed\r\n\r\n");
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// Uploads `<final>.par` to the provisioning server.
pub fn par_deploy(env: &BuildEnv) -> Result<GoalOutput> {
    let server: String = env.handler("par").get(
        &Param::new("serverUri").literal("http://localhost:8080/provisioning/stockpar"),
        env,
    )?;
    let par = env.output("par");
    let contents =
        std::fs::read(&par).with_context(|| format!("failed to read {}", par.display()))?;
    let file_name = par
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    tracing::info!("Uploading {} to {}", par.display(), server);
    let resp = Client::new()
        .post(&server)
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(multipart_body(&file_name, &contents))
        .send()?;
    anyhow::ensure!(
        resp.status().is_success(),
        "POST {} returned status code {}",
        server,
        resp.status()
    );
    Ok(GoalOutput::default())
}
