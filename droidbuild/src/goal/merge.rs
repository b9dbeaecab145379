use crate::artifact::ArtifactType;
use crate::params::Param;
use crate::{sdk, BuildEnv, GoalFailure, GoalOutput};
use anyhow::Result;
use droidcommon::Execute;
use manifmerger::{ManifestMerger, MergeError, MergeStrategy, Revision};
use std::path::PathBuf;

/// Manifests of unpacked apklib and aar dependencies.
fn library_manifests(env: &BuildEnv) -> Result<Option<Vec<PathBuf>>> {
    let manifests = env
        .dependencies()
        .iter()
        .filter(|dep| matches!(dep.kind, ArtifactType::Apklib | ArtifactType::Aar))
        .map(|dep| env.absolute(&dep.file).join("AndroidManifest.xml"))
        .filter(|manifest| manifest.is_file())
        .collect();
    Ok(Some(manifests))
}

/// Merges the project manifest with the manifests of its libraries.
pub fn merge_manifests<E: Execute>(env: &BuildEnv, exec: &mut E) -> Result<GoalOutput> {
    let h = env.handler("merge");
    let libs: Vec<PathBuf> = h.get(
        &Param::new("libraryManifests").provider(library_manifests),
        env,
    )?;
    if libs.is_empty() {
        tracing::info!("No library manifests found, skipping manifest merge");
        return Ok(GoalOutput::default());
    }
    let out: PathBuf = h.get(
        &Param::new("output").literal("${project.build.directory}/AndroidManifest.xml"),
        env,
    )?;
    let out = env.absolute(&out);
    let libs: Vec<PathBuf> = libs.iter().map(|lib| env.absolute(lib)).collect();
    let main = env.manifest();
    let sdk = env.sdk()?;
    let tools = sdk.tools_major_version()?;
    tracing::debug!("SDK tools r{}", tools);
    let strategy = MergeStrategy::new(Revision::for_tools(tools), sdk.path())?;
    let merger = ManifestMerger::with_strategy(sdk::java(), strategy);
    tracing::info!(
        "Merging {} library manifests with the {} merger",
        libs.len(),
        merger.strategy().revision()
    );
    let merged = match merger.merge(exec, &out, &main, &libs) {
        Ok(merged) => merged,
        Err(MergeError::Execution(err)) => {
            tracing::error!("{}", err);
            false
        }
        Err(err) => return Err(err.into()),
    };
    if !merged {
        return Err(GoalFailure::MergeFailed { main, libs }.into());
    }
    tracing::info!("Merged manifest written to {}", out.display());
    Ok(GoalOutput::default())
}
