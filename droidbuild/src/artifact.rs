use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactType {
    #[default]
    Jar,
    Apk,
    Apklib,
    Aar,
    So,
    A,
}

impl std::fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Jar => write!(f, "jar"),
            Self::Apk => write!(f, "apk"),
            Self::Apklib => write!(f, "apklib"),
            Self::Aar => write!(f, "aar"),
            Self::So => write!(f, "so"),
            Self::A => write!(f, "a"),
        }
    }
}

impl std::str::FromStr for ArtifactType {
    type Err = anyhow::Error;

    fn from_str(kind: &str) -> Result<Self> {
        Ok(match kind {
            "jar" => Self::Jar,
            "apk" => Self::Apk,
            "apklib" => Self::Apklib,
            "aar" => Self::Aar,
            "so" => Self::So,
            "a" => Self::A,
            _ => anyhow::bail!("unsupported artifact type {}", kind),
        })
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    Compile,
    Provided,
    Runtime,
    Test,
    System,
}

/// A dependency the host build already resolved to a file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Artifact {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub kind: ArtifactType,
    pub scope: Scope,
    pub classifier: Option<String>,
    pub file: PathBuf,
}

impl Artifact {
    /// Artifacts the device already provides, like `android.jar` itself.
    pub fn is_sdk_provided(&self) -> bool {
        self.scope == Scope::Provided
            || self.group_id == "android"
            || (self.group_id == "com.google.android" && self.artifact_id == "android")
    }

    /// Whether the classes of this artifact end up in `classes.dex`.
    pub fn is_dex_input(&self) -> bool {
        self.kind == ArtifactType::Jar
            && !matches!(self.scope, Scope::Test | Scope::System)
            && !self.is_sdk_provided()
    }
}

impl std::fmt::Display for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.group_id, self.artifact_id, self.version, self.kind
        )?;
        if let Some(classifier) = &self.classifier {
            write!(f, ":{}", classifier)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Artifact {
    type Err = anyhow::Error;

    /// Parses `group:artifact:version[:type]`.
    fn from_str(coordinates: &str) -> Result<Self> {
        let parts: Vec<_> = coordinates.split(':').collect();
        let (group_id, artifact_id, version, kind) = match parts.as_slice() {
            [g, a, v] => (g, a, v, ArtifactType::Jar),
            [g, a, v, t] => (g, a, v, t.parse()?),
            _ => anyhow::bail!(
                "expected group:artifact:version coordinates, found {}",
                coordinates
            ),
        };
        if group_id.is_empty() || artifact_id.is_empty() || version.is_empty() {
            anyhow::bail!("incomplete coordinates {}", coordinates);
        }
        Ok(Self {
            group_id: group_id.to_string(),
            artifact_id: artifact_id.to_string(),
            version: version.to_string(),
            kind,
            scope: Scope::Compile,
            classifier: None,
            file: PathBuf::new(),
        })
    }
}

/// An output a goal produced and registered with the build.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AttachedArtifact {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    pub file: PathBuf,
}

impl AttachedArtifact {
    pub fn new(kind: &str, file: PathBuf) -> Self {
        Self {
            kind: kind.to_string(),
            classifier: None,
            file,
        }
    }
}

const REGISTRY: &str = "attached-artifacts.yaml";

/// Adds `attached` to the registry in `build_dir`, replacing entries with the
/// same type and classifier.
pub fn record(build_dir: &Path, attached: &[AttachedArtifact]) -> Result<()> {
    if attached.is_empty() {
        return Ok(());
    }
    let path = build_dir.join(REGISTRY);
    let mut registry = load(build_dir)?;
    for artifact in attached {
        registry.retain(|a| a.kind != artifact.kind || a.classifier != artifact.classifier);
        registry.push(artifact.clone());
    }
    std::fs::create_dir_all(build_dir)?;
    std::fs::write(path, serde_yaml::to_string(&registry)?)?;
    Ok(())
}

pub fn load(build_dir: &Path) -> Result<Vec<AttachedArtifact>> {
    let path = build_dir.join(REGISTRY);
    if !path.exists() {
        return Ok(vec![]);
    }
    Ok(serde_yaml::from_str(&std::fs::read_to_string(path)?)?)
}
