use crate::artifact::{Artifact, ArtifactType, Scope};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Project description read from `android.yaml`.
#[derive(Clone, Debug)]
pub struct Config {
    pub name: String,
    pub version: String,
    pub final_name: String,
    pub sdk: SdkConfig,
    pub layout: Layout,
    pub properties: BTreeMap<String, String>,
    pub dependencies: Vec<Artifact>,
    sections: BTreeMap<String, Mapping>,
}

impl Config {
    pub fn parse<P: AsRef<Path>>(path: P, default_name: &str) -> Result<Self> {
        let path = path.as_ref();
        let raw = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            if contents.trim().is_empty() {
                RawConfig::default()
            } else {
                serde_yaml::from_str(&contents)
                    .with_context(|| format!("failed to parse {}", path.display()))?
            }
        } else {
            tracing::debug!("{} not found, using defaults", path.display());
            RawConfig::default()
        };
        Self::from_raw(raw, default_name)
    }

    fn from_raw(raw: RawConfig, default_name: &str) -> Result<Self> {
        let name = raw.name.unwrap_or_else(|| default_name.to_string());
        let version = raw.version.unwrap_or_else(|| "0.1.0".to_string());
        let final_name = raw
            .final_name
            .unwrap_or_else(|| format!("{}-{}", name, version));
        let mut properties = BTreeMap::new();
        for (key, value) in raw.properties {
            properties.insert(key, scalar(&value)?);
        }
        let dependencies = raw
            .dependencies
            .into_iter()
            .map(RawDependency::into_artifact)
            .collect::<Result<Vec<_>>>()?;
        let mut sections = BTreeMap::new();
        for (key, value) in raw.sections {
            match value {
                Value::Mapping(mapping) => {
                    sections.insert(key, mapping);
                }
                Value::Null => {}
                _ => anyhow::bail!("expected `{}` to be a mapping of goal settings", key),
            }
        }
        Ok(Self {
            name,
            version,
            final_name,
            sdk: raw.sdk,
            layout: raw.layout,
            properties,
            dependencies,
            sections,
        })
    }

    /// The goal settings stored under `group`, if any.
    pub fn section(&self, group: &str) -> Option<&Mapping> {
        self.sections.get(group)
    }
}

fn scalar(value: &Value) -> Result<String> {
    Ok(match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        _ => anyhow::bail!("property values must be scalars, found {:?}", value),
    })
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SdkConfig {
    pub path: Option<PathBuf>,
    pub platform: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Layout {
    pub source: PathBuf,
    pub resources: Vec<PathBuf>,
    pub res: PathBuf,
    pub assets: PathBuf,
    pub manifest: PathBuf,
    pub build: PathBuf,
    pub classes: Option<PathBuf>,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            source: "src/main/java".into(),
            resources: vec!["src/main/resources".into()],
            res: "res".into(),
            assets: "assets".into(),
            manifest: "AndroidManifest.xml".into(),
            build: "target".into(),
            classes: None,
        }
    }
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawConfig {
    name: Option<String>,
    version: Option<String>,
    final_name: Option<String>,
    #[serde(default)]
    sdk: SdkConfig,
    #[serde(default)]
    layout: Layout,
    #[serde(default)]
    properties: BTreeMap<String, Value>,
    #[serde(default)]
    dependencies: Vec<RawDependency>,
    #[serde(flatten)]
    sections: BTreeMap<String, Value>,
}

#[derive(Deserialize)]
struct RawDependency {
    coordinates: String,
    #[serde(rename = "type")]
    kind: Option<ArtifactType>,
    #[serde(default)]
    scope: Scope,
    classifier: Option<String>,
    file: PathBuf,
}

impl RawDependency {
    fn into_artifact(self) -> Result<Artifact> {
        let mut artifact: Artifact = self.coordinates.parse()?;
        if let Some(kind) = self.kind {
            artifact.kind = kind;
        }
        artifact.scope = self.scope;
        artifact.classifier = self.classifier;
        artifact.file = self.file;
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROJECT: &str = r#"
name: apidemos
version: 2.3.1
sdk:
  platform: "8"
layout:
  res: src/main/res
properties:
  android.dex.coreLibrary: true
  android.emma.filters: "com.example.*"
dependencies:
  - coordinates: com.google.android:android:2.2.1
    scope: provided
    file: libs/android.jar
  - coordinates: com.example:util:1.0
    file: libs/util.jar
  - coordinates: com.example:app:1.0
    type: apk
    file: libs/app.apk
dex:
  jvmArguments: [Xmx2048M]
  coreLibrary: false
emma:
"#;

    #[test]
    fn parses_project_file() -> Result<()> {
        let raw: RawConfig = serde_yaml::from_str(PROJECT)?;
        let config = Config::from_raw(raw, "ignored")?;
        assert_eq!(config.name, "apidemos");
        assert_eq!(config.final_name, "apidemos-2.3.1");
        assert_eq!(config.sdk.platform.as_deref(), Some("8"));
        assert_eq!(config.layout.res, Path::new("src/main/res"));
        assert_eq!(config.layout.source, Path::new("src/main/java"));
        assert_eq!(config.properties["android.dex.coreLibrary"], "true");
        assert_eq!(config.dependencies.len(), 3);
        assert_eq!(config.dependencies[0].scope, Scope::Provided);
        assert_eq!(config.dependencies[1].kind, ArtifactType::Jar);
        assert_eq!(config.dependencies[2].kind, ArtifactType::Apk);
        let dex = config.section("dex").unwrap();
        assert_eq!(dex.get("coreLibrary"), Some(&Value::Bool(false)));
        assert!(config.section("emma").is_none());
        assert!(config.section("layout").is_none());
        Ok(())
    }

    #[test]
    fn missing_project_file_uses_defaults() -> Result<()> {
        let config = Config::parse("/does/not/exist/android.yaml", "demo")?;
        assert_eq!(config.name, "demo");
        assert_eq!(config.final_name, "demo-0.1.0");
        assert_eq!(config.layout.build, Path::new("target"));
        assert!(config.dependencies.is_empty());
        Ok(())
    }

    #[test]
    fn rejects_scalar_goal_section() {
        let raw: RawConfig = serde_yaml::from_str("dex: fast\n").unwrap();
        assert!(Config::from_raw(raw, "demo").is_err());
    }
}
