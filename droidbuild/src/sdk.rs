use anyhow::{Context, Result};
use droidcommon::parse_properties;
use std::path::{Path, PathBuf};

/// A platform installed under `<sdk>/platforms`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Platform {
    pub dir: PathBuf,
    pub api_level: String,
    pub version: String,
}

impl Platform {
    fn load(dir: PathBuf) -> Option<Self> {
        let text = std::fs::read_to_string(dir.join("source.properties")).ok()?;
        let props = parse_properties(&text);
        let api_level = props.get("AndroidVersion.ApiLevel")?.clone();
        let version = props
            .get("Platform.Version")
            .cloned()
            .unwrap_or_else(|| api_level.clone());
        Some(Self {
            dir,
            api_level,
            version,
        })
    }

    fn matches(&self, wanted: &str) -> bool {
        self.api_level == wanted
            || self.version == wanted
            || self.dir.file_name().map(|n| n == wanted).unwrap_or_default()
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AndroidSdk {
    path: PathBuf,
    platform: Platform,
    build_tools: Option<PathBuf>,
}

impl AndroidSdk {
    /// The SDK location from `ANDROID_HOME` or `ANDROID_SDK_ROOT`.
    pub fn path_from_env() -> Option<PathBuf> {
        std::env::var_os("ANDROID_HOME")
            .or_else(|| std::env::var_os("ANDROID_SDK_ROOT"))
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
    }

    /// Opens the SDK at `path`. `platform` is an api level, a platform
    /// version or a directory name; the newest platform is used without it.
    pub fn new(path: &Path, platform: Option<&str>) -> Result<Self> {
        anyhow::ensure!(
            path.is_dir(),
            "Android SDK not found at {}",
            path.display()
        );
        let path = dunce::canonicalize(path)?;
        let platforms_dir = path.join("platforms");
        let mut platforms: Vec<Platform> = std::fs::read_dir(&platforms_dir)
            .with_context(|| format!("failed to open platforms dir {}", platforms_dir.display()))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| Platform::load(entry.path()))
            .collect();
        platforms.sort_by_key(|p| version_key(&p.api_level));
        let platform = match platform {
            Some(wanted) => platforms
                .into_iter()
                .find(|p| p.matches(wanted))
                .with_context(|| {
                    format!("Invalid SDK: platform/API level {} not available", wanted)
                })?,
            None => platforms
                .pop()
                .with_context(|| format!("no platform found in {}", platforms_dir.display()))?,
        };
        let build_tools = std::fs::read_dir(path.join("build-tools"))
            .ok()
            .into_iter()
            .flatten()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .max_by_key(|entry| version_key(&entry.file_name().to_string_lossy()))
            .map(|entry| entry.path());
        tracing::debug!(
            "using android sdk {} with platform {}",
            path.display(),
            platform.dir.display()
        );
        Ok(Self {
            path,
            platform,
            build_tools,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn android_jar(&self) -> PathBuf {
        self.platform.dir.join("android.jar")
    }

    pub fn framework_aidl(&self) -> PathBuf {
        self.platform.dir.join("framework.aidl")
    }

    fn tool_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![];
        if let Some(build_tools) = &self.build_tools {
            dirs.push(build_tools.clone());
        }
        dirs.push(self.path.join("platform-tools"));
        dirs.push(self.path.join("tools"));
        dirs.push(self.platform.dir.join("tools"));
        dirs
    }

    /// Path of an SDK executable like `aapt`, `aidl`, `adb` or `apkbuilder`.
    pub fn tool(&self, name: &str) -> Result<PathBuf> {
        let candidates = if cfg!(windows) {
            vec![format!("{}.exe", name), format!("{}.bat", name)]
        } else {
            vec![name.to_string()]
        };
        for dir in self.tool_dirs() {
            for candidate in &candidates {
                let path = dir.join(candidate);
                if path.is_file() {
                    return Ok(path);
                }
            }
        }
        anyhow::bail!(
            "{} not found in the Android SDK at {}",
            name,
            self.path.display()
        )
    }

    /// `dx.jar` of the newest build tools, or of older platform-tools layouts.
    pub fn dx_jar(&self) -> Result<PathBuf> {
        self.tool_dirs()
            .into_iter()
            .map(|dir| dir.join("lib").join("dx.jar"))
            .find(|jar| jar.is_file())
            .with_context(|| format!("dx.jar not found in {}", self.path.display()))
    }

    pub fn proguard_jar(&self) -> PathBuf {
        self.path.join("tools").join("proguard").join("lib").join("proguard.jar")
    }

    pub fn emma_jar(&self) -> PathBuf {
        self.path.join("tools").join("lib").join("emma.jar")
    }

    pub fn tools_major_version(&self) -> Result<u32> {
        Ok(manifmerger::tools_major_version(&self.path)?)
    }
}

fn version_key(version: &str) -> Vec<u32> {
    version
        .split(|c: char| !c.is_ascii_digit())
        .filter_map(|part| part.parse().ok())
        .collect()
}

/// The `java` executable from `JAVA_HOME`, the `PATH`, or plain `java`
/// left for the OS to resolve.
pub fn java() -> PathBuf {
    if let Some(home) = std::env::var_os("JAVA_HOME") {
        let java = Path::new(&home).join("bin").join(exe!("java"));
        if java.is_file() {
            return java;
        }
    }
    which::which(exe!("java")).unwrap_or_else(|_| PathBuf::from(exe!("java")))
}
