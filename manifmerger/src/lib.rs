//! Merges library manifests into an application manifest with the merger
//! that ships in `tools/lib` of the Android SDK.
//!
//! The jars changed between tools r20 and r21, so a [`MergeStrategy`] is
//! picked from the installed tools revision and validated against the jars
//! on disk before anything is run.
use droidcommon::{contains_entry, parse_properties, Command, Execute, ExecutionError};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

const MAIN_CLASS: &str = "com.android.manifmerger.Main";
const MERGER_CLASS: &str = "com/android/manifmerger/ManifestMerger.class";

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no Pkg.Revision in {}", .0.display())]
    MissingRevision(PathBuf),
    #[error("invalid tools revision `{0}`")]
    InvalidRevision(String),
    #[error("manifest merger {revision} needs {}: {reason}", .jar.display())]
    Vendor {
        revision: Revision,
        jar: PathBuf,
        reason: String,
    },
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Revision {
    R20,
    R21,
}

impl Revision {
    /// Picks the merger flavour for a tools major version.
    pub fn for_tools(major: u32) -> Self {
        if major == 21 {
            Self::R21
        } else {
            log::warn!(
                "SDK tools r{} are not supported by the manifest merger, falling back to r20. Results may be unreliable.",
                major
            );
            Self::R20
        }
    }

    /// Reads the tools revision of the SDK at `sdk`.
    pub fn detect(sdk: &Path) -> Result<Self, MergeError> {
        Ok(Self::for_tools(tools_major_version(sdk)?))
    }

    fn logger_jar(self) -> (&'static str, &'static str) {
        match self {
            Self::R20 => ("sdklib.jar", "com/android/sdklib/StdSdkLog.class"),
            Self::R21 => ("common.jar", "com/android/utils/StdLogger.class"),
        }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::R20 => write!(f, "r20"),
            Self::R21 => write!(f, "r21"),
        }
    }
}

/// Major version of the installed SDK tools, from `tools/source.properties`.
pub fn tools_major_version(sdk: &Path) -> Result<u32, MergeError> {
    let path = sdk.join("tools").join("source.properties");
    let text = std::fs::read_to_string(&path).map_err(|source| MergeError::Io {
        path: path.clone(),
        source,
    })?;
    let props = parse_properties(&text);
    let revision = props
        .get("Pkg.Revision")
        .ok_or(MergeError::MissingRevision(path))?;
    let major = revision
        .split(['.', ' '])
        .next()
        .unwrap_or_default();
    major
        .parse()
        .map_err(|_| MergeError::InvalidRevision(revision.clone()))
}

/// The vendor jars of one merger flavour.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MergeStrategy {
    revision: Revision,
    merger_jar: PathBuf,
    logger_jar: PathBuf,
}

impl MergeStrategy {
    /// Locates and checks the jars for `revision` in `<sdk>/tools/lib`.
    pub fn new(revision: Revision, sdk: &Path) -> Result<Self, MergeError> {
        let lib = sdk.join("tools").join("lib");
        let merger_jar = lib.join("manifmerger.jar");
        check_vendor_jar(revision, &merger_jar, MERGER_CLASS)?;
        let (jar, class) = revision.logger_jar();
        let logger_jar = lib.join(jar);
        check_vendor_jar(revision, &logger_jar, class)?;
        Ok(Self {
            revision,
            merger_jar,
            logger_jar,
        })
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn classpath(&self) -> OsString {
        let mut cp = OsString::from(&self.merger_jar);
        cp.push(if cfg!(windows) { ";" } else { ":" });
        cp.push(&self.logger_jar);
        cp
    }

    pub fn command(&self, java: &Path, out: &Path, main: &Path, libs: &[PathBuf]) -> Command {
        Command::new(java)
            .arg("-cp")
            .arg(self.classpath())
            .arg(MAIN_CLASS)
            .arg("merge")
            .arg("--out")
            .arg(out)
            .arg("--main")
            .arg(main)
            .arg("--libs")
            .args(libs)
            .fail_on_stderr(false)
    }
}

fn check_vendor_jar(revision: Revision, jar: &Path, class: &str) -> Result<(), MergeError> {
    let vendor = |reason: String| MergeError::Vendor {
        revision,
        jar: jar.to_path_buf(),
        reason,
    };
    if !jar.is_file() {
        return Err(vendor("file not found".into()));
    }
    match contains_entry(jar, class) {
        Ok(true) => Ok(()),
        Ok(false) => Err(vendor(format!("{} not found", class))),
        Err(err) => Err(vendor(err.to_string())),
    }
}

/// Owns the strategy chosen for one SDK installation.
#[derive(Clone, Debug)]
pub struct ManifestMerger {
    java: PathBuf,
    strategy: MergeStrategy,
}

impl ManifestMerger {
    pub fn new(java: PathBuf, sdk: &Path) -> Result<Self, MergeError> {
        let strategy = MergeStrategy::new(Revision::detect(sdk)?, sdk)?;
        Ok(Self { java, strategy })
    }

    pub fn with_strategy(java: PathBuf, strategy: MergeStrategy) -> Self {
        Self { java, strategy }
    }

    pub fn strategy(&self) -> &MergeStrategy {
        &self.strategy
    }

    /// Writes the merge of `main` and `libs` to `out`. Returns `false` when
    /// the merger rejects the inputs.
    pub fn merge<E: Execute>(
        &self,
        exec: &mut E,
        out: &Path,
        main: &Path,
        libs: &[PathBuf],
    ) -> Result<bool, MergeError> {
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent).map_err(|source| MergeError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let command = self.strategy.command(&self.java, out, main, libs);
        log::debug!("merging manifests with {}", self.strategy.revision());
        match exec.execute(&command) {
            Ok(_) => Ok(out.exists()),
            Err(ExecutionError::Failed { code, stderr, .. }) => {
                log::error!("manifest merger exited with {}: {}", code, stderr.trim());
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }
}
