use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Zip file writer used for jars, `.apksources` and `.par` bundles.
pub struct Archive {
    zip: ZipWriter<BufWriter<File>>,
}

impl Archive {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        Ok(Self {
            zip: ZipWriter::new(BufWriter::new(file)),
        })
    }

    /// Adds `source` deflated as the entry `dest`.
    pub fn add_file(&mut self, source: &Path, dest: &str) -> Result<()> {
        let mut f = File::open(source)
            .with_context(|| format!("failed to open {}", source.display()))?;
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        self.zip.start_file(dest, options)?;
        std::io::copy(&mut f, &mut self.zip)?;
        Ok(())
    }

    /// Adds every file below `source` under `prefix`. A missing directory
    /// adds nothing.
    pub fn add_directory(&mut self, source: &Path, prefix: &str) -> Result<()> {
        if !source.is_dir() {
            return Ok(());
        }
        let mut entries = std::fs::read_dir(source)?
            .collect::<std::io::Result<Vec<_>>>()?;
        entries.sort_by_key(|entry| entry.file_name());
        for entry in entries {
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            let dest = if prefix.is_empty() {
                file_name.to_string()
            } else {
                format!("{}/{}", prefix.trim_end_matches('/'), file_name)
            };
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                self.add_directory(&entry.path(), &dest)?;
            } else if file_type.is_file() {
                self.add_file(&entry.path(), &dest)?;
            }
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.zip.finish()?;
        Ok(())
    }
}

/// Checks whether a zip or jar file has an entry called `name`.
pub fn contains_entry(archive: &Path, name: &str) -> Result<bool> {
    let file = File::open(archive)
        .with_context(|| format!("failed to open {}", archive.display()))?;
    let mut zip = ZipArchive::new(file)
        .with_context(|| format!("{} is not a zip archive", archive.display()))?;
    let found = zip.by_name(name).is_ok();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zips_directory_tree_under_prefix() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let res = dir.path().join("res");
        std::fs::create_dir_all(res.join("values"))?;
        std::fs::write(res.join("values").join("strings.xml"), "<resources/>")?;
        std::fs::write(res.join("icon.png"), [0u8; 4])?;
        let out = dir.path().join("out").join("app.apksources");
        let mut archive = Archive::create(&out)?;
        archive.add_directory(&res, "res")?;
        archive.add_directory(&dir.path().join("missing"), "assets")?;
        archive.finish()?;

        let mut zip = ZipArchive::new(File::open(&out)?)?;
        let mut names: Vec<_> = zip.file_names().map(|n| n.to_string()).collect();
        names.sort();
        assert_eq!(names, ["res/icon.png", "res/values/strings.xml"]);
        assert!(zip.by_name("res/values/strings.xml").is_ok());
        assert!(contains_entry(&out, "res/icon.png")?);
        assert!(!contains_entry(&out, "assets/icon.png")?);
        Ok(())
    }

    #[test]
    fn entries_are_deflated() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let class = dir.path().join("Main.class");
        std::fs::write(&class, [0xca, 0xfe, 0xba, 0xbe])?;
        let out = dir.path().join("classes.jar");
        let mut archive = Archive::create(&out)?;
        archive.add_file(&class, "com/example/Main.class")?;
        archive.finish()?;
        let mut zip = ZipArchive::new(File::open(&out)?)?;
        let entry = zip.by_name("com/example/Main.class")?;
        assert_eq!(entry.compression(), CompressionMethod::Deflated);
        assert_eq!(entry.size(), 4);
        Ok(())
    }

    #[test]
    fn contains_entry_rejects_non_zip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("broken.jar");
        std::fs::write(&path, "not a zip")?;
        assert!(contains_entry(&path, "a.class").is_err());
        Ok(())
    }
}
