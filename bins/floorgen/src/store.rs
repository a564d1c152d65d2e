//! Versioned run workspaces and result collection.
//!
//! Every run gets a fresh `workspace_<circuit>_<mode>_v<N>` directory, and
//! collected files land under `results/<circuit>/` with a `_vK` name suffix
//! on collision. Nothing is ever overwritten.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

/// Creates run workspaces and collects run outputs under one root.
pub struct RunStore {
    root: PathBuf,
}

/// One run's directories.
pub struct Workspace {
    /// The run directory; the placer runs here and logs land here.
    pub dir: PathBuf,
    /// The input directory the placer reads, named after the circuit.
    pub input_dir: PathBuf,
    /// The run's version number.
    pub version: u32,
}

impl RunStore {
    /// Creates a store rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the next `workspace_<circuit>_<mode>_v<N>` directory.
    ///
    /// `N` is the first version with no existing directory, so reruns never
    /// touch earlier workspaces.
    pub fn create_workspace(&self, circuit: &str, mode: &str) -> anyhow::Result<Workspace> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create run root {:?}", self.root))?;
        let mut version = 1u32;
        let dir = loop {
            let candidate = self
                .root
                .join(format!("workspace_{circuit}_{mode}_v{version}"));
            if !candidate.exists() {
                break candidate;
            }
            version += 1;
        };
        let input_dir = dir.join(circuit);
        fs::create_dir_all(&input_dir)
            .with_context(|| format!("failed to create workspace {dir:?}"))?;
        tracing::info!(circuit, mode, version, "created workspace {dir:?}");
        Ok(Workspace {
            dir,
            input_dir,
            version,
        })
    }

    /// Copies files into `results/<circuit>/`, renaming on collision.
    ///
    /// Returns the destination paths.
    pub fn collect(&self, circuit: &str, files: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
        let dest_dir = self.root.join("results").join(circuit);
        fs::create_dir_all(&dest_dir)
            .with_context(|| format!("failed to create results directory {dest_dir:?}"))?;
        let mut collected = Vec::with_capacity(files.len());
        for file in files {
            let name = file
                .file_name()
                .and_then(|n| n.to_str())
                .with_context(|| format!("output file {file:?} has no usable name"))?;
            let dest = unused_path(&dest_dir, name);
            fs::copy(file, &dest)
                .with_context(|| format!("failed to copy {file:?} to {dest:?}"))?;
            collected.push(dest);
        }
        tracing::info!(
            circuit,
            files = collected.len(),
            "collected results into {dest_dir:?}"
        );
        Ok(collected)
    }
}

/// The first unused path for `name` in `dir`, suffixing the stem with `_vK`
/// on collision.
///
/// The existing file counts as the first version, so suffixes start at
/// `_v2`. The suffix goes before the final extension: `a.b.json` becomes
/// `a.b_v2.json`.
fn unused_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (name, None),
    };
    let mut version = 2u32;
    loop {
        let versioned = match ext {
            Some(ext) => format!("{stem}_v{version}.{ext}"),
            None => format!("{stem}_v{version}"),
        };
        let candidate = dir.join(versioned);
        if !candidate.exists() {
            return candidate;
        }
        version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reruns_get_fresh_workspaces() {
        let tmp = tempfile::tempdir().unwrap();
        let store = RunStore::new(tmp.path());
        let first = store.create_workspace("ota5", "floorplan").unwrap();
        fs::write(first.input_dir.join("ota5.sp"), "* run 1").unwrap();
        let second = store.create_workspace("ota5", "floorplan").unwrap();

        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        assert_ne!(first.dir, second.dir);
        // The first run's inputs are untouched.
        assert_eq!(
            fs::read_to_string(first.input_dir.join("ota5.sp")).unwrap(),
            "* run 1"
        );
    }

    #[test]
    fn mode_suffix_separates_workspaces() {
        let tmp = tempfile::tempdir().unwrap();
        let store = RunStore::new(tmp.path());
        let a = store.create_workspace("ota5", "floorplan").unwrap();
        let b = store.create_workspace("ota5", "pnr").unwrap();
        assert_eq!(a.version, 1);
        assert_eq!(b.version, 1);
        assert_ne!(a.dir, b.dir);
    }

    #[test]
    fn collection_never_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let store = RunStore::new(tmp.path());
        let src = tmp.path().join("ota5_0.json");

        fs::write(&src, "first").unwrap();
        let first = store.collect("ota5", &[src.clone()]).unwrap();
        fs::write(&src, "second").unwrap();
        let second = store.collect("ota5", &[src.clone()]).unwrap();
        let third = store.collect("ota5", &[src]).unwrap();

        assert_eq!(first[0].file_name().unwrap(), "ota5_0.json");
        assert_eq!(second[0].file_name().unwrap(), "ota5_0_v2.json");
        assert_eq!(third[0].file_name().unwrap(), "ota5_0_v3.json");
        assert_eq!(fs::read_to_string(&first[0]).unwrap(), "first");
        assert_eq!(fs::read_to_string(&second[0]).unwrap(), "second");
    }

    #[test]
    fn collision_suffix_precedes_the_final_extension() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("ota5.python.gds"), "").unwrap();
        assert_eq!(
            unused_path(tmp.path(), "ota5.python.gds").file_name().unwrap(),
            "ota5.python_v2.gds"
        );
    }

    #[test]
    fn extensionless_names_get_plain_suffixes() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("notes"), "").unwrap();
        assert_eq!(
            unused_path(tmp.path(), "notes").file_name().unwrap(),
            "notes_v2"
        );
    }
}
