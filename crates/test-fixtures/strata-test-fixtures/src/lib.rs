use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Deserialize;

static MANIFEST: Lazy<Manifest> = Lazy::new(|| {
    let raw = include_str!("../../../../fixtures/manifest.json");
    serde_json::from_str(raw).expect("fixtures manifest should parse")
});

#[derive(Debug, Deserialize)]
struct Manifest {
    skeletons: HashMap<String, String>,
    clips: HashMap<String, ClipEntry>,
    setups: HashMap<String, String>,
}

/// Clip fixtures are either a bare path or a path tagged with the set they belong to.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClipEntry {
    Path(String),
    Detailed {
        path: String,
        #[serde(default)]
        set: Option<String>,
    },
}

impl ClipEntry {
    fn as_path(&self) -> &str {
        match self {
            ClipEntry::Path(path) => path,
            ClipEntry::Detailed { path, .. } => path,
        }
    }

    fn set(&self) -> Option<&str> {
        match self {
            ClipEntry::Path(_) => None,
            ClipEntry::Detailed { set, .. } => set.as_deref(),
        }
    }
}

fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures")
}

fn resolve_path(rel: &str) -> PathBuf {
    fixtures_root().join(rel)
}

fn read_to_string(rel: &str) -> Result<String> {
    let path = resolve_path(rel);
    fs::read_to_string(&path)
        .with_context(|| format!("failed to read fixture at {}", path.display()))
}

fn load_json<T: DeserializeOwned>(rel: &str) -> Result<T> {
    let text = read_to_string(rel)?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse JSON fixture {rel}"))
}

fn lookup<'a, T>(map: &'a HashMap<String, T>, kind: &str, name: &str) -> Result<&'a T> {
    map.get(name)
        .ok_or_else(|| anyhow!("unknown {kind} fixture '{name}'"))
}

pub mod skeletons {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.skeletons.keys().cloned().collect()
    }

    pub fn json(name: &str) -> Result<String> {
        let rel = lookup(&MANIFEST.skeletons, "skeleton", name)?;
        read_to_string(rel)
    }

    pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
        let rel = lookup(&MANIFEST.skeletons, "skeleton", name)?;
        super::load_json(rel)
    }
}

pub mod clips {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.clips.keys().cloned().collect()
    }

    /// Names of every clip fixture tagged with `set`, sorted for stable load order.
    pub fn in_set(set: &str) -> Vec<String> {
        let mut names: Vec<String> = MANIFEST
            .clips
            .iter()
            .filter(|(_, entry)| entry.set() == Some(set))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn json(name: &str) -> Result<String> {
        let entry = lookup(&MANIFEST.clips, "clip", name)?;
        read_to_string(entry.as_path())
    }

    pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
        let entry = lookup(&MANIFEST.clips, "clip", name)?;
        super::load_json(entry.as_path())
    }

    pub fn path(name: &str) -> Result<PathBuf> {
        let entry = lookup(&MANIFEST.clips, "clip", name)?;
        Ok(resolve_path(entry.as_path()))
    }
}

pub mod setups {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.setups.keys().cloned().collect()
    }

    pub fn json(name: &str) -> Result<String> {
        let rel = lookup(&MANIFEST.setups, "setup", name)?;
        read_to_string(rel)
    }

    pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
        let rel = lookup(&MANIFEST.setups, "setup", name)?;
        super::load_json(rel)
    }
}
