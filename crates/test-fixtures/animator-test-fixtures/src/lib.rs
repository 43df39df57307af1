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
    controllers: HashMap<String, ControllerEntry>,
    clips: HashMap<String, String>,
}

/// A controller description, optionally paired with the clip set it indexes.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ControllerEntry {
    Path(String),
    Detailed {
        path: String,
        #[serde(default)]
        clips: Option<String>,
    },
}

impl ControllerEntry {
    fn as_path(&self) -> &str {
        match self {
            ControllerEntry::Path(path) => path,
            ControllerEntry::Detailed { path, .. } => path,
        }
    }

    fn clips(&self) -> Option<&str> {
        match self {
            ControllerEntry::Path(_) => None,
            ControllerEntry::Detailed { clips, .. } => clips.as_deref(),
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

pub mod controllers {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.controllers.keys().cloned().collect()
    }

    pub fn json(name: &str) -> Result<String> {
        let entry = lookup(&MANIFEST.controllers, "controller", name)?;
        read_to_string(entry.as_path())
    }

    pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
        let entry = lookup(&MANIFEST.controllers, "controller", name)?;
        super::load_json(entry.as_path())
    }

    /// Name of the clip set the controller was authored against, if any.
    pub fn clip_set(name: &str) -> Result<Option<String>> {
        let entry = lookup(&MANIFEST.controllers, "controller", name)?;
        Ok(entry.clips().map(str::to_string))
    }

    pub fn path(name: &str) -> Result<PathBuf> {
        let entry = lookup(&MANIFEST.controllers, "controller", name)?;
        Ok(resolve_path(entry.as_path()))
    }
}

pub mod clips {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.clips.keys().cloned().collect()
    }

    pub fn json(name: &str) -> Result<String> {
        let rel = lookup(&MANIFEST.clips, "clip set", name)?;
        read_to_string(rel)
    }

    pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
        let rel = lookup(&MANIFEST.clips, "clip set", name)?;
        super::load_json(rel)
    }

    pub fn path(name: &str) -> Result<PathBuf> {
        let rel = lookup(&MANIFEST.clips, "clip set", name)?;
        Ok(resolve_path(rel))
    }
}
