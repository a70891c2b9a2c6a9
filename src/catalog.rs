//! Predefined campaigns a GM can load.
//!
//! Two campaigns ship inside the binary. Operators can add more, or replace a
//! built-in one with the same key, by dropping `*.json` files in the
//! directory named by `[campaigns] dir`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::lobby::Campaign;
use crate::validation::clean_key;

const BUILTIN: &[(&str, &str)] = &[
    ("lantern-crypt.json", include_str!("../data/campaigns/lantern-crypt.json")),
    ("salt-road.json", include_str!("../data/campaigns/salt-road.json")),
];

const MAX_KEY: usize = 40;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// What `/campaigns` and the CLI list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignSummary {
    pub key: String,
    pub title: String,
    pub summary: String,
    pub scenes: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CampaignCatalog {
    campaigns: BTreeMap<String, Campaign>,
}

/// Parse one definition; the key comes from the file unless the stem is all we have.
fn parse_definition(stem: &str, contents: &str, path: &Path) -> Result<(String, Campaign), CatalogError> {
    let mut campaign: Campaign = serde_json::from_str(contents).map_err(|e| CatalogError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    let key = campaign
        .key
        .as_deref()
        .map(|k| clean_key(k, MAX_KEY))
        .filter(|k| !k.is_empty())
        .unwrap_or_else(|| clean_key(stem, MAX_KEY));
    campaign.key = Some(key.clone());
    Ok((key, campaign))
}

impl CampaignCatalog {
    /// Catalog holding only the campaigns compiled into the binary.
    pub fn builtin() -> Self {
        let mut catalog = CampaignCatalog::default();
        for (file, contents) in BUILTIN {
            let path = Path::new(file);
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(file);
            match parse_definition(stem, contents, path) {
                Ok((key, campaign)) => {
                    catalog.campaigns.insert(key, campaign);
                }
                Err(e) => log::error!("Built-in campaign skipped: {}", e),
            }
        }
        catalog
    }

    /// Load every `*.json` in `dir`. A missing directory is not an error.
    /// Returns how many definitions were added or replaced.
    pub fn load_dir<P: AsRef<Path>>(&mut self, dir: P) -> Result<usize, CatalogError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            log::debug!("Campaign directory {} not present", dir.display());
            return Ok(0);
        }
        let entries = fs::read_dir(dir).map_err(|e| CatalogError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|x| x.to_str()) == Some("json"))
            .collect();
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            let contents = fs::read_to_string(&path).map_err(|e| CatalogError::Io {
                path: path.clone(),
                source: e,
            })?;
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            let (key, campaign) = parse_definition(&stem, &contents, &path)?;
            if key.is_empty() {
                log::warn!("Campaign file {} has no usable key, skipped", path.display());
                continue;
            }
            log::info!("Loaded campaign '{}' from {}", key, path.display());
            self.campaigns.insert(key, campaign);
            loaded += 1;
        }
        Ok(loaded)
    }

    pub fn get(&self, key: &str) -> Option<&Campaign> {
        self.campaigns.get(key)
    }

    pub fn list(&self) -> Vec<CampaignSummary> {
        self.campaigns
            .iter()
            .map(|(key, c)| CampaignSummary {
                key: key.clone(),
                title: c.title.clone(),
                summary: c.summary.clone(),
                scenes: c.scenes.len(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.campaigns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.campaigns.is_empty()
    }
}
