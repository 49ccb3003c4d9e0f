//! Registration table for bucket credentials.
//!
//! The host discovers [`DESCRIPTOR`] for display metadata and looks
//! credentials up by id in a [`CredentialCatalog`]. Resolvers (and the
//! clients inside them) are shared per region.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tracing::info;

use crate::config::Settings;
use crate::credential::BucketCredential;
use crate::errors::ConfigError;
use crate::models::{CredentialParams, CredentialRecord, Region};
use crate::resolver::SecretResolver;

/// Static metadata the host shows for this credential kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialDescriptor {
    pub kind: &'static str,
    pub display_name: &'static str,
}

pub const DESCRIPTOR: CredentialDescriptor = CredentialDescriptor {
    kind: "awsBucketCredentials",
    display_name: "AWS Bucket Credentials",
};

enum ResolverSource {
    PerRegion(Settings),
    Shared(Arc<SecretResolver>),
}

pub struct CredentialCatalog {
    source: ResolverSource,
    resolvers: DashMap<Region, Arc<SecretResolver>>,
    entries: DashMap<String, Arc<BucketCredential>>,
    reload_lock: Mutex<()>,
}

impl CredentialCatalog {
    /// Empty catalog that builds one S3/KMS resolver per region on demand.
    pub fn new(settings: Settings) -> Self {
        Self::with_source(ResolverSource::PerRegion(settings))
    }

    /// Empty catalog whose credentials all use `resolver`.
    pub fn with_resolver(resolver: Arc<SecretResolver>) -> Self {
        Self::with_source(ResolverSource::Shared(resolver))
    }

    fn with_source(source: ResolverSource) -> Self {
        Self {
            source,
            resolvers: DashMap::new(),
            entries: DashMap::new(),
            reload_lock: Mutex::new(()),
        }
    }

    fn resolver_for(&self, region: Region) -> Result<Arc<SecretResolver>, ConfigError> {
        match &self.source {
            ResolverSource::Shared(resolver) => Ok(resolver.clone()),
            ResolverSource::PerRegion(settings) => {
                if let Some(resolver) = self.resolvers.get(&region) {
                    return Ok(resolver.value().clone());
                }
                let resolver = Arc::new(SecretResolver::from_settings(region, settings)?);
                self.resolvers.insert(region, resolver.clone());
                Ok(resolver)
            }
        }
    }

    /// Wrap `record` in a credential and register it, replacing any entry
    /// with the same id.
    pub fn add(&self, record: CredentialRecord) -> Result<Arc<BucketCredential>, ConfigError> {
        let resolver = self.resolver_for(record.region())?;
        let credential = Arc::new(BucketCredential::new(record, resolver));
        self.entries
            .insert(credential.id().to_string(), credential.clone());
        Ok(credential)
    }

    /// Register a prebuilt credential. Returns the entry it replaced.
    pub fn register(&self, credential: BucketCredential) -> Option<Arc<BucketCredential>> {
        self.entries
            .insert(credential.id().to_string(), Arc::new(credential))
    }

    pub fn get(&self, id: &str) -> Option<Arc<BucketCredential>> {
        self.entries.get(id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, id: &str) -> Option<Arc<BucketCredential>> {
        self.entries.remove(id).map(|(_, credential)| credential)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace the whole catalog. Every record is wrapped before anything is
    /// swapped, so a failure leaves the current entries untouched.
    ///
    /// New entries are inserted before stale ones are dropped: an id present
    /// in both the old and new catalog stays visible to concurrent `get`s
    /// throughout.
    pub fn reload(&self, records: Vec<CredentialRecord>) -> Result<(), ConfigError> {
        let mut built = Vec::with_capacity(records.len());
        for record in records {
            let resolver = self.resolver_for(record.region())?;
            built.push(Arc::new(BucketCredential::new(record, resolver)));
        }

        let _guard = self.reload_lock.lock().unwrap_or_else(|p| p.into_inner());
        let keep: HashSet<String> = built.iter().map(|c| c.id().to_string()).collect();
        for credential in built {
            self.entries
                .insert(credential.id().to_string(), credential);
        }
        self.entries.retain(|id, _| keep.contains(id));
        info!(count = self.entries.len(), "credential catalog reloaded");
        Ok(())
    }

    /// Load a catalog from a YAML (or `.json`) list of credential entries.
    pub fn load_file(path: &Path, settings: Settings) -> Result<Self, ConfigError> {
        let records = read_catalog_file(path)?;
        let catalog = Self::new(settings);
        catalog.reload(records)?;
        Ok(catalog)
    }
}

/// Parse and validate every entry of a catalog file. Any invalid entry or
/// duplicate id fails the whole file.
pub fn read_catalog_file(path: &Path) -> Result<Vec<CredentialRecord>, ConfigError> {
    let display = path.display().to_string();
    let catalog_error = |reason: String| ConfigError::Catalog {
        path: display.clone(),
        reason,
    };

    let contents = std::fs::read_to_string(path).map_err(|e| catalog_error(e.to_string()))?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let entries: Vec<CredentialParams> = if is_json {
        serde_json::from_str(&contents).map_err(|e| catalog_error(e.to_string()))?
    } else {
        serde_yaml::from_str(&contents).map_err(|e| catalog_error(e.to_string()))?
    };

    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(entries.len());
    for (index, params) in entries.into_iter().enumerate() {
        let record = CredentialRecord::new(params)
            .map_err(|e| catalog_error(format!("entry {index}: {e}")))?;
        if !seen.insert(record.id().to_string()) {
            return Err(catalog_error(format!(
                "entry {index}: duplicate id {:?}",
                record.id()
            )));
        }
        records.push(record);
    }
    Ok(records)
}
