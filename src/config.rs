use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::Deserialize;

use crate::credentials::Credentials;
use crate::domain::{ChartSource, SourceId, TimeFormat};
use crate::error::ChartError;
use crate::template::{PathTemplate, SidecarTemplate, UrlTemplate};

const BUILTIN_CATALOG: &str = include_str!("../assets/catalog.json");
const SUPPORTED_SCHEMA: u32 = 1;

#[derive(Debug, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub sources: Vec<SourceEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceEntry {
    pub id: SourceId,
    pub name: String,
    pub url: UrlTemplate,
    pub image: PathTemplate,
    pub sidecar_file: PathTemplate,
    pub time_format: TimeFormat,
    pub interval_secs: u32,
    #[serde(default)]
    pub offset_secs: i64,
    pub expected_kib: u32,
    pub sidecar: SidecarTemplate,
    #[serde(default)]
    pub realm: Option<String>,
}

impl TryFrom<SourceEntry> for ChartSource {
    type Error = ChartError;

    fn try_from(entry: SourceEntry) -> Result<Self, Self::Error> {
        if entry.interval_secs == 0 {
            return Err(ChartError::InvalidSource {
                id: entry.id.to_string(),
                reason: "interval_secs must be positive".to_string(),
            });
        }
        if entry.offset_secs.unsigned_abs() >= u64::from(entry.interval_secs) {
            return Err(ChartError::InvalidSource {
                id: entry.id.to_string(),
                reason: "offset_secs must be smaller than interval_secs".to_string(),
            });
        }
        if entry.name.trim().is_empty() {
            return Err(ChartError::InvalidSource {
                id: entry.id.to_string(),
                reason: "name must not be empty".to_string(),
            });
        }
        Ok(ChartSource {
            id: entry.id,
            name: entry.name,
            url: entry.url,
            image: entry.image,
            sidecar_file: entry.sidecar_file,
            time_format: entry.time_format,
            interval_secs: entry.interval_secs,
            offset_secs: entry.offset_secs,
            expected_kib: entry.expected_kib,
            sidecar: entry.sidecar,
            realm: entry.realm.filter(|realm| !realm.trim().is_empty()),
        })
    }
}

/// Validated, read-only set of chart sources.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub schema_version: u32,
    sources: Vec<Arc<ChartSource>>,
}

impl Catalog {
    pub fn sources(&self) -> &[Arc<ChartSource>] {
        &self.sources
    }

    pub fn get(&self, id: &SourceId) -> Option<&Arc<ChartSource>> {
        self.sources.iter().find(|source| &source.id == id)
    }

    pub fn is_available(source: &ChartSource, credentials: &Credentials) -> bool {
        source
            .realm
            .as_deref()
            .map(|realm| credentials.has_realm(realm))
            .unwrap_or(true)
    }

    pub fn available<'a>(
        &'a self,
        credentials: &'a Credentials,
    ) -> impl Iterator<Item = &'a Arc<ChartSource>> + 'a {
        self.sources
            .iter()
            .filter(move |source| Self::is_available(source, credentials))
    }

    /// Looks up a source and checks its realm is covered by `credentials`.
    pub fn require(
        &self,
        id: &SourceId,
        credentials: &Credentials,
    ) -> Result<Arc<ChartSource>, ChartError> {
        let source = self
            .get(id)
            .ok_or_else(|| ChartError::UnknownSource(id.to_string()))?;
        if let Some(realm) = source.realm.as_deref() {
            if !credentials.has_realm(realm) {
                return Err(ChartError::MissingCredentials {
                    id: id.to_string(),
                    realm: realm.to_string(),
                });
            }
        }
        Ok(Arc::clone(source))
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads the catalog at `path`, or the built-in one when `path` is `None`.
    pub fn resolve(path: Option<&Path>) -> Result<Catalog, ChartError> {
        let content = match path {
            Some(path) => fs::read_to_string(path)
                .map_err(|_| ChartError::CatalogRead(path.to_path_buf()))?,
            None => BUILTIN_CATALOG.to_string(),
        };
        Self::parse(&content)
    }

    pub fn builtin() -> Result<Catalog, ChartError> {
        Self::parse(BUILTIN_CATALOG)
    }

    pub fn parse(content: &str) -> Result<Catalog, ChartError> {
        let config: CatalogConfig = serde_json::from_str(content)
            .map_err(|err| ChartError::CatalogParse(err.to_string()))?;
        Self::resolve_config(config)
    }

    pub fn resolve_config(config: CatalogConfig) -> Result<Catalog, ChartError> {
        let schema_version = config.schema_version.unwrap_or(SUPPORTED_SCHEMA);
        if schema_version != SUPPORTED_SCHEMA {
            return Err(ChartError::UnsupportedSchema(schema_version));
        }

        let mut seen = HashSet::new();
        let sources = config
            .sources
            .into_iter()
            .map(|entry| {
                if !seen.insert(entry.id.clone()) {
                    return Err(ChartError::DuplicateSource(entry.id.to_string()));
                }
                ChartSource::try_from(entry).map(Arc::new)
            })
            .collect::<Result<Vec<_>, ChartError>>()?;

        tracing::debug!(count = sources.len(), "catalog loaded");
        Ok(Catalog {
            schema_version,
            sources,
        })
    }
}

/// Filesystem locations used by the downloader.
#[derive(Debug, Clone)]
pub struct Settings {
    pub download_dir: Utf8PathBuf,
    pub credentials_path: PathBuf,
}

impl Settings {
    pub fn new() -> Result<Self, ChartError> {
        let data_root = BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".vfrnav"))
            .ok_or_else(|| ChartError::Filesystem("unable to resolve home directory".to_string()))?;
        let download_dir = Utf8PathBuf::from_path_buf(data_root.join("bitmapmaps").join("wetterdl"))
            .map_err(|_| ChartError::Filesystem("invalid download path".to_string()))?;
        Ok(Self {
            download_dir,
            credentials_path: data_root.join("wetterdl"),
        })
    }

    pub fn with_overrides(
        mut self,
        download_dir: Option<Utf8PathBuf>,
        credentials_path: Option<PathBuf>,
    ) -> Self {
        if let Some(dir) = download_dir {
            self.download_dir = dir;
        }
        if let Some(path) = credentials_path {
            self.credentials_path = path;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const MINIMAL: &str = r#"{
        "sources": [{
            "id": "radar_test",
            "name": "Radar Test",
            "url": "http://example.org/rad_{stamp}.png",
            "image": "rad_{stamp}.png",
            "sidecar_file": "rad_{stamp}.xml",
            "time_format": "%y%m%d%H%M",
            "interval_secs": 300,
            "expected_kib": 100,
            "sidecar": "<map file=\"{file}\"/>",
            "realm": "http://example.org/"
        }]
    }"#;

    #[test]
    fn builtin_catalog_is_valid() {
        let catalog = ConfigLoader::builtin().unwrap();
        assert_eq!(catalog.schema_version, 1);
        let open = catalog.available(&Credentials::empty()).count();
        assert_eq!(open, 7);
        let id: SourceId = "blitzortung_europe".parse().unwrap();
        let source = catalog.get(&id).unwrap();
        assert_eq!(source.interval_secs, 60);
        assert_eq!(source.expected_kib, 53);
    }

    #[test]
    fn parse_minimal_catalog() {
        let catalog = ConfigLoader::parse(MINIMAL).unwrap();
        let id: SourceId = "radar_test".parse().unwrap();
        let err = catalog.require(&id, &Credentials::empty()).unwrap_err();
        assert_matches!(err, ChartError::MissingCredentials { .. });

        let creds = Credentials::parse("u:p:http://example.org/\n");
        let source = catalog.require(&id, &creds).unwrap();
        assert_eq!(source.offset_secs, 0);
    }

    #[test]
    fn rejects_zero_interval() {
        let content = MINIMAL.replace("\"interval_secs\": 300", "\"interval_secs\": 0");
        let err = ConfigLoader::parse(&content).unwrap_err();
        assert_matches!(err, ChartError::InvalidSource { .. });
    }

    #[test]
    fn rejects_offset_outside_interval() {
        for offset in ["300", "-300", "-9223372036854775808"] {
            let content = MINIMAL.replace(
                "\"interval_secs\": 300",
                &format!("\"interval_secs\": 300, \"offset_secs\": {offset}"),
            );
            let err = ConfigLoader::parse(&content).unwrap_err();
            assert_matches!(err, ChartError::InvalidSource { .. });
        }

        let content = MINIMAL.replace(
            "\"interval_secs\": 300",
            "\"interval_secs\": 300, \"offset_secs\": -299",
        );
        let catalog = ConfigLoader::parse(&content).unwrap();
        assert_eq!(catalog.sources()[0].offset_secs, -299);
    }

    #[test]
    fn rejects_bad_template_at_load() {
        let content = MINIMAL.replace("rad_{stamp}.xml", "rad_{epoch}.xml");
        let err = ConfigLoader::parse(&content).unwrap_err();
        assert_matches!(err, ChartError::CatalogParse(_));
    }
}
