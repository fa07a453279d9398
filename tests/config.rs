use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use wxchart_dl::config::{CatalogConfig, ConfigLoader, Settings};
use wxchart_dl::credentials::Credentials;
use wxchart_dl::error::ChartError;

const SOURCE: &str = r#"{
    "id": "sat_eu",
    "name": "Satellite Europe",
    "url": "https://charts.test/sat/{stamp}.jpg",
    "image": "sat/{stamp}.jpg",
    "sidecar_file": "sat/{stamp}.xml",
    "time_format": "%Y%m%d%H%M",
    "interval_secs": 900,
    "offset_secs": 300,
    "expected_kib": 400,
    "sidecar": "<map file=\"{file}\" epoch=\"{epoch}\"/>"
}"#;

fn catalog_with(sources: &[&str]) -> String {
    format!(r#"{{"schema_version": 1, "sources": [{}]}}"#, sources.join(","))
}

#[test]
fn catalog_file_replaces_builtin() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("catalog.json");
    fs::write(&path, catalog_with(&[SOURCE])).unwrap();

    let catalog = ConfigLoader::resolve(Some(&path)).unwrap();

    assert_eq!(catalog.sources().len(), 1);
    let source = catalog.require(&"SAT_EU".parse().unwrap(), &Credentials::empty()).unwrap();
    assert_eq!(source.offset_secs, 300);
    assert_eq!(source.realm, None);
}

#[test]
fn missing_catalog_file_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    let err = ConfigLoader::resolve(Some(&temp.path().join("absent.json"))).unwrap_err();
    assert_matches!(err, ChartError::CatalogRead(_));
}

#[test]
fn duplicate_ids_are_rejected() {
    let err = ConfigLoader::parse(&catalog_with(&[SOURCE, SOURCE])).unwrap_err();
    assert_matches!(err, ChartError::DuplicateSource(id) if id == "sat_eu");
}

#[test]
fn unknown_schema_is_rejected() {
    let config: CatalogConfig = serde_json::from_str(r#"{"schema_version": 2}"#).unwrap();
    let err = ConfigLoader::resolve_config(config).unwrap_err();
    assert_matches!(err, ChartError::UnsupportedSchema(2));
}

#[test]
fn unknown_template_field_is_rejected() {
    let broken = SOURCE.replace("{stamp}.jpg\"", "{hour}.jpg\"");
    let err = ConfigLoader::parse(&catalog_with(&[&broken])).unwrap_err();
    assert_matches!(err, ChartError::CatalogParse(_));
}

#[test]
fn gated_sources_follow_credentials() {
    let catalog = ConfigLoader::builtin().unwrap();
    let gated = catalog
        .sources()
        .iter()
        .find(|source| source.realm.as_deref() == Some("http://www.flugwetter.de/"))
        .unwrap();

    let err = catalog.require(&gated.id, &Credentials::empty()).unwrap_err();
    assert_matches!(err, ChartError::MissingCredentials { .. });

    let credentials = Credentials::parse("pilot:secret:http://www.flugwetter.de/\n");
    assert!(catalog.require(&gated.id, &credentials).is_ok());
    assert!(
        catalog.available(&credentials).count() > catalog.available(&Credentials::empty()).count()
    );
}

#[test]
fn unknown_source_is_reported() {
    let catalog = ConfigLoader::builtin().unwrap();
    let err = catalog
        .require(&"no_such_chart".parse().unwrap(), &Credentials::empty())
        .unwrap_err();
    assert_matches!(err, ChartError::UnknownSource(_));
}

#[test]
fn settings_overrides_replace_defaults() {
    let settings = Settings {
        download_dir: "/var/charts".into(),
        credentials_path: "/etc/wxchart/credentials".into(),
    }
    .with_overrides(Some("/tmp/charts".into()), None);

    assert_eq!(settings.download_dir, Utf8PathBuf::from("/tmp/charts"));
    assert_eq!(
        settings.credentials_path,
        std::path::PathBuf::from("/etc/wxchart/credentials")
    );
}
