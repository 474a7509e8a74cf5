use crate::logger::LogLevel;
use crate::mapping::MappingTree;
use crate::registry::DEFAULT_SYNC_FLAG_SUFFIX;
use crate::schema::{ModelSpec, Schema};
use crate::sync::Propagation;
use crate::{info, AppError};
use config::{Config, ConfigError, Environment, File, FileFormat};
use dotenv::dotenv;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Once;

static DOTENV_ONCE: Once = Once::new();

fn ensure_dotenv_loaded() {
    DOTENV_ONCE.call_once(|| match dotenv() {
        Ok(_) => info!("Config loaded including .env file."),
        Err(_) => info!("Config loaded without .env file."),
    });
}

/// Reads `path` (any format the `config` crate knows) overlaid with `<PREFIX>__SECTION__KEY`
/// environment variables.
pub fn load_config<T>(path: &str, prefix: &str) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Debug,
{
    ensure_dotenv_loaded();

    let builder = Config::builder()
        .add_source(File::with_name(path).required(true))
        .add_source(Environment::with_prefix(prefix).try_parsing(true).separator("__"));

    let cfg = builder.build()?.try_deserialize::<T>()?;
    info!("{:#?}", cfg);
    Ok(cfg)
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub storage: StorageSettings,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub models: BTreeMap<String, ModelSettings>,
    /// Nested mappings per depender model, leaves in document order.
    #[serde(default)]
    pub mappings: BTreeMap<String, MappingTree>,
    /// `a.b.column == target` expressions per depender model.
    #[serde(default)]
    pub expressions: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    pub db_path: String,
    #[serde(default = "default_cache_size_mb")]
    pub db_cache_size_mb: usize,
}

fn default_cache_size_mb() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncSettings {
    #[serde(default = "default_sync_flag_suffix")]
    pub sync_flag_suffix: String,
    #[serde(default)]
    pub propagation: Propagation,
    #[serde(default)]
    pub log_level: LogLevel,
}

fn default_sync_flag_suffix() -> String {
    DEFAULT_SYNC_FLAG_SUFFIX.to_string()
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self { sync_flag_suffix: default_sync_flag_suffix(), propagation: Propagation::default(), log_level: LogLevel::default() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelSettings {
    pub table: Option<String>,
    pub primary_key: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub belongs_to: BTreeMap<String, AssociationSettings>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssociationSettings {
    pub model: String,
    /// Defaults to `<association>_id`.
    pub foreign_key: Option<String>,
}

impl AppConfig {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        load_config(path, "DENORM")
    }

    /// Inline TOML, without file or environment sources.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Config::builder().add_source(File::from_str(toml, FileFormat::Toml)).build()?.try_deserialize()
    }

    pub fn to_schema(&self) -> Result<Schema, AppError> {
        let mut builder = Schema::builder();
        for (name, settings) in &self.models {
            let mut spec = ModelSpec::new(name).columns(&settings.columns);
            if let Some(table) = &settings.table {
                spec = spec.table(table);
            }
            if let Some(pk) = &settings.primary_key {
                spec = spec.primary_key(pk);
            }
            for (association, target) in &settings.belongs_to {
                let foreign_key = target.foreign_key.clone().unwrap_or_else(|| format!("{}_id", association));
                spec = spec.belongs_to(association, &target.model, &foreign_key);
            }
            builder = builder.spec(spec);
        }
        builder.build()
    }
}

#[cfg(test)]
mod settings_tests {
    use super::*;

    const TOML: &str = r#"
        [storage]
        db_path = "/tmp/denorm/company"

        [sync]
        propagation = "deferred"
        log_level = "debug"

        [models.countries]
        columns = ["name"]

        [models.companies]
        columns = ["name"]
        belongs_to.country = { model = "countries" }

        [models.employees]
        table = "staff"
        columns = ["name", "company_country_name", "company_country_name_is_synced", "company_name"]
        belongs_to.company = { model = "companies", foreign_key = "employer_id" }

        [mappings.employees.company]
        name = "company_name"
        country = { name = "company_country_name" }
    "#;

    #[test]
    fn parses_models_and_sync_settings() {
        let config = AppConfig::from_toml_str(TOML).expect("config");
        assert_eq!(config.storage.db_cache_size_mb, 64);
        assert_eq!(config.sync.propagation, Propagation::Deferred);
        assert_eq!(config.sync.log_level, LogLevel::Debug);
        assert_eq!(config.sync.sync_flag_suffix, "_is_synced");

        let schema = config.to_schema().expect("schema");
        let employees = schema.model(schema.model_id("employees").unwrap());
        assert_eq!(employees.table, "staff");
        assert_eq!(employees.association("company").map(|a| a.foreign_key.as_str()), Some("employer_id"));
        let companies = schema.model(schema.model_id("companies").unwrap());
        assert!(companies.has_column("country_id"));
    }

    #[test]
    fn mappings_keep_document_order() {
        let config = AppConfig::from_toml_str(TOML).expect("config");
        let targets: Vec<String> = config.mappings["employees"].flatten().into_iter().map(|m| m.target).collect();
        assert_eq!(targets, vec!["company_name", "company_country_name"]);
    }

    #[test]
    fn missing_storage_section_is_an_error() {
        assert!(AppConfig::from_toml_str("[sync]\npropagation = \"eager\"").is_err());
    }
}
