use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::models::{SchemaVersion, StoreBackend, UnknownVariant, VisionBackend};
use crate::pipeline::extraction::gemini::DEFAULT_GEMINI_URL;
use crate::pipeline::extraction::ollama::DEFAULT_OLLAMA_URL;
use crate::pipeline::extraction::{GeminiClient, OllamaVisionClient, VisionClient, VisionError};
use crate::store::sqlite::open_database;
use crate::store::{GoogleSheetStore, ServiceAccountKey, SheetStore, SqliteSheetStore, StoreError};

/// Application-level constants
pub const APP_NAME: &str = "LabTrack";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_SHEET_NAME: &str = "Hasta Takip";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_OLLAMA_MODEL: &str = "dcarrascosa/medgemma-1.5-4b-it";
const DB_FILE_NAME: &str = "labtrack.db";

pub const ENV_VISION_BACKEND: &str = "LABTRACK_VISION_BACKEND";
pub const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_GEMINI_MODEL: &str = "LABTRACK_GEMINI_MODEL";
pub const ENV_GEMINI_URL: &str = "LABTRACK_GEMINI_URL";
pub const ENV_OLLAMA_URL: &str = "LABTRACK_OLLAMA_URL";
pub const ENV_OLLAMA_MODEL: &str = "LABTRACK_OLLAMA_MODEL";
pub const ENV_STORE: &str = "LABTRACK_STORE";
pub const ENV_SERVICE_ACCOUNT: &str = "GCP_SERVICE_ACCOUNT";
pub const ENV_SERVICE_ACCOUNT_FILE: &str = "GCP_SERVICE_ACCOUNT_FILE";
pub const ENV_SHEET_NAME: &str = "LABTRACK_SHEET_NAME";
pub const ENV_SCHEMA: &str = "LABTRACK_SCHEMA";
pub const ENV_DB: &str = "LABTRACK_DB";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("Cannot determine home directory")]
    NoHomeDir,

    #[error("Cannot read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    fn invalid(var: &'static str, err: UnknownVariant) -> Self {
        ConfigError::Invalid {
            var,
            reason: format!("unknown value {:?}", err.value),
        }
    }
}

/// Get the application data directory
/// ~/LabTrack/ on all platforms
pub fn app_data_dir() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(APP_NAME))
}

/// Default location of the local sheet database.
pub fn default_db_path() -> Result<PathBuf, ConfigError> {
    Ok(app_data_dir()?.join(DB_FILE_NAME))
}

/// Filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "labtrack=debug,labtrack_lib=debug,warn"
    } else {
        "labtrack=info,labtrack_lib=info,warn"
    }
}

/// Read a process environment variable; blank values count as unset.
pub fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

/// Load `.env` from the working directory or its parents when present.
/// Returns the file that was loaded.
pub fn load_dotenv() -> Result<Option<PathBuf>, dotenvy::Error> {
    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Which vision model reads the reports.
#[derive(Debug, Clone, PartialEq)]
pub enum VisionSettings {
    Gemini {
        api_key: String,
        model: String,
        base_url: String,
    },
    Ollama {
        model: String,
        base_url: String,
    },
}

impl VisionSettings {
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let backend = match lookup(ENV_VISION_BACKEND) {
            Some(raw) => raw
                .parse::<VisionBackend>()
                .map_err(|e| ConfigError::invalid(ENV_VISION_BACKEND, e))?,
            None => VisionBackend::Gemini,
        };

        Ok(match backend {
            VisionBackend::Gemini => VisionSettings::Gemini {
                api_key: lookup(ENV_GEMINI_API_KEY)
                    .ok_or(ConfigError::Missing(ENV_GEMINI_API_KEY))?,
                model: lookup(ENV_GEMINI_MODEL).unwrap_or_else(|| DEFAULT_GEMINI_MODEL.into()),
                base_url: lookup(ENV_GEMINI_URL).unwrap_or_else(|| DEFAULT_GEMINI_URL.into()),
            },
            VisionBackend::Ollama => VisionSettings::Ollama {
                model: lookup(ENV_OLLAMA_MODEL).unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.into()),
                base_url: lookup(ENV_OLLAMA_URL).unwrap_or_else(|| DEFAULT_OLLAMA_URL.into()),
            },
        })
    }

    pub fn backend(&self) -> VisionBackend {
        match self {
            VisionSettings::Gemini { .. } => VisionBackend::Gemini,
            VisionSettings::Ollama { .. } => VisionBackend::Ollama,
        }
    }

    pub fn build_client(&self) -> Result<Arc<dyn VisionClient>, VisionError> {
        let client: Arc<dyn VisionClient> = match self {
            VisionSettings::Gemini {
                api_key,
                model,
                base_url,
            } => Arc::new(GeminiClient::new(base_url, api_key, model)?),
            VisionSettings::Ollama { model, base_url } => {
                Arc::new(OllamaVisionClient::new(base_url, model)?)
            }
        };
        Ok(client)
    }
}

#[derive(Debug, Clone)]
pub enum StoreLocation {
    Google { key: ServiceAccountKey },
    Sqlite { path: PathBuf },
}

/// Where records are appended and read from.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub sheet_name: String,
    pub schema: SchemaVersion,
    pub location: StoreLocation,
}

impl StoreSettings {
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let backend = match lookup(ENV_STORE) {
            Some(raw) => raw
                .parse::<StoreBackend>()
                .map_err(|e| ConfigError::invalid(ENV_STORE, e))?,
            None => StoreBackend::Google,
        };
        let schema = match lookup(ENV_SCHEMA) {
            Some(raw) => raw
                .parse::<SchemaVersion>()
                .map_err(|e| ConfigError::invalid(ENV_SCHEMA, e))?,
            None => SchemaVersion::V2,
        };
        let sheet_name = lookup(ENV_SHEET_NAME)
            .map(|name| name.trim().to_string())
            .unwrap_or_else(|| DEFAULT_SHEET_NAME.into());

        let location = match backend {
            StoreBackend::Google => StoreLocation::Google {
                key: service_account_key(lookup)?,
            },
            StoreBackend::Sqlite => StoreLocation::Sqlite {
                path: match lookup(ENV_DB) {
                    Some(path) => PathBuf::from(path),
                    None => default_db_path()?,
                },
            },
        };

        Ok(Self {
            sheet_name,
            schema,
            location,
        })
    }

    pub fn backend(&self) -> StoreBackend {
        match self.location {
            StoreLocation::Google { .. } => StoreBackend::Google,
            StoreLocation::Sqlite { .. } => StoreBackend::Sqlite,
        }
    }

    /// Open the configured sheet. It must already exist.
    pub fn open(&self) -> Result<Box<dyn SheetStore>, StoreError> {
        let store: Box<dyn SheetStore> = match &self.location {
            StoreLocation::Google { key } => {
                Box::new(GoogleSheetStore::open(key.clone(), &self.sheet_name)?)
            }
            StoreLocation::Sqlite { path } => {
                Box::new(SqliteSheetStore::open(open_database(path)?, &self.sheet_name)?)
            }
        };
        Ok(store)
    }

    /// Open the configured sheet, creating it first when the local store
    /// does not have it yet. A remote spreadsheet must already exist.
    pub fn open_or_create(&self) -> Result<Box<dyn SheetStore>, StoreError> {
        match &self.location {
            StoreLocation::Sqlite { path } => match self.open() {
                Err(StoreError::SheetNotFound(_)) => {
                    let created = SqliteSheetStore::create(open_database(path)?, &self.sheet_name)?;
                    Ok(Box::new(created) as Box<dyn SheetStore>)
                }
                other => other,
            },
            StoreLocation::Google { .. } => self.open(),
        }
    }
}

fn service_account_key(lookup: Lookup<'_>) -> Result<ServiceAccountKey, ConfigError> {
    let json = match (lookup(ENV_SERVICE_ACCOUNT), lookup(ENV_SERVICE_ACCOUNT_FILE)) {
        (Some(json), _) => json,
        (None, Some(path)) => {
            let path = PathBuf::from(path);
            std::fs::read_to_string(&path).map_err(|source| ConfigError::ReadFile { path, source })?
        }
        (None, None) => return Err(ConfigError::Missing(ENV_SERVICE_ACCOUNT)),
    };

    ServiceAccountKey::from_json(&json).map_err(|e| ConfigError::Invalid {
        var: ENV_SERVICE_ACCOUNT,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const KEY_JSON: &str = r#"{"client_email": "bot@p.iam.gserviceaccount.com", "private_key": "pem"}"#;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn app_data_dir_under_home() {
        let dir = app_data_dir().unwrap();
        let home = dirs::home_dir().unwrap();
        assert!(dir.starts_with(home));
        assert!(dir.ends_with("LabTrack"));
        assert!(default_db_path().unwrap().starts_with(dir));
    }

    #[test]
    fn app_name_is_labtrack() {
        assert_eq!(APP_NAME, "LabTrack");
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn log_filter_targets_both_crates() {
        assert!(default_log_filter().contains("labtrack="));
        assert!(default_log_filter().contains("labtrack_lib="));
    }

    #[test]
    fn gemini_is_default_and_needs_key() {
        let err = VisionSettings::from_lookup(&lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ENV_GEMINI_API_KEY)));

        let settings =
            VisionSettings::from_lookup(&lookup_from(&[(ENV_GEMINI_API_KEY, "k")])).unwrap();
        assert_eq!(
            settings,
            VisionSettings::Gemini {
                api_key: "k".into(),
                model: DEFAULT_GEMINI_MODEL.into(),
                base_url: DEFAULT_GEMINI_URL.into(),
            }
        );
    }

    #[test]
    fn ollama_needs_no_key() {
        let settings = VisionSettings::from_lookup(&lookup_from(&[
            (ENV_VISION_BACKEND, "Ollama"),
            (ENV_OLLAMA_MODEL, "medgemma:4b"),
        ]))
        .unwrap();
        assert_eq!(settings.backend(), VisionBackend::Ollama);
        assert_eq!(
            settings,
            VisionSettings::Ollama {
                model: "medgemma:4b".into(),
                base_url: DEFAULT_OLLAMA_URL.into(),
            }
        );
        assert_eq!(settings.build_client().unwrap().model_name(), "medgemma:4b");
    }

    #[test]
    fn unknown_backend_is_invalid() {
        let err =
            VisionSettings::from_lookup(&lookup_from(&[(ENV_VISION_BACKEND, "openai")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: ENV_VISION_BACKEND, .. }));
    }

    #[test]
    fn google_store_needs_service_account() {
        let err = StoreSettings::from_lookup(&lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ENV_SERVICE_ACCOUNT)));

        let settings =
            StoreSettings::from_lookup(&lookup_from(&[(ENV_SERVICE_ACCOUNT, KEY_JSON)])).unwrap();
        assert_eq!(settings.backend(), StoreBackend::Google);
        assert_eq!(settings.sheet_name, DEFAULT_SHEET_NAME);
        assert_eq!(settings.schema, SchemaVersion::V2);
    }

    #[test]
    fn service_account_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.json");
        std::fs::write(&path, KEY_JSON).unwrap();
        let path_text = path.to_string_lossy().to_string();

        let settings =
            StoreSettings::from_lookup(&lookup_from(&[(ENV_SERVICE_ACCOUNT_FILE, path_text.as_str())]))
                .unwrap();
        match settings.location {
            StoreLocation::Google { key } => {
                assert_eq!(key.client_email, "bot@p.iam.gserviceaccount.com")
            }
            other => panic!("expected google, got {other:?}"),
        }

        let missing = dir.path().join("absent.json").to_string_lossy().to_string();
        let err = StoreSettings::from_lookup(&lookup_from(&[(ENV_SERVICE_ACCOUNT_FILE, missing.as_str())]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn malformed_service_account_is_invalid() {
        let err = StoreSettings::from_lookup(&lookup_from(&[(ENV_SERVICE_ACCOUNT, "{not json")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: ENV_SERVICE_ACCOUNT, .. }));
    }

    #[test]
    fn sqlite_store_with_schema_and_name() {
        let settings = StoreSettings::from_lookup(&lookup_from(&[
            (ENV_STORE, "sqlite"),
            (ENV_DB, "/tmp/lab.db"),
            (ENV_SCHEMA, "v1"),
            (ENV_SHEET_NAME, " Ward 3 "),
        ]))
        .unwrap();
        assert_eq!(settings.backend(), StoreBackend::Sqlite);
        assert_eq!(settings.schema, SchemaVersion::V1);
        assert_eq!(settings.sheet_name, "Ward 3");
        assert!(matches!(
            settings.location,
            StoreLocation::Sqlite { ref path } if path == &PathBuf::from("/tmp/lab.db")
        ));
    }

    #[test]
    fn sqlite_open_or_create() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("lab.db").to_string_lossy().to_string();
        let settings =
            StoreSettings::from_lookup(&lookup_from(&[(ENV_STORE, "sqlite"), (ENV_DB, db.as_str())]))
                .unwrap();

        assert!(matches!(settings.open(), Err(StoreError::SheetNotFound(_))));
        let created = settings.open_or_create().unwrap();
        assert_eq!(created.name(), DEFAULT_SHEET_NAME);
        drop(created);
        assert!(settings.open().is_ok());
        assert!(settings.open_or_create().is_ok());
    }

    #[test]
    fn invalid_schema_is_rejected() {
        let err = StoreSettings::from_lookup(&lookup_from(&[
            (ENV_STORE, "sqlite"),
            (ENV_DB, "x.db"),
            (ENV_SCHEMA, "v3"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: ENV_SCHEMA, .. }));
    }
}
