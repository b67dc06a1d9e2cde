//! Configuration schema (schemaforge.toml)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Input format of a schema source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceFormat {
    /// PostgreSQL DDL
    Postgres,

    /// Prisma Schema Language
    Prisma,

    /// tbls JSON introspection document
    Tbls,

    /// Drizzle ORM source targeting MySQL
    DrizzleMysql,

    /// Drizzle ORM source targeting PostgreSQL
    DrizzlePostgres,

    /// Rails `db/schema.rb`
    #[serde(rename = "schemarb")]
    SchemaRb,
}

impl Default for SourceFormat {
    fn default() -> Self {
        Self::Postgres
    }
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Prisma => "prisma",
            Self::Tbls => "tbls",
            Self::DrizzleMysql => "drizzle-mysql",
            Self::DrizzlePostgres => "drizzle-postgres",
            Self::SchemaRb => "schemarb",
        }
    }

    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "sql" => Some(Self::Postgres),
            "prisma" => Some(Self::Prisma),
            "json" => Some(Self::Tbls),
            "rb" => Some(Self::SchemaRb),
            _ => None,
        }
    }
}

impl std::str::FromStr for SourceFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "prisma" => Ok(Self::Prisma),
            "tbls" => Ok(Self::Tbls),
            "drizzle-mysql" => Ok(Self::DrizzleMysql),
            "drizzle-postgres" | "drizzle" => Ok(Self::DrizzlePostgres),
            "schemarb" | "schema-rb" | "rails" => Ok(Self::SchemaRb),
            other => Err(ConfigError::ParseError(format!("unknown format: {}", other))),
        }
    }
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parser behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserSettings {
    /// Parse SQL statement by statement so one bad statement does not
    /// discard the rest of the document
    #[serde(default = "default_true")]
    pub chunk_statements: bool,
}

impl Default for ParserSettings {
    fn default() -> Self {
        Self {
            chunk_statements: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Ordered override documents applied on top of a parsed schema
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideSettings {
    /// Override files, applied in order (later files win)
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

/// Local version history settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySettings {
    /// Directory holding the file-backed version store
    #[serde(default = "default_store")]
    pub store: PathBuf,

    /// Document identifier within the store
    #[serde(default = "default_document")]
    pub document: String,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            store: default_store(),
            document: default_document(),
        }
    }
}

fn default_store() -> PathBuf {
    PathBuf::from(".schemaforge/history")
}

fn default_document() -> String {
    "default".to_string()
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Default input format
    #[serde(default)]
    pub format: SourceFormat,

    #[serde(default)]
    pub parser: ParserSettings,

    #[serde(default)]
    pub overrides: OverrideSettings,

    #[serde(default)]
    pub history: HistorySettings,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            format: SourceFormat::default(),
            parser: ParserSettings::default(),
            overrides: OverrideSettings::default(),
            history: HistorySettings::default(),
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Resolve a configured path against the project root
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    /// Override files resolved against the project root, in order
    pub fn override_files(&self) -> Vec<PathBuf> {
        self.overrides.files.iter().map(|p| self.resolve(p)).collect()
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.format, SourceFormat::Postgres);
        assert!(config.parser.chunk_statements);
        assert!(config.overrides.files.is_empty());
        assert_eq!(config.history.document, "default");
    }

    #[test]
    fn parse_config_from_toml() {
        let toml = r#"
format = "drizzle-mysql"

[parser]
chunk_statements = false

[overrides]
files = ["overrides/base.json", "overrides/team.toml"]

[history]
store = "var/history"
document = "main"
"#;

        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.format, SourceFormat::DrizzleMysql);
        assert!(!config.parser.chunk_statements);
        assert_eq!(
            config.overrides.files,
            vec![PathBuf::from("overrides/base.json"), PathBuf::from("overrides/team.toml")]
        );
        assert_eq!(config.history.store, PathBuf::from("var/history"));
        assert_eq!(config.history.document, "main");
    }

    #[test]
    fn malformed_config_is_parse_error() {
        let result = Config::from_toml("format = 42");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn file_round_trip_sets_project_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schemaforge.toml");

        let mut config = Config::default();
        config.format = SourceFormat::Prisma;
        config.overrides.files.push(PathBuf::from("o.json"));
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.format, SourceFormat::Prisma);
        assert_eq!(loaded.project_root, dir.path());
        assert_eq!(loaded.override_files(), vec![dir.path().join("o.json")]);
    }

    #[test]
    fn format_from_str_and_path() {
        assert_eq!("postgresql".parse::<SourceFormat>().unwrap(), SourceFormat::Postgres);
        assert!("oracle".parse::<SourceFormat>().is_err());
        assert_eq!(SourceFormat::from_path(Path::new("schema.prisma")), Some(SourceFormat::Prisma));
        assert_eq!(SourceFormat::from_path(Path::new("schema.ts")), None);
        assert_eq!(SourceFormat::from_path(Path::new("db/schema.rb")), Some(SourceFormat::SchemaRb));
        assert_eq!("rails".parse::<SourceFormat>().unwrap(), SourceFormat::SchemaRb);
        assert_eq!(SourceFormat::SchemaRb.to_string(), "schemarb");
    }
}
