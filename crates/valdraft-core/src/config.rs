// Configuration loading and parsing (server.toml, draft.toml, overrides.toml,
// client.toml).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

/// Everything the draft server needs, assembled from `server.toml`,
/// `draft.toml` and the optional `overrides.toml`.
#[derive(Debug, Clone)]
pub struct Config {
    pub draft: DraftConfig,
    pub overrides: Vec<PlayerOverride>,
    pub websocket: WebsocketConfig,
    pub database: DatabaseConfig,
    pub http: HttpConfig,
    pub sync: SyncConfig,
    pub cache: CacheConfig,
}

// ---------------------------------------------------------------------------
// draft.toml structs
// ---------------------------------------------------------------------------

/// Wrapper for the top-level `[draft]` table in draft.toml.
#[derive(Debug, Clone, Deserialize)]
struct DraftFile {
    draft: DraftConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DraftConfig {
    pub name: String,
    /// Salary of a player with rating 1.0.
    pub base_salary: f64,
    /// How many handles are taken from each team listing.
    #[serde(default = "default_roster_size")]
    pub roster_size: usize,
    pub teams: Vec<TeamEntry>,
    pub stat_queries: Vec<StatQuery>,
}

fn default_roster_size() -> usize {
    5
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TeamEntry {
    pub name: String,
    pub id: u32,
}

/// One `(region, timespan)` request against the stat source.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatQuery {
    pub region: String,
    pub timespan: Timespan,
}

impl StatQuery {
    pub fn new(region: impl Into<String>, timespan: Timespan) -> Self {
        StatQuery {
            region: region.into(),
            timespan,
        }
    }
}

impl fmt::Display for StatQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.region, self.timespan)
    }
}

/// Stat window: every recorded match, or the last N days.
///
/// Accepts `"all"`, a bare integer (`30`) or a day suffix (`"30d"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TimespanValue", into = "TimespanValue")]
pub enum Timespan {
    All,
    Days(u32),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum TimespanValue {
    Days(u32),
    Text(String),
}

impl TryFrom<TimespanValue> for Timespan {
    type Error = String;

    fn try_from(value: TimespanValue) -> Result<Self, Self::Error> {
        match value {
            TimespanValue::Days(0) => Err("timespan must be at least 1 day".into()),
            TimespanValue::Days(n) => Ok(Timespan::Days(n)),
            TimespanValue::Text(text) => text.parse(),
        }
    }
}

impl From<Timespan> for TimespanValue {
    fn from(value: Timespan) -> Self {
        match value {
            Timespan::All => TimespanValue::Text("all".into()),
            Timespan::Days(n) => TimespanValue::Days(n),
        }
    }
}

impl std::str::FromStr for Timespan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s == "all" {
            return Ok(Timespan::All);
        }
        let digits = s.strip_suffix('d').unwrap_or(&s);
        match digits.parse::<u32>() {
            Ok(0) => Err("timespan must be at least 1 day".into()),
            Ok(n) => Ok(Timespan::Days(n)),
            Err(_) => Err(format!("invalid timespan `{s}`, expected \"all\" or a day count")),
        }
    }
}

impl fmt::Display for Timespan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timespan::All => write!(f, "all"),
            Timespan::Days(n) => write!(f, "{n}d"),
        }
    }
}

// ---------------------------------------------------------------------------
// overrides.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
struct OverridesFile {
    #[serde(default)]
    overrides: Vec<PlayerOverride>,
}

/// Manual correction applied after the automatic stat merge.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlayerOverride {
    pub name: String,
    /// Team used when the player is missing from every team listing.
    pub team: String,
    #[serde(default)]
    pub agents: Vec<String>,
    pub rating: f64,
}

// ---------------------------------------------------------------------------
// server.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire server.toml file.
#[derive(Debug, Clone, Deserialize)]
struct ServerFile {
    websocket: WebsocketConfig,
    database: DatabaseConfig,
    http: HttpConfig,
    sync: SyncConfig,
    cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebsocketConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub stat_source_url: String,
    pub team_source_url: String,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    pub channel_capacity: usize,
    pub poll_interval_ms: u64,
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub roster_ttl_secs: u64,
}

// ---------------------------------------------------------------------------
// client.toml structs
// ---------------------------------------------------------------------------

/// Settings for the terminal draft client.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub server_url: String,
    /// Handle announced to the server and recorded as `picked_by`.
    #[serde(default)]
    pub user: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate the server configuration from `config/server.toml`,
/// `config/draft.toml` and (optionally) `config/overrides.toml`, all relative
/// to `base_dir`. Does not copy defaults; see [`load_config`].
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    let server: ServerFile = parse_file(&config_dir.join("server.toml"))?;
    let draft: DraftFile = parse_file(&config_dir.join("draft.toml"))?;

    let overrides_path = config_dir.join("overrides.toml");
    let overrides: OverridesFile = if overrides_path.exists() {
        parse_file(&overrides_path)?
    } else {
        OverridesFile::default()
    };

    let config = Config {
        draft: draft.draft,
        overrides: overrides.overrides,
        websocket: server.websocket,
        database: server.database,
        http: server.http,
        sync: server.sync,
        cache: server.cache,
    };

    validate(&config)?;

    Ok(config)
}

/// Load the terminal client configuration from `config/client.toml`.
pub fn load_client_config_from(base_dir: &Path) -> Result<ClientConfig, ConfigError> {
    let config: ClientConfig = parse_file(&base_dir.join("config").join("client.toml"))?;
    if config.server_url.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "client.server_url".into(),
            message: "must not be empty".into(),
        });
    }
    Ok(config)
}

/// Copy every file in `defaults/` that is missing from `config/`.
///
/// Existing files are never overwritten and `.example` templates are skipped.
/// Returns the paths that were created.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");
    let copy_err = |message: String| ConfigError::DefaultsCopyError { message };

    if !defaults_dir.exists() {
        if config_dir.exists() {
            return Ok(vec![]);
        }
        return Err(copy_err(format!(
            "neither defaults/ nor config/ directory found in {}",
            base_dir.display()
        )));
    }

    std::fs::create_dir_all(&config_dir)
        .map_err(|e| copy_err(format!("failed to create config directory: {e}")))?;

    let entries = std::fs::read_dir(&defaults_dir)
        .map_err(|e| copy_err(format!("failed to read defaults directory: {e}")))?;

    let mut created = Vec::new();
    for entry in entries {
        let source = entry
            .map_err(|e| copy_err(format!("failed to read defaults entry: {e}")))?
            .path();
        let Some(file_name) = source.file_name() else {
            continue;
        };
        if !source.is_file() || file_name.to_string_lossy().ends_with(".example") {
            continue;
        }

        let target = config_dir.join(file_name);
        let mut dest = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(dest) => dest,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(copy_err(format!("failed to create {}: {e}", target.display()))),
        };

        let content = std::fs::read(&source)
            .map_err(|e| copy_err(format!("failed to read {}: {e}", source.display())))?;
        std::io::Write::write_all(&mut dest, &content)
            .map_err(|e| copy_err(format!("failed to write {}: {e}", target.display())))?;
        created.push(target);
    }

    Ok(created)
}

/// Load the server config relative to the current working directory,
/// seeding `config/` from `defaults/` first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = current_dir()?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

/// Load the client config relative to the current working directory,
/// seeding `config/` from `defaults/` first.
pub fn load_client_config() -> Result<ClientConfig, ConfigError> {
    let cwd = current_dir()?;
    ensure_config_files(&cwd)?;
    load_client_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn current_dir() -> Result<PathBuf, ConfigError> {
    std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })
}

fn parse_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })?;
    toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let draft = &config.draft;

    if !(draft.base_salary.is_finite() && draft.base_salary > 0.0) {
        return Err(invalid(
            "draft.base_salary",
            format!("must be > 0, got {}", draft.base_salary),
        ));
    }
    if draft.roster_size == 0 {
        return Err(invalid("draft.roster_size", "must be greater than 0"));
    }
    if draft.teams.is_empty() {
        return Err(invalid("draft.teams", "at least one team is required"));
    }

    let mut seen_ids = HashSet::new();
    for (i, team) in draft.teams.iter().enumerate() {
        if team.name.trim().is_empty() {
            return Err(invalid(format!("draft.teams[{i}].name"), "must not be empty"));
        }
        if !seen_ids.insert(team.id) {
            return Err(invalid(
                format!("draft.teams[{i}].id"),
                format!("duplicate team id {}", team.id),
            ));
        }
    }

    if draft.stat_queries.is_empty() {
        return Err(invalid("draft.stat_queries", "at least one query is required"));
    }
    for (i, query) in draft.stat_queries.iter().enumerate() {
        if query.region.trim().is_empty() {
            return Err(invalid(
                format!("draft.stat_queries[{i}].region"),
                "must not be empty",
            ));
        }
    }

    for (i, o) in config.overrides.iter().enumerate() {
        if o.name.trim().is_empty() {
            return Err(invalid(format!("overrides[{i}].name"), "must not be empty"));
        }
        if !(o.rating.is_finite() && o.rating >= 0.0) {
            return Err(invalid(
                format!("overrides[{i}].rating"),
                format!("must be >= 0, got {}", o.rating),
            ));
        }
    }

    if config.http.timeout_secs == 0 {
        return Err(invalid("http.timeout_secs", "must be greater than 0"));
    }
    for (field, url) in [
        ("http.stat_source_url", &config.http.stat_source_url),
        ("http.team_source_url", &config.http.team_source_url),
    ] {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(invalid(field, format!("must be an http(s) URL, got `{url}`")));
        }
    }

    // tokio's broadcast channel panics on a zero capacity.
    if config.sync.channel_capacity == 0 {
        return Err(invalid("sync.channel_capacity", "must be greater than 0"));
    }
    if config.sync.poll_interval_ms == 0 {
        return Err(invalid("sync.poll_interval_ms", "must be greater than 0"));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// The workspace-level `defaults/` directory.
    fn defaults_dir() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../defaults")
    }

    /// Fresh scratch directory with `config/` populated from defaults.
    fn scratch_with_defaults(name: &str) -> PathBuf {
        let tmp = std::env::temp_dir().join(format!("valdraft_config_{name}"));
        let _ = fs::remove_dir_all(&tmp);
        let config_dir = tmp.join("config");
        fs::create_dir_all(&config_dir).unwrap();
        for file in ["server.toml", "draft.toml", "overrides.toml", "client.toml"] {
            fs::copy(defaults_dir().join(file), config_dir.join(file)).unwrap();
        }
        tmp
    }

    fn replace_in(path: &Path, from: &str, to: &str) {
        let text = fs::read_to_string(path).unwrap();
        assert!(text.contains(from), "{from:?} not found in {}", path.display());
        fs::write(path, text.replacen(from, to, 1)).unwrap();
    }

    #[test]
    fn load_valid_config_from_defaults() {
        let tmp = scratch_with_defaults("valid");
        let config = load_config_from(&tmp).expect("defaults should load");

        assert_eq!(config.draft.name, "Valorant Fantasy");
        assert!((config.draft.base_salary - 5_000_000.0).abs() < f64::EPSILON);
        assert_eq!(config.draft.roster_size, 5);
        assert_eq!(config.draft.teams.len(), 12);
        assert_eq!(
            config.draft.teams[0],
            TeamEntry {
                name: "G2".into(),
                id: 11058
            }
        );
        assert_eq!(
            config.draft.stat_queries,
            vec![
                StatQuery::new("na", Timespan::All),
                StatQuery::new("br", Timespan::All),
            ]
        );
        assert_eq!(config.overrides.len(), 5);
        assert_eq!(config.overrides[0].name, "keznit");
        assert_eq!(config.overrides[0].agents, vec!["jett", "raze"]);

        assert_eq!(config.websocket.port, 9101);
        assert_eq!(config.database.path, "valdraft.db");
        assert_eq!(config.database.busy_timeout(), Duration::from_secs(5));
        assert_eq!(config.http.timeout(), Duration::from_secs(10));
        assert_eq!(config.sync.channel_capacity, 256);
        assert_eq!(config.sync.poll_interval(), Duration::from_millis(1000));
        assert_eq!(config.cache.roster_ttl_secs, 3600);

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_overrides_toml_is_ok() {
        let tmp = scratch_with_defaults("no_overrides");
        fs::remove_file(tmp.join("config/overrides.toml")).unwrap();

        let config = load_config_from(&tmp).expect("should load without overrides.toml");
        assert!(config.overrides.is_empty());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_server_toml_is_reported() {
        let tmp = scratch_with_defaults("no_server");
        fs::remove_file(tmp.join("config/server.toml")).unwrap();

        let err = load_config_from(&tmp).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let tmp = scratch_with_defaults("malformed");
        fs::write(tmp.join("config/draft.toml"), "[draft\nname = ").unwrap();

        let err = load_config_from(&tmp).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_zero_base_salary() {
        let tmp = scratch_with_defaults("zero_salary");
        replace_in(
            &tmp.join("config/draft.toml"),
            "base_salary = 5000000.0",
            "base_salary = 0.0",
        );

        match load_config_from(&tmp).unwrap_err() {
            ConfigError::ValidationError { field, .. } => assert_eq!(field, "draft.base_salary"),
            other => panic!("expected validation error, got {other:?}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_duplicate_team_ids() {
        let tmp = scratch_with_defaults("dup_team");
        replace_in(&tmp.join("config/draft.toml"), "id = 1034", "id = 11058");

        match load_config_from(&tmp).unwrap_err() {
            ConfigError::ValidationError { field, message } => {
                assert_eq!(field, "draft.teams[1].id");
                assert!(message.contains("11058"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_zero_channel_capacity() {
        let tmp = scratch_with_defaults("zero_capacity");
        replace_in(
            &tmp.join("config/server.toml"),
            "channel_capacity = 256",
            "channel_capacity = 0",
        );

        match load_config_from(&tmp).unwrap_err() {
            ConfigError::ValidationError { field, .. } => {
                assert_eq!(field, "sync.channel_capacity")
            }
            other => panic!("expected validation error, got {other:?}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_negative_override_rating() {
        let tmp = scratch_with_defaults("neg_override");
        fs::write(
            tmp.join("config/overrides.toml"),
            "[[overrides]]\nname = \"x\"\nteam = \"T\"\nrating = -1.0\n",
        )
        .unwrap();

        match load_config_from(&tmp).unwrap_err() {
            ConfigError::ValidationError { field, .. } => assert_eq!(field, "overrides[0].rating"),
            other => panic!("expected validation error, got {other:?}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn client_config_loads_with_optional_user() {
        let tmp = scratch_with_defaults("client");
        let client = load_client_config_from(&tmp).unwrap();
        assert_eq!(client.server_url, "ws://127.0.0.1:9101");

        fs::write(
            tmp.join("config/client.toml"),
            "server_url = \"ws://example:1\"\n",
        )
        .unwrap();
        let client = load_client_config_from(&tmp).unwrap();
        assert!(client.user.is_none());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn timespan_parses_words_days_and_suffixes() {
        assert_eq!("all".parse::<Timespan>(), Ok(Timespan::All));
        assert_eq!("ALL".parse::<Timespan>(), Ok(Timespan::All));
        assert_eq!("30".parse::<Timespan>(), Ok(Timespan::Days(30)));
        assert_eq!("90d".parse::<Timespan>(), Ok(Timespan::Days(90)));
        assert!("0d".parse::<Timespan>().is_err());
        assert!("forever".parse::<Timespan>().is_err());
    }

    #[test]
    fn timespan_deserializes_from_string_or_integer() {
        #[derive(Deserialize)]
        struct Wrapper {
            a: Timespan,
            b: Timespan,
            c: Timespan,
        }
        let w: Wrapper = toml::from_str("a = \"all\"\nb = 60\nc = \"7d\"\n").unwrap();
        assert_eq!(w.a, Timespan::All);
        assert_eq!(w.b, Timespan::Days(60));
        assert_eq!(w.c, Timespan::Days(7));
    }

    #[test]
    fn timespan_display_matches_query_format() {
        assert_eq!(Timespan::All.to_string(), "all");
        assert_eq!(Timespan::Days(30).to_string(), "30d");
        assert_eq!(StatQuery::new("na", Timespan::All).to_string(), "na/all");
    }

    #[test]
    fn ensure_config_files_copies_missing_only() {
        let tmp = std::env::temp_dir().join("valdraft_config_ensure");
        let _ = fs::remove_dir_all(&tmp);
        let defaults = tmp.join("defaults");
        fs::create_dir_all(&defaults).unwrap();
        fs::write(defaults.join("server.toml"), "from-defaults").unwrap();
        fs::write(defaults.join("draft.toml"), "from-defaults").unwrap();
        fs::write(defaults.join("client.toml.example"), "template").unwrap();

        let config_dir = tmp.join("config");
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(config_dir.join("draft.toml"), "user-edited").unwrap();

        let created = ensure_config_files(&tmp).unwrap();
        assert_eq!(created, vec![config_dir.join("server.toml")]);
        assert_eq!(
            fs::read_to_string(config_dir.join("draft.toml")).unwrap(),
            "user-edited"
        );
        assert!(!config_dir.join("client.toml.example").exists());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_without_any_directory_fails() {
        let tmp = std::env::temp_dir().join("valdraft_config_empty");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        let err = ensure_config_files(&tmp).unwrap_err();
        assert!(matches!(err, ConfigError::DefaultsCopyError { .. }));

        let _ = fs::remove_dir_all(&tmp);
    }
}
