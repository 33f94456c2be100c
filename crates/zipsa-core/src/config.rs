//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nested keys, e.g. `APP_RETRIEVAL__RRF_K=30`). Every section
//! has defaults, so a missing file yields a usable configuration.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub struct Config {
    figment: Figment,
    base_dir: PathBuf,
}

impl Config {
    /// Load `config.toml` and its environment overlay from the working directory.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("config.toml"))
    }

    /// Load `path` plus the `config.<env>.toml` next to it.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        let base_dir = path.parent().filter(|p| !p.as_os_str().is_empty()).map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        let mut figment = Figment::from(Serialized::defaults(AppConfig::default())).merge(Toml::file(path));
        let overlay = match env_name.as_str() {
            "dev" | "development" => Some("config.dev.toml"),
            "prod" | "production" => Some("config.prod.toml"),
            "test" | "testing" => Some("config.test.toml"),
            _ => None,
        };
        if let Some(file) = overlay {
            figment = figment.merge(Toml::file(base_dir.join(file)));
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment, base_dir };
        config.validate()?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    pub fn app(&self) -> anyhow::Result<AppConfig> {
        self.figment.extract().map_err(|e| anyhow::anyhow!("Failed to read configuration: {}", e))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve a configured path against the directory of the config file.
    pub fn resolve(&self, p: &str) -> PathBuf {
        resolve_with_base(&self.base_dir, p)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let app = self.app()?;
        if app.retrieval.over_fetch == 0 {
            anyhow::bail!("retrieval.over_fetch must be at least 1");
        }
        if app.retrieval.rrf_k == 0 {
            anyhow::bail!("retrieval.rrf_k must be positive");
        }
        if app.embedding.dimension() == 0 {
            anyhow::bail!("embedding dimension must be positive");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub retrieval: RetrievalConfig,
    pub tokenizer: TokenizerPaths,
    pub embedding: EmbeddingBackendConfig,
    pub store: StoreConfig,
}

/// Knobs of the hybrid retriever.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// RRF smoothing constant K in `1 / (rank + K)`.
    pub rrf_k: u32,
    /// Dense candidates fetched per requested result.
    pub over_fetch: usize,
    pub sparse_timeout_ms: u64,
    pub dense_timeout_ms: u64,
    /// Specialist value that means "do not restrict".
    pub general_sentinel: String,
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60,
            over_fetch: 2,
            sparse_timeout_ms: 2_000,
            dense_timeout_ms: 5_000,
            general_sentinel: "General".to_string(),
            default_limit: 3,
            max_limit: 50,
        }
    }
}

impl RetrievalConfig {
    pub fn sparse_timeout(&self) -> Duration {
        Duration::from_millis(self.sparse_timeout_ms)
    }

    pub fn dense_timeout(&self) -> Duration {
        Duration::from_millis(self.dense_timeout_ms)
    }
}

/// Locations of the tokenizer's resource files; any of them may be absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerPaths {
    pub dictionary: Option<String>,
    pub stopwords: Option<String>,
    pub synonyms: Option<String>,
}

impl Default for TokenizerPaths {
    fn default() -> Self {
        Self {
            dictionary: Some("resources/tokenizer/domain_dictionary.txt".to_string()),
            stopwords: Some("resources/tokenizer/stopwords.txt".to_string()),
            synonyms: Some("resources/tokenizer/synonyms.json".to_string()),
        }
    }
}

/// Which embedding backend the binaries construct at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum EmbeddingBackendConfig {
    Local {
        model_dir: String,
        #[serde(default = "default_local_dimension")]
        dimension: usize,
        #[serde(default = "default_max_len")]
        max_len: usize,
    },
    Remote {
        #[serde(default = "default_remote_endpoint")]
        endpoint: String,
        #[serde(default = "default_remote_model")]
        model: String,
        #[serde(default = "default_remote_dimension")]
        dimension: usize,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
        /// Send `dimensions` with each request; only models that can shorten
        /// their output (text-embedding-3-*) accept it.
        #[serde(default)]
        send_dimensions: bool,
    },
    Hash {
        #[serde(default = "default_local_dimension")]
        dimension: usize,
    },
}

impl Default for EmbeddingBackendConfig {
    fn default() -> Self {
        EmbeddingBackendConfig::Local {
            model_dir: "models/multilingual-e5-small".to_string(),
            dimension: default_local_dimension(),
            max_len: default_max_len(),
        }
    }
}

impl EmbeddingBackendConfig {
    pub fn dimension(&self) -> usize {
        match self {
            EmbeddingBackendConfig::Local { dimension, .. }
            | EmbeddingBackendConfig::Remote { dimension, .. }
            | EmbeddingBackendConfig::Hash { dimension } => *dimension,
        }
    }
}

fn default_local_dimension() -> usize { 384 }
fn default_max_len() -> usize { 512 }
fn default_remote_endpoint() -> String { "https://api.openai.com/v1/embeddings".to_string() }
fn default_remote_model() -> String { "text-embedding-3-small".to_string() }
fn default_remote_dimension() -> usize { 1536 }
fn default_timeout_secs() -> u64 { 30 }

/// Where the two indexes live and which numeric traits they declare.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub sparse_index_dir: String,
    pub dense_uri: String,
    pub table: String,
    pub traits: Vec<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sparse_index_dir: "data/indexes/tantivy".to_string(),
            dense_uri: "data/indexes/lancedb".to_string(),
            table: "documents".to_string(),
            traits: DEFAULT_TRAITS.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

/// Breed statistics exposed as filterable traits.
pub const DEFAULT_TRAITS: &[&str] = &[
    "indoor",
    "lap",
    "hypoallergenic",
    "adaptability",
    "affection_level",
    "child_friendly",
    "dog_friendly",
    "energy_level",
    "grooming",
    "health_issues",
    "intelligence",
    "shedding_level",
    "social_needs",
    "stranger_friendly",
    "vocalisation",
];

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_apply_without_files() {
        Jail::expect_with(|jail| {
            jail.set_env("RUST_ENV", "test");
            let config = Config::load().map_err(|e| e.to_string())?;
            let app = config.app().map_err(|e| e.to_string())?;
            assert_eq!(app.retrieval.rrf_k, 60);
            assert_eq!(app.retrieval.over_fetch, 2);
            assert_eq!(app.retrieval.general_sentinel, "General");
            assert_eq!(app.store.traits.len(), DEFAULT_TRAITS.len());
            assert_eq!(app.embedding.dimension(), 384);
            Ok(())
        });
    }

    #[test]
    fn env_overlay_and_variables_override_file() {
        Jail::expect_with(|jail| {
            jail.set_env("RUST_ENV", "test");
            jail.create_file(
                "config.toml",
                r#"
                [retrieval]
                rrf_k = 30
                [embedding]
                provider = "hash"
                dimension = 64
                "#,
            )?;
            jail.create_file("config.test.toml", "[retrieval]\nover_fetch = 4\n")?;
            jail.set_env("APP_RETRIEVAL__MAX_LIMIT", "7");
            let app = Config::load().map_err(|e| e.to_string())?.app().map_err(|e| e.to_string())?;
            assert_eq!(app.retrieval.rrf_k, 30);
            assert_eq!(app.retrieval.over_fetch, 4);
            assert_eq!(app.retrieval.max_limit, 7);
            assert!(matches!(app.embedding, EmbeddingBackendConfig::Hash { dimension: 64 }));
            Ok(())
        });
    }

    #[test]
    fn zero_over_fetch_is_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("RUST_ENV", "test");
            jail.create_file("config.toml", "[retrieval]\nover_fetch = 0\n")?;
            assert!(Config::load().is_err());
            Ok(())
        });
    }

    #[test]
    fn relative_paths_resolve_against_base() {
        let base = Path::new("/srv/zipsa");
        assert_eq!(resolve_with_base(base, "data/x"), PathBuf::from("/srv/zipsa/data/x"));
        assert_eq!(resolve_with_base(base, "/abs/y"), PathBuf::from("/abs/y"));
    }
}
