//! Configuration management for folio.
//!
//! Parses `folio.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! The configuration describes the site-level registry consumed by the page
//! model: registered output formats (in registration order), the formats
//! enabled per page kind, pagination, publishing rules, languages and menus.
//!
//! ## Environment Variable Expansion
//!
//! `base_url` and the `url` of configured menu entries may reference
//! environment variables, so one file serves several deployments:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "folio.toml";

/// Site configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Absolute base URL used for permalinks (e.g., `https://example.org/`).
    pub base_url: String,
    /// Language of items that don't declare one.
    pub default_language: String,
    /// Known languages; list order is the language weight.
    pub languages: Vec<String>,
    /// Publishing rules.
    pub build: BuildConfig,
    /// Pagination settings.
    pub pagination: PaginationConfig,
    /// Output format registry as parsed from TOML (`None` = defaults).
    output_formats: Option<Vec<OutputFormatConfig>>,
    /// Output formats enabled per page kind.
    pub outputs: OutputsConfig,
    /// Site menus defined in configuration, keyed by menu name.
    pub menus: BTreeMap<String, Vec<MenuEntryConfig>>,

    /// Resolved output format registry (set after loading).
    #[serde(skip)]
    pub formats_resolved: Vec<OutputFormatConfig>,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            default_language: "en".to_owned(),
            languages: Vec::new(),
            build: BuildConfig::default(),
            pagination: PaginationConfig::default(),
            output_formats: None,
            outputs: OutputsConfig::default(),
            menus: BTreeMap::new(),
            formats_resolved: OutputFormatConfig::defaults(),
            config_path: None,
        }
    }
}

/// Publishing rules: which items count as published.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Include items marked `draft: true`.
    pub drafts: bool,
    /// Include items dated in the future.
    pub future: bool,
    /// Include items whose expiry date has passed.
    pub expired: bool,
}

/// Pagination configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Elements per page (must be at least 1).
    pub page_size: usize,
    /// Path segment inserted before the page number (`/blog/page/2/`).
    pub path: String,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            path: "page".to_owned(),
        }
    }
}

/// One registered output format.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct OutputFormatConfig {
    /// Unique format name (e.g., "html", "amp").
    pub name: String,
    /// Media type (e.g., "text/html").
    pub media_type: String,
    /// File base name without suffix.
    #[serde(default = "default_base_name")]
    pub base_name: String,
    /// File suffix without the dot.
    pub suffix: String,
    /// Path prefix for this format (e.g., "amp" puts files under `/amp/`).
    #[serde(default)]
    pub path: String,
    /// Links point at the directory rather than the file.
    #[serde(default)]
    pub permalinkable: bool,
    /// Output is plain text rather than markup.
    #[serde(default)]
    pub plain_text: bool,
    /// Link relation used when listing alternative formats.
    #[serde(default = "default_rel")]
    pub rel: String,
}

fn default_base_name() -> String {
    "index".to_owned()
}

fn default_rel() -> String {
    "alternate".to_owned()
}

impl OutputFormatConfig {
    /// Built-in registry: `html`, `json`, `amp`, `rss`, in that order.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        let format = |name: &str, media_type: &str, suffix: &str, path: &str, permalinkable| Self {
            name: name.to_owned(),
            media_type: media_type.to_owned(),
            base_name: default_base_name(),
            suffix: suffix.to_owned(),
            path: path.to_owned(),
            permalinkable,
            plain_text: false,
            rel: default_rel(),
        };
        let mut html = format("html", "text/html", "html", "", true);
        html.rel = "canonical".to_owned();
        let mut json = format("json", "application/json", "json", "", false);
        json.plain_text = true;
        vec![
            html,
            json,
            format("amp", "text/html", "html", "amp", true),
            format("rss", "application/rss+xml", "xml", "", false),
        ]
    }
}

/// Output formats enabled per page kind, by format name.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct OutputsConfig {
    /// Formats for the home page.
    pub home: Vec<String>,
    /// Formats for section (branch) pages.
    pub section: Vec<String>,
    /// Formats for regular (leaf) pages.
    pub page: Vec<String>,
}

impl Default for OutputsConfig {
    fn default() -> Self {
        Self {
            home: vec!["html".to_owned(), "rss".to_owned()],
            section: vec!["html".to_owned(), "rss".to_owned()],
            page: vec!["html".to_owned()],
        }
    }
}

/// Menu entry declared in configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MenuEntryConfig {
    /// Unique identifier within the menu (defaults to `name`).
    pub identifier: Option<String>,
    /// Display name.
    pub name: String,
    /// Link target.
    pub url: String,
    /// Sort weight (lower first).
    pub weight: i64,
    /// Identifier of the parent entry.
    pub parent: Option<String>,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`base_url`").
        field: String,
        /// Error message (e.g., "${`SITE_HOST`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Expand `${VAR}` and `${VAR:-default}` in a link field.
///
/// Bare `$VAR` is left alone.
fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    if !value.contains("${") {
        return Ok(value.to_owned());
    }
    shellexpand::env_with_context(value, |var| std::env::var(var).map(Some))
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| ConfigError::EnvVar {
            field: field.to_owned(),
            message: format!("${{{}}}: {}", e.var_name, e.cause),
        })
}

/// Require a URL field to use http:// or https:// scheme.
fn require_http_url(url: &str, field: &str) -> Result<(), ConfigError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{field} must start with http:// or https://"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `folio.toml` in current directory and parents,
    /// falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails,
    /// or validation fails.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse, expand, resolve and validate configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns error if parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content)?;
        config.expand_env_vars()?;
        config.resolve();
        config.validate()?;
        Ok(config)
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&content)?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Look up a registered output format by name.
    #[must_use]
    pub fn format(&self, name: &str) -> Option<&OutputFormatConfig> {
        self.formats_resolved.iter().find(|f| f.name == name)
    }

    /// Effective language list (falls back to the default language alone).
    #[must_use]
    pub fn language_order(&self) -> Vec<String> {
        if self.languages.is_empty() {
            vec![self.default_language.clone()]
        } else {
            self.languages.clone()
        }
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_url.is_empty() {
            require_http_url(&self.base_url, "base_url")?;
        }
        require_non_empty(&self.default_language, "default_language")?;
        if !self.languages.is_empty() && !self.languages.contains(&self.default_language) {
            return Err(ConfigError::Validation(format!(
                "languages must include default_language {:?}",
                self.default_language
            )));
        }
        self.validate_pagination()?;
        self.validate_formats()?;
        self.validate_menus()?;
        Ok(())
    }

    fn validate_pagination(&self) -> Result<(), ConfigError> {
        if self.pagination.page_size == 0 {
            return Err(ConfigError::Validation(
                "pagination.page_size must be greater than 0".to_owned(),
            ));
        }
        require_non_empty(&self.pagination.path, "pagination.path")?;
        if self.pagination.path.contains('/') {
            return Err(ConfigError::Validation(
                "pagination.path must be a single path segment".to_owned(),
            ));
        }
        Ok(())
    }

    fn validate_formats(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for format in &self.formats_resolved {
            require_non_empty(&format.name, "output_formats.name")?;
            require_non_empty(&format.suffix, "output_formats.suffix")?;
            if !seen.insert(format.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "output format {:?} registered twice",
                    format.name
                )));
            }
        }

        let kinds = [
            ("outputs.home", &self.outputs.home),
            ("outputs.section", &self.outputs.section),
            ("outputs.page", &self.outputs.page),
        ];
        for (field, names) in kinds {
            for name in names {
                if !seen.contains(name.as_str()) {
                    return Err(ConfigError::Validation(format!(
                        "{field} references unregistered output format {name:?}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_menus(&self) -> Result<(), ConfigError> {
        for (menu, entries) in &self.menus {
            for entry in entries {
                require_non_empty(&entry.name, &format!("menus.{menu}.name"))?;
            }
        }
        Ok(())
    }

    /// Expand environment variable references in link fields.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.base_url = expand_env(&self.base_url, "base_url")?;
        for (menu, entries) in &mut self.menus {
            for entry in entries {
                entry.url = expand_env(&entry.url, &format!("menus.{menu}.url"))?;
            }
        }
        Ok(())
    }

    /// Resolve derived values (format registry, trailing slash on base URL).
    fn resolve(&mut self) {
        self.formats_resolved = self
            .output_formats
            .clone()
            .unwrap_or_else(OutputFormatConfig::defaults);
        if !self.base_url.is_empty() && !self.base_url.ends_with('/') {
            self.base_url.push('/');
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.default_language, "en");
        assert_eq!(config.pagination.page_size, 10);
        assert_eq!(config.pagination.path, "page");
        assert!(!config.build.drafts);
        assert_eq!(
            config
                .formats_resolved
                .iter()
                .map(|f| f.name.as_str())
                .collect::<Vec<_>>(),
            vec!["html", "json", "amp", "rss"]
        );
        assert_eq!(config.outputs.page, vec!["html".to_owned()]);
        assert_eq!(config.language_order(), vec!["en".to_owned()]);
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = Config::from_toml("").unwrap();

        assert_eq!(config.formats_resolved.len(), 4);
        assert!(config.menus.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
base_url = "https://example.org"
default_language = "en"
languages = ["en", "fr"]

[build]
future = true

[pagination]
page_size = 5
path = "p"

[[output_formats]]
name = "html"
media_type = "text/html"
suffix = "html"
permalinkable = true

[[output_formats]]
name = "amp"
media_type = "text/html"
suffix = "html"
path = "amp"

[outputs]
home = ["html"]
section = ["html", "amp"]
page = ["html", "amp"]

[[menus.main]]
identifier = "about"
name = "About"
url = "/about/"
weight = 10
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.base_url, "https://example.org/");
        assert!(config.build.future);
        assert_eq!(config.pagination.page_size, 5);
        assert_eq!(config.pagination.path, "p");
        assert_eq!(config.formats_resolved.len(), 2);
        assert_eq!(config.format("amp").unwrap().path, "amp");
        assert_eq!(config.format("amp").unwrap().base_name, "index");
        assert_eq!(config.format("html").unwrap().rel, "alternate");
        assert_eq!(
            config.menus["main"],
            vec![MenuEntryConfig {
                identifier: Some("about".to_owned()),
                name: "About".to_owned(),
                url: "/about/".to_owned(),
                weight: 10,
                parent: None,
            }]
        );
        assert_eq!(
            config.language_order(),
            vec!["en".to_owned(), "fr".to_owned()]
        );
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let err = Config::from_toml("[pagination]\npage_size = 0\n").unwrap_err();

        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("page_size"));
    }

    #[test]
    fn test_multi_segment_pagination_path_rejected() {
        let err = Config::from_toml("[pagination]\npath = \"a/b\"\n").unwrap_err();

        assert!(err.to_string().contains("single path segment"));
    }

    #[test]
    fn test_outputs_must_reference_registered_formats() {
        let toml = r#"
[outputs]
page = ["html", "pdf"]
"#;
        let err = Config::from_toml(toml).unwrap_err();

        assert!(err.to_string().contains("\"pdf\""));
    }

    #[test]
    fn test_duplicate_format_rejected() {
        let toml = r#"
[[output_formats]]
name = "html"
media_type = "text/html"
suffix = "html"

[[output_formats]]
name = "html"
media_type = "text/html"
suffix = "htm"

[outputs]
home = ["html"]
section = ["html"]
page = ["html"]
"#;
        let err = Config::from_toml(toml).unwrap_err();

        assert!(err.to_string().contains("registered twice"));
    }

    #[test]
    fn test_base_url_requires_scheme() {
        let err = Config::from_toml("base_url = \"example.org\"\n").unwrap_err();

        assert!(err.to_string().contains("base_url must start with http"));
    }

    #[test]
    fn test_languages_must_include_default() {
        let err = Config::from_toml("languages = [\"fr\"]\n").unwrap_err();

        assert!(err.to_string().contains("default_language"));
    }

    #[test]
    fn test_menu_entry_requires_name() {
        let toml = r#"
[[menus.main]]
url = "/x/"
"#;
        let err = Config::from_toml(toml).unwrap_err();

        assert!(err.to_string().contains("menus.main.name"));
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("folio.toml");
        std::fs::write(&path, "base_url = \"https://example.org/\"\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();

        assert_eq!(config.base_url, "https://example.org/");
        assert_eq!(config.config_path, Some(path));
    }

    #[test]
    fn test_load_missing_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");

        let err = Config::load(Some(&path)).unwrap_err();

        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("folio.toml");
        std::fs::write(&path, "base_url = [").unwrap();

        let err = Config::load(Some(&path)).unwrap_err();

        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_base_url_env_expansion() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::set_var("FOLIO_TEST_BASE_HOST", "docs.example.org");
        }

        let config = Config::from_toml("base_url = \"https://${FOLIO_TEST_BASE_HOST}\"\n").unwrap();

        assert_eq!(config.base_url, "https://docs.example.org/");
        unsafe {
            std::env::remove_var("FOLIO_TEST_BASE_HOST");
        }
    }

    #[test]
    fn test_menu_url_env_expansion_with_default() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::remove_var("FOLIO_TEST_STATUS_URL");
        }

        let config = Config::from_toml(
            "[[menus.footer]]\nname = \"Status\"\nurl = \"${FOLIO_TEST_STATUS_URL:-/status/}\"\n",
        )
        .unwrap();

        assert_eq!(config.menus["footer"][0].url, "/status/");
    }

    #[test]
    fn test_unset_env_var_names_field() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::remove_var("FOLIO_TEST_MISSING_HOST");
        }

        let err = Config::from_toml("base_url = \"https://${FOLIO_TEST_MISSING_HOST}\"\n")
            .unwrap_err();

        assert!(matches!(err, ConfigError::EnvVar { ref field, .. } if field == "base_url"));
        assert!(err.to_string().contains("FOLIO_TEST_MISSING_HOST"));
    }

    #[test]
    fn test_literal_urls_unchanged() {
        let config = Config::from_toml(
            "base_url = \"https://example.org/\"\n[[menus.main]]\nname = \"Cost\"\nurl = \"/pricing/$5/\"\n",
        )
        .unwrap();

        assert_eq!(config.base_url, "https://example.org/");
        assert_eq!(config.menus["main"][0].url, "/pricing/$5/");
    }
}
