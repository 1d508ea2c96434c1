use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use config::{Config, ConfigError, Environment, File, FileFormat};
use home::home_dir;
use log::debug;
use serde::Deserialize;

use crate::repository::RewriteRule;

pub const CONFIG_FILE_NAME: &str = "gomodnix.toml";

/// Settings read from `$HOME/.config/gomodnix.toml`, `<project>/gomodnix.toml`
/// and `GOMODNIX_*` environment variables, later sources taking precedence.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GomodnixConfig {
    pub jobs: Option<usize>,
    pub keep_going: Option<bool>,
    pub prefetch_command: Option<PathBuf>,
    pub fetch_submodules: Option<bool>,
    pub deep_clone: Option<bool>,
    pub go_command: Option<PathBuf>,
    pub rewrites: Vec<RewriteRule>,
}

impl GomodnixConfig {
    pub fn load(project: &Path) -> anyhow::Result<Self> {
        let mut files = Vec::new();
        if let Some(home) = home_dir() {
            files.push(home.join(".config").join(CONFIG_FILE_NAME));
        }
        files.push(project.join(CONFIG_FILE_NAME));

        let raw_config = RawConfig::load(&files, None)?;
        debug!("Loaded configuration: {:?}", raw_config);

        Ok(Self {
            jobs: raw_config.jobs,
            keep_going: raw_config.keep_going,
            prefetch_command: raw_config.prefetch.command,
            fetch_submodules: raw_config.prefetch.fetch_submodules,
            deep_clone: raw_config.prefetch.deep_clone,
            go_command: raw_config.go.command,
            rewrites: raw_config.rewrite,
        })
    }
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RawConfig {
    jobs: Option<usize>,
    keep_going: Option<bool>,
    #[serde(default)]
    prefetch: PrefetchConfig,
    #[serde(default)]
    go: GoConfig,
    #[serde(default)]
    rewrite: Vec<RewriteRule>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct PrefetchConfig {
    command: Option<PathBuf>,
    fetch_submodules: Option<bool>,
    deep_clone: Option<bool>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct GoConfig {
    command: Option<PathBuf>,
}

impl RawConfig {
    fn load(files: &[PathBuf], env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        for file in files {
            builder = builder.add_source(
                File::from(file.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }
        // `GOMODNIX_KEEP_GOING` sets `keep_going`, `GOMODNIX_PREFETCH__COMMAND` sets `prefetch.command`.
        builder
            .add_source(
                Environment::with_prefix("GOMODNIX")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }
}
