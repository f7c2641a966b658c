use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf};

use crate::common::paths;

/// What to do with a `.deb` that was downloaded on the remote machine but
/// then rejected by the resolver.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    #[default]
    Keep,
    Remove,
}

fn default_port() -> u16 {
    22
}

fn default_ssh_program() -> String {
    "ssh".to_string()
}

fn default_scp_program() -> String {
    "scp".to_string()
}

fn default_workdir() -> String {
    "depends".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RemoteConfig {
    pub host: Option<String>,
    pub user: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    pub identity_file: Option<PathBuf>,
    /// Password authentication goes through `sshpass`; key auth is preferred.
    pub password: Option<String>,
    /// May carry extra arguments, e.g. `ssh -F ~/.ssh/build_config`.
    #[serde(default = "default_ssh_program")]
    pub ssh_program: String,
    #[serde(default = "default_scp_program")]
    pub scp_program: String,
    /// Remote working directory (relative to the login directory).
    #[serde(default = "default_workdir")]
    pub workdir: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            host: None,
            user: None,
            port: default_port(),
            identity_file: None,
            password: None,
            ssh_program: default_ssh_program(),
            scp_program: default_scp_program(),
            workdir: default_workdir(),
        }
    }
}

fn default_stderr_threshold() -> usize {
    3
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ResolveConfig {
    /// Largest simulation stderr line count still treated as a clean run.
    #[serde(default = "default_stderr_threshold")]
    pub stderr_threshold: usize,
    #[serde(default)]
    pub orphans: OrphanPolicy,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        ResolveConfig {
            stderr_threshold: default_stderr_threshold(),
            orphans: OrphanPolicy::default(),
        }
    }
}

fn default_git_url() -> String {
    "git@gitlab-lest.ru:kvs/distrib_dep.git".to_string()
}

fn default_checkout_dir() -> PathBuf {
    PathBuf::from("distrib_dep")
}

fn default_manifest_subdir() -> PathBuf {
    PathBuf::from("linux")
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MetadataConfig {
    #[serde(default = "default_git_url")]
    pub git_url: String,
    /// Relative paths are resolved against the working directory.
    #[serde(default = "default_checkout_dir")]
    pub checkout_dir: PathBuf,
    /// Root of the manifest tree inside the checkout.
    #[serde(default = "default_manifest_subdir")]
    pub manifest_subdir: PathBuf,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        MetadataConfig {
            git_url: default_git_url(),
            checkout_dir: default_checkout_dir(),
            manifest_subdir: default_manifest_subdir(),
        }
    }
}

fn default_codename() -> String {
    "stable".to_string()
}

fn default_components() -> Vec<String> {
    vec!["main".to_string()]
}

fn default_architectures() -> Vec<String> {
    vec!["amd64".to_string(), "i386".to_string()]
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RepositoryConfig {
    #[serde(default = "default_codename")]
    pub codename: String,
    #[serde(default = "default_codename")]
    pub suite: String,
    #[serde(default = "default_components")]
    pub components: Vec<String>,
    #[serde(default = "default_architectures")]
    pub architectures: Vec<String>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        RepositoryConfig {
            codename: default_codename(),
            suite: default_codename(),
            components: default_components(),
            architectures: default_architectures(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub resolve: ResolveConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub repository: RepositoryConfig,
}

pub fn config_file_path() -> Result<PathBuf> {
    Ok(paths::aptpack_config_dir()?.join("aptpack.toml"))
}

impl Config {
    /// Load the config from disk. If the config file does not exist,
    /// create a default config file and return the default.
    pub fn load() -> Result<Config> {
        let cfg_path = config_file_path()?;
        if !cfg_path.exists() {
            let default = Config::default();
            let toml = toml::to_string_pretty(&default).context("serializing default config")?;
            fs::write(&cfg_path, toml)
                .with_context(|| format!("writing default config to {}", cfg_path.display()))?;
            return Ok(default);
        }
        Self::load_from(&cfg_path)
    }

    /// Load an explicit config file; a missing file is an error here.
    pub fn load_from(path: &Path) -> Result<Config> {
        let s = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&s).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(s: &str) -> Result<Config> {
        let c: Config = toml::from_str(s).context("parsing config toml")?;
        Ok(c)
    }
}
