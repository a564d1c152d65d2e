//! Runtime configuration.
//!
//! Settings come from `floorgen.toml` in the working directory (or a path
//! given on the command line), with environment variables taking precedence:
//! `GEMINI_API_KEY`, `ALIGN_EXEC`, `ALIGN_PDK_MOCK`, `ALIGN_PDK_SKY130`.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use align::Pdk;

/// The default configuration file name.
pub const CONFIG_FILE: &str = "floorgen.toml";

/// The default ALIGN entry point, resolved through `PATH`.
const DEFAULT_ALIGN_EXEC: &str = "schematic2layout.py";

/// The contents of `floorgen.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// The Gemini API key. `GEMINI_API_KEY` takes precedence.
    pub gemini_api_key: Option<String>,
    /// The Gemini model name; defaults to [`gemini::DEFAULT_MODEL`].
    pub gemini_model: Option<String>,
    /// The ALIGN entry point. `ALIGN_EXEC` takes precedence.
    pub align_exec: Option<PathBuf>,
    /// PDK directories, keyed by kit.
    #[serde(default)]
    pub pdk: PdkDirs,
}

/// The PDK directory table.
#[derive(Debug, Default, Deserialize)]
pub struct PdkDirs {
    /// The ALIGN mock PDK directory.
    pub mock: Option<PathBuf>,
    /// The ALIGN sky130 PDK directory.
    pub sky130: Option<PathBuf>,
}

impl Config {
    /// Loads configuration from the given file, or from [`CONFIG_FILE`] in
    /// the working directory. A missing default file yields the empty
    /// configuration; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(CONFIG_FILE), false),
        };
        if !path.exists() {
            if required {
                anyhow::bail!("config file {path:?} does not exist");
            }
            tracing::debug!("no {CONFIG_FILE} found, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {path:?}"))?;
        toml::from_str(&contents).with_context(|| format!("failed to parse {path:?}"))
    }

    /// The Gemini API key, from the environment or the config file.
    pub fn api_key(&self) -> anyhow::Result<String> {
        env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| self.gemini_api_key.clone())
            .context("no Gemini API key: set GEMINI_API_KEY or `gemini_api_key` in floorgen.toml")
    }

    /// The ALIGN entry point to invoke.
    pub fn align_exec(&self) -> PathBuf {
        env::var_os("ALIGN_EXEC")
            .map(PathBuf::from)
            .or_else(|| self.align_exec.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ALIGN_EXEC))
    }

    /// The directory of the given PDK.
    pub fn pdk_dir(&self, pdk: Pdk) -> anyhow::Result<PathBuf> {
        let (env_var, configured) = match pdk {
            Pdk::Mock => ("ALIGN_PDK_MOCK", &self.pdk.mock),
            Pdk::Sky130 => ("ALIGN_PDK_SKY130", &self.pdk.sky130),
        };
        env::var_os(env_var)
            .map(PathBuf::from)
            .or_else(|| configured.clone())
            .with_context(|| {
                format!(
                    "no directory for the {} PDK: set {env_var} or `pdk.{}` in floorgen.toml",
                    pdk.name(),
                    pdk.name()
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let config: Config = toml::from_str(
            r#"
            gemini_api_key = "k"
            gemini_model = "gemini-2.5-pro"
            align_exec = "/opt/align/bin/schematic2layout.py"

            [pdk]
            mock = "/opt/align/pdks/mock"
            sky130 = "/opt/align/pdks/sky130"
            "#,
        )
        .unwrap();
        assert_eq!(config.gemini_api_key.as_deref(), Some("k"));
        assert_eq!(
            config.pdk.sky130.as_deref(),
            Some(Path::new("/opt/align/pdks/sky130"))
        );
    }

    #[test]
    fn empty_config_uses_default_exec() {
        let config: Config = toml::from_str("").unwrap();
        // Only meaningful when ALIGN_EXEC is unset; tests do not set it.
        if env::var_os("ALIGN_EXEC").is_none() {
            assert_eq!(config.align_exec(), PathBuf::from(DEFAULT_ALIGN_EXEC));
        }
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        assert!(Config::load(Some(Path::new("/nonexistent/floorgen.toml"))).is_err());
    }

    #[test]
    fn missing_pdk_dir_is_an_error() {
        let config = Config::default();
        if env::var_os("ALIGN_PDK_MOCK").is_none() {
            assert!(config.pdk_dir(Pdk::Mock).is_err());
        }
    }
}
