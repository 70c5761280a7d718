use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::loader::parser::parse_json_file;

/// Deployment profile selected by `DEPLOYMENT_ENV`. Each profile switches the
/// base values before individual overrides are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Development,
    Production,
    Test,
}

impl FromStr for Profile {
    type Err = Error;

    fn from_str(value: &str) -> Result<Profile> {
        match value.to_ascii_lowercase().as_str() {
            "" | "development" | "dev" => Ok(Profile::Development),
            "production" | "prod" => Ok(Profile::Production),
            "test" | "travis_test" => Ok(Profile::Test),
            other => Err(Error::Config(format!("unknown deployment profile '{}'", other))),
        }
    }
}

/// Process-wide settings for both remote clients and the inbound facade.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub profile: Profile,

    /// Reservation service host (and optional port), without scheme.
    pub serveme_host: String,
    pub serveme_api_key: String,
    /// Identity passed as `steam_uid` on every reservation call.
    pub serveme_steam_uid: String,
    pub request_timeout: Duration,

    pub pauling_host: String,
    pub pauling_port: u16,
    /// Selects the no-op control-service client. No connection is attempted.
    pub pauling_disabled: bool,
    pub rpc_timeout: Duration,

    /// Local port the inbound facade listens on.
    pub rpc_port: u16,

    pub demo_dir: PathBuf,
    pub log_dir: PathBuf,
}

/// Optional overrides read from a JSON settings file. Absent fields keep the profile value.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SettingsFile {
    pub serveme_host: Option<String>,
    pub serveme_api_key: Option<String>,
    pub serveme_steam_uid: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub pauling_host: Option<String>,
    pub pauling_port: Option<u16>,
    pub pauling_disabled: Option<bool>,
    pub rpc_timeout_secs: Option<u64>,
    pub rpc_port: Option<u16>,
    pub demo_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

impl Settings {
    pub fn for_profile(profile: Profile) -> Self {
        let development = Settings {
            profile,
            serveme_host: "serveme.tf".to_string(),
            serveme_api_key: String::new(),
            serveme_steam_uid: String::new(),
            request_timeout: Duration::from_secs(10),
            pauling_host: "localhost".to_string(),
            pauling_port: 1234,
            pauling_disabled: false,
            rpc_timeout: Duration::from_secs(10),
            rpc_port: 8081,
            demo_dir: PathBuf::from("demos"),
            log_dir: PathBuf::from("logs"),
        };

        match profile {
            Profile::Development => development,
            Profile::Production => Settings { rpc_port: 8001, ..development },
            Profile::Test => Settings {
                serveme_host: "localhost:3000".to_string(),
                pauling_disabled: true,
                request_timeout: Duration::from_secs(2),
                rpc_timeout: Duration::from_secs(2),
                ..development
            },
        }
    }

    /// Profile defaults, then the optional settings file, then environment variables.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        Self::load_with(config_file, |name| std::env::var(name).ok())
    }

    pub fn load_with<F>(config_file: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let profile = Profile::from_str(&lookup("DEPLOYMENT_ENV").unwrap_or_default())?;
        let mut settings = Settings::for_profile(profile);

        if let Some(path) = config_file {
            let file: SettingsFile = parse_json_file(path)?;
            settings.apply_file(file);
        }

        settings.apply_env(&lookup)?;
        settings.validate()?;

        log::debug!("Loaded settings for profile {:?} (control service disabled: {}).", settings.profile, settings.pauling_disabled);
        Ok(settings)
    }

    fn apply_file(&mut self, file: SettingsFile) {
        if let Some(v) = file.serveme_host {
            self.serveme_host = v;
        }
        if let Some(v) = file.serveme_api_key {
            self.serveme_api_key = v;
        }
        if let Some(v) = file.serveme_steam_uid {
            self.serveme_steam_uid = v;
        }
        if let Some(v) = file.request_timeout_secs {
            self.request_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.pauling_host {
            self.pauling_host = v;
        }
        if let Some(v) = file.pauling_port {
            self.pauling_port = v;
        }
        if let Some(v) = file.pauling_disabled {
            self.pauling_disabled = v;
        }
        if let Some(v) = file.rpc_timeout_secs {
            self.rpc_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.rpc_port {
            self.rpc_port = v;
        }
        if let Some(v) = file.demo_dir {
            self.demo_dir = v;
        }
        if let Some(v) = file.log_dir {
            self.log_dir = v;
        }
    }

    fn apply_env<F>(&mut self, lookup: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_string(&mut self.serveme_host, lookup("SERVEME_HOST"));
        override_string(&mut self.serveme_api_key, lookup("SERVEME_API_KEY"));
        override_string(&mut self.serveme_steam_uid, lookup("SERVEME_STEAM_UID"));
        override_string(&mut self.pauling_host, lookup("PAULING_HOST"));

        if let Some(port) = parsed::<u16>("PAULING_PORT", lookup("PAULING_PORT"))? {
            self.pauling_port = port;
        }
        if let Some(disabled) = parsed::<bool>("PAULING_DISABLED", lookup("PAULING_DISABLED"))? {
            self.pauling_disabled = disabled;
        }
        if let Some(port) = parsed::<u16>("RPC_PORT", lookup("RPC_PORT"))? {
            self.rpc_port = port;
        }
        if let Some(secs) = parsed::<u64>("REQUEST_TIMEOUT_SECS", lookup("REQUEST_TIMEOUT_SECS"))? {
            self.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parsed::<u64>("RPC_TIMEOUT_SECS", lookup("RPC_TIMEOUT_SECS"))? {
            self.rpc_timeout = Duration::from_secs(secs);
        }
        if let Some(dir) = lookup("DEMO_DIR").filter(|v| !v.is_empty()) {
            self.demo_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("LOG_DIR").filter(|v| !v.is_empty()) {
            self.log_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.serveme_host.trim().is_empty() {
            return Err(Error::Config("serveme_host must not be empty".into()));
        }
        if !self.pauling_disabled && self.pauling_host.trim().is_empty() {
            return Err(Error::Config("pauling_host must not be empty unless the control service is disabled".into()));
        }
        if self.request_timeout.is_zero() || self.rpc_timeout.is_zero() {
            return Err(Error::Config("timeouts must be greater than zero".into()));
        }
        if self.serveme_api_key.is_empty() {
            log::warn!("No reservation API key configured. Calls to {} will be rejected.", self.serveme_host);
        }
        Ok(())
    }

    pub fn pauling_addr(&self) -> String {
        format!("{}:{}", self.pauling_host, self.pauling_port)
    }
}

fn override_string(target: &mut String, value: Option<String>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        *target = value;
    }
}

fn parsed<T: FromStr>(name: &str, value: Option<String>) -> Result<Option<T>> {
    match value.filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|_| Error::Config(format!("{} has an invalid value '{}'", name, raw))),
    }
}
