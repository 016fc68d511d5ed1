use dotenvy::dotenv;
use serde::Deserialize;
use std::{path::PathBuf, str::FromStr, time::Duration};
use url::Url;

use crate::client::FileMetadata;
use crate::error::ConfigError;
use crate::serde_utils;
use crate::upload::UploadOptions;

pub const DEFAULT_API_BASE_URL: &str = "https://api.screenapp.io/v2/";
pub const DEFAULT_CONTENT_TYPE: &str = "video/mp4";

const REQUIRED_VARS: [&str; 4] = ["AUTHENTICATION_TOKEN", "TEAM_ID", "FOLDER_ID", "FILE_PATH"];

#[derive(Debug, Deserialize, Default)]
struct ConfigEnv {
    authentication_token: Option<String>,
    team_id: Option<String>,
    folder_id: Option<String>,
    file_path: Option<String>,
    api_base_url: Option<Url>,
    content_type: Option<String>,
    upload_mode: Option<String>,
    chunk_size: Option<u64>,
    upload_concurrency: Option<usize>,
    part_attempts: Option<u32>,
    #[serde(default, deserialize_with = "serde_utils::deserialize_humantime")]
    part_retry_backoff: Option<Duration>,
    description: Option<String>,
    recorder_name: Option<String>,
    recorder_email: Option<String>,
    needs_conversion: Option<bool>,
}

/// How the file is sent to the files API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadMode {
    #[default]
    Multipart,
    Simple,
    /// Single-shot for files that fit in one chunk, multipart otherwise.
    Auto,
}

impl FromStr for UploadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "multipart" => Ok(UploadMode::Multipart),
            "simple" => Ok(UploadMode::Simple),
            "auto" => Ok(UploadMode::Auto),
            other => Err(format!(
                "expected one of multipart, simple, auto but got '{}'",
                other
            )),
        }
    }
}

/// Team and folder a file is uploaded into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub team_id: String,
    pub folder_id: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub auth_token: String,
    pub destination: Destination,
    pub file_path: PathBuf,
    pub api_base_url: Url,
    pub content_type: String,
    pub upload_mode: UploadMode,
    pub upload: UploadOptions,
    pub metadata: FileMetadata,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn merge_config(env: ConfigEnv) -> Result<Config, ConfigError> {
    let required = [
        non_empty(env.authentication_token),
        non_empty(env.team_id),
        non_empty(env.folder_id),
        non_empty(env.file_path),
    ];

    let missing: Vec<&'static str> = REQUIRED_VARS
        .iter()
        .zip(required.iter())
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| *name)
        .collect();
    let (auth_token, team_id, folder_id, file_path) = match required {
        [Some(token), Some(team), Some(folder), Some(path)] => (token, team, folder, path),
        _ => return Err(ConfigError::Missing(missing)),
    };

    let mut api_base_url = match env.api_base_url {
        Some(url) => url,
        None => Url::parse(DEFAULT_API_BASE_URL).map_err(|e| ConfigError::Invalid {
            name: "API_BASE_URL",
            reason: e.to_string(),
        })?,
    };
    if api_base_url.cannot_be_a_base() {
        return Err(ConfigError::Invalid {
            name: "API_BASE_URL",
            reason: format!("'{}' cannot be used as a base URL", api_base_url),
        });
    }
    // Url::join drops the last segment unless the path ends with a slash
    if !api_base_url.path().ends_with('/') {
        let path = format!("{}/", api_base_url.path());
        api_base_url.set_path(&path);
    }

    let upload_mode = match non_empty(env.upload_mode) {
        Some(mode) => mode.parse().map_err(|reason| ConfigError::Invalid {
            name: "UPLOAD_MODE",
            reason,
        })?,
        None => UploadMode::default(),
    };

    let defaults = UploadOptions::default();
    let upload = UploadOptions {
        chunk_size: positive("CHUNK_SIZE", env.chunk_size, defaults.chunk_size)?,
        concurrency: positive(
            "UPLOAD_CONCURRENCY",
            env.upload_concurrency,
            defaults.concurrency,
        )?,
        part_attempts: positive("PART_ATTEMPTS", env.part_attempts, defaults.part_attempts)?,
        retry_backoff: env.part_retry_backoff.unwrap_or(defaults.retry_backoff),
    };

    let metadata = FileMetadata {
        description: non_empty(env.description),
        recorder_name: non_empty(env.recorder_name),
        recorder_email: non_empty(env.recorder_email),
        needs_conversion: env.needs_conversion.unwrap_or(true),
    };

    Ok(Config {
        auth_token,
        destination: Destination { team_id, folder_id },
        file_path: PathBuf::from(file_path),
        api_base_url,
        content_type: non_empty(env.content_type)
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
        upload_mode,
        upload,
        metadata,
    })
}

fn positive<T>(name: &'static str, value: Option<T>, default: T) -> Result<T, ConfigError>
where
    T: PartialOrd + Default,
{
    match value {
        Some(v) if v <= T::default() => Err(ConfigError::Invalid {
            name,
            reason: "must be greater than zero".to_string(),
        }),
        Some(v) => Ok(v),
        None => Ok(default),
    }
}

impl Config {
    /// Builds a config from an explicit set of variables, ignoring the process environment.
    pub fn from_vars<I>(vars: I) -> Result<Config, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let env: ConfigEnv = envy::from_iter(vars)?;
        merge_config(env)
    }
}

pub fn read_config() -> Result<Config, ConfigError> {
    let _ = dotenv();
    Config::from_vars(std::env::vars())
}
