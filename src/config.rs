use anyhow::{Context, Result, anyhow, bail};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/vidshare-env";
pub const DEFAULT_VIDSHARE_PORT: u16 = 8080;
pub const DEFAULT_VIDSHARE_HOST: &str = "127.0.0.1";
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 86_400;
pub const DEFAULT_LOG_FILTER: &str = "info,vidshare=debug";
pub const MIN_SECRET_LEN: usize = 32;

/// Values as written in the env file; every key is optional at this stage.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub database_path: Option<PathBuf>,
    pub vidshare_host: Option<String>,
    pub vidshare_port: Option<u16>,
    pub access_token_secret: Option<String>,
    pub access_token_ttl_secs: Option<u64>,
    pub cors_origin: Option<String>,
    pub log_filter: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub database_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub access_token_secret: String,
    pub access_token_ttl_secs: u64,
    pub cors_origin: Option<String>,
    pub log_filter: String,
}

/// Command line values that take precedence over the env file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database_path: Option<PathBuf>,
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

pub fn read_env_config(path: &Path) -> Result<Option<EnvConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    let mut cfg = EnvConfig::default();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some((key, value_raw)) = trimmed.split_once('=') {
            let value = value_raw.trim().trim_matches('"');
            match key.trim() {
                "DATABASE_PATH" => cfg.database_path = non_empty(value).map(PathBuf::from),
                "VIDSHARE_HOST" => cfg.vidshare_host = non_empty(value),
                "VIDSHARE_PORT" => {
                    let port: u16 = value
                        .parse()
                        .with_context(|| format!("Parsing VIDSHARE_PORT from {}", path.display()))?;
                    cfg.vidshare_port = Some(port);
                }
                "ACCESS_TOKEN_SECRET" => cfg.access_token_secret = non_empty(value),
                "ACCESS_TOKEN_TTL_SECS" => {
                    let ttl: u64 = value.parse().with_context(|| {
                        format!("Parsing ACCESS_TOKEN_TTL_SECS from {}", path.display())
                    })?;
                    cfg.access_token_ttl_secs = Some(ttl);
                }
                "CORS_ORIGIN" => cfg.cors_origin = non_empty(value),
                "LOG_FILTER" => cfg.log_filter = non_empty(value),
                _ => {}
            }
        }
    }
    Ok(Some(cfg))
}

pub fn load_runtime_config_from(
    path: impl AsRef<Path>,
    overrides: Overrides,
) -> Result<RuntimeConfig> {
    let path = path.as_ref();
    let cfg = read_env_config(path)?
        .ok_or_else(|| anyhow!("Missing config file at {}", path.display()))?;

    let database_path = overrides
        .database_path
        .or(cfg.database_path)
        .ok_or_else(|| anyhow!("DATABASE_PATH not set in {}", path.display()))?;
    let access_token_secret = cfg
        .access_token_secret
        .ok_or_else(|| anyhow!("ACCESS_TOKEN_SECRET not set in {}", path.display()))?;
    if access_token_secret.len() < MIN_SECRET_LEN {
        bail!(
            "ACCESS_TOKEN_SECRET in {} must be at least {MIN_SECRET_LEN} characters",
            path.display()
        );
    }

    Ok(RuntimeConfig {
        database_path,
        host: overrides
            .host
            .or(cfg.vidshare_host)
            .unwrap_or_else(|| DEFAULT_VIDSHARE_HOST.to_string()),
        port: overrides
            .port
            .or(cfg.vidshare_port)
            .unwrap_or(DEFAULT_VIDSHARE_PORT),
        access_token_secret,
        access_token_ttl_secs: cfg.access_token_ttl_secs.unwrap_or(DEFAULT_TOKEN_TTL_SECS),
        cors_origin: cfg.cors_origin,
        log_filter: cfg
            .log_filter
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SECRET_LINE: &str = "ACCESS_TOKEN_SECRET=\"0123456789abcdef0123456789abcdef\"\n";

    fn make_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    #[test]
    fn read_env_config_extracts_port() {
        let cfg = make_config("DATABASE_PATH=\"/var/lib/vidshare/db\"\nVIDSHARE_PORT=\"4242\"\n");
        let parsed = read_env_config(cfg.path()).unwrap().unwrap();
        assert_eq!(parsed.vidshare_port, Some(4242));
    }

    #[test]
    fn load_runtime_config_defaults_missing_values() {
        let cfg = make_config(&format!("# comment\nDATABASE_PATH=\"/d/vidshare.db\"\n{SECRET_LINE}"));
        let runtime = load_runtime_config_from(cfg.path(), Overrides::default()).unwrap();
        assert_eq!(runtime.port, DEFAULT_VIDSHARE_PORT);
        assert_eq!(runtime.host, DEFAULT_VIDSHARE_HOST);
        assert_eq!(runtime.database_path, PathBuf::from("/d/vidshare.db"));
        assert_eq!(runtime.access_token_ttl_secs, DEFAULT_TOKEN_TTL_SECS);
        assert_eq!(runtime.log_filter, DEFAULT_LOG_FILTER);
        assert!(runtime.cors_origin.is_none());
    }

    #[test]
    fn overrides_win_over_file() {
        let cfg = make_config(&format!(
            "DATABASE_PATH=\"/d/a.db\"\nVIDSHARE_HOST=\"0.0.0.0\"\nVIDSHARE_PORT=\"9000\"\n{SECRET_LINE}"
        ));
        let runtime = load_runtime_config_from(
            cfg.path(),
            Overrides {
                host: None,
                port: Some(7000),
                database_path: Some(PathBuf::from("/tmp/b.db")),
            },
        )
        .unwrap();
        assert_eq!(runtime.host, "0.0.0.0");
        assert_eq!(runtime.port, 7000);
        assert_eq!(runtime.database_path, PathBuf::from("/tmp/b.db"));
    }

    #[test]
    fn short_or_missing_secret_is_rejected() {
        let short = make_config("DATABASE_PATH=\"/d\"\nACCESS_TOKEN_SECRET=\"tiny\"\n");
        assert!(load_runtime_config_from(short.path(), Overrides::default()).is_err());

        let missing = make_config("DATABASE_PATH=\"/d\"\n");
        assert!(load_runtime_config_from(missing.path(), Overrides::default()).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_runtime_config_from(dir.path().join("absent"), Overrides::default())
            .unwrap_err();
        assert!(err.to_string().contains("Missing config file"));
    }
}
