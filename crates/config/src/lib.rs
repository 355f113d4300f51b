//! 统一配置中心
//!
//! 加载顺序：默认值 -> `APP_CONFIG_FILE` 指定的文件（toml/yaml/json）-> `APP_` 前缀环境变量
//! （`__` 表示嵌套，例如 `APP_AUTH__SECRET`）。加载后先做字段校验，再做语义校验。

use std::path::PathBuf;

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// `database.url` 取该值时使用内存存储
pub const MEMORY_DATABASE_URL: &str = "memory";

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    #[validate(length(min = 1))]
    pub url: String,
    #[validate(range(min = 1))]
    pub max_connections: u32,
    #[validate(range(min = 1))]
    pub acquire_timeout_seconds: u64,
    /// 获取连接失败时的最大尝试次数
    #[validate(range(min = 1, max = 10))]
    pub acquire_retries: u32,
}

impl DatabaseConfig {
    pub fn is_memory(&self) -> bool {
        self.url == MEMORY_DATABASE_URL
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// HS256 JWT，身份取自 `user_id` 声明
    Jwt,
    /// 与共享密钥比较，通过后解析为 `shared_secret_identity`
    SharedSecret,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AuthConfig {
    pub mode: AuthMode,
    pub secret: String,
    pub shared_secret_identity: i64,
    /// 每次操作都重新校验连接凭证
    #[serde(default)]
    pub revalidate_per_operation: bool,
    #[validate(range(min = 1))]
    pub token_ttl_minutes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationMode {
    OfflineOnly,
    Always,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NotificationConfig {
    /// 未配置时不推送
    #[validate(url)]
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub policy: NotificationMode,
    #[validate(range(min = 1, max = 60))]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UploadConfig {
    pub dir: PathBuf,
    #[validate(length(min = 1))]
    pub allowed_extensions: Vec<String>,
    #[validate(range(min = 1))]
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub database: DatabaseConfig,
    #[validate(nested)]
    pub auth: AuthConfig,
    #[validate(nested)]
    pub notification: NotificationConfig,
    #[validate(nested)]
    pub upload: UploadConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 5000,
                cors_origins: vec!["*".into()],
            },
            database: DatabaseConfig {
                url: MEMORY_DATABASE_URL.into(),
                max_connections: 10,
                acquire_timeout_seconds: 5,
                acquire_retries: 3,
            },
            auth: AuthConfig {
                mode: AuthMode::SharedSecret,
                secret: String::new(),
                shared_secret_identity: 1,
                revalidate_per_operation: false,
                token_ttl_minutes: 60 * 24,
            },
            notification: NotificationConfig {
                endpoint: None,
                api_key: None,
                policy: NotificationMode::OfflineOnly,
                timeout_seconds: 5,
            },
            upload: UploadConfig {
                dir: PathBuf::from("uploads/chat"),
                allowed_extensions: ["png", "jpg", "jpeg", "gif", "mp4", "mov", "pdf"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
                max_bytes: 50 * 1024 * 1024,
            },
        }
    }
}

impl AppConfig {
    /// 按 默认值 -> 配置文件 -> 环境变量 的优先级加载并校验
    pub fn load() -> Result<Self, ConfigError> {
        let mut fig = Figment::new().merge(Serialized::defaults(AppConfig::default()));
        if let Ok(path) = std::env::var("APP_CONFIG_FILE") {
            if path.ends_with(".yml") || path.ends_with(".yaml") {
                fig = fig.merge(Yaml::file(path));
            } else if path.ends_with(".json") {
                fig = fig.merge(Json::file(path));
            } else {
                fig = fig.merge(Toml::file(path));
            }
        }
        fig = fig.merge(Env::prefixed("APP_").split("__"));

        Self::from_figment(fig)
    }

    pub fn from_figment(fig: Figment) -> Result<Self, ConfigError> {
        let cfg: AppConfig = fig.extract().map_err(Box::new)?;
        cfg.check()?;
        Ok(cfg)
    }

    /// 字段校验加语义校验
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;

        if !self.database.is_memory()
            && !(self.database.url.starts_with("postgres://")
                || self.database.url.starts_with("postgresql://"))
        {
            return Err(ConfigError::InvalidDatabaseUrl(format!(
                "expected a postgres:// url or \"{MEMORY_DATABASE_URL}\""
            )));
        }

        if let Some(origin) = self.server.cors_origins.iter().find(|origin| {
            origin.as_str() != "*"
                && !(origin.starts_with("http://") || origin.starts_with("https://"))
        }) {
            return Err(ConfigError::InvalidCors(format!(
                "origin {origin:?} must be \"*\" or an http(s) origin"
            )));
        }

        match self.auth.mode {
            // 至少 256 位
            AuthMode::Jwt if self.auth.secret.len() < 32 => {
                return Err(ConfigError::InvalidAuth(
                    "JWT secret must be at least 32 characters long".into(),
                ));
            }
            AuthMode::SharedSecret if self.auth.secret.is_empty() => {
                return Err(ConfigError::InvalidAuth("shared secret cannot be empty".into()));
            }
            _ => {}
        }

        if self
            .upload
            .allowed_extensions
            .iter()
            .any(|ext| ext.is_empty() || ext.contains('.'))
        {
            return Err(ConfigError::InvalidUpload(
                "allowed extensions must be bare, non-empty names".into(),
            ));
        }

        Ok(())
    }

    /// 日志用的脱敏副本
    pub fn sanitized(&self) -> Self {
        let mut copy = self.clone();
        copy.auth.secret = "[REDACTED]".into();
        if copy.notification.api_key.is_some() {
            copy.notification.api_key = Some("[REDACTED]".into());
        }
        if let Some((scheme, rest)) = copy.database.url.split_once("://") {
            if let Some((_, host)) = rest.rsplit_once('@') {
                copy.database.url = format!("{scheme}://[REDACTED]@{host}");
            }
        }
        copy
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("Invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error("Invalid database URL: {0}")]
    InvalidDatabaseUrl(String),
    #[error("Invalid auth configuration: {0}")]
    InvalidAuth(String),
    #[error("Invalid upload configuration: {0}")]
    InvalidUpload(String),
    #[error("Invalid CORS configuration: {0}")]
    InvalidCors(String),
}
