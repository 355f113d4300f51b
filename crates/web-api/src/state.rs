use std::path::PathBuf;
use std::sync::Arc;

use application::DeliveryService;

/// 上传配置
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub dir: PathBuf,
    /// 小写、不带点的扩展名
    pub allowed_extensions: Vec<String>,
    pub max_bytes: usize,
}

impl UploadSettings {
    pub fn new(dir: impl Into<PathBuf>, allowed_extensions: &[String], max_bytes: usize) -> Self {
        Self {
            dir: dir.into(),
            allowed_extensions: allowed_extensions
                .iter()
                .map(|ext| ext.trim().to_ascii_lowercase())
                .collect(),
            max_bytes,
        }
    }

    pub fn allows(&self, extension: &str) -> bool {
        let extension = extension.to_ascii_lowercase();
        self.allowed_extensions.iter().any(|ext| *ext == extension)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub delivery_service: Arc<DeliveryService>,
    pub uploads: Arc<UploadSettings>,
    /// 允许跨域的来源，`*` 表示任意来源，空表示不允许跨域
    pub cors_origins: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(delivery_service: Arc<DeliveryService>, uploads: UploadSettings) -> Self {
        Self {
            delivery_service,
            uploads: Arc::new(uploads),
            cors_origins: Arc::new(vec!["*".to_string()]),
        }
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Arc::new(origins);
        self
    }
}
