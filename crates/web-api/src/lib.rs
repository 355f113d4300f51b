//! Web API 层。
//!
//! 提供 Axum 路由：WebSocket 投递通道、文件上传与静态文件服务，
//! 请求委托给应用层的 `DeliveryService`。

mod error;
mod routes;
mod state;
mod upload;
mod ws_connection;

pub use error::{ApiError, ErrorBody};
pub use routes::{router, UPLOADS_ROUTE};
pub use state::{AppState, UploadSettings};
pub use upload::sanitize_filename;
