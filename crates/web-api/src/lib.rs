//! Web API 层：REST 网关、WebSocket 协议引擎与房间注册表。

pub mod auth;
pub mod error;
pub mod registry;
pub mod routes;
pub mod state;
pub mod websocket;

pub use auth::JwtService;
pub use error::ApiError;
pub use registry::RoomRegistry;
pub use routes::router;
pub use state::AppState;
