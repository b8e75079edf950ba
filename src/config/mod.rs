mod settings;

pub use settings::{ApiConfig, OtelConfig, ServerConfig, Settings, WebSocketConfig};
