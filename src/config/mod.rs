pub mod settings;

pub use settings::{
    NotificationMode, NotificationsConfig, PaymentsConfig, ServerConfig, Settings, ShimConfig,
    StorageBackend, StorageConfig, UnknownRoutePolicy, UploadsConfig,
};
