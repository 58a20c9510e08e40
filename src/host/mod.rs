//! 宿主协作方：设置提供方与预热标记（由外层实现，核心只消费接口）

pub mod marker;
pub mod settings;

pub use marker::{InMemoryWarmupRecorder, JsonFileWarmupRecorder, WarmupMarker, WarmupRecorder};
pub use settings::{DefaultSettings, InMemorySettings, SettingsProvider};
