//! Configuration registries: live application state and persisted settings.

pub mod application;
pub mod item;
pub mod monitor;
pub mod settings;

pub use application::{APPLICATION_CONFIG_ORIGIN, ApplicationConfig};
pub use item::{Accessor, Authority, DualAuthorityItem, ItemDescriptor, MenuApi, Reflect, Shared};
pub use monitor::{ConfigMonitor, MONITOR_ORIGIN};
pub use settings::{SETTINGS_CONFIG_ORIGIN, SettingsConfig};
