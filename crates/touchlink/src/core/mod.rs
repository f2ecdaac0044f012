//! Core configuration shared by every subsystem

pub mod config;

pub use config::{
    DebugToolConfig, RenderConfig, TouchLinkConfig, TrackingConfig, WatchdogConfig,
    DEFAULT_PREDICTION_MS, MAX_PREDICTION_MS,
};
