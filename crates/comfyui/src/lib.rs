//! Clients for the external generation and voice services.
//!
//! Provides the REST wrappers, wire types, job polling with stall
//! detection, ffmpeg helpers for dialogue tracks, and the
//! [`GenerationBackend`](storyreel_core::backend::GenerationBackend) /
//! [`AudioBackend`](storyreel_core::backend::AudioBackend)
//! implementations built on them.

pub mod api;
pub mod audio;
pub mod backend;
pub mod config;
pub mod ffmpeg;
pub mod messages;
pub mod poller;
pub mod voice;

pub use audio::MediaAudioBackend;
pub use backend::ServiceBackend;
pub use config::ServiceConfig;
