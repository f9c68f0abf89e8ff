#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod api;
pub mod app;
pub mod call_session;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod event;
pub mod location;
pub mod model;
pub mod report;
pub mod transcript;
pub mod view;
pub mod wizard;

use std::time::Duration;

pub use app::App;
pub use capabilities::{Capabilities, Effect};
pub use crux_core::{render::Render, App as CruxApp};
pub use event::Event;
pub use model::Model;
pub use view::ViewModel;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const NO_TRANSCRIPT_PLACEHOLDER: &str = "No transcript available";
pub const TERMINAL_CALL_STATUSES: &[&str] = &["ended", "completed"];
pub const COORDINATE_DECIMALS: usize = 6;
