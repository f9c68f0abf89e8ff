mod http;
mod timer;

pub use self::http::{HttpOutcome, Method, OutgoingRequest, RequestError, ValidatedUrl};
pub use crux_http::Http;
pub use self::timer::{Timer, TimerId, TimerOperation, TimerOutput};

// Crux's built-in Render covers everything the views need.
pub use crux_core::render::Render;

use crate::app::App;
use crate::event::Event;

#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub http: Http<Event>,
    pub timer: Timer<Event>,
    pub render: Render<Event>,
}
