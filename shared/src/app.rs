use tracing::{debug, error, info, warn};

use crate::api::{self, BackendApi, Geocoder};
use crate::call_session::{CallCommand, CallNotification, PollPolicy, SessionOutput};
use crate::capabilities::Capabilities;
use crate::error::{ApiError, AppError, ErrorKind};
use crate::event::Event;
use crate::location::{Coordinate, Location};
use crate::model::{EmergencyReport, FirstAidStatus, Model};
use crate::report::MediaError;
use crate::view::{self, ViewModel};
use crate::wizard::{TransitionError, WizardStep};

const AUDIO_FAILED: &str = "Failed to process audio. Please try again.";
const IMAGE_FAILED: &str = "Failed to analyze image. Please try again.";
const FIRST_AID_FAILED: &str = "Failed to generate first aid instructions. Please try again.";
const MICROPHONE_FAILED: &str = "Unable to access microphone. Please check your permissions.";

#[derive(Default)]
pub struct App;

impl App {
    /// Delivers the session's notifications, then runs its commands. A request
    /// that cannot even be built is answered straight away as a failure.
    fn run_session(&self, out: SessionOutput, model: &mut Model, caps: &Capabilities) {
        for notification in out.notifications {
            match notification {
                CallNotification::StateChanged(state) => {
                    debug!(state = state.as_str(), "call state changed");
                }
                CallNotification::Completed(result) => {
                    if let Err(e) = model.wizard.advance_on_call_completed(result) {
                        error!(error = %e, "call completed outside the call step");
                        model.set_error(Self::transition_error(&e));
                    }
                }
                CallNotification::Failed(e) => {
                    warn!(error = %e, "emergency call failed");
                    // Other failures show as the call's own state; a lost call needs an alert.
                    if matches!(e, ApiError::PollLimitReached { .. }) {
                        model.set_error(AppError::from(e));
                    }
                }
            }
        }

        for command in out.commands {
            match command {
                CallCommand::StartCall { attempt } => {
                    match BackendApi::new(&model.config).and_then(|api| api.start_call()) {
                        Ok(request) => request.send(&caps.http, move |result| Event::CallStarted {
                            attempt,
                            result: api::parse_start_call(result),
                        }),
                        Err(e) => {
                            let out = model.call.on_call_started(attempt, Err(e));
                            self.run_session(out, model, caps);
                        }
                    }
                }
                CallCommand::CheckStatus { attempt, call_id } => {
                    match BackendApi::new(&model.config).and_then(|api| api.check_status(&call_id)) {
                        Ok(request) => {
                            request.send(&caps.http, move |result| Event::CallStatusReceived {
                                attempt,
                                result: api::parse_call_status(result),
                            });
                        }
                        Err(e) => {
                            let out = model.call.on_status(attempt, Err(e));
                            self.run_session(out, model, caps);
                        }
                    }
                }
                CallCommand::ArmTimer { id, after } => {
                    caps.timer.start(id, after, |id| Event::PollTimerElapsed { id });
                }
                CallCommand::CancelTimer { id } => caps.timer.cancel(id),
            }
        }
    }

    fn submit_report(&self, report: EmergencyReport, model: &mut Model, caps: &Capabilities) {
        match model.wizard.advance_on_report(report) {
            Ok(()) => Self::request_first_aid(model, caps),
            Err(e) => model.set_error(Self::transition_error(&e)),
        }
    }

    fn request_first_aid(model: &mut Model, caps: &Capabilities) {
        let Some(report) = model.wizard.report() else {
            warn!("first aid requested without a report");
            return;
        };
        match BackendApi::new(&model.config).and_then(|api| api.first_aid(report)) {
            Ok(request) => {
                model.first_aid = FirstAidStatus::Pending;
                request.send(&caps.http, |result| {
                    Event::FirstAidReceived(api::parse_first_aid(result))
                });
            }
            Err(e) => {
                model.first_aid = FirstAidStatus::Failed;
                model.set_error(AppError::from_api(&e, FIRST_AID_FAILED));
            }
        }
    }

    fn request_address(model: &mut Model, caps: &Capabilities, at: Coordinate) {
        match Geocoder::new(&model.config).and_then(|g| g.reverse(at.lat(), at.lon())) {
            Ok(request) => {
                model.pending_geocode = Some(at);
                request.send(&caps.http, move |result| Event::AddressResolved {
                    at,
                    result: api::parse_reverse_geocode(result),
                });
            }
            Err(e) => warn!(error = %e, "could not build reverse geocode request"),
        }
    }

    fn media_error(e: &MediaError) -> AppError {
        match e {
            MediaError::Empty { kind } => AppError::new(
                ErrorKind::Validation,
                format!("The {kind} is empty. Please try again."),
            ),
            MediaError::TooLarge { size, max, .. } => AppError::new(ErrorKind::MediaTooLarge, e.to_string())
                .with_context("bytes", size.to_string())
                .with_context("max_bytes", max.to_string()),
        }
    }

    fn transition_error(e: &TransitionError) -> AppError {
        AppError::new(ErrorKind::InvalidState, "That step is not available right now.")
            .with_internal(e.to_string())
    }

    fn in_step(model: &Model, step: WizardStep, event_name: &str) -> bool {
        let current = model.wizard.step();
        if current != step {
            warn!(event = event_name, step = %current, "event ignored in this step");
        }
        current == step
    }
}

impl crux_core::App for App {
    type Event = Event;
    type Model = Model;
    type ViewModel = ViewModel;
    type Capabilities = Capabilities;

    fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
        let event_name = event.name();
        if event.is_user_initiated() {
            info!(event = event_name, "user action");
        } else {
            debug!(event = event_name, "event");
        }

        match event {
            Event::Noop => return,

            Event::Configure(config) => match config.validate() {
                Ok(()) => {
                    model.call.set_policy(PollPolicy::from(&config));
                    model.config = config;
                    info!(api = %model.config.api_base_url, "configured");
                }
                Err(e) => {
                    error!(error = %e, "rejected configuration");
                    model.set_error(AppError::new(ErrorKind::Configuration, e.to_string()));
                }
            },

            Event::StartRecording => {
                if Self::in_step(model, WizardStep::ReportCapture, event_name) {
                    model.report.start_recording();
                }
            }

            Event::RecordingFailed { reason } => {
                model.report.recording_failed();
                warn!(%reason, "microphone unavailable");
                model.set_error(AppError::new(ErrorKind::Validation, MICROPHONE_FAILED).with_internal(reason));
            }

            Event::RecordingFinished { audio } => {
                if model.wizard.step() != WizardStep::ReportCapture {
                    warn!("recording arrived after the report was submitted");
                    return;
                }
                let upload = match model.report.finish_recording(&audio) {
                    Ok(upload) => upload,
                    Err(e) => {
                        warn!(error = %e, "recording rejected");
                        model.set_error(Self::media_error(&e));
                        return caps.render.render();
                    }
                };
                match BackendApi::new(&model.config).and_then(|api| api.transcribe_audio(&audio)) {
                    Ok(request) => request.send(&caps.http, move |result| {
                        Event::TranscriptionReceived {
                            upload,
                            result: api::parse_transcription(result),
                        }
                    }),
                    Err(e) => {
                        let failed = Event::TranscriptionReceived { upload, result: Err(e) };
                        return self.update(failed, model, caps);
                    }
                }
            }

            Event::TranscriptionReceived { upload, result } => {
                match model.report.on_transcription(upload, result) {
                    Ok(Some(report)) => self.submit_report(report, model, caps),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(error = %e, "transcription failed");
                        model.set_error(AppError::from_api(&e, AUDIO_FAILED));
                    }
                }
            }

            Event::CaptureImageRequested => {
                if Self::in_step(model, WizardStep::ReportCapture, event_name) {
                    model.report.capture_image();
                }
            }

            Event::PhotoTaken { image } => {
                if model.wizard.step() != WizardStep::ReportCapture {
                    warn!("photo arrived after the report was submitted");
                    return;
                }
                let upload = match model.report.photo_taken(&image) {
                    Ok(upload) => upload,
                    Err(e) => {
                        warn!(error = %e, "photo rejected");
                        model.set_error(Self::media_error(&e));
                        return caps.render.render();
                    }
                };
                match BackendApi::new(&model.config).and_then(|api| api.analyze_image(&image)) {
                    Ok(request) => request.send(&caps.http, move |result| Event::ImageAnalyzed {
                        upload,
                        result: api::parse_image_analysis(result),
                    }),
                    Err(e) => {
                        let failed = Event::ImageAnalyzed { upload, result: Err(e) };
                        return self.update(failed, model, caps);
                    }
                }
            }

            Event::ImageAnalyzed { upload, result } => {
                match model.report.on_image_analysis(upload, result) {
                    Ok(Some(report)) => self.submit_report(report, model, caps),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(error = %e, "image analysis failed");
                        model.set_error(AppError::from_api(&e, IMAGE_FAILED));
                    }
                }
            }

            Event::ResetForm => {
                if Self::in_step(model, WizardStep::ReportCapture, event_name) {
                    model.report.reset();
                }
            }

            Event::FirstAidReceived(result) => {
                if model.first_aid != FirstAidStatus::Pending {
                    debug!("ignoring first aid response nobody is waiting for");
                    return;
                }
                match result {
                    Ok(response) => {
                        model.first_aid = FirstAidStatus::Idle;
                        if let Err(e) = model.wizard.advance_on_first_aid(response) {
                            model.set_error(Self::transition_error(&e));
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "first aid request failed");
                        model.first_aid = FirstAidStatus::Failed;
                        model.set_error(AppError::from_api(&e, FIRST_AID_FAILED));
                    }
                }
            }

            Event::RetryFirstAid => {
                if Self::in_step(model, WizardStep::ResponseProcessing, event_name)
                    && model.first_aid == FirstAidStatus::Failed
                {
                    model.clear_error();
                    Self::request_first_aid(model, caps);
                }
            }

            Event::CallRequested => {
                if Self::in_step(model, WizardStep::InstructionsAndCall, event_name) {
                    match model.call.initiate() {
                        Ok(out) => self.run_session(out, model, caps),
                        Err(e) => info!(error = %e, "call request ignored"),
                    }
                }
            }

            Event::CallStarted { attempt, result } => {
                let out = model.call.on_call_started(attempt, result);
                self.run_session(out, model, caps);
            }

            Event::PollTimerElapsed { id } => {
                let out = model.call.on_timer_elapsed(id);
                self.run_session(out, model, caps);
            }

            Event::CallStatusReceived { attempt, result } => {
                let out = model.call.on_status(attempt, result);
                self.run_session(out, model, caps);
            }

            Event::LocationUpdated { lat, lon } => match Coordinate::new(lat, lon) {
                Ok(at) => {
                    let moved = model.wizard.location().map_or(true, |l| l.coordinate != at);
                    if moved {
                        model.wizard.update_location(Location::new(at));
                        Self::request_address(model, caps, at);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "location fix rejected");
                    model.set_error(
                        AppError::new(ErrorKind::Validation, e.to_string())
                            .with_context("lat", lat.to_string())
                            .with_context("lon", lon.to_string()),
                    );
                }
            },

            Event::LocationFailed { reason } => {
                warn!(%reason, "location unavailable");
            }

            Event::AddressResolved { at, result } => {
                if model.pending_geocode == Some(at) {
                    model.pending_geocode = None;
                }
                match result {
                    Ok(response) => {
                        let applied = model
                            .wizard
                            .location_mut()
                            .is_some_and(|l| l.resolve_address(at, response.display_name));
                        if !applied {
                            debug!("address is for a previous position");
                        }
                    }
                    Err(e) => warn!(error = %e, "reverse geocoding failed"),
                }
            }

            Event::DismissError => model.clear_error(),

            Event::ResetRequested => {
                let out = model.call.reset();
                self.run_session(out, model, caps);
                model.wizard.reset();
                model.report.reset();
                model.first_aid = FirstAidStatus::Idle;
                model.clear_error();
            }

            Event::ViewTornDown => {
                let out = model.call.teardown();
                self.run_session(out, model, caps);
            }
        }

        caps.render.render();
    }

    fn view(&self, model: &Model) -> ViewModel {
        view::build(model)
    }
}
