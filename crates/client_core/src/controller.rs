use std::{panic::AssertUnwindSafe, path::Path, sync::Arc, time::Duration};

use futures::FutureExt;
use shared::{
    domain::{
        CroppedImage, PredictionResult, RequestId, SelectionId, SubmissionStatus,
        DEFAULT_MAX_UPLOAD_BYTES,
    },
    error::{ErrorKind, PredictionError},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    file::{display_name, ImageFile, SelectPathError},
    preferences::{
        encode_display_preference, parse_display_preference, PreferenceStore,
        DISPLAY_PREFERENCE_KEY,
    },
    preview::{PreviewHandle, PreviewRegistry},
    PredictionEndpoint,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerOptions {
    pub max_upload_bytes: u64,
    pub request_timeout: Option<Duration>,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            request_timeout: Some(Duration::from_secs(30)),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ControllerEvent {
    SelectionChanged {
        selection_id: SelectionId,
        file_name: String,
        size_bytes: u64,
        preview_uri: String,
    },
    SelectionRejected {
        message: String,
    },
    CropUpdated {
        selection_id: SelectionId,
    },
    SelectionCleared,
    SubmissionStarted {
        request_id: RequestId,
        selection_id: SelectionId,
    },
    PredictionReady {
        request_id: RequestId,
        prediction: PredictionResult,
    },
    SubmissionFailed {
        request_id: Option<RequestId>,
        kind: ErrorKind,
        message: String,
    },
    StaleResponseDiscarded {
        request_id: RequestId,
        selection_id: SelectionId,
    },
    DisplayPreferenceChanged {
        dark_mode: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionSnapshot {
    pub selection_id: SelectionId,
    pub file_name: String,
    pub mime_type: Option<String>,
    pub size_bytes: u64,
    pub preview_uri: String,
    pub cropped: Option<CroppedImage>,
}

/// Everything a view needs to render one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSnapshot {
    pub selection: Option<SelectionSnapshot>,
    pub status: SubmissionStatus,
    pub request_in_flight: bool,
    /// Local validation message (oversized file, nothing selected).
    pub notice: Option<String>,
    pub last_error: Option<String>,
    pub last_prediction: Option<PredictionResult>,
    pub dark_mode: bool,
}

impl ControllerSnapshot {
    pub fn visible_error(&self) -> Option<&str> {
        self.notice.as_deref().or(self.last_error.as_deref())
    }
}

struct Selection {
    id: SelectionId,
    file: ImageFile,
    preview: PreviewHandle,
    cropped: Option<CroppedImage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SubmissionTicket {
    request_id: RequestId,
    selection_id: SelectionId,
}

struct ControllerState {
    selection: Option<Selection>,
    next_selection_id: u64,
    next_request_id: u64,
    status: SubmissionStatus,
    in_flight: Option<SubmissionTicket>,
    notice: Option<String>,
    last_error: Option<String>,
    last_prediction: Option<PredictionResult>,
    dark_mode: bool,
}

impl ControllerState {
    fn reset_submission(&mut self) {
        self.status = SubmissionStatus::Idle;
        self.notice = None;
        self.last_error = None;
        self.last_prediction = None;
    }
}

/// Owns the selected image, its preview and crop, the submission status and
/// the latest outcome, and performs the single upload-and-predict request.
///
/// At most one request is in flight. A response is applied only if the
/// selection it was issued for is still current.
pub struct UploadPredictionController {
    options: ControllerOptions,
    endpoint: Arc<dyn PredictionEndpoint>,
    preferences: Arc<dyn PreferenceStore>,
    previews: PreviewRegistry,
    inner: Mutex<ControllerState>,
    preference_writes: Mutex<()>,
    events: broadcast::Sender<ControllerEvent>,
}

impl UploadPredictionController {
    /// Reads the display preference once; a store failure falls back to light mode.
    pub async fn new(
        options: ControllerOptions,
        endpoint: Arc<dyn PredictionEndpoint>,
        preferences: Arc<dyn PreferenceStore>,
    ) -> Arc<Self> {
        let dark_mode = match preferences.get(DISPLAY_PREFERENCE_KEY).await {
            Ok(value) => value.as_deref().is_some_and(parse_display_preference),
            Err(err) => {
                warn!(error = %err, "failed to read display preference; using default");
                false
            }
        };
        let (events, _) = broadcast::channel(256);

        Arc::new(Self {
            options,
            endpoint,
            preferences,
            previews: PreviewRegistry::new(),
            preference_writes: Mutex::new(()),
            inner: Mutex::new(ControllerState {
                selection: None,
                next_selection_id: 1,
                next_request_id: 1,
                status: SubmissionStatus::Idle,
                in_flight: None,
                notice: None,
                last_error: None,
                last_prediction: None,
                dark_mode,
            }),
            events,
        })
    }

    pub fn options(&self) -> ControllerOptions {
        self.options
    }

    pub fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ControllerEvent) {
        let _ = self.events.send(event);
    }

    /// Replaces the current selection. Oversized files are rejected and the
    /// previous selection, preview and outcome are kept.
    pub async fn select_file(&self, candidate: ImageFile) -> Result<(), PredictionError> {
        let size_bytes = candidate.size_bytes();
        if size_bytes > self.options.max_upload_bytes {
            return Err(self.reject_oversized(candidate.name(), size_bytes).await);
        }

        let mut inner = self.inner.lock().await;
        let selection_id = SelectionId(inner.next_selection_id);
        inner.next_selection_id += 1;

        let preview = self.previews.acquire(&candidate);
        let event = ControllerEvent::SelectionChanged {
            selection_id,
            file_name: candidate.name().to_string(),
            size_bytes,
            preview_uri: preview.uri().to_string(),
        };
        inner.selection = Some(Selection {
            id: selection_id,
            file: candidate,
            preview,
            cropped: None,
        });
        inner.reset_submission();
        drop(inner);

        info!(selection_id = selection_id.0, size_bytes, "image selected");
        self.emit(event);
        Ok(())
    }

    /// Like [`select_file`](Self::select_file), but checks the size on disk
    /// before reading so oversized files are never loaded.
    pub async fn select_path(&self, path: &Path) -> Result<(), SelectPathError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|source| SelectPathError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        if metadata.len() > self.options.max_upload_bytes {
            let err = self
                .reject_oversized(&display_name(path), metadata.len())
                .await;
            return Err(err.into());
        }

        let file = ImageFile::from_path(path).await?;
        self.select_file(file).await?;
        Ok(())
    }

    async fn reject_oversized(&self, file_name: &str, size_bytes: u64) -> PredictionError {
        let err = PredictionError::FileTooLarge {
            size_bytes,
            limit_bytes: self.options.max_upload_bytes,
        };
        let message = err.user_message();
        self.inner.lock().await.notice = Some(message.clone());
        warn!(
            file = file_name,
            size_bytes,
            limit_bytes = self.options.max_upload_bytes,
            "rejected oversized image"
        );
        self.emit(ControllerEvent::SelectionRejected { message });
        err
    }

    /// Stores the latest crop for the current selection. Bounds are not checked.
    pub async fn update_crop(&self, cropped: CroppedImage) {
        let mut inner = self.inner.lock().await;
        let Some(selection) = inner.selection.as_mut() else {
            debug!("ignoring crop update without a selection");
            return;
        };
        selection.cropped = Some(cropped);
        let selection_id = selection.id;
        drop(inner);

        self.emit(ControllerEvent::CropUpdated { selection_id });
    }

    /// Drops the selection, its preview and crop, and any outcome. Idempotent.
    pub async fn clear_selection(&self) {
        let mut inner = self.inner.lock().await;
        let had_state = inner.selection.is_some()
            || inner.notice.is_some()
            || inner.last_error.is_some()
            || inner.last_prediction.is_some()
            || inner.status != SubmissionStatus::Idle;
        inner.selection = None;
        inner.reset_submission();
        drop(inner);

        if had_state {
            info!("selection cleared");
            self.emit(ControllerEvent::SelectionCleared);
        }
    }

    /// Uploads the selected file once and reconciles the outcome.
    ///
    /// The request runs on its own task, so the busy flag is released even
    /// if the caller stops polling this future. There is no retry.
    pub async fn submit(self: &Arc<Self>) -> Result<PredictionResult, PredictionError> {
        let (ticket, file) = {
            let mut inner = self.inner.lock().await;
            if inner.in_flight.is_some() {
                debug!("rejecting submit while a request is in flight");
                return Err(PredictionError::SubmissionInProgress);
            }
            let current = inner
                .selection
                .as_ref()
                .map(|selection| (selection.id, selection.file.clone()));
            let Some((selection_id, file)) = current else {
                let err = PredictionError::NoFileSelected;
                inner.notice = Some(err.user_message());
                drop(inner);
                self.emit(ControllerEvent::SubmissionFailed {
                    request_id: None,
                    kind: err.kind(),
                    message: err.user_message(),
                });
                return Err(err);
            };
            let request_id = RequestId(inner.next_request_id);
            inner.next_request_id += 1;
            let ticket = SubmissionTicket {
                request_id,
                selection_id,
            };
            inner.in_flight = Some(ticket);
            inner.status = SubmissionStatus::Submitting;
            inner.notice = None;
            inner.last_error = None;
            inner.last_prediction = None;
            (ticket, file)
        };

        info!(
            request_id = ticket.request_id.0,
            selection_id = ticket.selection_id.0,
            size_bytes = file.size_bytes(),
            "submitting image for prediction"
        );
        self.emit(ControllerEvent::SubmissionStarted {
            request_id: ticket.request_id,
            selection_id: ticket.selection_id,
        });

        let controller = Arc::clone(self);
        let task = tokio::spawn(async move { controller.run_submission(ticket, file).await });
        match task.await {
            Ok(outcome) => outcome,
            Err(join_err) => {
                let err = PredictionError::transport(format!("prediction task aborted: {join_err}"));
                self.finish_submission(ticket, Err(err.clone())).await;
                Err(err)
            }
        }
    }

    async fn run_submission(
        &self,
        ticket: SubmissionTicket,
        file: ImageFile,
    ) -> Result<PredictionResult, PredictionError> {
        let request = AssertUnwindSafe(self.call_endpoint(&file)).catch_unwind();
        let outcome = match request.await {
            Ok(outcome) => outcome,
            Err(_) => Err(PredictionError::transport("prediction endpoint panicked")),
        };
        self.finish_submission(ticket, outcome.clone()).await;
        outcome
    }

    async fn call_endpoint(&self, file: &ImageFile) -> Result<PredictionResult, PredictionError> {
        match self.options.request_timeout {
            Some(limit) => tokio::time::timeout(limit, self.endpoint.predict(file))
                .await
                .unwrap_or_else(|_| {
                    Err(PredictionError::transport(format!(
                        "no response within {}ms",
                        limit.as_millis()
                    )))
                }),
            None => self.endpoint.predict(file).await,
        }
    }

    async fn finish_submission(
        &self,
        ticket: SubmissionTicket,
        outcome: Result<PredictionResult, PredictionError>,
    ) {
        let mut inner = self.inner.lock().await;
        if inner.in_flight != Some(ticket) {
            return;
        }
        inner.in_flight = None;

        let current_selection = inner.selection.as_ref().map(|s| s.id);
        if current_selection != Some(ticket.selection_id) {
            drop(inner);
            info!(
                request_id = ticket.request_id.0,
                selection_id = ticket.selection_id.0,
                "discarding response for superseded selection"
            );
            self.emit(ControllerEvent::StaleResponseDiscarded {
                request_id: ticket.request_id,
                selection_id: ticket.selection_id,
            });
            return;
        }

        let event = match outcome {
            Ok(prediction) => {
                inner.status = SubmissionStatus::Succeeded;
                inner.last_error = None;
                inner.last_prediction = Some(prediction.clone());
                info!(
                    request_id = ticket.request_id.0,
                    disease = %prediction.predicted_disease,
                    confidence = prediction.confidence,
                    "prediction received"
                );
                ControllerEvent::PredictionReady {
                    request_id: ticket.request_id,
                    prediction,
                }
            }
            Err(err) => {
                let message = err.user_message();
                inner.status = SubmissionStatus::Failed;
                inner.last_prediction = None;
                inner.last_error = Some(message.clone());
                warn!(
                    request_id = ticket.request_id.0,
                    kind = ?err.kind(),
                    error = %err,
                    "prediction failed"
                );
                ControllerEvent::SubmissionFailed {
                    request_id: Some(ticket.request_id),
                    kind: err.kind(),
                    message,
                }
            }
        };
        drop(inner);
        self.emit(event);
    }

    pub async fn display_preference(&self) -> bool {
        self.inner.lock().await.dark_mode
    }

    /// Flips dark mode and persists it. The in-memory flag only changes once
    /// the store accepted the write. Toggles are serialized among themselves,
    /// but the state lock is not held while the store writes.
    pub async fn toggle_display_preference(&self) -> anyhow::Result<bool> {
        let _write = self.preference_writes.lock().await;
        let dark_mode = !self.inner.lock().await.dark_mode;
        self.preferences
            .set(DISPLAY_PREFERENCE_KEY, encode_display_preference(dark_mode))
            .await?;
        self.inner.lock().await.dark_mode = dark_mode;

        debug!(dark_mode, "display preference toggled");
        self.emit(ControllerEvent::DisplayPreferenceChanged { dark_mode });
        Ok(dark_mode)
    }

    pub async fn snapshot(&self) -> ControllerSnapshot {
        let inner = self.inner.lock().await;
        ControllerSnapshot {
            selection: inner.selection.as_ref().map(|selection| SelectionSnapshot {
                selection_id: selection.id,
                file_name: selection.file.name().to_string(),
                mime_type: selection.file.mime_type().map(str::to_string),
                size_bytes: selection.file.size_bytes(),
                preview_uri: selection.preview.uri().to_string(),
                cropped: selection.cropped.clone(),
            }),
            status: inner.status,
            request_in_flight: inner.in_flight.is_some(),
            notice: inner.notice.clone(),
            last_error: inner.last_error.clone(),
            last_prediction: inner.last_prediction.clone(),
            dark_mode: inner.dark_mode,
        }
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
