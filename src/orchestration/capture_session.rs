//! Per-user capture session: capture → compress → analyze → editable results.
//!
//! The session is a plain value owned by the caller. Analysis can be split into
//! [`CaptureSession::begin_analysis`] and [`CaptureSession::complete`] so that several requests
//! may be in flight; whichever completes last decides the displayed state. Completions for a
//! capture that has since been discarded are ignored.

use tracing::{debug, info, warn};

use crate::client::AnalysisClient;
use crate::core::errors::{AnalysisError, CompressionError, EditError, SessionError};
use crate::core::types::{AnalysisResult, Ingredient};
use crate::orchestration::editable_results::{IngredientField, IngredientTable};
use crate::services::capture::{prepare_capture, CaptureSource, CapturedImage};

/// Where the analysis of the current capture stands
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisStatus {
    Idle,
    Analyzing,
    Succeeded(AnalysisResult),
    Failed(String),
}

/// What the results panel should show
#[derive(Debug, PartialEq)]
pub enum ResultsView<'a> {
    /// Nothing captured yet
    Hidden,
    Loading,
    /// Request failed; a retry is offered
    Failed { message: &'a str },
    /// The model found nothing; a retry is offered
    NoFoodRecognized,
    Table(&'a IngredientTable),
}

/// Handle for one in-flight analysis request
#[derive(Debug, Clone)]
pub struct AnalysisTicket {
    capture_id: u64,
    request_id: u64,
    image_url: String,
}

impl AnalysisTicket {
    pub fn image_url(&self) -> &str {
        &self.image_url
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }
}

#[derive(Debug)]
pub struct CaptureSession {
    target_bytes: usize,
    capture: Option<CapturedImage>,
    status: AnalysisStatus,
    table: IngredientTable,
    capture_id: u64,
    next_request_id: u64,
}

impl CaptureSession {
    pub fn new(target_bytes: usize) -> Self {
        Self {
            target_bytes,
            capture: None,
            status: AnalysisStatus::Idle,
            table: IngredientTable::default(),
            capture_id: 0,
            next_request_id: 0,
        }
    }

    pub fn status(&self) -> &AnalysisStatus {
        &self.status
    }

    pub fn capture(&self) -> Option<&CapturedImage> {
        self.capture.as_ref()
    }

    pub fn table(&self) -> &IngredientTable {
        &self.table
    }

    /// Compress (if needed) and store a new capture, replacing any previous one.
    ///
    /// On failure the session is left exactly as it was.
    pub async fn capture_image(&mut self, source: CaptureSource) -> Result<&CapturedImage, CompressionError> {
        let captured = prepare_capture(source, self.target_bytes).await.map_err(|e| {
            warn!("Failed to process image: {}", e);
            e
        })?;

        info!(
            "Captured image ({} bytes original, compressed: {})",
            captured.original_size, captured.compressed
        );
        Ok(self.install_capture(captured))
    }

    fn install_capture(&mut self, captured: CapturedImage) -> &CapturedImage {
        self.capture_id += 1;
        self.status = AnalysisStatus::Idle;
        self.table = IngredientTable::default();
        self.capture.insert(captured)
    }

    /// Start an analysis of the stored capture. Earlier requests keep running.
    pub fn begin_analysis(&mut self) -> Result<AnalysisTicket, SessionError> {
        let capture = self.capture.as_ref().ok_or(SessionError::NoCapture)?;
        self.next_request_id += 1;
        self.status = AnalysisStatus::Analyzing;
        debug!("Starting analysis request {}", self.next_request_id);

        Ok(AnalysisTicket {
            capture_id: self.capture_id,
            request_id: self.next_request_id,
            image_url: capture.data_url.clone(),
        })
    }

    /// Apply the outcome of a request. Returns false if the ticket's capture was discarded.
    pub fn complete(&mut self, ticket: AnalysisTicket, outcome: Result<AnalysisResult, AnalysisError>) -> bool {
        if ticket.capture_id != self.capture_id || self.capture.is_none() {
            debug!("Dropping response {} for a discarded capture", ticket.request_id);
            return false;
        }

        match outcome {
            Ok(result) => {
                info!("Analysis {} returned {} ingredients", ticket.request_id, result.ingredients.len());
                self.table = IngredientTable::from_result(&result);
                self.status = AnalysisStatus::Succeeded(result);
            }
            Err(e) => {
                warn!("Analysis {} failed: {}", ticket.request_id, e);
                let message = match e {
                    AnalysisError::Server { message, .. } => message,
                    other => other.to_string(),
                };
                self.status = AnalysisStatus::Failed(message);
            }
        }
        true
    }

    /// Analyze the stored capture and wait for the outcome.
    pub async fn analyze(&mut self, client: &AnalysisClient) -> Result<&AnalysisStatus, SessionError> {
        let ticket = self.begin_analysis()?;
        let outcome = client.analyze(ticket.image_url()).await;
        self.complete(ticket, outcome);
        Ok(&self.status)
    }

    /// User-initiated retry: re-sends the same stored image.
    pub async fn retry(&mut self, client: &AnalysisClient) -> Result<&AnalysisStatus, SessionError> {
        self.analyze(client).await
    }

    /// Capture then analyze, as when the user takes or uploads a photo.
    pub async fn capture_and_analyze(
        &mut self,
        source: CaptureSource,
        client: &AnalysisClient,
    ) -> Result<&AnalysisStatus, SessionError> {
        self.capture_image(source).await?;
        self.analyze(client).await
    }

    /// Retake: discard the capture and any results.
    pub fn reset(&mut self) {
        self.capture_id += 1;
        self.capture = None;
        self.status = AnalysisStatus::Idle;
        self.table = IngredientTable::default();
    }

    pub fn edit(&mut self, index: usize, field: IngredientField, value: &str) -> Result<&Ingredient, EditError> {
        self.table.edit(index, field, value)
    }

    pub fn total_calories(&self) -> f64 {
        self.table.total_calories()
    }

    pub fn view(&self) -> ResultsView<'_> {
        if self.capture.is_none() {
            return ResultsView::Hidden;
        }
        match &self.status {
            AnalysisStatus::Idle => ResultsView::Hidden,
            AnalysisStatus::Analyzing => ResultsView::Loading,
            AnalysisStatus::Failed(message) => ResultsView::Failed { message },
            AnalysisStatus::Succeeded(result) if result.is_empty() => ResultsView::NoFoodRecognized,
            AnalysisStatus::Succeeded(_) => ResultsView::Table(&self.table),
        }
    }
}
