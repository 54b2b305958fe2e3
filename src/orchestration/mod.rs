pub mod capture_session;
pub mod editable_results;

pub use capture_session::{AnalysisStatus, AnalysisTicket, CaptureSession, ResultsView};
pub use editable_results::{IngredientField, IngredientTable};
