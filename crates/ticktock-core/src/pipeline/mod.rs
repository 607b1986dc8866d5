pub mod config;
mod orchestrator;
pub mod report;
mod types;

pub use config::{DenseConfig, RegistrationConfig, Strategy, TemplateSearchConfig};
pub use orchestrator::{register, register_batch, ReferenceFeatures, Registrar};
pub use report::{render_markdown, write_report, ReportEntry};
pub use types::{
    BatchStage, MethodUsed, NoOpReporter, ProgressReporter, RegistrationResult, RegistrationState,
};
