pub mod analysis;
pub mod classifier;
pub mod criteria;
pub mod decision;
pub mod fetch;
pub mod llm;
pub mod pipeline;
pub mod profile;
pub mod report;
pub mod store;

pub use analysis::{AnalysisEngine, AnalysisError, CandidateProfile};
pub use classifier::{classify, ClassifiedFile, FileEntry, FileTree};
pub use criteria::CriteriaModel;
pub use decision::decide;
pub use fetch::{FetchError, LocalFetcher, RepositoryFetcher};
pub use llm::{client_for, AnalysisClient, AnalysisSettings, NoopClient};
pub use pipeline::{EvaluateError, EvaluationOutcome, EvaluationRequest, Evaluator};
pub use profile::{
    Category, CertLevel, Certification, CertificationHistoryEntry, FileType, FunctionCategory,
    Repository, Scores, SecurityFile, SecurityProfile, Severity, VulnStatus, Vulnerability,
};
pub use report::{render_report, OutputFormat, ReportDoc};
pub use store::{commit_evaluation, JsonStore, MemoryStore, ProfileStore, StoreError};
