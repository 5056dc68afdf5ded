use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Days a certification remains valid after the evaluation date.
pub const CERTIFICATION_VALIDITY_DAYS: i64 = 180;

/// Certification tiers in ascending order of assurance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CertLevel {
    None,
    Bronze,
    Silver,
    Gold,
}

impl CertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertLevel::None => "None",
            CertLevel::Bronze => "Bronze",
            CertLevel::Silver => "Silver",
            CertLevel::Gold => "Gold",
        }
    }
}

impl std::fmt::Display for CertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vulnerability severity taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
            Severity::Info => "INFO",
        }
    }
}

/// Remediation state of a vulnerability finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VulnStatus {
    Open,
    Fixed,
    #[serde(rename = "In Progress")]
    InProgress,
    #[serde(rename = "Won't Fix")]
    WontFix,
}

impl VulnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VulnStatus::Open => "Open",
            VulnStatus::Fixed => "Fixed",
            VulnStatus::InProgress => "In Progress",
            VulnStatus::WontFix => "Won't Fix",
        }
    }
}

/// Primary function of an evaluated MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FunctionCategory {
    Memory,
    Retrieval,
    Tool,
    #[default]
    General,
}

impl FunctionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionCategory::Memory => "Memory",
            FunctionCategory::Retrieval => "Retrieval",
            FunctionCategory::Tool => "Tool",
            FunctionCategory::General => "General",
        }
    }
}

/// Semantic role assigned to a classified source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Config,
    Auth,
    Api,
    Main,
    Docs,
    Dependencies,
}

impl FileType {
    pub const ALL: [FileType; 6] = [
        FileType::Config,
        FileType::Auth,
        FileType::Api,
        FileType::Main,
        FileType::Docs,
        FileType::Dependencies,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Config => "config",
            FileType::Auth => "auth",
            FileType::Api => "api",
            FileType::Main => "main",
            FileType::Docs => "docs",
            FileType::Dependencies => "dependencies",
        }
    }
}

/// Assessment categories scored by the analysis engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Authentication,
    DataProtection,
    InputValidation,
    PromptSecurity,
    Infrastructure,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Authentication,
        Category::DataProtection,
        Category::InputValidation,
        Category::PromptSecurity,
        Category::Infrastructure,
    ];

    /// Section heading used in rendered reports and prompts.
    pub fn title(&self) -> &'static str {
        match self {
            Category::Authentication => "Authentication & Authorization",
            Category::DataProtection => "Data Protection",
            Category::InputValidation => "Input Validation & Processing",
            Category::PromptSecurity => "Prompt Security",
            Category::Infrastructure => "Infrastructure Security",
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Category::Authentication => "authentication",
            Category::DataProtection => "data_protection",
            Category::InputValidation => "input_validation",
            Category::PromptSecurity => "prompt_security",
            Category::Infrastructure => "infrastructure",
        }
    }
}

/// Per-category security scores, each an integer within `1..=10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scores {
    pub overall: u8,
    pub authentication: u8,
    pub data_protection: u8,
    pub input_validation: u8,
    pub prompt_security: u8,
    pub infrastructure: u8,
}

impl Scores {
    /// Validate that every score sits inside the 1–10 scale.
    pub fn validate(&self) -> Result<(), ProfileValidationError> {
        for (name, value) in self.entries() {
            if !(1..=10).contains(&value) {
                return Err(ProfileValidationError::ScoreOutOfRange {
                    field: name.to_string(),
                    value,
                });
            }
        }
        Ok(())
    }

    /// Score for one assessment category (`overall` excluded).
    pub fn category(&self, category: Category) -> u8 {
        match category {
            Category::Authentication => self.authentication,
            Category::DataProtection => self.data_protection,
            Category::InputValidation => self.input_validation,
            Category::PromptSecurity => self.prompt_security,
            Category::Infrastructure => self.infrastructure,
        }
    }

    /// Minimum across the five assessment categories.
    pub fn category_floor(&self) -> u8 {
        Category::ALL
            .iter()
            .map(|c| self.category(*c))
            .min()
            .unwrap_or(1)
    }

    fn entries(&self) -> [(&'static str, u8); 6] {
        [
            ("overall", self.overall),
            ("authentication", self.authentication),
            ("data_protection", self.data_protection),
            ("input_validation", self.input_validation),
            ("prompt_security", self.prompt_security),
            ("infrastructure", self.infrastructure),
        ]
    }
}

/// A single vulnerability finding inside a security profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vulnerability {
    /// Stable within the owning profile (`V1`, `V2`, ...), not globally unique.
    pub id: String,
    pub severity: Severity,
    pub category: String,
    pub description: String,
    pub recommendation: String,
    pub status: VulnStatus,
}

impl Vulnerability {
    /// Whether this finding counts against certification tiers.
    pub fn is_blocking(&self) -> bool {
        matches!(self.status, VulnStatus::Open | VulnStatus::InProgress)
    }
}

/// Narrative assessment for one category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryAssessment {
    pub mechanisms: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
}

/// Certification decision attached to a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certification {
    pub level: CertLevel,
    pub justification: String,
    pub conditions: String,
    pub expires: DateTime<Utc>,
}

impl Certification {
    pub fn expiration_for(evaluated: DateTime<Utc>) -> DateTime<Utc> {
        evaluated + Duration::days(CERTIFICATION_VALIDITY_DAYS)
    }
}

/// Identity record for an evaluated MCP server project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: Uuid,
    pub name: String,
    /// Canonical URL; the natural key for upserts.
    pub url: String,
    pub primary_function: FunctionCategory,
    pub evaluation_date: DateTime<Utc>,
    pub evaluator: String,
    pub version_evaluated: String,
    /// Cache of the latest certification history entry; re-derivable.
    pub certification_level: CertLevel,
}

/// Snapshot of one classified file at evaluation time. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityFile {
    pub repo_id: Uuid,
    pub profile_id: Uuid,
    pub path: String,
    pub file_type: FileType,
    pub content: String,
    pub evaluated_at: DateTime<Utc>,
}

/// Full evaluation result for one repository at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityProfile {
    pub id: Uuid,
    pub repo_id: Uuid,
    pub evaluation_date: DateTime<Utc>,
    pub criteria_version: String,
    pub scores: Scores,
    pub executive_summary: String,
    pub architecture_overview: String,
    pub authentication: CategoryAssessment,
    pub data_protection: CategoryAssessment,
    pub input_validation: CategoryAssessment,
    pub prompt_security: CategoryAssessment,
    pub infrastructure: CategoryAssessment,
    pub vulnerabilities: Vec<Vulnerability>,
    pub deployment_recommendations: Vec<String>,
    pub code_quality: String,
    pub certification: Certification,
}

impl SecurityProfile {
    pub fn assessment(&self, category: Category) -> &CategoryAssessment {
        match category {
            Category::Authentication => &self.authentication,
            Category::DataProtection => &self.data_protection,
            Category::InputValidation => &self.input_validation,
            Category::PromptSecurity => &self.prompt_security,
            Category::Infrastructure => &self.infrastructure,
        }
    }

    /// Validate scores and vulnerability identity invariants.
    pub fn validate(&self) -> Result<(), ProfileValidationError> {
        self.scores.validate()?;
        let mut seen = std::collections::HashSet::new();
        for vuln in &self.vulnerabilities {
            if vuln.id.trim().is_empty() {
                return Err(ProfileValidationError::BlankVulnerabilityId);
            }
            if !seen.insert(vuln.id.as_str()) {
                return Err(ProfileValidationError::DuplicateVulnerabilityId {
                    id: vuln.id.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Append-only audit record of a certification decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificationHistoryEntry {
    pub id: Uuid,
    pub repo_id: Uuid,
    pub date: DateTime<Utc>,
    pub level: CertLevel,
    pub evaluator: String,
    pub notes: String,
}

/// Errors emitted while validating profile invariants.
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProfileValidationError {
    #[error("score `{field}` must be within 1..=10 (got {value})")]
    ScoreOutOfRange { field: String, value: u8 },
    #[error("vulnerability id must not be blank")]
    BlankVulnerabilityId,
    #[error("duplicate vulnerability id `{id}` within profile")]
    DuplicateVulnerabilityId { id: String },
}
