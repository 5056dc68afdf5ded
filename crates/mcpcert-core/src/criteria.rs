use std::fmt::Write;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::profile::{Category, CertLevel, Severity};

/// Requirements a profile must satisfy to reach one certification tier.
///
/// Tiers are monotone supersets: Silver implies Bronze, Gold implies Silver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierRequirements {
    pub tier: CertLevel,
    /// Severities that must have no blocking (Open/In Progress) findings.
    pub blocked_severities: Vec<Severity>,
    /// Minimum for every one of the five category scores, if any.
    pub min_category_score: Option<u8>,
    /// Minimum overall score, if any.
    pub min_overall_score: Option<u8>,
    pub description: String,
}

/// Scoring rubric for one assessment category: five bands over the 1–10 scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRubric {
    pub category: Category,
    /// Band labels for 1–2, 3–4, 5–6, 7–8, 9–10 in that order.
    pub bands: [String; 5],
}

/// Canonical definition of one vulnerability severity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityDefinition {
    pub severity: Severity,
    pub definition: String,
}

/// Static, versioned rule set backing analysis prompts and certification
/// decisions. Pure data; no I/O.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriteriaModel {
    pub version: String,
    pub rubrics: Vec<CategoryRubric>,
    pub tiers: Vec<TierRequirements>,
    pub severities: Vec<SeverityDefinition>,
}

static CRITERIA_V1: Lazy<CriteriaModel> = Lazy::new(build_v1);

impl CriteriaModel {
    /// The active criteria version.
    pub fn v1() -> &'static CriteriaModel {
        &CRITERIA_V1
    }

    /// Requirements for a certifiable tier; `None` for `CertLevel::None`.
    pub fn requirements_for(&self, tier: CertLevel) -> Option<&TierRequirements> {
        self.tiers.iter().find(|t| t.tier == tier)
    }

    /// Descriptive band label for a category score. Scores are clamped to the
    /// 1–10 scale before lookup so the function stays total.
    pub fn band_for(&self, category: Category, score: u8) -> &str {
        let rubric = self
            .rubrics
            .iter()
            .find(|r| r.category == category)
            .expect("all categories carry a rubric");
        let idx = (score.clamp(1, 10) as usize - 1) / 2;
        &rubric.bands[idx]
    }

    /// Rubric rendered as prompt material for the analysis engine.
    pub fn rubric_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Evaluation criteria (version {}):", self.version);
        for rubric in &self.rubrics {
            let _ = writeln!(out, "\n{} (score 1-10):", rubric.category.title());
            for (i, band) in rubric.bands.iter().enumerate() {
                let low = i * 2 + 1;
                let _ = writeln!(out, "  {}-{}: {}", low, low + 1, band);
            }
        }
        let _ = writeln!(out, "\nVulnerability severities:");
        for def in &self.severities {
            let _ = writeln!(out, "  {}: {}", def.severity.as_str(), def.definition);
        }
        let _ = writeln!(out, "\nCertification tiers:");
        for tier in &self.tiers {
            let _ = writeln!(out, "  {}: {}", tier.tier, tier.description);
        }
        out
    }
}

fn build_v1() -> CriteriaModel {
    let rubric = |category: Category, bands: [&str; 5]| CategoryRubric {
        category,
        bands: bands.map(String::from),
    };

    CriteriaModel {
        version: "1.0.0".to_string(),
        rubrics: vec![
            rubric(
                Category::Authentication,
                [
                    "No authentication on exposed MCP endpoints",
                    "Static shared secrets or basic auth without transport protection",
                    "API keys or tokens verified on every request",
                    "Standards-based auth (OAuth/JWT) with scoped authorization checks",
                    "Strong auth plus role-based access control and tenant isolation",
                ],
            ),
            rubric(
                Category::DataProtection,
                [
                    "Sensitive data stored and transmitted in plaintext",
                    "TLS in transit but secrets or PII persisted unprotected",
                    "TLS everywhere, secrets externalized from source",
                    "Encryption at rest for sensitive stores, redaction in logs",
                    "Comprehensive encryption, key rotation, and data minimization",
                ],
            ),
            rubric(
                Category::InputValidation,
                [
                    "Request payloads consumed without any validation",
                    "Ad-hoc checks on some handlers only",
                    "Schema validation on primary endpoints",
                    "Strict typed validation on all inputs with bounded sizes",
                    "Defense in depth: validation, canonicalization, and output encoding",
                ],
            ),
            rubric(
                Category::PromptSecurity,
                [
                    "User input concatenated directly into model prompts",
                    "Partial separation of user content from instructions",
                    "Role separation with basic sanitization of user input",
                    "Injection filtering and instruction/data isolation throughout",
                    "Layered prompt hardening with content filtering and audits",
                ],
            ),
            rubric(
                Category::Infrastructure,
                [
                    "No rate limiting, logging, or dependency management",
                    "Minimal logging, unpinned dependencies",
                    "Rate limiting and structured logs on key paths, pinned dependencies",
                    "Per-client limits, secure log handling, vulnerability-scanned dependencies",
                    "Hardened deployment with monitoring, least privilege, and supply-chain controls",
                ],
            ),
        ],
        tiers: vec![
            TierRequirements {
                tier: CertLevel::Bronze,
                blocked_severities: vec![Severity::Critical],
                min_category_score: None,
                min_overall_score: Some(5),
                description: "no open critical vulnerabilities and an overall score of at least 5"
                    .to_string(),
            },
            TierRequirements {
                tier: CertLevel::Silver,
                blocked_severities: vec![Severity::Critical, Severity::High],
                min_category_score: Some(6),
                min_overall_score: Some(5),
                description:
                    "Bronze plus no open high vulnerabilities and every category score at least 6"
                        .to_string(),
            },
            TierRequirements {
                tier: CertLevel::Gold,
                blocked_severities: vec![Severity::Critical, Severity::High, Severity::Medium],
                min_category_score: Some(8),
                min_overall_score: Some(5),
                description:
                    "Silver plus no open medium vulnerabilities and every category score at least 8"
                        .to_string(),
            },
        ],
        severities: vec![
            SeverityDefinition {
                severity: Severity::Critical,
                definition: "Directly exploitable for remote code execution, credential theft, \
                             or full data compromise"
                    .to_string(),
            },
            SeverityDefinition {
                severity: Severity::High,
                definition: "Exploitable weakness with significant impact, such as missing \
                             authentication or injection into privileged context"
                    .to_string(),
            },
            SeverityDefinition {
                severity: Severity::Medium,
                definition: "Weakness requiring specific conditions or yielding limited access"
                    .to_string(),
            },
            SeverityDefinition {
                severity: Severity::Low,
                definition: "Hardening gap with minimal direct impact".to_string(),
            },
            SeverityDefinition {
                severity: Severity::Info,
                definition: "Observation with no direct security impact".to_string(),
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_are_monotone_supersets() {
        let model = CriteriaModel::v1();
        let bronze = model.requirements_for(CertLevel::Bronze).unwrap();
        let silver = model.requirements_for(CertLevel::Silver).unwrap();
        let gold = model.requirements_for(CertLevel::Gold).unwrap();

        for sev in &bronze.blocked_severities {
            assert!(silver.blocked_severities.contains(sev));
        }
        for sev in &silver.blocked_severities {
            assert!(gold.blocked_severities.contains(sev));
        }
        assert!(silver.min_category_score <= gold.min_category_score);
    }

    #[test]
    fn none_tier_has_no_requirements() {
        assert!(CriteriaModel::v1()
            .requirements_for(CertLevel::None)
            .is_none());
    }

    #[test]
    fn band_lookup_covers_scale_and_clamps() {
        let model = CriteriaModel::v1();
        let lowest = model.band_for(Category::Authentication, 1);
        assert_eq!(model.band_for(Category::Authentication, 2), lowest);
        let highest = model.band_for(Category::Authentication, 10);
        assert_ne!(lowest, highest);
        // out-of-range scores clamp instead of panicking
        assert_eq!(model.band_for(Category::Authentication, 0), lowest);
        assert_eq!(model.band_for(Category::Authentication, 12), highest);
    }

    #[test]
    fn rubric_text_names_every_category_and_tier() {
        let text = CriteriaModel::v1().rubric_text();
        for category in Category::ALL {
            assert!(text.contains(category.title()), "missing {category:?}");
        }
        assert!(text.contains("Bronze"));
        assert!(text.contains("Silver"));
        assert!(text.contains("Gold"));
        assert!(text.contains("CRITICAL"));
    }
}
