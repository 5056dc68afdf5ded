//! Canonical report rendering.
//!
//! A pure projection of a stored profile: the same inputs always produce the
//! same bytes. The generation timestamp is an explicit parameter, never read
//! from the wall clock.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::criteria::CriteriaModel;
use crate::profile::{
    Category, CertificationHistoryEntry, Repository, SecurityProfile,
};

/// Output styles supported by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Markdown,
    Json,
}

/// Serializable projection combining everything a published report carries.
#[derive(Debug, Serialize)]
pub struct ReportDoc<'a> {
    pub repository: &'a Repository,
    pub profile: &'a SecurityProfile,
    pub history: &'a [CertificationHistoryEntry],
    pub generated_at: DateTime<Utc>,
}

/// Produce a report string in the requested format.
pub fn render_report(
    profile: &SecurityProfile,
    repository: &Repository,
    history: &[CertificationHistoryEntry],
    generated_at: DateTime<Utc>,
    format: OutputFormat,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Markdown => render_markdown(profile, repository, history, generated_at),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&ReportDoc {
            repository,
            profile,
            history,
            generated_at,
        })?),
    }
}

fn render_markdown(
    profile: &SecurityProfile,
    repository: &Repository,
    history: &[CertificationHistoryEntry],
    generated_at: DateTime<Utc>,
) -> anyhow::Result<String> {
    let criteria = CriteriaModel::v1();
    let mut out = String::new();

    writeln!(out, "# MCP Security Profile: {}\n", repository.name)?;

    writeln!(out, "## Basic Information")?;
    writeln!(out, "- **Name**: {}", repository.name)?;
    writeln!(out, "- **Repository**: {}", repository.url)?;
    writeln!(
        out,
        "- **Primary Function**: {}",
        repository.primary_function.as_str()
    )?;
    writeln!(
        out,
        "- **Evaluation Date**: {}",
        profile.evaluation_date.format("%Y-%m-%d")
    )?;
    writeln!(out, "- **Evaluator**: {}", repository.evaluator)?;
    writeln!(
        out,
        "- **Version Evaluated**: {}",
        repository.version_evaluated
    )?;
    writeln!(
        out,
        "- **Certification Level**: {}\n",
        profile.certification.level
    )?;

    writeln!(out, "## Security Score")?;
    writeln!(out, "- **Overall Score**: {}/10", profile.scores.overall)?;
    for category in Category::ALL {
        writeln!(
            out,
            "- **{}**: {}/10",
            category.title(),
            profile.scores.category(category)
        )?;
    }
    writeln!(out)?;

    writeln!(out, "## Executive Summary\n")?;
    writeln!(out, "{}\n", profile.executive_summary.trim())?;

    writeln!(out, "## Architecture Overview\n")?;
    writeln!(out, "{}\n", profile.architecture_overview.trim())?;

    writeln!(out, "## Security Features Assessment\n")?;
    for category in Category::ALL {
        let assessment = profile.assessment(category);
        let score = profile.scores.category(category);
        writeln!(out, "### {}", category.title())?;
        writeln!(
            out,
            "- **Score**: {}/10 ({})",
            score,
            criteria.band_for(category, score)
        )?;
        writeln!(out, "- **Mechanisms**: {}", assessment.mechanisms.trim())?;
        if !assessment.strengths.is_empty() {
            writeln!(out, "\n**Strengths**:")?;
            for item in &assessment.strengths {
                writeln!(out, "- {item}")?;
            }
        }
        if !assessment.weaknesses.is_empty() {
            writeln!(out, "\n**Weaknesses**:")?;
            for item in &assessment.weaknesses {
                writeln!(out, "- {item}")?;
            }
        }
        writeln!(out)?;
    }

    writeln!(out, "## Vulnerabilities\n")?;
    if profile.vulnerabilities.is_empty() {
        writeln!(out, "No vulnerabilities identified.\n")?;
    } else {
        writeln!(
            out,
            "| ID | Severity | Category | Description | Recommendation | Status |"
        )?;
        writeln!(
            out,
            "|---|----------|----------|-------------|----------------|--------|"
        )?;
        for vuln in &profile.vulnerabilities {
            writeln!(
                out,
                "| {} | {} | {} | {} | {} | {} |",
                vuln.id,
                vuln.severity.as_str(),
                cell(&vuln.category),
                cell(&vuln.description),
                cell(&vuln.recommendation),
                vuln.status.as_str()
            )?;
        }
        writeln!(out)?;
    }

    writeln!(out, "## Deployment Recommendations\n")?;
    if profile.deployment_recommendations.is_empty() {
        writeln!(out, "None.\n")?;
    } else {
        for item in &profile.deployment_recommendations {
            writeln!(out, "- {item}")?;
        }
        writeln!(out)?;
    }

    writeln!(out, "## Code Quality Assessment\n")?;
    writeln!(out, "{}\n", profile.code_quality.trim())?;

    writeln!(out, "## Certification Details\n")?;
    writeln!(
        out,
        "- **Certification Level**: {}",
        profile.certification.level
    )?;
    writeln!(
        out,
        "- **Justification**: {}",
        profile.certification.justification
    )?;
    writeln!(out, "- **Conditions**: {}", profile.certification.conditions)?;
    writeln!(
        out,
        "- **Expiration**: {}\n",
        profile.certification.expires.format("%Y-%m-%d")
    )?;

    writeln!(out, "## Change History\n")?;
    if history.is_empty() {
        writeln!(out, "No prior evaluations.\n")?;
    } else {
        writeln!(out, "| Date | Level | Evaluator | Notes |")?;
        writeln!(out, "|------|-------|-----------|-------|")?;
        for entry in history {
            writeln!(
                out,
                "| {} | {} | {} | {} |",
                entry.date.format("%Y-%m-%d"),
                entry.level,
                cell(&entry.evaluator),
                cell(&entry.notes)
            )?;
        }
        writeln!(out)?;
    }

    writeln!(
        out,
        "---\n_Generated at {} (criteria version {})_",
        generated_at.format("%Y-%m-%d %H:%M UTC"),
        profile.criteria_version
    )?;

    Ok(out)
}

/// Flatten text into a single markdown table cell.
fn cell(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '\n' | '\r' => ' ',
            '|' => '/',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_fixtures::{history_entry, profile, repository};
    use chrono::TimeZone;
    use insta::assert_snapshot;

    fn generated_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 2, 9, 30, 0).unwrap()
    }

    #[test]
    fn sections_appear_in_canonical_order() {
        let repo = repository("https://github.com/example/server");
        let p = profile(repo.id);
        let history = vec![history_entry(repo.id, p.certification.level)];
        let output =
            render_report(&p, &repo, &history, generated_at(), OutputFormat::Markdown).unwrap();

        let order = [
            "## Basic Information",
            "## Security Score",
            "## Executive Summary",
            "## Architecture Overview",
            "## Security Features Assessment",
            "## Vulnerabilities",
            "## Deployment Recommendations",
            "## Code Quality Assessment",
            "## Certification Details",
            "## Change History",
        ];
        let mut last = 0;
        for header in order {
            let pos = output.find(header).unwrap_or_else(|| {
                panic!("missing section {header}");
            });
            assert!(pos > last, "section {header} out of order");
            last = pos;
        }
    }

    #[test]
    fn output_is_byte_identical_across_runs() {
        let repo = repository("https://github.com/example/server");
        let p = profile(repo.id);
        let history = vec![history_entry(repo.id, p.certification.level)];
        let a = render_report(&p, &repo, &history, generated_at(), OutputFormat::Markdown).unwrap();
        let b = render_report(&p, &repo, &history, generated_at(), OutputFormat::Markdown).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn table_cells_are_flattened() {
        let repo = repository("https://github.com/example/server");
        let mut p = profile(repo.id);
        p.vulnerabilities[0].description = "line one\nline | two".into();
        let output =
            render_report(&p, &repo, &[], generated_at(), OutputFormat::Markdown).unwrap();
        assert!(output.contains("line one line / two"));
    }

    #[test]
    fn empty_vulnerability_list_renders_placeholder() {
        let repo = repository("https://github.com/example/server");
        let mut p = profile(repo.id);
        p.vulnerabilities.clear();
        let output =
            render_report(&p, &repo, &[], generated_at(), OutputFormat::Markdown).unwrap();
        assert!(output.contains("No vulnerabilities identified."));
    }

    #[test]
    fn json_projection_carries_all_parts() {
        let repo = repository("https://github.com/example/server");
        let p = profile(repo.id);
        let history = vec![history_entry(repo.id, p.certification.level)];
        let output =
            render_report(&p, &repo, &history, generated_at(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["repository"]["name"], "example-server");
        assert_eq!(value["profile"]["scores"]["overall"], 5);
        assert!(value["history"].is_array());
    }

    #[test]
    fn vulnerability_table_snapshot() {
        let repo = repository("https://github.com/example/server");
        let p = profile(repo.id);
        let output =
            render_report(&p, &repo, &[], generated_at(), OutputFormat::Markdown).unwrap();
        let start = output.find("## Vulnerabilities").unwrap();
        let end = output.find("## Deployment Recommendations").unwrap();
        assert_snapshot!(output[start..end].trim_end(), @r###"
        ## Vulnerabilities

        | ID | Severity | Category | Description | Recommendation | Status |
        |---|----------|----------|-------------|----------------|--------|
        | V1 | MEDIUM | Input Validation | Unbounded request payloads | Enforce size limits | Open |
        "###);
    }
}
