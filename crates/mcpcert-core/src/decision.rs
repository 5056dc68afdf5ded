//! Deterministic certification decisions.
//!
//! The decision engine is the only source of truth for certification levels.
//! It is a pure function over scores and vulnerabilities; the analysis
//! engine's own certification opinion is never trusted.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::criteria::CriteriaModel;
use crate::profile::{CertLevel, Certification, Scores, Severity, VulnStatus, Vulnerability};

const CONDITIONS: &str = "Certification is based on automated analysis and should be \
                          confirmed by manual review before being relied upon.";

/// Derive the certification level for a profile.
///
/// Evaluates tiers top-down; the first tier whose cumulative requirements are
/// satisfied (and that is not excluded by an accepted-risk cap) wins. Total
/// over any score tuple in `[1,10]` and any vulnerability list.
pub fn decide(
    scores: &Scores,
    vulnerabilities: &[Vulnerability],
    criteria: &CriteriaModel,
    evaluated_at: DateTime<Utc>,
) -> Certification {
    let cap = accepted_risk_cap(vulnerabilities);

    let highest = |cap_level: CertLevel| {
        [CertLevel::Gold, CertLevel::Silver, CertLevel::Bronze]
            .into_iter()
            .filter(|candidate| *candidate <= cap_level)
            .find(|candidate| {
                cumulative_failures(*candidate, scores, vulnerabilities, criteria).is_empty()
            })
            .unwrap_or(CertLevel::None)
    };

    let level = highest(cap.level);
    let uncapped = highest(CertLevel::Gold);

    let justification = build_justification(
        level,
        uncapped,
        &cap,
        scores,
        vulnerabilities,
        criteria,
    );
    debug!(level = %level, %justification, "certification decided");

    Certification {
        level,
        justification,
        conditions: CONDITIONS.to_string(),
        expires: Certification::expiration_for(evaluated_at),
    }
}

/// Cap imposed by accepted (Won't Fix) critical/high findings. An accepted
/// critical risk cannot be certified at all; an accepted high risk can reach
/// at most Bronze.
struct RiskCap {
    level: CertLevel,
    reason: Option<String>,
}

fn accepted_risk_cap(vulnerabilities: &[Vulnerability]) -> RiskCap {
    let accepted = |severity: Severity| {
        vulnerabilities
            .iter()
            .filter(|v| v.status == VulnStatus::WontFix && v.severity == severity)
            .count()
    };

    let critical = accepted(Severity::Critical);
    if critical > 0 {
        return RiskCap {
            level: CertLevel::None,
            reason: Some(format!(
                "{critical} CRITICAL vulnerability(ies) accepted as Won't Fix"
            )),
        };
    }
    let high = accepted(Severity::High);
    if high > 0 {
        return RiskCap {
            level: CertLevel::Bronze,
            reason: Some(format!(
                "{high} HIGH vulnerability(ies) accepted as Won't Fix"
            )),
        };
    }
    RiskCap {
        level: CertLevel::Gold,
        reason: None,
    }
}

/// Unmet requirements for `tier` and every tier below it.
fn cumulative_failures(
    tier: CertLevel,
    scores: &Scores,
    vulnerabilities: &[Vulnerability],
    criteria: &CriteriaModel,
) -> Vec<String> {
    let mut failures = Vec::new();
    for candidate in [CertLevel::Bronze, CertLevel::Silver, CertLevel::Gold] {
        if candidate > tier {
            break;
        }
        let Some(reqs) = criteria.requirements_for(candidate) else {
            continue;
        };
        for severity in &reqs.blocked_severities {
            let open = vulnerabilities
                .iter()
                .filter(|v| v.is_blocking() && v.severity == *severity)
                .count();
            if open > 0 {
                let line = format!("{open} open {} vulnerability(ies)", severity.as_str());
                if !failures.contains(&line) {
                    failures.push(line);
                }
            }
        }
        if let Some(min) = reqs.min_overall_score {
            if scores.overall < min {
                let line = format!("overall score {} below {min}", scores.overall);
                if !failures.contains(&line) {
                    failures.push(line);
                }
            }
        }
        if let Some(min) = reqs.min_category_score {
            let floor = scores.category_floor();
            if floor < min {
                let line = format!("lowest category score {floor} below {min}");
                if !failures.contains(&line) {
                    failures.push(line);
                }
            }
        }
    }
    failures
}

fn build_justification(
    level: CertLevel,
    uncapped: CertLevel,
    cap: &RiskCap,
    scores: &Scores,
    vulnerabilities: &[Vulnerability],
    criteria: &CriteriaModel,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    match level {
        CertLevel::Gold => parts.push(
            "meets all Gold requirements: no open critical, high, or medium vulnerabilities \
             and every category score at least 8"
                .to_string(),
        ),
        CertLevel::None => {
            let failures =
                cumulative_failures(CertLevel::Bronze, scores, vulnerabilities, criteria);
            if !failures.is_empty() {
                parts.push(format!("Bronze blocked by: {}", failures.join("; ")));
            } else if cap.reason.is_none() {
                parts.push("does not meet Bronze requirements".to_string());
            }
        }
        awarded => {
            let next = match awarded {
                CertLevel::Bronze => CertLevel::Silver,
                _ => CertLevel::Gold,
            };
            let failures = cumulative_failures(next, scores, vulnerabilities, criteria);
            if failures.is_empty() {
                parts.push(format!("meets {awarded} requirements"));
            } else {
                parts.push(format!(
                    "meets {awarded} requirements; {next} blocked by: {}",
                    failures.join("; ")
                ));
            }
        }
    }

    if uncapped > level {
        if let Some(reason) = &cap.reason {
            parts.push(format!("tier capped at {}: {reason}", cap.level));
        }
    }

    parts.join(". ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn scores(overall: u8, cats: [u8; 5]) -> Scores {
        Scores {
            overall,
            authentication: cats[0],
            data_protection: cats[1],
            input_validation: cats[2],
            prompt_security: cats[3],
            infrastructure: cats[4],
        }
    }

    fn vuln(id: &str, severity: Severity, status: VulnStatus) -> Vulnerability {
        Vulnerability {
            id: id.into(),
            severity,
            category: "Authentication".into(),
            description: "test finding".into(),
            recommendation: "remediate".into(),
            status,
        }
    }

    fn level(scores: &Scores, vulns: &[Vulnerability]) -> CertLevel {
        decide(scores, vulns, CriteriaModel::v1(), at()).level
    }

    #[test]
    fn scenario_a_bronze_on_mixed_scores() {
        let s = scores(5, [5, 6, 7, 5, 6]);
        assert_eq!(level(&s, &[]), CertLevel::Bronze);
    }

    #[test]
    fn scenario_b_open_medium_keeps_bronze() {
        let s = scores(5, [5, 6, 7, 5, 6]);
        let v = [vuln("V1", Severity::Medium, VulnStatus::Open)];
        assert_eq!(level(&s, &v), CertLevel::Bronze);
    }

    #[test]
    fn scenario_c_open_high_caps_qualified_scores_at_bronze() {
        let s = scores(8, [8, 8, 8, 8, 8]);
        let v = [vuln("V1", Severity::High, VulnStatus::Open)];
        assert_eq!(level(&s, &v), CertLevel::Bronze);
    }

    #[test]
    fn scenario_d_clean_nines_reach_gold() {
        let s = scores(9, [9, 9, 9, 9, 9]);
        assert_eq!(level(&s, &[]), CertLevel::Gold);
    }

    #[test]
    fn open_critical_always_yields_none() {
        let s = scores(10, [10, 10, 10, 10, 10]);
        let v = [vuln("V1", Severity::Critical, VulnStatus::Open)];
        assert_eq!(level(&s, &v), CertLevel::None);
    }

    #[test]
    fn in_progress_counts_as_blocking() {
        let s = scores(10, [10, 10, 10, 10, 10]);
        let v = [vuln("V1", Severity::Critical, VulnStatus::InProgress)];
        assert_eq!(level(&s, &v), CertLevel::None);
    }

    #[test]
    fn fixed_findings_do_not_block() {
        let s = scores(9, [9, 9, 9, 9, 9]);
        let v = [vuln("V1", Severity::Critical, VulnStatus::Fixed)];
        assert_eq!(level(&s, &v), CertLevel::Gold);
    }

    #[test]
    fn wont_fix_high_caps_at_bronze() {
        let s = scores(9, [9, 9, 9, 9, 9]);
        let v = [vuln("V1", Severity::High, VulnStatus::WontFix)];
        let cert = decide(&s, &v, CriteriaModel::v1(), at());
        assert_eq!(cert.level, CertLevel::Bronze);
        assert!(cert.justification.contains("Won't Fix"));
    }

    #[test]
    fn wont_fix_critical_caps_at_none() {
        let s = scores(10, [10, 10, 10, 10, 10]);
        let v = [vuln("V1", Severity::Critical, VulnStatus::WontFix)];
        let cert = decide(&s, &v, CriteriaModel::v1(), at());
        assert_eq!(cert.level, CertLevel::None);
        assert!(cert.justification.contains("capped at None"));
    }

    #[test]
    fn silver_requires_category_floor_of_six() {
        let s = scores(7, [6, 6, 6, 5, 6]);
        assert_eq!(level(&s, &[]), CertLevel::Bronze);
        let s = scores(7, [6, 6, 6, 6, 6]);
        assert_eq!(level(&s, &[]), CertLevel::Silver);
    }

    #[test]
    fn low_overall_blocks_bronze() {
        let s = scores(4, [8, 8, 8, 8, 8]);
        let cert = decide(&s, &[], CriteriaModel::v1(), at());
        assert_eq!(cert.level, CertLevel::None);
        assert!(cert.justification.contains("overall score 4 below 5"));
    }

    #[test]
    fn justification_names_binding_constraint() {
        let s = scores(8, [8, 8, 8, 8, 8]);
        let v = [vuln("V1", Severity::High, VulnStatus::Open)];
        let cert = decide(&s, &v, CriteriaModel::v1(), at());
        assert!(
            cert.justification.contains("open HIGH"),
            "got: {}",
            cert.justification
        );
    }

    #[test]
    fn expiration_is_six_months_out() {
        let cert = decide(&scores(9, [9; 5]), &[], CriteriaModel::v1(), at());
        assert_eq!(cert.expires, at() + chrono::Duration::days(180));
    }

    fn arb_status() -> impl Strategy<Value = VulnStatus> {
        prop_oneof![
            Just(VulnStatus::Open),
            Just(VulnStatus::Fixed),
            Just(VulnStatus::InProgress),
            Just(VulnStatus::WontFix),
        ]
    }

    fn arb_severity() -> impl Strategy<Value = Severity> {
        prop_oneof![
            Just(Severity::Critical),
            Just(Severity::High),
            Just(Severity::Medium),
            Just(Severity::Low),
            Just(Severity::Info),
        ]
    }

    fn arb_vulns() -> impl Strategy<Value = Vec<Vulnerability>> {
        proptest::collection::vec((arb_severity(), arb_status()), 0..6).prop_map(|entries| {
            entries
                .into_iter()
                .enumerate()
                .map(|(i, (severity, status))| Vulnerability {
                    id: format!("V{}", i + 1),
                    severity,
                    category: "Infrastructure".into(),
                    description: "generated".into(),
                    recommendation: "generated".into(),
                    status,
                })
                .collect()
        })
    }

    fn arb_scores() -> impl Strategy<Value = Scores> {
        (1u8..=10, [1u8..=10, 1u8..=10, 1u8..=10, 1u8..=10, 1u8..=10])
            .prop_map(|(overall, cats)| scores(overall, cats))
    }

    proptest! {
        #[test]
        fn improving_a_score_never_lowers_the_tier(s in arb_scores(), v in arb_vulns()) {
            let before = level(&s, &v);
            let bumped = Scores {
                overall: (s.overall + 1).min(10),
                authentication: (s.authentication + 1).min(10),
                data_protection: (s.data_protection + 1).min(10),
                input_validation: (s.input_validation + 1).min(10),
                prompt_security: (s.prompt_security + 1).min(10),
                infrastructure: (s.infrastructure + 1).min(10),
            };
            prop_assert!(level(&bumped, &v) >= before);
        }

        #[test]
        fn fixing_a_vulnerability_never_lowers_the_tier(s in arb_scores(), v in arb_vulns()) {
            let before = level(&s, &v);
            for idx in 0..v.len() {
                let mut fixed = v.clone();
                fixed[idx].status = VulnStatus::Fixed;
                prop_assert!(level(&s, &fixed) >= before);
            }
        }

        #[test]
        fn removing_a_vulnerability_never_lowers_the_tier(s in arb_scores(), v in arb_vulns()) {
            let before = level(&s, &v);
            for idx in 0..v.len() {
                let mut removed = v.clone();
                removed.remove(idx);
                prop_assert!(level(&s, &removed) >= before);
            }
        }

        #[test]
        fn adding_an_open_vulnerability_never_raises_the_tier(s in arb_scores(), v in arb_vulns(), sev in arb_severity()) {
            let before = level(&s, &v);
            let mut worse = v.clone();
            worse.push(Vulnerability {
                id: format!("V{}", worse.len() + 1),
                severity: sev,
                category: "Authentication".into(),
                description: "generated".into(),
                recommendation: "generated".into(),
                status: VulnStatus::Open,
            });
            prop_assert!(level(&s, &worse) <= before);
        }

        #[test]
        fn decision_is_total_and_deterministic(s in arb_scores(), v in arb_vulns()) {
            let first = decide(&s, &v, CriteriaModel::v1(), at());
            let second = decide(&s, &v, CriteriaModel::v1(), at());
            prop_assert_eq!(first, second);
        }
    }
}
