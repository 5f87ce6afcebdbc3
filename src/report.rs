//! Two-stage decoding of the security-scan response: a strict schema decode
//! first, then a heuristic text scan when the model's JSON is malformed. The
//! caller always gets a rendered string back, never a panic.

use crate::extract;
use serde::{Deserialize, Serialize};

pub const NO_ISSUES_PHRASE: &str = "NO SECURITY ISSUES DETECTED";

const NO_ISSUES_MESSAGE: &str = "\u{2705} NO SECURITY ISSUES DETECTED\n\n\
    The code appears to be secure. No vulnerabilities were identified in the analysis.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityReport {
    pub status: ReportStatus,
    #[serde(default)]
    pub issues: Vec<Issue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Secure,
    Vulnerable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Severity,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub fix: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    #[serde(alias = "critical")]
    Critical,
    #[serde(alias = "high")]
    High,
    #[serde(alias = "medium")]
    Medium,
    #[serde(alias = "low")]
    Low,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Critical => "Critical",
            Severity::High => "High",
            Severity::Medium => "Medium",
            Severity::Low => "Low",
        };
        f.write_str(s)
    }
}

/// Strict decode stage. Tries the trimmed raw text first, then the body of a
/// fenced block if one is present.
pub fn parse_report(raw: &str) -> Option<SecurityReport> {
    let trimmed = raw.trim();
    if let Ok(report) = serde_json::from_str::<SecurityReport>(trimmed) {
        return Some(report);
    }
    let fenced = extract::extract_payload(raw, None);
    if fenced != trimmed {
        if let Ok(report) = serde_json::from_str::<SecurityReport>(&fenced) {
            return Some(report);
        }
    }
    None
}

/// Render a well-formed report. A secure status or an empty issue list both
/// collapse to the fixed no-issues message.
pub fn render_report(report: &SecurityReport) -> String {
    if report.status == ReportStatus::Secure || report.issues.is_empty() {
        return NO_ISSUES_MESSAGE.to_string();
    }
    let mut out = String::from("\u{1f534} SECURITY VULNERABILITIES DETECTED\n\n");
    for (i, issue) in report.issues.iter().enumerate() {
        out.push_str(&format!(
            "ISSUE #{}: {} (Severity: {})\n",
            i + 1,
            issue.kind,
            issue.severity
        ));
        out.push_str(&format!("Description: {}\n", issue.description));
        out.push_str(&format!("Explanation: {}\n\n", issue.explanation));
        out.push_str(&format!("Recommended Fix:\n```\n{}\n```\n\n", issue.fix));
    }
    out
}

/// Full normalization: strict decode, then the heuristic fallback. Malformed
/// output that still announces "no issues" gets the fixed message; anything
/// else passes through unrendered rather than failing the caller.
pub fn normalize(raw: &str) -> String {
    if let Some(report) = parse_report(raw) {
        return render_report(&report);
    }
    if raw.contains(NO_ISSUES_PHRASE) {
        return NO_ISSUES_MESSAGE.to_string();
    }
    raw.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VULNERABLE_JSON: &str = r#"{
        "status": "vulnerable",
        "issues": [
            {
                "type": "Command Injection",
                "severity": "Critical",
                "description": "User input reaches a shell",
                "explanation": "Attackers can run arbitrary commands",
                "fix": "subprocess.run([...], shell=False)"
            }
        ]
    }"#;

    #[test]
    fn secure_report_renders_fixed_message() {
        let rendered = normalize(r#"{"status": "secure", "issues": []}"#);
        assert!(rendered.contains(NO_ISSUES_PHRASE));
    }

    #[test]
    fn vulnerable_with_empty_issues_counts_as_secure() {
        let rendered = normalize(r#"{"status": "vulnerable", "issues": []}"#);
        assert!(rendered.contains(NO_ISSUES_PHRASE));
    }

    #[test]
    fn vulnerable_report_renders_numbered_issues() {
        let rendered = normalize(VULNERABLE_JSON);
        assert!(rendered.contains("SECURITY VULNERABILITIES DETECTED"));
        assert!(rendered.contains("ISSUE #1: Command Injection (Severity: Critical)"));
        assert!(rendered.contains("Description: User input reaches a shell"));
        assert!(rendered.contains("```\nsubprocess.run([...], shell=False)\n```"));
    }

    #[test]
    fn fenced_json_is_accepted() {
        let raw = format!("Here is my analysis:\n```json\n{}\n```", VULNERABLE_JSON);
        let rendered = normalize(&raw);
        assert!(rendered.contains("ISSUE #1"));
    }

    #[test]
    fn lowercase_severity_alias_parses() {
        let raw = r#"{"status":"vulnerable","issues":[{"type":"XSS","severity":"high","description":"d","explanation":"e","fix":"f"}]}"#;
        let report = parse_report(raw).unwrap();
        assert_eq!(report.issues[0].severity, Severity::High);
    }

    #[test]
    fn malformed_json_with_no_issues_phrase() {
        let raw = "I could not produce JSON but NO SECURITY ISSUES DETECTED in this code.";
        assert!(normalize(raw).contains(NO_ISSUES_PHRASE));
        assert!(normalize(raw).contains("appears to be secure"));
    }

    #[test]
    fn malformed_json_passes_through_unrendered() {
        let raw = "{\"status\": \"vulnerab"; // truncated mid-stream
        assert_eq!(normalize(raw), raw);
    }

    #[test]
    fn normalize_is_idempotent_on_no_issues_output() {
        let once = normalize(r#"{"status": "secure", "issues": []}"#);
        let twice = normalize(&once);
        assert_eq!(once, twice);
    }
}
