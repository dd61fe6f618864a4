use crate::model::ScanReport;
use anyhow::Result;
use std::fmt::Write;

pub const NO_FINDINGS: &str = "No known vulnerable dependencies found.";

pub fn print_text(report: &ScanReport) -> Result<()> {
    print!("{}", render_text(report));
    Ok(())
}

/// One block per finding, then any warnings.
pub fn render_text(report: &ScanReport) -> String {
    let mut out = String::new();

    if report.findings.is_empty() {
        let _ = writeln!(out, "{}", NO_FINDINGS);
    } else {
        let _ = writeln!(out, "Vulnerable dependencies detected:");
        let _ = writeln!(out);

        for f in &report.findings {
            let _ = writeln!(out, "- Package: {}", f.package);
            let _ = writeln!(out, "  Installed: {}", f.installed_version);
            let _ = writeln!(out, "  Vulnerable range: {}", f.vulnerable_range);
            if let Some(fixed) = &f.fixed_version {
                let _ = writeln!(out, "  Fixed in: {}", fixed);
            }
            if let Some(cve) = &f.identifier {
                let _ = writeln!(out, "  CVE: {}", cve);
            }
            if let Some(advisory) = &f.advisory_id {
                let _ = writeln!(out, "  Advisory: {}", advisory);
            }
            if let Some(summary) = &f.summary {
                let _ = writeln!(out, "  Summary: {}", summary);
            }
            let _ = writeln!(out);
        }
    }

    if !report.warnings.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Warnings ({}):", report.warnings.len());
        for w in &report.warnings {
            let _ = writeln!(out, "  ! {}", w);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Finding, ScanMode, ScanWarning};

    #[test]
    fn test_empty_report() {
        let report = ScanReport::new(ScanMode::Local, Vec::new());
        assert_eq!(render_text(&report), format!("{}\n", NO_FINDINGS));
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let mut report = ScanReport::new(ScanMode::Local, Vec::new());
        report.findings.push(Finding {
            package: "requests".to_string(),
            installed_version: "2.19.0".to_string(),
            vulnerable_range: "<=2.19.0".to_string(),
            fixed_version: Some("2.20.0".to_string()),
            identifier: Some("CVE-2018-18074".to_string()),
            summary: None,
            advisory_id: None,
        });

        let text = render_text(&report);
        assert!(text.contains("- Package: requests\n"));
        assert!(text.contains("  Installed: 2.19.0\n"));
        assert!(text.contains("  Vulnerable range: <=2.19.0\n"));
        assert!(text.contains("  Fixed in: 2.20.0\n"));
        assert!(text.contains("  CVE: CVE-2018-18074\n"));
        assert!(!text.contains("Summary:"));
        assert!(!text.contains(NO_FINDINGS));
    }

    #[test]
    fn test_warnings_follow_findings() {
        let mut report = ScanReport::new(ScanMode::Remote, Vec::new());
        report.warnings.push(ScanWarning::RemoteQuery {
            package: "idna".to_string(),
            version: "2.7".to_string(),
            reason: "query timed out after 10s".to_string(),
        });

        let text = render_text(&report);
        assert!(text.starts_with(NO_FINDINGS));
        assert!(text.contains("Warnings (1):"));
        assert!(text.contains("idna==2.7: vulnerability query failed"));
    }
}
