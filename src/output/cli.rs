use super::text::NO_FINDINGS;
use crate::model::{ScanMode, ScanReport, ScanWarning};
use anyhow::Result;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct DependencyRow {
    #[tabled(rename = "Package")]
    name: String,
    #[tabled(rename = "Version")]
    version: String,
}

#[derive(Tabled)]
struct FindingRow {
    #[tabled(rename = "Package")]
    package: String,
    #[tabled(rename = "Installed")]
    installed: String,
    #[tabled(rename = "Vulnerable Range")]
    range: String,
    #[tabled(rename = "Fixed In")]
    fixed_in: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Summary")]
    summary: String,
}

pub fn print_cli_table(report: &ScanReport) -> Result<()> {
    println!();
    println!(
        "Scan completed at: {}",
        report.scan_time.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();

    if report.dependencies.is_empty() {
        println!("No dependencies resolved.");
    } else {
        println!("Resolved {} dependencies:", report.dependencies.len());
        println!();

        let rows: Vec<DependencyRow> = report
            .dependencies
            .iter()
            .map(|d| DependencyRow {
                name: truncate(&d.name, 40),
                version: d.version.to_string(),
            })
            .collect();

        let table = Table::new(rows).with(Style::rounded()).to_string();
        println!("{}", table);
    }

    println!();
    if report.findings.is_empty() {
        println!("{}", NO_FINDINGS);
    } else {
        println!("Found {} vulnerabilities:", report.findings.len());
        println!();

        let rows: Vec<FindingRow> = report
            .findings
            .iter()
            .map(|f| FindingRow {
                package: f.package.clone(),
                installed: f.installed_version.clone(),
                range: truncate(&f.vulnerable_range, 30),
                fixed_in: f.fixed_version.clone().unwrap_or_else(|| "-".to_string()),
                id: f.display_id().unwrap_or("-").to_string(),
                summary: truncate(f.summary.as_deref().unwrap_or("-"), 50),
            })
            .collect();

        let table = Table::new(rows).with(Style::rounded()).to_string();
        println!("{}", table);
    }

    if !report.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for w in &report.warnings {
            println!("  \x1b[33m!\x1b[0m {}", w);
        }
    }

    println!();
    print_summary(report);

    Ok(())
}

fn print_summary(report: &ScanReport) {
    let vulnerable_packages = {
        let mut names: Vec<&str> = report.findings.iter().map(|f| f.package.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names.len()
    };
    let fixable = report
        .findings
        .iter()
        .filter(|f| f.fixed_version.is_some())
        .count();
    let unchecked = report
        .warnings
        .iter()
        .filter(|w| {
            matches!(
                w,
                ScanWarning::RemoteQuery { .. }
                    | ScanWarning::UnsupportedRange { .. }
                    | ScanWarning::NotInstalled { .. }
            )
        })
        .count();

    println!("Summary:");
    println!(
        "  Mode: {}",
        match report.mode {
            ScanMode::Local => "local database",
            ScanMode::Remote => "remote feed",
        }
    );
    println!("  Dependencies scanned: {}", report.dependencies.len());
    println!(
        "  Vulnerabilities: {} in {} packages ({} with a fix available)",
        report.findings.len(),
        vulnerable_packages,
        fixable
    );
    if unchecked > 0 {
        println!("  Not fully checked: {}", unchecked);
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
