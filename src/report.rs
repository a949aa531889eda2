// src/report.rs
//! Final adoption report, as text or JSON

use colored::Colorize;
use serde::Serialize;
use std::io::{self, Write};

use crate::scanner::ScanRun;
use crate::stats::StatsSnapshot;
use crate::types::{CertificateSummary, OutcomeKind};

/// Row order of the name outcomes in the text report
const OUTCOME_ROWS: [OutcomeKind; 10] = [
    OutcomeKind::Skipped,
    OutcomeKind::Unavailable,
    OutcomeKind::TlsError,
    OutcomeKind::IncompleteChain,
    OutcomeKind::ExpiredCert,
    OutcomeKind::SelfSignedCert,
    OutcomeKind::WrongCert,
    OutcomeKind::MiscInvalidCert,
    OutcomeKind::CertNotPresented,
    OutcomeKind::Valid,
];

/// Report format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Human-readable text (default)
    Text,
    /// One pretty-printed JSON document
    Json,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    stats: &'a StatsSnapshot,
    elapsed_secs: f64,
    cancelled: bool,
}

/// `n` as a percentage of `total`; 0 when `total` is 0
pub fn percent(n: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    n as f64 / total as f64 * 100.0
}

fn outcome_description(kind: OutcomeKind) -> &'static str {
    match kind {
        OutcomeKind::Skipped => "names skipped",
        OutcomeKind::Unavailable => "names couldn't be connected to",
        OutcomeKind::TlsError => "names threw a TLS handshake error",
        OutcomeKind::IncompleteChain => "names sent an incomplete chain",
        OutcomeKind::ExpiredCert => "names used an expired certificate",
        OutcomeKind::SelfSignedCert => "names used a self signed certificate",
        OutcomeKind::WrongCert => "names used a certificate for names that didn't match",
        OutcomeKind::MiscInvalidCert => "names used an invalid certificate (misc. reasons)",
        OutcomeKind::CertNotPresented => "names didn't use their certificate",
        OutcomeKind::Valid => "names used their certificate",
    }
}

fn summary_description(summary: CertificateSummary) -> &'static str {
    match summary {
        CertificateSummary::Unused => "certificates were used by none of their names",
        CertificateSummary::PartiallyUsed => "certificates were used by some of their names",
        CertificateSummary::FullyUsed => "certificates were used by all of their names",
    }
}

/// Prints the final statistics once the scan is over
pub struct ReportPrinter {
    format: ReportFormat,
    use_colors: bool,
}

impl ReportPrinter {
    /// Printer for stdout; colours only when stdout is a terminal
    pub fn new(format: ReportFormat) -> Self {
        Self {
            format,
            use_colors: is_terminal::is_terminal(std::io::stdout()),
        }
    }

    /// Printer that never emits colour codes
    pub fn plain(format: ReportFormat) -> Self {
        Self {
            format,
            use_colors: false,
        }
    }

    pub fn print(&self, snapshot: &StatsSnapshot, run: &ScanRun) -> anyhow::Result<()> {
        let stdout = io::stdout();
        let mut writer = stdout.lock();
        self.write_report(&mut writer, snapshot, run)?;
        writer.flush()?;
        Ok(())
    }

    pub fn write_report<W: Write>(
        &self,
        writer: &mut W,
        snapshot: &StatsSnapshot,
        run: &ScanRun,
    ) -> anyhow::Result<()> {
        match self.format {
            ReportFormat::Json => {
                let report = JsonReport {
                    stats: snapshot,
                    elapsed_secs: run.elapsed.as_secs_f64(),
                    cancelled: run.cancelled,
                };
                serde_json::to_writer_pretty(&mut *writer, &report)?;
                writeln!(writer)?;
            }
            ReportFormat::Text => self.write_text(writer, snapshot, run)?,
        }
        Ok(())
    }

    fn write_text<W: Write>(
        &self,
        writer: &mut W,
        snapshot: &StatsSnapshot,
        run: &ScanRun,
    ) -> io::Result<()> {
        let heading = "# adoption statistics";
        if self.use_colors {
            writeln!(writer, "{}", heading.bold())?;
        } else {
            writeln!(writer, "{}", heading)?;
        }

        if run.cancelled {
            let notice = "(scan interrupted, partial results)";
            if self.use_colors {
                writeln!(writer, "{}", notice.yellow())?;
            } else {
                writeln!(writer, "{}", notice)?;
            }
        }

        let names = snapshot.processed_names;
        let certs = snapshot.processed_certificates;

        writeln!(
            writer,
            "{} certificates checked (totalling {} DNS names)",
            certs, names
        )?;
        writeln!(writer)?;

        for kind in OUTCOME_ROWS {
            let count = snapshot.outcome(kind);
            writeln!(
                writer,
                "{} ({:.2}%) {}",
                count,
                percent(count, names),
                outcome_description(kind)
            )?;
        }
        writeln!(writer)?;

        writeln!(
            writer,
            "{} ({:.2}%) names had a stapled OCSP response",
            snapshot.ocsp_stapled,
            percent(snapshot.ocsp_stapled, names)
        )?;
        writeln!(
            writer,
            "{} ({:.2}%) names served SCT receipts",
            snapshot.sct_present,
            percent(snapshot.sct_present, names)
        )?;
        writeln!(writer)?;

        for summary in CertificateSummary::ALL {
            let count = snapshot.summary(summary);
            writeln!(
                writer,
                "{} ({:.2}%) {}",
                count,
                percent(count, certs),
                summary_description(summary)
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::RunStatistics;
    use crate::types::ProbeOutcome;
    use std::time::Duration;

    fn sample_snapshot() -> StatsSnapshot {
        let stats = RunStatistics::new();
        let outcomes = [
            [
                ProbeOutcome::Valid {
                    ocsp_stapled: true,
                    sct_present: false,
                },
                ProbeOutcome::Unavailable,
            ],
            [ProbeOutcome::Skipped, ProbeOutcome::WrongCert],
        ];
        for cert in &outcomes {
            for _ in cert {
                stats.name_probed();
            }
            stats.record(cert);
        }
        stats.snapshot()
    }

    fn finished() -> ScanRun {
        ScanRun {
            cancelled: false,
            elapsed: Duration::from_millis(1500),
        }
    }

    fn render(printer: &ReportPrinter, snapshot: &StatsSnapshot, run: &ScanRun) -> String {
        let mut buf = Vec::new();
        printer.write_report(&mut buf, snapshot, run).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(0, 0), 0.0);
        assert_eq!(percent(5, 0), 0.0);
        assert_eq!(percent(1, 4), 25.0);
        assert_eq!(percent(3, 3), 100.0);
    }

    #[test]
    fn test_text_report() {
        let printer = ReportPrinter::plain(ReportFormat::Text);
        let text = render(&printer, &sample_snapshot(), &finished());

        assert!(text.starts_with("# adoption statistics\n"));
        assert!(text.contains("2 certificates checked (totalling 4 DNS names)"));
        assert!(text.contains("1 (25.00%) names skipped"));
        assert!(text.contains("1 (25.00%) names couldn't be connected to"));
        assert!(text.contains("1 (25.00%) names used a certificate for names that didn't match"));
        assert!(text.contains("0 (0.00%) names threw a TLS handshake error"));
        assert!(text.contains("1 (25.00%) names had a stapled OCSP response"));
        assert!(text.contains("0 (0.00%) names served SCT receipts"));
        assert!(text.contains("1 (50.00%) certificates were used by none of their names"));
        assert!(text.contains("1 (50.00%) certificates were used by some of their names"));
        assert!(text.contains("0 (0.00%) certificates were used by all of their names"));
        assert!(!text.contains("interrupted"));
        // No escape codes from the plain printer
        assert!(!text.contains('\u{1b}'));
    }

    #[test]
    fn test_text_report_empty_run() {
        let printer = ReportPrinter::plain(ReportFormat::Text);
        let run = ScanRun {
            cancelled: true,
            elapsed: Duration::ZERO,
        };
        let text = render(&printer, &RunStatistics::new().snapshot(), &run);

        assert!(text.contains("(scan interrupted, partial results)"));
        assert!(text.contains("0 certificates checked (totalling 0 DNS names)"));
        assert!(text.contains("0 (0.00%) names skipped"));
        assert!(text.contains("0 (0.00%) certificates were used by all of their names"));
        assert!(!text.contains("NaN"));
    }

    #[test]
    fn test_json_report() {
        let printer = ReportPrinter::plain(ReportFormat::Json);
        let json = render(&printer, &sample_snapshot(), &finished());
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["processed_certificates"], 2);
        assert_eq!(value["processed_names"], 4);
        assert_eq!(value["names"]["valid"], 1);
        assert_eq!(value["names"]["wrong_cert"], 1);
        assert_eq!(value["certificates"]["partially_used"], 1);
        assert_eq!(value["ocsp_stapled"], 1);
        assert_eq!(value["cancelled"], false);
        assert_eq!(value["elapsed_secs"], 1.5);
    }
}
