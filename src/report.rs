use crate::types::{CheckResult, Status, Summary};
use anyhow::Result;
use colored::Colorize;
use std::io::Write;

/// Streams the numbered report: `1..N`, then one line per check.
pub struct ReportWriter<W: Write> {
    out: W,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn plan(&mut self, count: usize) -> Result<()> {
        writeln!(self.out, "1..{count}")?;
        self.out.flush()?;
        Ok(())
    }

    pub fn result(&mut self, r: &CheckResult) -> Result<()> {
        self.out.write_all(format_result(r).as_bytes())?;
        self.out.flush()?;
        Ok(())
    }

    /// Free-form diagnostic, every line prefixed with `# `.
    pub fn diag(&mut self, msg: &str) -> Result<()> {
        for line in msg.lines() {
            writeln!(self.out, "# {line}")?;
        }
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Keeps a label on its own line; `#` is escaped so it cannot read as a
/// directive.
fn escape_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        match c {
            '\n' | '\r' => out.push(' '),
            '#' => out.push_str("\\#"),
            c => out.push(c),
        }
    }
    out
}

/// One result line, plus the diagnostic block for failures.
pub fn format_result(r: &CheckResult) -> String {
    let label = r
        .label
        .as_deref()
        .map(|l| format!(" {}", escape_label(l)))
        .unwrap_or_default();
    match r.status {
        Status::Pass => format!("ok {}{label}\n", r.ordinal),
        Status::Skip => format!(
            "ok {} # skip {}\n",
            r.ordinal,
            r.skip_reason.as_deref().unwrap_or_default().replace(['\n', '\r'], " ")
        ),
        Status::Fail => {
            let mut out = format!("not ok {}{label}\n", r.ordinal);
            if let Some(exp) = &r.expected {
                out.push_str(&format!("#   expected: {exp:?}\n"));
            }
            if let Some(act) = &r.actual {
                out.push_str(&format!("#        got: {act:?}\n"));
            }
            if let Some(err) = &r.error {
                for (i, line) in err.lines().enumerate() {
                    let head = if i == 0 { "error:" } else { "" };
                    out.push_str(&format!("#   {head:>9} {line}\n"));
                }
            }
            out
        }
    }
}

pub fn render_human(summary: &Summary, verbose: bool) -> String {
    let mut out = String::new();
    let header = format!(
        "Total: {}, Passed: {}, Failed: {}, Skipped: {}",
        summary.total,
        summary.passed.to_string().green(),
        if summary.failed > 0 {
            summary.failed.to_string().red().bold().to_string()
        } else {
            summary.failed.to_string().green().to_string()
        },
        summary.skipped.to_string().yellow()
    );
    out.push_str(&header);
    out.push('\n');
    for c in &summary.checks {
        let name = format!("#{} {}", c.ordinal, c.label.as_deref().unwrap_or_default());
        match c.status {
            Status::Pass if verbose => {
                out.push_str(&format!("{} {}\n", "[OK]".green().bold(), name.green()));
            }
            Status::Skip if verbose => {
                out.push_str(&format!(
                    "{} {} ({})\n",
                    "[SKIP]".yellow().bold(),
                    name,
                    c.skip_reason.as_deref().unwrap_or_default()
                ));
            }
            Status::Fail => {
                out.push_str(&format!("{} {}\n", "[FAIL]".red().bold(), name.red().bold()));
                if let Some(err) = &c.error {
                    out.push_str(&format!("  {} {}\n", "error   :".bold(), err.red()));
                }
                if let Some(exp) = &c.expected {
                    out.push_str(&format!("  {} {:?}\n", "expected:".bold(), exp));
                }
                if let Some(act) = &c.actual {
                    out.push_str(&format!("  {} {:?}\n", "actual  :".bold(), act));
                }
            }
            _ => {}
        }
    }
    if !summary.well_formed() {
        out.push_str(&format!(
            "{}\n",
            format!(
                "Planned {} checks but ran {}",
                summary.planned, summary.total
            )
            .red()
            .bold()
        ));
    }
    out
}

pub fn print_human(summary: &Summary, verbose: bool) {
    eprint!("{}", render_human(summary, verbose));
}
