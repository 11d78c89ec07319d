use crate::backend::Backend;
use crate::mask;
use crate::reader;
use crate::report::ReportWriter;
use crate::types::{Check, CheckResult, Status, Summary, TestCase, TestSuite};
use anyhow::{Context, Result};
use std::io::Write;
use tracing::{debug, info};

/// Result lines emitted for every case, whether it runs or is skipped.
pub const CHECKS_PER_CASE: usize = 3;

pub const NO_FAST_REASON: &str = "fast backend not available in this build";

/// Runs one case's input expressions through `backend`.
pub fn evaluate(backend: &dyn Backend, case: &TestCase) -> Result<String> {
    let mut values = Vec::new();
    for (idx, src) in case.inputs.iter().enumerate() {
        let read = reader::parse_values(src)
            .with_context(|| format!("input #{} could not be read", idx + 1))?;
        values.extend(read);
    }
    backend.dump(&values, &case.names, &case.config)
}

/// Number of result lines a run over `suites` will emit.
pub fn plan_checks(suites: &[TestSuite], fast_available: bool) -> usize {
    suites
        .iter()
        .flat_map(|s| &s.cases)
        .map(|c| {
            let runs = if !c.requires_fast && fast_available { 2 } else { 1 };
            runs * CHECKS_PER_CASE
        })
        .sum()
}

fn fault_text(e: &anyhow::Error) -> String {
    format!("{e:#}")
}

/// Owns the test counter and the report stream for one run.
pub struct RunContext<W: Write> {
    report: ReportWriter<W>,
    counter: usize,
    mask_addresses: bool,
    summary: Summary,
}

impl<W: Write> RunContext<W> {
    /// Writes the `1..planned` header straight away.
    pub fn new(out: W, planned: usize, mask_addresses: bool) -> Result<Self> {
        let mut report = ReportWriter::new(out);
        report.plan(planned)?;
        Ok(Self {
            report,
            counter: 0,
            mask_addresses,
            summary: Summary {
                planned,
                ..Default::default()
            },
        })
    }

    pub fn counter(&self) -> usize {
        self.counter
    }

    pub fn mask_addresses(&self) -> bool {
        self.mask_addresses
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    fn emit(&mut self, mut result: CheckResult) -> Result<()> {
        self.counter += 1;
        result.ordinal = self.counter;
        self.report.result(&result)?;
        self.summary.record(result);
        Ok(())
    }

    fn check(
        &mut self,
        label: Option<&str>,
        check: Check,
        status: Status,
        expected: Option<String>,
        actual: Option<String>,
        error: Option<String>,
    ) -> Result<()> {
        let label = label.map(|l| format!("{l}{}", check.suffix()));
        self.emit(CheckResult {
            ordinal: 0,
            label,
            status,
            expected,
            actual,
            error,
            skip_reason: None,
        })
    }

    /// Golden output, parse-back and repeat checks for one case; always
    /// three result lines.
    pub fn assert_serialization_matches(
        &mut self,
        backend: &dyn Backend,
        case: &TestCase,
        label: Option<&str>,
    ) -> Result<()> {
        let masking = self.mask_addresses && mask::wants_masking(&case.expect);
        let normalize = |s: &str| -> String {
            if masking {
                mask::mask_addresses(s).into_owned()
            } else {
                s.to_string()
            }
        };
        let expected = normalize(&case.expect);

        let first = evaluate(backend, case);
        self.golden(label, Check::Output, &first, &expected, &normalize)?;

        match &first {
            Ok(text) => match reader::parse_dump(text) {
                Ok(_) => self.check(label, Check::ParseBack, Status::Pass, None, None, None)?,
                Err(e) => {
                    debug!(error = %e, "dump output does not read back");
                    self.check(
                        label,
                        Check::ParseBack,
                        Status::Fail,
                        None,
                        Some(text.clone()),
                        Some(format!("output does not read back: {e}")),
                    )?
                }
            },
            Err(e) => self.check(
                label,
                Check::ParseBack,
                Status::Fail,
                None,
                None,
                Some(format!("no output to read back: {}", fault_text(e))),
            )?,
        }

        let again = evaluate(backend, case);
        self.golden(label, Check::Repeat, &again, &expected, &normalize)
    }

    fn golden(
        &mut self,
        label: Option<&str>,
        check: Check,
        produced: &Result<String>,
        expected: &str,
        normalize: &dyn Fn(&str) -> String,
    ) -> Result<()> {
        match produced {
            Ok(text) => {
                let actual = normalize(text);
                if actual == expected {
                    self.check(label, check, Status::Pass, None, None, None)
                } else {
                    self.check(
                        label,
                        check,
                        Status::Fail,
                        Some(expected.to_string()),
                        Some(actual),
                        None,
                    )
                }
            }
            Err(e) => {
                debug!(error = %fault_text(e), "evaluation fault");
                self.check(
                    label,
                    check,
                    Status::Fail,
                    Some(expected.to_string()),
                    None,
                    Some(fault_text(e)),
                )
            }
        }
    }

    /// Three skip lines for a case that cannot run here.
    pub fn skip_serialization_check(&mut self, reason: &str) -> Result<()> {
        for _ in Check::ALL {
            self.emit(CheckResult {
                ordinal: 0,
                label: None,
                status: Status::Skip,
                expected: None,
                actual: None,
                error: None,
                skip_reason: Some(reason.to_string()),
            })?;
        }
        Ok(())
    }

    /// Every case on `reference`, then again on `fast` when there is one.
    /// Cases that require the fast backend run only there, or are skipped.
    pub fn run_suite(
        &mut self,
        reference: &dyn Backend,
        fast: Option<&dyn Backend>,
        suite: &TestSuite,
    ) -> Result<()> {
        info!(
            suite = %suite.name,
            cases = suite.cases.len(),
            backend = reference.name(),
            "running suite"
        );
        for case in &suite.cases {
            let label = case.label.as_deref();
            let fast_label = match label {
                Some(l) => format!("{l} [fast]"),
                None => "[fast]".to_string(),
            };
            if case.requires_fast {
                match fast {
                    Some(f) => self.assert_serialization_matches(f, case, Some(&fast_label))?,
                    None => self.skip_serialization_check(NO_FAST_REASON)?,
                }
                continue;
            }
            self.assert_serialization_matches(reference, case, label)?;
            if let Some(f) = fast {
                self.assert_serialization_matches(f, case, Some(&fast_label))?;
            }
        }
        Ok(())
    }

    pub fn run_suites(
        &mut self,
        reference: &dyn Backend,
        fast: Option<&dyn Backend>,
        suites: &[TestSuite],
    ) -> Result<()> {
        for suite in suites {
            self.run_suite(reference, fast, suite)?;
        }
        Ok(())
    }

    /// Closes the report; notes a plan mismatch in the stream.
    pub fn finish(mut self) -> Result<(Summary, W)> {
        if !self.summary.well_formed() {
            self.report.diag(&format!(
                "Looks like you planned {} checks but ran {}.",
                self.summary.planned, self.summary.total
            ))?;
        }
        Ok((self.summary, self.report.into_inner()))
    }
}
