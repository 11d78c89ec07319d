use crate::config::DumpConfig;

#[derive(Debug, Clone)]
pub struct TestCase {
    pub group: String,
    pub label: Option<String>,
    pub inputs: Vec<String>,
    pub names: Vec<String>,
    pub expect: String,
    pub config: DumpConfig,
    pub requires_fast: bool,
}

#[derive(Debug, Clone)]
pub struct TestSuite {
    pub name: String,
    pub cases: Vec<TestCase>,
}

/// The three checks made for every case, in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    Output,
    ParseBack,
    Repeat,
}

impl Check {
    pub const ALL: [Check; 3] = [Check::Output, Check::ParseBack, Check::Repeat];

    pub fn suffix(self) -> &'static str {
        match self {
            Check::Output => "",
            Check::ParseBack => " (parse-back)",
            Check::Repeat => " (repeat)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pass,
    Fail,
    Skip,
}

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub ordinal: usize,
    pub label: Option<String>,
    pub status: Status,
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub error: Option<String>,
    pub skip_reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub planned: usize,
    pub total: usize,   // result lines emitted
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub checks: Vec<CheckResult>,
}

impl Summary {
    pub fn record(&mut self, result: CheckResult) {
        self.total += 1;
        match result.status {
            Status::Pass => self.passed += 1,
            Status::Fail => self.failed += 1,
            Status::Skip => self.skipped += 1,
        }
        self.checks.push(result);
    }

    /// The emitted line count matches the declared plan.
    pub fn well_formed(&self) -> bool {
        self.total == self.planned
    }
}
