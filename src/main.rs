use anyhow::Result;
use clap::{Parser, ValueEnum};
use colored::control::set_override as set_color_override;
use dumpcheck::backend::{Backend, DEFAULT_TIMEOUT, ExternalBackend, PureBackend};
use dumpcheck::engine::{RunContext, plan_checks};
use dumpcheck::fast;
use dumpcheck::report::print_human;
use dumpcheck::suite::{BackendChoice, ExternalCfg, SuiteWithConfig, load_suites};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum BackendOpt {
    Pure,
    External,
}

impl From<BackendOpt> for BackendChoice {
    fn from(v: BackendOpt) -> Self {
        match v {
            BackendOpt::Pure => BackendChoice::Pure,
            BackendOpt::External => BackendChoice::External,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    version,
    about = "Golden-output checks for Data::Dumper-style serializers"
)]
struct Cli {
    /// YAML files or directories with test cases
    #[arg(value_name = "TEST_PATHS", required = true)]
    tests: Vec<PathBuf>,

    /// Reference backend; overrides Config.Backend in every file
    #[arg(long, value_enum)]
    backend: Option<BackendOpt>,

    /// Command for the external backend; overrides Config.External.Cmd
    #[arg(long = "external-cmd", value_name = "CMD")]
    external_cmd: Option<String>,

    /// Run as if the fast backend had not been built
    #[arg(long = "no-fast")]
    no_fast: bool,

    /// Compare addresses literally even where the expected text uses 0xdeadbeef
    #[arg(long = "no-mask-addresses")]
    no_mask_addresses: bool,

    /// Group number (1..N) or group name; 0 or "list" lists groups
    #[arg(short = 't', long = "test", value_name = "TEST")]
    test: Option<String>,

    /// No human summary on stderr
    #[arg(short = 'q', long = "silent")]
    silent: bool,

    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    #[arg(long = "no-color")]
    no_color: bool,
}

// Groups in encounter order across all suites
#[derive(Clone)]
struct GroupRef {
    suite_idx: usize,
    group: String,
}

fn list_groups(groups: &[GroupRef], suites: &[SuiteWithConfig]) -> String {
    let mut out = String::from("Available groups:\n");
    for (idx, g) in groups.iter().enumerate() {
        out.push_str(&format!(
            "  {:>3}. {} ({})\n",
            idx + 1,
            g.group,
            suites[g.suite_idx].suite.name
        ));
    }
    out
}

/// Narrows `suites` to the groups picked by `-t`; `Ok(false)` means
/// the groups were listed and nothing should run.
fn select_groups(suites: &mut Vec<SuiteWithConfig>, sel: &str) -> Result<bool> {
    let mut groups: Vec<GroupRef> = Vec::new();
    for (si, swc) in suites.iter().enumerate() {
        let mut seen: HashSet<&str> = HashSet::new();
        for c in &swc.suite.cases {
            if seen.insert(&c.group) {
                groups.push(GroupRef {
                    suite_idx: si,
                    group: c.group.clone(),
                });
            }
        }
    }
    if groups.is_empty() {
        error!("No test cases found");
        std::process::exit(2);
    }

    let trimmed = sel.trim();
    if trimmed == "0" || trimmed.eq_ignore_ascii_case("list") {
        print!("{}", list_groups(&groups, suites));
        return Ok(false);
    }

    let selected: Vec<GroupRef> = match trimmed.parse::<usize>() {
        Ok(n) if n >= 1 && n <= groups.len() => vec![groups[n - 1].clone()],
        Ok(n) => {
            error!("Invalid group number {n} (valid: 1..{})", groups.len());
            eprint!("{}", list_groups(&groups, suites));
            std::process::exit(2);
        }
        Err(_) => groups.iter().filter(|g| g.group == trimmed).cloned().collect(),
    };
    if selected.is_empty() {
        error!("Group '{trimmed}' not found");
        eprint!("{}", list_groups(&groups, suites));
        std::process::exit(2);
    }

    for (si, swc) in suites.iter_mut().enumerate() {
        swc.suite
            .cases
            .retain(|c| selected.iter().any(|g| g.suite_idx == si && g.group == c.group));
    }
    suites.retain(|swc| !swc.suite.cases.is_empty());
    Ok(true)
}

fn reference_backend(swc: &SuiteWithConfig, cli: &Cli) -> Result<Box<dyn Backend>> {
    let choice = cli.backend.map(BackendChoice::from).unwrap_or(swc.backend);
    match choice {
        BackendChoice::Pure => Ok(Box::new(PureBackend)),
        BackendChoice::External => {
            let cfg = match (&cli.external_cmd, &swc.external) {
                (Some(cmd), Some(ext)) => ExternalCfg {
                    cmd: cmd.trim().to_string(),
                    ..ext.clone()
                },
                (Some(cmd), None) => ExternalCfg {
                    cmd: cmd.trim().to_string(),
                    args: vec![],
                    timeout: None,
                },
                (None, Some(ext)) => ext.clone(),
                (None, None) => anyhow::bail!(
                    "{}: external backend selected but no command configured (use --external-cmd)",
                    swc.suite.name
                ),
            };
            let backend = ExternalBackend {
                cmd: cfg.cmd,
                args: cfg.args,
                timeout: Some(cfg.timeout.map(Duration::from_secs).unwrap_or(DEFAULT_TIMEOUT)),
                quiet: cli.silent,
            };
            // fail fast on configuration errors
            backend.validate()?;
            Ok(Box::new(backend))
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        // With -v, show INFO and above, but allow RUST_LOG to override for debug/trace
        std::env::var("RUST_LOG").unwrap_or_else(|_| "dumpcheck=info".to_string())
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| "dumpcheck=warn".to_string())
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    set_color_override(!cli.no_color);

    let mut suites = match load_suites(&cli.tests) {
        Ok(s) => s,
        Err(e) => {
            error!("{e:#}");
            std::process::exit(2);
        }
    };
    suites.retain(|swc| !swc.suite.cases.is_empty());

    if let Some(sel) = &cli.test {
        if !select_groups(&mut suites, sel)? {
            return Ok(());
        }
    }

    // backends are resolved before the plan line so configuration errors never
    // leave a half-written report behind
    let mut backends = Vec::with_capacity(suites.len());
    for swc in &suites {
        match reference_backend(swc, &cli) {
            Ok(b) => backends.push(b),
            Err(e) => {
                error!("{e:#}");
                std::process::exit(2);
            }
        }
    }

    let fast_backend = if cli.no_fast { None } else { fast::backend() };
    let planned_suites: Vec<_> = suites.iter().map(|s| s.suite.clone()).collect();
    let planned = plan_checks(&planned_suites, fast_backend.is_some());
    info!(
        "{} {}: {} suites, {} checks, fast backend {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        suites.len(),
        planned,
        if fast_backend.is_some() { "on" } else { "off" }
    );

    let stdout = std::io::stdout().lock();
    let mut ctx = RunContext::new(stdout, planned, !cli.no_mask_addresses)?;
    for (swc, backend) in suites.iter().zip(&backends) {
        ctx.run_suite(backend.as_ref(), fast_backend.as_deref(), &swc.suite)?;
    }
    let (summary, _) = ctx.finish()?;

    if !cli.silent {
        print_human(&summary, cli.verbose);
    }
    info!(
        total = summary.total,
        passed = summary.passed,
        failed = summary.failed,
        skipped = summary.skipped,
        "all suites finished"
    );

    if summary.failed > 0 || !summary.well_formed() {
        std::process::exit(1);
    }
    Ok(())
}
