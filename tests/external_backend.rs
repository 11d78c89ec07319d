#![cfg(unix)]

use anyhow::Result;
use dumpcheck::backend::{Backend, ExternalBackend, PureBackend};
use dumpcheck::config::DumpConfig;
use dumpcheck::reader::parse_values;
use dumpcheck::value::Value;
use std::path::PathBuf;
use std::time::{Duration, Instant};

fn external(cmd: &str, args: &[&str], timeout: Duration) -> ExternalBackend {
    ExternalBackend {
        cmd: cmd.into(),
        args: args.iter().map(|a| a.to_string()).collect(),
        timeout: Some(timeout),
        quiet: true,
    }
}

fn shell(script: &str, timeout: Duration) -> ExternalBackend {
    external("sh", &["-c", script], timeout)
}

#[test]
fn large_payload_streams_through() -> Result<()> {
    let payload = "x".repeat(400_000);
    let backend = external("cat", &[], Duration::from_secs(20));
    let out = backend.dump(&[Value::scalar(payload.clone())], &[], &DumpConfig::default())?;
    assert_eq!(out.len(), payload.len() + 3);
    assert_eq!(out, format!("\"{payload}\"\n"));
    Ok(())
}

#[test]
fn program_may_write_before_reading_its_input() -> Result<()> {
    let backend = shell("yes | head -c 200000; cat", Duration::from_secs(20));
    let payload = "z".repeat(300_000);
    let out = backend.dump(&[Value::scalar(payload)], &[], &DumpConfig::default())?;
    assert_eq!(out.len(), 200_000 + 300_000 + 3);
    assert!(out.starts_with("y\ny\n"));
    assert!(out.ends_with("zz\"\n"));
    Ok(())
}

#[test]
fn slow_program_is_killed_at_the_timeout() {
    let backend = external("sleep", &["5"], Duration::from_millis(300));
    let started = Instant::now();
    let err = backend
        .dump(&[Value::scalar("1")], &[], &DumpConfig::default())
        .unwrap_err();
    assert!(err.to_string().contains("timed out"), "{err:#}");
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn failing_program_is_an_error() {
    let backend = shell("cat >/dev/null; exit 3", Duration::from_secs(10));
    let err = backend
        .dump(&[Value::scalar("1")], &[], &DumpConfig::default())
        .unwrap_err();
    assert!(err.to_string().contains("failed with status"), "{err:#}");
}

#[test]
fn program_exiting_without_reading_keeps_its_output() -> Result<()> {
    let backend = shell("echo done", Duration::from_secs(10));
    let out = backend.dump(&[Value::scalar("y".repeat(300_000))], &[], &DumpConfig::default())?;
    assert_eq!(out, "done\n");
    Ok(())
}

#[test]
fn perl_dumper_names_match_the_pure_backend() -> Result<()> {
    if which::which("perl").is_err() {
        return Ok(());
    }
    let script = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scripts/perl-dumper.pl");
    let backend = ExternalBackend {
        cmd: "perl".into(),
        args: vec![script.to_string_lossy().into_owned()],
        timeout: Some(Duration::from_secs(20)),
        quiet: false,
    };
    let values = parse_values("1, 2, 3")?;
    let names = vec![String::new(), "second".to_string(), String::new()];
    let cfg = DumpConfig::default();

    let out = backend.dump(&values, &names, &cfg)?;
    assert_eq!(out, "$VAR1 = 1;\n$second = 2;\n$VAR3 = 3;\n");
    assert_eq!(out, PureBackend.dump(&values, &names, &cfg)?);
    Ok(())
}
