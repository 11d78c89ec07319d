use crate::config::DumpConfig;
use crate::quote;
use crate::value::Value;
use anyhow::{Context, Result, anyhow, bail};
use std::io::{self, Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::debug;
use wait_timeout::ChildExt;

/// 30 seconds per external dump
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Placeholder printed for code references.
pub const CODE_PLACEHOLDER: &str = "sub { \"DUMMY\" }";

/// A serializer turning values into dump text.
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;
    fn dump(&self, values: &[Value], names: &[String], cfg: &DumpConfig) -> Result<String>;
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// `$name` for the value at `idx`: an explicit name, or `$VAR<n>`.
pub fn var_name(idx: usize, names: &[String], cfg: &DumpConfig) -> String {
    match names.get(idx).map(|n| n.trim()).filter(|n| !n.is_empty()) {
        Some(n) if n.starts_with('$') => n.to_string(),
        Some(n) => format!("${}", n.trim_start_matches('*')),
        None => format!("${}{}", cfg.varname, idx + 1),
    }
}

/// A blessed value's own body; blessing twice keeps the outer class.
pub(crate) fn bless_body(mut v: &Value) -> &Value {
    while let Value::Blessed { inner, .. } = v {
        v = inner;
    }
    v
}

/// Reference implementation: every node renders to its own string.
#[derive(Debug, Clone, Copy, Default)]
pub struct PureBackend;

impl Backend for PureBackend {
    fn name(&self) -> &str {
        "pure"
    }

    fn dump(&self, values: &[Value], names: &[String], cfg: &DumpConfig) -> Result<String> {
        cfg.validate()?;
        cfg.check_recursion(values)?;
        let mut out = String::new();
        for (idx, val) in values.iter().enumerate() {
            let name = var_name(idx, names, cfg);
            let apad = if cfg.indent >= 2 && !cfg.terse {
                " ".repeat(name.chars().count() + 3)
            } else {
                String::new()
            };
            let mut valstr = PureDump { cfg }.node(val, 0, &apad);
            if !cfg.terse {
                valstr = format!("{name} = {valstr};");
            }
            out.push_str(&cfg.pad);
            out.push_str(&valstr);
            out.push_str(cfg.sep());
        }
        Ok(out)
    }
}

struct PureDump<'a> {
    cfg: &'a DumpConfig,
}

impl PureDump<'_> {
    fn node(&self, val: &Value, level: usize, apad: &str) -> String {
        let cfg = self.cfg;
        if !val.is_ref() {
            return match val {
                Value::Scalar(s) => quote::scalar(s, cfg.useqq),
                _ => "undef".to_string(),
            };
        }
        let level = level + 1;
        if cfg.maxdepth > 0 && level > cfg.maxdepth {
            return format!("'{}'", val.stringify_ref().unwrap_or_default());
        }

        let (class, body, apad) = match val {
            Value::Blessed { class, .. } => {
                let apad = if cfg.indent >= 2 {
                    format!("{apad}       ")
                } else {
                    apad.to_string()
                };
                (Some(class), bless_body(val), apad)
            }
            _ => (None, val, apad.to_string()),
        };

        let pad = format!("{}{}{}", cfg.sep(), cfg.pad, apad);
        let ipad = cfg.xpad().repeat(level);
        let closing = format!("{pad}{}", cfg.xpad().repeat(level - 1));
        let trailing = if cfg.trailingcomma && cfg.indent >= 1 { "," } else { "" };

        let out = match body {
            Value::Array(items) if items.is_empty() => "[]".to_string(),
            Value::Array(items) => {
                let elems: Vec<String> = items
                    .iter()
                    .map(|item| format!("{pad}{ipad}{}", self.node(item, level, &apad)))
                    .collect();
                format!("[{}{trailing}{closing}]", elems.join(","))
            }
            Value::Hash(map) if map.is_empty() => "{}".to_string(),
            Value::Hash(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                if cfg.sortkeys {
                    keys.sort();
                }
                let elems: Vec<String> = keys
                    .into_iter()
                    .map(|k| {
                        let nk = format!("{}{}", quote::key(k, cfg.quotekeys, cfg.useqq), cfg.pair);
                        let child_apad = if cfg.indent >= 2 {
                            format!("{apad}{}", " ".repeat(nk.chars().count()))
                        } else {
                            apad.clone()
                        };
                        format!("{pad}{ipad}{nk}{}", self.node(&map[k], level, &child_apad))
                    })
                    .collect();
                format!("{{{}{trailing}{closing}}}", elems.join(","))
            }
            Value::Ref(inner) => format!("\\{}", self.node(inner, level, &apad)),
            Value::Code => CODE_PLACEHOLDER.to_string(),
            Value::Scalar(s) => quote::scalar(s, cfg.useqq),
            Value::Undef | Value::Blessed { .. } => "undef".to_string(),
        };

        match class {
            Some(class) => format!("bless( {out}, {} )", quote::single_quote(class)),
            None => out,
        }
    }
}

/// Delegates dumping to an external program, e.g. `perl` running
/// `scripts/perl-dumper.pl`.
///
/// Values go to stdin one per line, written as terse one-line literals.
/// Options go in `DUMPCHECK_*` environment variables, with the variable
/// names in `DUMPCHECK_NAMES` one per line. Stdout is the dump.
#[derive(Debug, Clone)]
pub struct ExternalBackend {
    pub cmd: String,
    pub args: Vec<String>,
    pub timeout: Option<Duration>,
    pub quiet: bool, // discard the program's stderr when true
}

impl ExternalBackend {
    fn source_lines(values: &[Value]) -> Result<String> {
        let literal = DumpConfig {
            indent: 0,
            terse: true,
            useqq: true,
            maxrecurse: 0,
            ..DumpConfig::default()
        };
        let mut src = String::new();
        for v in values {
            src.push_str(&PureBackend.dump(std::slice::from_ref(v), &[], &literal)?);
            src.push('\n');
        }
        Ok(src)
    }

    fn env(cfg: &DumpConfig, names: &[String]) -> Vec<(&'static str, String)> {
        let flag = |b: bool| String::from(if b { "1" } else { "0" });
        vec![
            ("DUMPCHECK_INDENT", cfg.indent.to_string()),
            ("DUMPCHECK_TERSE", flag(cfg.terse)),
            ("DUMPCHECK_USEQQ", flag(cfg.useqq)),
            ("DUMPCHECK_SORTKEYS", flag(cfg.sortkeys)),
            ("DUMPCHECK_QUOTEKEYS", flag(cfg.quotekeys)),
            ("DUMPCHECK_PAIR", cfg.pair.clone()),
            ("DUMPCHECK_VARNAME", cfg.varname.clone()),
            ("DUMPCHECK_TRAILINGCOMMA", flag(cfg.trailingcomma)),
            ("DUMPCHECK_MAXDEPTH", cfg.maxdepth.to_string()),
            ("DUMPCHECK_MAXRECURSE", cfg.maxrecurse.to_string()),
            ("DUMPCHECK_PAD", cfg.pad.clone()),
            // one per line; an empty line keeps the default `$VARn` name
            ("DUMPCHECK_NAMES", names.join("\n")),
        ]
    }
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

impl Backend for ExternalBackend {
    fn name(&self) -> &str {
        "external"
    }

    fn dump(&self, values: &[Value], names: &[String], cfg: &DumpConfig) -> Result<String> {
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let src = Self::source_lines(values)?;
        debug!(cmd = %self.cmd, values = values.len(), "running external dumper");

        let mut child = Command::new(&self.cmd)
            .args(&self.args)
            .envs(Self::env(cfg, names))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(if self.quiet {
                Stdio::null()
            } else {
                Stdio::inherit()
            })
            .spawn()
            .with_context(|| format!("Failed to start '{}'", self.cmd))?;

        // Both pipes are serviced on their own threads so a program that
        // writes before it has read all its input cannot stall the run.
        let (Some(mut stdin), Some(mut stdout)) = (child.stdin.take(), child.stdout.take())
        else {
            reap(&mut child);
            bail!("'{}' started without piped stdio", self.cmd);
        };
        let reader = thread::spawn(move || {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).map(|_| buf)
        });
        let writer = thread::spawn(move || stdin.write_all(src.as_bytes()));

        let status = match child.wait_timeout(timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                reap(&mut child);
                bail!("'{}' timed out after {:?}", self.cmd, timeout);
            }
            Err(e) => {
                reap(&mut child);
                return Err(e).with_context(|| format!("Failed to wait for '{}'", self.cmd));
            }
        };

        match writer.join() {
            Ok(Ok(())) => {}
            // the program may exit without reading everything
            Ok(Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => return Err(e).context("Failed to write dumper input"),
            Err(_) => bail!("stdin writer panicked"),
        }
        if !status.success() {
            bail!("'{}' failed with status {}", self.cmd, status);
        }

        let bytes = reader
            .join()
            .map_err(|_| anyhow!("stdout reader panicked"))?
            .context("Failed to read dumper output")?;
        String::from_utf8(bytes).context("Dumper output is not valid UTF-8")
    }

    fn validate(&self) -> Result<()> {
        which::which(&self.cmd).map(|_| ()).map_err(|e| {
            anyhow!(
                "Dumper command '{}' not found or not executable ({e}). Check that it is installed and in PATH.",
                self.cmd
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::parse_values;
    use pretty_assertions::assert_eq;

    fn dump_with(src: &str, cfg: &DumpConfig) -> String {
        let values = parse_values(src).unwrap();
        PureBackend.dump(&values, &[], cfg).unwrap()
    }

    fn dump(src: &str) -> String {
        dump_with(src, &DumpConfig::default())
    }

    #[test]
    fn string_with_embedded_newline() {
        assert_eq!(dump(r#""42\n""#), "$VAR1 = '42\n';\n");
    }

    #[test]
    fn indent_two_aligns_under_the_opening_bracket() {
        let expected = "\
$VAR1 = {
          'a' => 1,
          'b' => [
                   1,
                   'x'
                 ],
          'c' => {}
        };
";
        assert_eq!(dump("{ a => 1, b => [1, 'x'], c => {} }"), expected);
    }

    #[test]
    fn indent_one_uses_fixed_steps() {
        let cfg = DumpConfig {
            indent: 1,
            ..Default::default()
        };
        let expected = "\
$VAR1 = {
  'a' => [
    1,
    2
  ]
};
";
        assert_eq!(dump_with("{ a => [1, 2] }", &cfg), expected);
    }

    #[test]
    fn indent_zero_is_a_single_line() {
        let cfg = DumpConfig {
            indent: 0,
            ..Default::default()
        };
        assert_eq!(
            dump_with("{ a => [1, undef], b => \\'x' }", &cfg),
            "$VAR1 = {'a' => [1,undef],'b' => \\'x'};"
        );
    }

    #[test]
    fn bless_and_ref_to_ref() {
        let expected = "\
$VAR1 = bless( {
                 'k' => sub { \"DUMMY\" }
               }, 'Foo::Bar' );
$VAR2 = \\[
            1
          ];
";
        assert_eq!(
            dump("bless( { k => sub { 1 } }, 'Foo::Bar' ), \\[1]"),
            expected
        );
    }

    #[test]
    fn terse_sortkeys_and_names() {
        let cfg = DumpConfig {
            terse: true,
            sortkeys: true,
            indent: 1,
            ..Default::default()
        };
        assert_eq!(dump_with("{ b => 2, a => 1 }", &cfg), "{\n  'a' => 1,\n  'b' => 2\n}\n");

        let values = parse_values("1, 2").unwrap();
        let names = vec!["foo".to_string(), String::new()];
        let out = PureBackend
            .dump(&values, &names, &DumpConfig::default())
            .unwrap();
        assert_eq!(out, "$foo = 1;\n$VAR2 = 2;\n");
    }

    #[test]
    fn maxdepth_prints_addresses() {
        let cfg = DumpConfig {
            indent: 0,
            maxdepth: 1,
            ..Default::default()
        };
        let out = dump_with("[ { a => 1 }, bless([], 'Foo') ]", &cfg);
        assert!(out.starts_with("$VAR1 = ['HASH(0x"), "{out}");
        assert!(out.contains(",'Foo=ARRAY(0x"), "{out}");
    }

    #[test]
    fn trailing_comma_and_useqq_keys() {
        let cfg = DumpConfig {
            indent: 1,
            useqq: true,
            quotekeys: false,
            trailingcomma: true,
            ..Default::default()
        };
        assert_eq!(
            dump_with("{ plain => \"t\\tab\", 'two words' => 1 }", &cfg),
            "$VAR1 = {\n  plain => \"t\\tab\",\n  \"two words\" => 1,\n};\n"
        );
    }

    #[test]
    fn rejects_invalid_config() {
        let cfg = DumpConfig {
            indent: 7,
            ..Default::default()
        };
        assert!(PureBackend.dump(&[Value::Undef], &[], &cfg).is_err());
    }

    #[test]
    fn external_backend_sends_one_literal_per_line() {
        let values = parse_values("\"a\\nb\", [1, { k => undef }]").unwrap();
        let src = ExternalBackend::source_lines(&values).unwrap();
        assert_eq!(src, "\"a\\nb\"\n[1,{'k' => undef}]\n");
    }

    #[test]
    fn external_backend_keeps_name_positions() {
        let names = vec![String::new(), "second".into(), "a,b".into()];
        let env = ExternalBackend::env(&DumpConfig::default(), &names);
        let sent = env
            .iter()
            .find(|(k, _)| *k == "DUMPCHECK_NAMES")
            .map(|(_, v)| v.as_str());
        assert_eq!(sent, Some("\nsecond\na,b"));
    }

    #[cfg(unix)]
    #[test]
    fn external_backend_returns_program_stdout() {
        let backend = ExternalBackend {
            cmd: "cat".into(),
            args: vec![],
            timeout: Some(Duration::from_secs(5)),
            quiet: true,
        };
        backend.validate().unwrap();
        let values = parse_values("'x'").unwrap();
        let out = backend.dump(&values, &[], &DumpConfig::default()).unwrap();
        assert_eq!(out, "\"x\"\n");
    }

    #[test]
    fn external_backend_validate_reports_missing_command() {
        let backend = ExternalBackend {
            cmd: "dumpcheck-no-such-command".into(),
            args: vec![],
            timeout: None,
            quiet: true,
        };
        assert!(backend.validate().is_err());
    }
}
