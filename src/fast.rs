//! Single-buffer serializer.
//!
//! Produces the same bytes as [`PureBackend`](crate::backend::PureBackend)
//! but streams into one output buffer and keeps the alignment pad as a
//! stack that grows and shrinks with nesting.
#![cfg_attr(not(feature = "fast"), allow(unused_imports))]

use crate::backend::{Backend, CODE_PLACEHOLDER, bless_body, var_name};
use crate::config::DumpConfig;
use crate::quote;
use crate::value::Value;
use anyhow::Result;

/// Whether this build carries the accelerated backend.
pub const AVAILABLE: bool = cfg!(feature = "fast");

/// The accelerated backend, when compiled in.
pub fn backend() -> Option<Box<dyn Backend>> {
    #[cfg(feature = "fast")]
    {
        Some(Box::new(FastBackend))
    }
    #[cfg(not(feature = "fast"))]
    {
        None
    }
}

#[cfg(feature = "fast")]
#[derive(Debug, Clone, Copy, Default)]
pub struct FastBackend;

#[cfg(feature = "fast")]
impl Backend for FastBackend {
    fn name(&self) -> &str {
        "fast"
    }

    fn dump(&self, values: &[Value], names: &[String], cfg: &DumpConfig) -> Result<String> {
        cfg.validate()?;
        cfg.check_recursion(values)?;
        let mut w = Writer {
            cfg,
            out: String::with_capacity(64 * values.len().max(1)),
            apad: String::new(),
            level: 0,
        };
        for (idx, val) in values.iter().enumerate() {
            let name = var_name(idx, names, cfg);
            w.out.push_str(&cfg.pad);
            if !cfg.terse {
                w.out.push_str(&name);
                w.out.push_str(" = ");
                if cfg.indent >= 2 {
                    w.push_apad(name.chars().count() + 3);
                }
            }
            w.value(val);
            w.apad.clear();
            if !cfg.terse {
                w.out.push(';');
            }
            w.out.push_str(cfg.sep());
        }
        Ok(w.out)
    }
}

#[cfg(feature = "fast")]
struct Writer<'a> {
    cfg: &'a DumpConfig,
    out: String,
    apad: String,
    level: usize,
}

#[cfg(feature = "fast")]
impl Writer<'_> {
    fn push_apad(&mut self, width: usize) {
        self.apad.extend(std::iter::repeat(' ').take(width));
    }

    fn newline(&mut self, level: usize) {
        self.out.push_str(self.cfg.sep());
        self.out.push_str(&self.cfg.pad);
        self.out.push_str(&self.apad);
        for _ in 0..level {
            self.out.push_str(self.cfg.xpad());
        }
    }

    fn value(&mut self, val: &Value) {
        match val {
            Value::Undef => self.out.push_str("undef"),
            Value::Scalar(s) => self.out.push_str(&quote::scalar(s, self.cfg.useqq)),
            _ => {
                self.level += 1;
                self.reference(val);
                self.level -= 1;
            }
        }
    }

    fn reference(&mut self, val: &Value) {
        if self.cfg.maxdepth > 0 && self.level > self.cfg.maxdepth {
            self.out.push('\'');
            self.out.push_str(&val.stringify_ref().unwrap_or_default());
            self.out.push('\'');
            return;
        }
        let mark = self.apad.len();
        let class = match val {
            Value::Blessed { class, .. } => {
                self.out.push_str("bless( ");
                if self.cfg.indent >= 2 {
                    self.push_apad(7);
                }
                Some(class)
            }
            _ => None,
        };

        match bless_body(val) {
            Value::Array(items) => self.array(items),
            Value::Hash(map) => self.hash(map),
            Value::Ref(inner) => {
                self.out.push('\\');
                self.value(inner);
            }
            Value::Code => self.out.push_str(CODE_PLACEHOLDER),
            Value::Scalar(s) => self.out.push_str(&quote::scalar(s, self.cfg.useqq)),
            Value::Undef | Value::Blessed { .. } => self.out.push_str("undef"),
        }

        self.apad.truncate(mark);
        if let Some(class) = class {
            self.out.push_str(", ");
            self.out.push_str(&quote::single_quote(class));
            self.out.push_str(" )");
        }
    }

    fn close(&mut self, bracket: char) {
        if self.cfg.trailingcomma && self.cfg.indent >= 1 {
            self.out.push(',');
        }
        self.newline(self.level - 1);
        self.out.push(bracket);
    }

    fn array(&mut self, items: &[Value]) {
        if items.is_empty() {
            self.out.push_str("[]");
            return;
        }
        self.out.push('[');
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.out.push(',');
            }
            self.newline(self.level);
            self.value(item);
        }
        self.close(']');
    }

    fn hash(&mut self, map: &indexmap::IndexMap<String, Value>) {
        if map.is_empty() {
            self.out.push_str("{}");
            return;
        }
        let mut entries: Vec<(&String, &Value)> = map.iter().collect();
        if self.cfg.sortkeys {
            entries.sort_by(|a, b| a.0.cmp(b.0));
        }
        self.out.push('{');
        for (i, (k, v)) in entries.into_iter().enumerate() {
            if i > 0 {
                self.out.push(',');
            }
            self.newline(self.level);
            let key = quote::key(k, self.cfg.quotekeys, self.cfg.useqq);
            self.out.push_str(&key);
            self.out.push_str(&self.cfg.pair);
            let mark = self.apad.len();
            if self.cfg.indent >= 2 {
                self.push_apad(key.chars().count() + self.cfg.pair.chars().count());
            }
            self.value(v);
            self.apad.truncate(mark);
        }
        self.close('}');
    }
}

#[cfg(all(test, feature = "fast"))]
mod tests {
    use super::*;
    use crate::backend::PureBackend;
    use crate::reader::parse_values;
    use pretty_assertions::assert_eq;

    const INPUTS: &[&str] = &[
        r#""42\n""#,
        "{ a => 1, b => [1, 'x', { c => undef }], e => {} }",
        "bless( { k => sub { 1 }, l => [] }, 'Foo::Bar' ), \\[1, \\'two']",
        "[ \\\\'deep', bless([1], 'Obj'), \"tab\\there\" ]",
        "{ 'two words' => -7, z => 0, a => '007' }",
    ];

    fn configs() -> Vec<DumpConfig> {
        let mut out = Vec::new();
        for indent in 0..=2 {
            for flags in 0..16u8 {
                out.push(DumpConfig {
                    indent,
                    terse: flags & 1 != 0,
                    useqq: flags & 2 != 0,
                    sortkeys: flags & 4 != 0,
                    trailingcomma: flags & 8 != 0,
                    quotekeys: indent != 1,
                    pad: if indent == 2 { "# ".into() } else { String::new() },
                    ..Default::default()
                });
            }
        }
        out
    }

    #[test]
    fn matches_pure_backend_byte_for_byte() {
        for src in INPUTS {
            let values = parse_values(src).unwrap();
            for cfg in configs() {
                let pure = PureBackend.dump(&values, &[], &cfg).unwrap();
                let fast = FastBackend.dump(&values, &[], &cfg).unwrap();
                assert_eq!(pure, fast, "input {src} with {cfg:?}");
            }
        }
    }

    #[test]
    fn maxdepth_output_has_the_same_shape() {
        let values = parse_values("[ [ [1] ], { a => { b => 1 } } ]").unwrap();
        let cfg = DumpConfig {
            maxdepth: 2,
            ..Default::default()
        };
        let pure = PureBackend.dump(&values, &[], &cfg).unwrap();
        let fast = FastBackend.dump(&values, &[], &cfg).unwrap();
        assert_eq!(
            crate::mask::mask_addresses(&pure),
            crate::mask::mask_addresses(&fast)
        );
        assert!(fast.contains("'ARRAY(0x"), "{fast}");
    }

    #[test]
    fn availability_follows_the_feature() {
        assert!(AVAILABLE);
        assert_eq!(backend().map(|b| b.name().to_string()).as_deref(), Some("fast"));
    }
}
