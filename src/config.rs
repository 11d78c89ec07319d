use crate::value::Value;
use anyhow::{Result, bail};
use serde::Deserialize;

/// Default reference nesting limit, as in `Data::Dumper`.
pub const DEFAULT_MAXRECURSE: usize = 1000;

/// Output options understood by every backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpConfig {
    pub indent: u8,
    pub terse: bool,
    pub useqq: bool,
    pub sortkeys: bool,
    pub quotekeys: bool,
    pub pair: String,
    pub varname: String,
    pub trailingcomma: bool,
    pub maxdepth: usize,
    pub maxrecurse: usize,
    pub pad: String,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            indent: 2,
            terse: false,
            useqq: false,
            sortkeys: false,
            quotekeys: true,
            pair: " => ".to_string(),
            varname: "VAR".to_string(),
            trailingcomma: false,
            maxdepth: 0,
            maxrecurse: DEFAULT_MAXRECURSE,
            pad: String::new(),
        }
    }
}

impl DumpConfig {
    /// Line separator: a newline unless everything goes on one line.
    pub fn sep(&self) -> &'static str {
        if self.indent > 0 { "\n" } else { "" }
    }

    /// Per-level indentation unit.
    pub fn xpad(&self) -> &'static str {
        if self.indent > 0 { "  " } else { "" }
    }

    pub fn validate(&self) -> Result<()> {
        if self.indent > 2 {
            bail!("Indent must be 0, 1 or 2 (got {})", self.indent);
        }
        if self.varname.is_empty() {
            bail!("Varname must not be empty");
        }
        Ok(())
    }

    /// Refuse values nested deeper than `maxrecurse` (0 = no limit).
    /// Levels beyond `maxdepth` are never visited, so they don't count.
    pub fn check_recursion(&self, values: &[Value]) -> Result<()> {
        if self.maxrecurse == 0 {
            return Ok(());
        }
        for v in values {
            let mut depth = v.ref_depth();
            if self.maxdepth > 0 {
                depth = depth.min(self.maxdepth);
            }
            if depth > self.maxrecurse {
                bail!("Recursion limit of {} exceeded", self.maxrecurse);
            }
        }
        Ok(())
    }

    /// Overlay the options that are set.
    pub fn apply(&mut self, opts: &DumpOptions) {
        if let Some(v) = opts.indent {
            self.indent = v;
        }
        if let Some(v) = opts.terse {
            self.terse = v;
        }
        if let Some(v) = opts.useqq {
            self.useqq = v;
        }
        if let Some(v) = opts.sortkeys {
            self.sortkeys = v;
        }
        if let Some(v) = opts.quotekeys {
            self.quotekeys = v;
        }
        if let Some(v) = &opts.pair {
            self.pair = v.clone();
        }
        if let Some(v) = &opts.varname {
            self.varname = v.clone();
        }
        if let Some(v) = opts.trailingcomma {
            self.trailingcomma = v;
        }
        if let Some(v) = opts.maxdepth {
            self.maxdepth = v;
        }
        if let Some(v) = opts.maxrecurse {
            self.maxrecurse = v;
        }
        if let Some(v) = &opts.pad {
            self.pad = v.clone();
        }
    }

    pub fn with(opts: &[&DumpOptions]) -> Self {
        let mut cfg = Self::default();
        for o in opts {
            cfg.apply(o);
        }
        cfg
    }
}

/// Partial options as written in a suite file.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct DumpOptions {
    pub indent: Option<u8>,
    pub terse: Option<bool>,
    pub useqq: Option<bool>,
    pub sortkeys: Option<bool>,
    pub quotekeys: Option<bool>,
    pub pair: Option<String>,
    pub varname: Option<String>,
    pub trailingcomma: Option<bool>,
    pub maxdepth: Option<usize>,
    pub maxrecurse: Option<usize>,
    pub pad: Option<String>,
}
