use indexmap::IndexMap;

/// An in-memory value as the serializer sees it.
///
/// `Array`, `Hash` and `Code` are references, the way `Dumper` receives
/// them; `Ref` is a reference to a scalar or to another reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Undef,
    Scalar(String),
    Array(Vec<Value>),
    Hash(IndexMap<String, Value>),
    Ref(Box<Value>),
    Blessed { class: String, inner: Box<Value> },
    Code,
}

impl Value {
    pub fn scalar(s: impl Into<String>) -> Self {
        Value::Scalar(s.into())
    }

    /// Whether entering this value descends one reference level.
    pub fn is_ref(&self) -> bool {
        !matches!(self, Value::Undef | Value::Scalar(_))
    }

    /// Reference kind as Perl stringifies it (`HASH`, `ARRAY`, ...).
    pub fn ref_kind(&self) -> Option<&'static str> {
        match self {
            Value::Undef | Value::Scalar(_) => None,
            Value::Array(_) => Some("ARRAY"),
            Value::Hash(_) => Some("HASH"),
            Value::Code => Some("CODE"),
            Value::Ref(inner) => Some(if inner.is_ref() { "REF" } else { "SCALAR" }),
            Value::Blessed { inner, .. } => inner.ref_kind(),
        }
    }

    /// Deepest reference level at or below this value, counting levels
    /// the way the dumpers do: a blessed value and its body are one level.
    pub fn ref_depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 0usize)];
        while let Some((v, level)) = stack.pop() {
            if !v.is_ref() {
                continue;
            }
            let level = level + 1;
            deepest = deepest.max(level);
            let mut body = v;
            while let Value::Blessed { inner, .. } = body {
                body = inner;
            }
            match body {
                Value::Array(items) => stack.extend(items.iter().map(|i| (i, level))),
                Value::Hash(map) => stack.extend(map.values().map(|i| (i, level))),
                Value::Ref(inner) => stack.push((inner, level)),
                _ => {}
            }
        }
        deepest
    }

    /// `KIND(0x...)` / `Class=KIND(0x...)` using the node's heap address.
    pub fn stringify_ref(&self) -> Option<String> {
        let kind = self.ref_kind()?;
        let addr = self as *const Value as usize;
        Some(match self {
            Value::Blessed { class, inner } => {
                let addr = inner.as_ref() as *const Value as usize;
                format!("{class}={kind}({addr:#x})")
            }
            _ => format!("{kind}({addr:#x})"),
        })
    }
}
