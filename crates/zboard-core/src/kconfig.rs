//! KConfig build flags
//!
//! Build flags are kept as an ordered list of unique keys. Setting a key that
//! is already present replaces its value in place, so emission order is the
//! order in which keys were first seen.

use core::fmt;

/// Value of a single KConfig symbol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KconfigValue {
    /// Boolean symbol (`y` / `n`)
    Bool(bool),
    /// Integer symbol
    Int(i64),
    /// Hex symbol, rendered with a `0x` prefix
    Hex(u64),
    /// String symbol, rendered quoted
    Str(String),
}

impl KconfigValue {
    /// Parse a value as written in board tables
    ///
    /// `y` and `n` become booleans, decimal numbers become integers, `0x`
    /// numbers become hex values and anything else is a string.
    pub fn parse(s: &str) -> Self {
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            if let Ok(n) = u64::from_str_radix(hex, 16) {
                return Self::Hex(n);
            }
        }
        match s {
            "y" => Self::Bool(true),
            "n" => Self::Bool(false),
            _ => match s.parse::<i64>() {
                Ok(n) => Self::Int(n),
                Err(_) => Self::Str(s.to_string()),
            },
        }
    }
}

impl fmt::Display for KconfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(true) => write!(f, "y"),
            Self::Bool(false) => write!(f, "n"),
            Self::Int(n) => write!(f, "{}", n),
            Self::Hex(n) => write!(f, "{:#x}", n),
            Self::Str(s) => write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        }
    }
}

impl From<bool> for KconfigValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for KconfigValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for KconfigValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

/// Ordered, key-unique list of build flags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildFlags {
    entries: Vec<(String, KconfigValue)>,
}

impl BuildFlags {
    /// Create an empty flag list
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a flag, returning true if the key was not present before
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<KconfigValue>) -> bool {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => {
                *existing = value;
                false
            }
            None => {
                self.entries.push((key, value));
                true
            }
        }
    }

    /// Look up the value of a flag
    pub fn get(&self, key: &str) -> Option<&KconfigValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Check whether a flag is set
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Number of flags
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no flags are set
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over flags in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &KconfigValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Merge another flag list into this one
    pub fn extend(&mut self, other: &BuildFlags) {
        for (key, value) in other.iter() {
            self.set(key, value.clone());
        }
    }

    /// Render as `prj.conf` lines
    pub fn render_conf(&self) -> String {
        let mut out = String::new();
        for (key, value) in self.iter() {
            out.push_str(&format!("{}={}\n", key, value));
        }
        out
    }

    /// Render as CMake `-DKEY=VALUE` arguments
    pub fn cmake_args(&self) -> Vec<String> {
        self.iter()
            .map(|(key, value)| format!("-D{}={}", key, value))
            .collect()
    }
}

impl FromIterator<(String, KconfigValue)> for BuildFlags {
    fn from_iter<I: IntoIterator<Item = (String, KconfigValue)>>(iter: I) -> Self {
        let mut flags = BuildFlags::new();
        for (key, value) in iter {
            flags.set(key, value);
        }
        flags
    }
}
