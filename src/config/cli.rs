use std::collections::BTreeMap;
use std::ffi::OsString;
use std::sync::LazyLock;
use std::time::SystemTime;

use parking_lot::RwLock;
use tracing::warn;

use super::source::PropertySource;
use super::system::toggle;
use super::value::PropertyValue;

pub const SOURCE_NAME: &str = "command-line-args";
pub const DEFAULT_ORDINAL: i32 = 10_000;

pub const PREFIX_TOGGLE: &str = "main.args.prefix";

static MAIN_ARGS: LazyLock<RwLock<Option<Vec<String>>>> = LazyLock::new(|| RwLock::new(None));

/// Records the program arguments used by [`CliSource::from_main_args`].
///
/// Without this the process arguments (minus the program name) are used.
pub fn set_main_args<I, S>(args: I)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    *MAIN_ARGS.write() = Some(args.into_iter().map(Into::into).collect());
}

/// Exposes command-line arguments as configuration entries.
///
/// | argument        | entry       |
/// |-----------------|-------------|
/// | `--key=value`   | `key=value` |
/// | `--flag`        | `flag=flag` |
/// | `-key value`    | `key=value` |
/// | `word`          | `word=word` |
#[derive(Debug, Clone)]
pub struct CliSource {
    entries: BTreeMap<String, PropertyValue>,
}

impl CliSource {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prefix = toggle(PREFIX_TOGGLE).unwrap_or_default();
        Self::with_prefix(prefix, args)
    }

    pub fn with_prefix<I, S>(prefix: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prefix = prefix.into();
        let now = SystemTime::now();
        let entries = parse_args(args.into_iter().map(Into::into))
            .into_iter()
            .map(|(k, v)| {
                let key = format!("{prefix}{k}");
                let value = PropertyValue::new(key.clone(), v, SOURCE_NAME).with_timestamp(now);
                (key, value)
            })
            .collect();
        Self { entries }
    }

    pub fn from_main_args() -> Self {
        let recorded = MAIN_ARGS.read().clone();
        match recorded {
            Some(args) => Self::new(args),
            None => Self::new(utf8_args(std::env::args_os().skip(1))),
        }
    }
}

/// Keeps the arguments that are valid UTF-8.
fn utf8_args(args: impl IntoIterator<Item = OsString>) -> impl Iterator<Item = String> {
    args.into_iter().filter_map(|arg| match arg.into_string() {
        Ok(arg) => Some(arg),
        Err(arg) => {
            warn!(argument = %arg.to_string_lossy(), "skipping argument that is not valid UTF-8");
            None
        }
    })
}

fn parse_args(args: impl Iterator<Item = String>) -> BTreeMap<String, String> {
    let mut result = BTreeMap::new();
    let mut pending: Option<String> = None;

    for arg in args {
        if let Some(long) = arg.strip_prefix("--") {
            if let Some(key) = pending.take() {
                result.insert(key.clone(), key);
            }
            match long.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    result.insert(key.trim().to_string(), value.trim().to_string());
                }
                None if !long.trim().is_empty() => {
                    result.insert(long.to_string(), long.to_string());
                }
                // `--` or `--=value`
                _ => {}
            }
        } else if let Some(short) = arg.strip_prefix('-').filter(|s| !s.is_empty()) {
            if let Some(key) = pending.replace(short.to_string()) {
                result.insert(key.clone(), key);
            }
        } else if let Some(key) = pending.take() {
            result.insert(key, arg);
        } else {
            result.insert(arg.clone(), arg);
        }
    }

    if let Some(key) = pending {
        result.insert(key.clone(), key);
    }
    result
}

impl PropertySource for CliSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn default_ordinal(&self) -> i32 {
        DEFAULT_ORDINAL
    }

    fn get(&self, key: &str) -> Option<PropertyValue> {
        self.entries.get(key).cloned()
    }

    fn properties(&self) -> BTreeMap<String, PropertyValue> {
        self.entries.clone()
    }
}
