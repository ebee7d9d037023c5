//! Conversion of raw string values into typed values.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::ConfigError;

/// State shared with converters during one conversion.
///
/// Converters record the formats they understand so a failed conversion can
/// tell the user what would have been accepted.
#[derive(Debug)]
pub struct ConversionContext<'a> {
    key: &'a str,
    target: &'static str,
    formats: Vec<String>,
}

impl<'a> ConversionContext<'a> {
    pub fn new(key: &'a str, target: &'static str) -> Self {
        Self {
            key,
            target,
            formats: Vec::new(),
        }
    }

    pub fn key(&self) -> &str {
        self.key
    }

    /// Name of the type being converted to.
    pub fn target(&self) -> &'static str {
        self.target
    }

    pub fn add_supported_format(&mut self, format: impl Into<String>) {
        let format = format.into();
        if !self.formats.contains(&format) {
            self.formats.push(format);
        }
    }

    pub fn supported_formats(&self) -> &[String] {
        &self.formats
    }
}

/// Converts a string into a `T`, or declines with `None`.
pub trait PropertyConverter<T>: Send + Sync {
    fn convert(&self, value: &str, ctx: &mut ConversionContext<'_>) -> Option<T>;
}

impl<T, F> PropertyConverter<T> for F
where
    F: Fn(&str, &mut ConversionContext<'_>) -> Option<T> + Send + Sync,
{
    fn convert(&self, value: &str, ctx: &mut ConversionContext<'_>) -> Option<T> {
        self(value, ctx)
    }
}

/// Contributes converters to a registry; discovered through the service registry.
pub trait ConverterProvider: Send + Sync + fmt::Debug {
    fn register_converters(&self, registry: &mut ConverterRegistry);
}

#[derive(Clone)]
struct Converters {
    type_name: &'static str,
    // each element holds a `Box<dyn PropertyConverter<T>>` for the keyed `T`
    list: Vec<Arc<dyn Any + Send + Sync>>,
}

/// Converters grouped by target type.
///
/// Per type, the most recently registered converter is consulted first and
/// the first one returning a value wins.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: HashMap<TypeId, Converters>,
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for entry in self.converters.values() {
            map.entry(&entry.type_name, &entry.list.len());
        }
        map.finish()
    }
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in converters.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_defaults();
        registry
    }

    pub fn register<T: 'static>(&mut self, converter: impl PropertyConverter<T> + 'static) {
        let boxed: Box<dyn PropertyConverter<T>> = Box::new(converter);
        self.converters
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Converters {
                type_name: type_name::<T>(),
                list: Vec::new(),
            })
            .list
            .insert(0, Arc::new(boxed));
    }

    /// Removes every converter for `T`, returning how many there were.
    pub fn remove<T: 'static>(&mut self) -> usize {
        self.converters
            .remove(&TypeId::of::<T>())
            .map_or(0, |entry| entry.list.len())
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.converters.contains_key(&TypeId::of::<T>())
    }

    /// Target type names that have at least one converter.
    pub fn type_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.converters.values().map(|e| e.type_name).collect();
        names.sort_unstable();
        names
    }

    pub fn convert<T: 'static>(&self, key: &str, value: &str) -> Result<T, ConfigError> {
        let target = type_name::<T>();
        let entry = self
            .converters
            .get(&TypeId::of::<T>())
            .ok_or(ConfigError::NoConverter(target))?;

        let mut ctx = ConversionContext::new(key, target);
        for converter in &entry.list {
            let Some(converter) = converter.downcast_ref::<Box<dyn PropertyConverter<T>>>() else {
                continue;
            };
            if let Some(converted) = converter.convert(value, &mut ctx) {
                return Ok(converted);
            }
        }

        Err(ConfigError::ConversionFailed {
            key: key.to_string(),
            value: value.to_string(),
            target,
            formats: ctx.formats,
        })
    }

    fn register_defaults(&mut self) {
        self.register::<bool>(parse_bool);
        self.register::<String>(|value: &str, _: &mut ConversionContext<'_>| {
            Some(value.to_string())
        });
        self.register::<char>(parse_char);
        self.register::<PathBuf>(|value: &str, ctx: &mut ConversionContext<'_>| {
            ctx.add_supported_format("<non-empty path>");
            (!value.trim().is_empty()).then(|| PathBuf::from(value.trim()))
        });
        self.register::<Duration>(parse_duration);

        macro_rules! register_integers {
            ($registry:expr; $($ty:ty),*) => {$(
                $registry.register::<$ty>(|value: &str, ctx: &mut ConversionContext<'_>| {
                    ctx.add_supported_format("<decimal>, 0x<hex>, #<hex>, MIN, MAX");
                    let trimmed = value.trim();
                    match trimmed.to_ascii_uppercase().as_str() {
                        "MIN" | "MIN_VALUE" => return Some(<$ty>::MIN),
                        "MAX" | "MAX_VALUE" => return Some(<$ty>::MAX),
                        _ => {}
                    }
                    let (digits, radix) = split_integer(trimmed)?;
                    <$ty>::from_str_radix(&digits, radix).ok()
                });
            )*};
        }
        register_integers!(self; i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

        macro_rules! register_floats {
            ($registry:expr; $($ty:ty),*) => {$(
                $registry.register::<$ty>(|value: &str, ctx: &mut ConversionContext<'_>| {
                    ctx.add_supported_format(
                        "<decimal>, NaN, POSITIVE_INFINITY, NEGATIVE_INFINITY, MIN, MAX, MIN_POSITIVE",
                    );
                    let trimmed = value.trim();
                    match trimmed.to_ascii_uppercase().as_str() {
                        "NAN" => Some(<$ty>::NAN),
                        "POSITIVE_INFINITY" | "INFINITY" | "+INFINITY" => Some(<$ty>::INFINITY),
                        "NEGATIVE_INFINITY" | "-INFINITY" => Some(<$ty>::NEG_INFINITY),
                        "MIN" | "MIN_VALUE" => Some(<$ty>::MIN),
                        "MAX" | "MAX_VALUE" => Some(<$ty>::MAX),
                        "MIN_POSITIVE" => Some(<$ty>::MIN_POSITIVE),
                        _ => trimmed.parse::<$ty>().ok(),
                    }
                });
            )*};
        }
        register_floats!(self; f32, f64);
    }
}

fn parse_bool(value: &str, ctx: &mut ConversionContext<'_>) -> Option<bool> {
    ctx.add_supported_format("true, yes, y, on, t (case-insensitive)");
    ctx.add_supported_format("false, no, n, off, f (case-insensitive)");
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "on" | "t" => Some(true),
        "false" | "no" | "n" | "off" | "f" => Some(false),
        _ => None,
    }
}

fn parse_char(value: &str, ctx: &mut ConversionContext<'_>) -> Option<char> {
    ctx.add_supported_format("<char>, '<char>'");
    let single = |s: &str| {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Some(c),
            _ => None,
        }
    };
    if let Some(c) = single(value) {
        return Some(c);
    }
    let inner = value.strip_prefix('\'')?.strip_suffix('\'')?;
    if inner == "''" {
        return Some('\'');
    }
    single(inner)
}

/// Splits an integer literal into signed digits and radix.
fn split_integer(s: &str) -> Option<(String, u32)> {
    let (negative, unsigned) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    if unsigned.starts_with(['+', '-']) || unsigned.is_empty() {
        return None;
    }
    let (digits, radix) = match unsigned
        .strip_prefix("0x")
        .or_else(|| unsigned.strip_prefix("0X"))
        .or_else(|| unsigned.strip_prefix('#'))
    {
        Some(hex) => (hex, 16),
        None => (unsigned, 10),
    };
    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return None;
    }
    let signed = if negative {
        format!("-{digits}")
    } else {
        digits.to_string()
    };
    Some((signed, radix))
}

fn parse_duration(value: &str, ctx: &mut ConversionContext<'_>) -> Option<Duration> {
    ctx.add_supported_format("<n>ms|s|m|h|d, e.g. 1h30m");
    ctx.add_supported_format("ISO-8601, e.g. PT1H30M or P2DT3H");

    let trimmed = value.trim();
    let seconds = match trimmed.strip_prefix(['P', 'p']) {
        Some(iso) => iso_seconds(iso)?,
        None => sum_units(trimmed, |unit| match unit {
            "ms" => Some(0.001),
            "s" => Some(1.0),
            "m" => Some(60.0),
            "h" => Some(3_600.0),
            "d" => Some(86_400.0),
            _ => None,
        })?,
    };
    Duration::try_from_secs_f64(seconds).ok()
}

fn iso_seconds(iso: &str) -> Option<f64> {
    let (date, time) = iso.split_once(['T', 't']).unwrap_or((iso, ""));
    if date.is_empty() && time.is_empty() {
        return None;
    }
    let date_seconds = if date.is_empty() {
        0.0
    } else {
        sum_units(date, |unit| match unit {
            "w" => Some(604_800.0),
            "d" => Some(86_400.0),
            _ => None,
        })?
    };
    let time_seconds = if time.is_empty() {
        0.0
    } else {
        sum_units(time, |unit| match unit {
            "h" => Some(3_600.0),
            "m" => Some(60.0),
            "s" => Some(1.0),
            _ => None,
        })?
    };
    Some(date_seconds + time_seconds)
}

/// Sums a sequence of `<number><unit>` pairs, scaling each unit to seconds.
fn sum_units(s: &str, scale: impl Fn(&str) -> Option<f64>) -> Option<f64> {
    if s.is_empty() {
        return None;
    }
    let is_number = |c: char| c.is_ascii_digit() || c == '.';
    let mut total = 0.0;
    let mut rest = s;

    while !rest.is_empty() {
        let number_len = rest.find(|c: char| !is_number(c)).unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let number: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let unit_len = rest.find(is_number).unwrap_or(rest.len());
        let factor = scale(&rest[..unit_len].to_ascii_lowercase())?;
        total += number * factor;
        rest = &rest[unit_len..];
    }

    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert<T: 'static>(value: &str) -> Result<T, ConfigError> {
        ConverterRegistry::with_defaults().convert::<T>("key", value)
    }

    #[test]
    fn test_bool_variants() {
        for yes in ["true", "YES", "y", "On", "t"] {
            assert!(convert::<bool>(yes).unwrap(), "{yes}");
        }
        for no in ["false", "No", "n", "OFF", "f"] {
            assert!(!convert::<bool>(no).unwrap(), "{no}");
        }
        assert!(matches!(
            convert::<bool>("maybe"),
            Err(ConfigError::ConversionFailed { .. })
        ));
    }

    #[test]
    fn test_integers() {
        assert_eq!(convert::<i32>(" 42 ").unwrap(), 42);
        assert_eq!(convert::<i32>("-0x10").unwrap(), -16);
        assert_eq!(convert::<u8>("#ff").unwrap(), 255);
        assert_eq!(convert::<i64>("MAX").unwrap(), i64::MAX);
        assert_eq!(convert::<i16>("min_value").unwrap(), i16::MIN);
        assert_eq!(convert::<u32>("+7").unwrap(), 7);
        assert!(convert::<u8>("256").is_err());
        assert!(convert::<u8>("-1").is_err());
        assert!(convert::<i32>("+-1").is_err());
        assert!(convert::<i32>("0x").is_err());
    }

    #[test]
    fn test_floats() {
        assert_eq!(convert::<f64>("1.5").unwrap(), 1.5);
        assert!(convert::<f64>("NaN").unwrap().is_nan());
        assert_eq!(convert::<f32>("POSITIVE_INFINITY").unwrap(), f32::INFINITY);
        assert_eq!(convert::<f64>("NEGATIVE_INFINITY").unwrap(), f64::NEG_INFINITY);
        assert_eq!(convert::<f64>("MAX").unwrap(), f64::MAX);
    }

    #[test]
    fn test_chars() {
        assert_eq!(convert::<char>("x").unwrap(), 'x');
        assert_eq!(convert::<char>("'y'").unwrap(), 'y');
        assert_eq!(convert::<char>("''''").unwrap(), '\'');
        assert!(convert::<char>("xy").is_err());
    }

    #[test]
    fn test_durations() {
        assert_eq!(convert::<Duration>("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(convert::<Duration>("1h30m").unwrap(), Duration::from_secs(5_400));
        assert_eq!(convert::<Duration>("1.5s").unwrap(), Duration::from_millis(1_500));
        assert_eq!(convert::<Duration>("PT1H30M").unwrap(), Duration::from_secs(5_400));
        assert_eq!(convert::<Duration>("P2DT3H").unwrap(), Duration::from_secs(183_600));
        assert_eq!(convert::<Duration>("P1W").unwrap(), Duration::from_secs(604_800));
        assert!(convert::<Duration>("15").is_err());
        assert!(convert::<Duration>("P").is_err());
    }

    #[test]
    fn test_failure_lists_supported_formats() {
        let err = convert::<bool>("perhaps").unwrap_err();
        let ConfigError::ConversionFailed { formats, target, .. } = &err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(*target, "bool");
        assert_eq!(formats.len(), 2);
        assert!(err.to_string().contains("yes"));
    }

    #[test]
    fn test_missing_converter() {
        struct Unknown;
        let result = ConverterRegistry::new().convert::<Unknown>("key", "v");
        assert!(matches!(result, Err(ConfigError::NoConverter(_))));
    }

    #[test]
    fn test_later_registration_is_consulted_first() {
        let mut registry = ConverterRegistry::with_defaults();
        registry.register::<bool>(|value: &str, _: &mut ConversionContext<'_>| {
            (value == "1").then_some(true)
        });

        assert!(registry.convert::<bool>("k", "1").unwrap());
        assert!(!registry.convert::<bool>("k", "no").unwrap());
    }

    #[test]
    fn test_remove() {
        let mut registry = ConverterRegistry::with_defaults();
        assert!(registry.contains::<char>());
        assert_eq!(registry.remove::<char>(), 1);
        assert!(!registry.contains::<char>());
    }
}
