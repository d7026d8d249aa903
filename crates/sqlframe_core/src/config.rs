use std::collections::HashMap;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicBool, Ordering};

use sqlframe_error::{DbError, Result};

use crate::types::ScalarValue;

/// Environment variable enabling SQL echo on startup.
pub const ECHO_SQL_ENV: &str = "SQLFRAME_ECHO_SQL";

/// Schema functions and types are deployed to when not given explicitly.
pub const DEFAULT_FUNCTION_SCHEMA: &str = "pg_temp";

/// Tracing target compiled statements are echoed under.
pub const ECHO_TARGET: &str = "sqlframe::sql";

static ECHO_SQL: LazyLock<AtomicBool> = LazyLock::new(|| {
    let enabled = std::env::var(ECHO_SQL_ENV)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "on" | "yes"))
        .unwrap_or(false);
    AtomicBool::new(enabled)
});

/// Check if every statement sent to the backend should be echoed.
pub fn echo_sql() -> bool {
    ECHO_SQL.load(Ordering::Relaxed)
}

pub fn set_echo_sql(enabled: bool) {
    ECHO_SQL.store(enabled, Ordering::Relaxed)
}

/// Configuration for a database handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub function_schema: String,
    pub application_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            function_schema: DEFAULT_FUNCTION_SCHEMA.to_string(),
            application_name: String::new(),
        }
    }
}

impl SessionConfig {
    pub fn set_from_scalar(&mut self, name: &str, value: ScalarValue) -> Result<()> {
        let func = get_functions(name)?;
        (func.set)(value, self)
    }

    pub fn get_as_scalar(&self, name: &str) -> Result<ScalarValue> {
        let func = get_functions(name)?;
        Ok((func.get)(self))
    }

    pub fn reset(&mut self, name: &str) -> Result<()> {
        let func = get_functions(name)?;
        (func.reset)(self);
        Ok(())
    }

    /// Backend run-time parameter a setting is forwarded to, if any.
    pub fn backend_parameter(name: &str) -> Result<Option<&'static str>> {
        Ok(get_functions(name)?.backend_parameter)
    }

    /// Names and descriptions of every setting.
    pub fn settings() -> impl Iterator<Item = (&'static str, &'static str)> {
        let mut settings: Vec<_> = GET_SET_FUNCTIONS
            .iter()
            .map(|(name, func)| (*name, func.description))
            .collect();
        settings.sort_unstable();
        settings.into_iter()
    }
}

fn get_functions(name: &str) -> Result<&'static SettingFunctions> {
    GET_SET_FUNCTIONS.get(name).ok_or_else(|| {
        DbError::invalid_argument(format!("Unknown setting '{name}'"))
            .with_field("available", available_names())
    })
}

fn available_names() -> String {
    let mut names: Vec<_> = GET_SET_FUNCTIONS.keys().copied().collect();
    names.sort_unstable();
    names.join(", ")
}

struct SettingFunctions {
    description: &'static str,
    backend_parameter: Option<&'static str>,
    set: fn(scalar: ScalarValue, conf: &mut SessionConfig) -> Result<()>,
    get: fn(conf: &SessionConfig) -> ScalarValue,
    reset: fn(conf: &mut SessionConfig),
}

impl SettingFunctions {
    const fn new<S: SessionSetting>() -> Self {
        SettingFunctions {
            description: S::DESCRIPTION,
            backend_parameter: S::BACKEND_PARAMETER,
            set: S::set_from_scalar as _,
            get: S::get_as_scalar as _,
            reset: S::reset as _,
        }
    }
}

fn insert_setting<S: SessionSetting>(map: &mut HashMap<&'static str, SettingFunctions>) {
    if map.insert(S::NAME, SettingFunctions::new::<S>()).is_some() {
        panic!("Duplicate settings names: {}", S::NAME);
    }
}

static GET_SET_FUNCTIONS: LazyLock<HashMap<&'static str, SettingFunctions>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    insert_setting::<EchoSql>(&mut map);
    insert_setting::<FunctionSchema>(&mut map);
    insert_setting::<ApplicationName>(&mut map);

    map
});

pub trait SessionSetting: Sync + Send + 'static {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;
    /// Forwarded to the backend with `set_config` when set or reset.
    const BACKEND_PARAMETER: Option<&'static str> = None;

    fn set_from_scalar(scalar: ScalarValue, conf: &mut SessionConfig) -> Result<()>;
    fn get_as_scalar(conf: &SessionConfig) -> ScalarValue;
    fn reset(conf: &mut SessionConfig);
}

/// Process wide, shared by every database handle.
pub struct EchoSql;

impl SessionSetting for EchoSql {
    const NAME: &'static str = "echo_sql";
    const DESCRIPTION: &'static str = "Log every statement sent to the backend";

    fn set_from_scalar(scalar: ScalarValue, _conf: &mut SessionConfig) -> Result<()> {
        set_echo_sql(scalar.try_as_bool()?);
        Ok(())
    }

    fn get_as_scalar(_conf: &SessionConfig) -> ScalarValue {
        echo_sql().into()
    }

    fn reset(_conf: &mut SessionConfig) {
        set_echo_sql(false)
    }
}

pub struct FunctionSchema;

impl SessionSetting for FunctionSchema {
    const NAME: &'static str = "function_schema";
    const DESCRIPTION: &'static str = "Schema functions and types are deployed to by default";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut SessionConfig) -> Result<()> {
        let val = scalar.try_into_string()?;
        if val.is_empty() {
            return Err(DbError::invalid_argument("Function schema cannot be empty"));
        }
        conf.function_schema = val;
        Ok(())
    }

    fn get_as_scalar(conf: &SessionConfig) -> ScalarValue {
        conf.function_schema.clone().into()
    }

    fn reset(conf: &mut SessionConfig) {
        conf.function_schema = DEFAULT_FUNCTION_SCHEMA.to_string();
    }
}

pub struct ApplicationName;

impl SessionSetting for ApplicationName {
    const NAME: &'static str = "application_name";
    const DESCRIPTION: &'static str = "Name the backend reports for this session";
    const BACKEND_PARAMETER: Option<&'static str> = Some("application_name");

    fn set_from_scalar(scalar: ScalarValue, conf: &mut SessionConfig) -> Result<()> {
        conf.application_name = scalar.try_into_string()?;
        Ok(())
    }

    fn get_as_scalar(conf: &SessionConfig) -> ScalarValue {
        conf.application_name.clone().into()
    }

    fn reset(conf: &mut SessionConfig) {
        conf.application_name = String::new();
    }
}
