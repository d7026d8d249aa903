use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error;
use std::fmt;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

/// Why constructing an expression or a relational node failed.
///
/// All of these are detected client side before anything is sent to the
/// backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstructionKind {
    /// Operand types are not in the promotion table for the operator.
    TypeMismatch,
    /// Expression mixes columns from unrelated relations.
    SchemaMismatch,
    /// Output column name is produced more than once, or can't be proven
    /// unique.
    AmbiguousColumn,
    /// Column reference doesn't resolve against the relation.
    UnresolvedColumn,
    /// Grouping sets can't be combined.
    IncompatibleGrouping,
    /// Wrong number of arguments at a function call site.
    ArityMismatch,
    /// Any other invalid argument to a builder method.
    InvalidArgument,
}

impl fmt::Display for ConstructionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch => write!(f, "type mismatch"),
            Self::SchemaMismatch => write!(f, "schema mismatch"),
            Self::AmbiguousColumn => write!(f, "ambiguous column"),
            Self::UnresolvedColumn => write!(f, "unresolved column"),
            Self::IncompatibleGrouping => write!(f, "incompatible grouping"),
            Self::ArityMismatch => write!(f, "arity mismatch"),
            Self::InvalidArgument => write!(f, "invalid argument"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbErrorKind {
    /// Invalid composition detected before any network call.
    Construction(ConstructionKind),
    /// Deploying a remote function or type collided with an incompatible
    /// existing definition.
    DefinitionConflict,
    /// The execution collaborator rejected or failed a statement.
    Execution,
    /// Cached rows were read after the backing relation changed.
    StaleState,
    /// Bug in this library.
    Internal,
}

impl fmt::Display for DbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Construction(kind) => write!(f, "construction error ({kind})"),
            Self::DefinitionConflict => write!(f, "definition conflict"),
            Self::Execution => write!(f, "execution error"),
            Self::StaleState => write!(f, "stale state"),
            Self::Internal => write!(f, "internal error"),
        }
    }
}

/// Value attached to an error as extra context.
pub trait ErrorFieldValue: fmt::Debug + fmt::Display + Sync + Send {}

impl<T> ErrorFieldValue for T where T: fmt::Debug + fmt::Display + Sync + Send {}

#[derive(Debug)]
struct ErrorField {
    key: String,
    value: Box<dyn ErrorFieldValue>,
}

#[derive(Debug)]
pub struct DbError {
    inner: Box<DbErrorInner>,
}

#[derive(Debug)]
struct DbErrorInner {
    kind: DbErrorKind,
    msg: String,
    source: Option<Box<dyn Error + Send + Sync>>,
    /// Compiled statement that failed, if any.
    sql: Option<String>,
    /// SQLSTATE reported by the backend.
    sqlstate: Option<String>,
    fields: Vec<ErrorField>,
    backtrace: Backtrace,
}

impl DbError {
    /// Create a new internal error.
    pub fn new(msg: impl Into<String>) -> Self {
        Self::with_kind(DbErrorKind::Internal, msg)
    }

    pub fn with_kind(kind: DbErrorKind, msg: impl Into<String>) -> Self {
        DbError {
            inner: Box::new(DbErrorInner {
                kind,
                msg: msg.into(),
                source: None,
                sql: None,
                sqlstate: None,
                fields: Vec::new(),
                backtrace: Backtrace::capture(),
            }),
        }
    }

    pub fn with_source(msg: impl Into<String>, source: Box<dyn Error + Send + Sync>) -> Self {
        let mut err = Self::new(msg);
        err.inner.source = Some(source);
        err
    }

    pub fn construction(kind: ConstructionKind, msg: impl Into<String>) -> Self {
        Self::with_kind(DbErrorKind::Construction(kind), msg)
    }

    pub fn type_mismatch(msg: impl Into<String>) -> Self {
        Self::construction(ConstructionKind::TypeMismatch, msg)
    }

    pub fn schema_mismatch(msg: impl Into<String>) -> Self {
        Self::construction(ConstructionKind::SchemaMismatch, msg)
    }

    pub fn ambiguous_column(msg: impl Into<String>) -> Self {
        Self::construction(ConstructionKind::AmbiguousColumn, msg)
    }

    pub fn unresolved_column(msg: impl Into<String>) -> Self {
        Self::construction(ConstructionKind::UnresolvedColumn, msg)
    }

    pub fn incompatible_grouping(msg: impl Into<String>) -> Self {
        Self::construction(ConstructionKind::IncompatibleGrouping, msg)
    }

    pub fn arity_mismatch(msg: impl Into<String>) -> Self {
        Self::construction(ConstructionKind::ArityMismatch, msg)
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::construction(ConstructionKind::InvalidArgument, msg)
    }

    pub fn definition_conflict(msg: impl Into<String>) -> Self {
        Self::with_kind(DbErrorKind::DefinitionConflict, msg)
    }

    /// Create an execution error wrapping the backend's diagnostic verbatim.
    pub fn execution(diagnostic: impl Into<String>) -> Self {
        Self::with_kind(DbErrorKind::Execution, diagnostic)
    }

    pub fn stale_state(msg: impl Into<String>) -> Self {
        Self::with_kind(DbErrorKind::StaleState, msg)
    }

    /// Attach the statement that produced this error.
    ///
    /// Keeps an already attached statement.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        if self.inner.sql.is_none() {
            self.inner.sql = Some(sql.into());
        }
        self
    }

    pub fn with_sqlstate(mut self, code: impl Into<String>) -> Self {
        self.inner.sqlstate = Some(code.into());
        self
    }

    pub fn with_field<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: ErrorFieldValue + 'static,
    {
        self.inner.fields.push(ErrorField {
            key: key.into(),
            value: Box::new(value),
        });
        self
    }

    pub fn kind(&self) -> DbErrorKind {
        self.inner.kind
    }

    /// Returns the construction sub-kind if this is a construction error.
    pub fn construction_kind(&self) -> Option<ConstructionKind> {
        match self.inner.kind {
            DbErrorKind::Construction(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn is_construction(&self) -> bool {
        matches!(self.inner.kind, DbErrorKind::Construction(_))
    }

    pub fn get_msg(&self) -> &str {
        &self.inner.msg
    }

    pub fn sql(&self) -> Option<&str> {
        self.inner.sql.as_deref()
    }

    pub fn sqlstate(&self) -> Option<&str> {
        self.inner.sqlstate.as_deref()
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.inner.backtrace
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.inner.kind, self.inner.msg)?;

        if let Some(code) = &self.inner.sqlstate {
            write!(f, " (SQLSTATE {code})")?;
        }

        for field in &self.inner.fields {
            write!(f, "\n  {}: {}", field.key, field.value)?;
        }

        if let Some(source) = &self.inner.source {
            write!(f, "\nError source: {source}")?;
        }

        if let Some(sql) = &self.inner.sql {
            write!(f, "\nStatement: {sql}")?;
        }

        if self.inner.backtrace.status() == BacktraceStatus::Captured {
            write!(f, "\nBacktrace: {}", self.inner.backtrace)?;
        }

        Ok(())
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl From<fmt::Error> for DbError {
    fn from(value: fmt::Error) -> Self {
        DbError::with_source("Format error", Box::new(value))
    }
}

/// An extension trait for adding context to the Error variant of a result.
pub trait ResultExt<T, E> {
    /// Wrap an error with a static context string.
    fn context(self, msg: &'static str) -> Result<T>;

    /// Wrap an error with a context string generated from a function.
    fn context_fn<F>(self, f: F) -> Result<T>
    where
        F: Fn() -> String;
}

impl<T, E: Error + Send + Sync + 'static> ResultExt<T, E> for std::result::Result<T, E> {
    fn context(self, msg: &'static str) -> Result<T> {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(DbError::with_source(msg, Box::new(e))),
        }
    }

    fn context_fn<F>(self, f: F) -> Result<T>
    where
        F: Fn() -> String,
    {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(DbError::with_source(f(), Box::new(e))),
        }
    }
}

pub trait OptionExt<T> {
    /// Return an error if the option is None.
    fn required(self, msg: &'static str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn required(self, msg: &'static str) -> Result<T> {
        match self {
            Some(v) => Ok(v),
            None => Err(DbError::new(msg)),
        }
    }
}

/// Return a "not implemented" internal error.
#[macro_export]
macro_rules! not_implemented {
    ($($arg:tt)*) => {
        Err($crate::DbError::new(format!("Not implemented: {}", format!($($arg)*))))
    };
}
