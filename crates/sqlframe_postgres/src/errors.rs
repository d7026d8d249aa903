use sqlframe_error::DbError;

#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    #[error("Failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("Failed to connect to Postgres instance: {0}")]
    Connect(#[source] tokio_postgres::Error),

    #[error("{message}")]
    Backend {
        message: String,
        sqlstate: String,
        detail: Option<String>,
        hint: Option<String>,
    },

    #[error("Postgres client error: {0}")]
    Client(#[source] tokio_postgres::Error),

    #[error("Connection to Postgres is closed")]
    Closed,

    #[error("Failed to decode column '{column}': {source}")]
    Decode {
        column: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("Cannot bind {value} as a parameter of type {pg_type}")]
    Bind { value: String, pg_type: String },

    #[error("Unsupported Postgres type: {0}")]
    UnsupportedPostgresType(String),

    #[error("Malformed {pg_type} value: {reason}")]
    Malformed {
        pg_type: String,
        reason: &'static str,
    },

    #[error("Overflow converting '{0}' to {1}")]
    DataOverflow(String, &'static str),
}

pub type Result<T, E = PostgresError> = std::result::Result<T, E>;

impl From<tokio_postgres::Error> for PostgresError {
    fn from(err: tokio_postgres::Error) -> Self {
        match err.as_db_error() {
            Some(db) => PostgresError::Backend {
                message: db.message().to_string(),
                sqlstate: db.code().code().to_string(),
                detail: db.detail().map(|s| s.to_string()),
                hint: db.hint().map(|s| s.to_string()),
            },
            None => PostgresError::Client(err),
        }
    }
}

impl From<PostgresError> for DbError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::Backend {
                message,
                sqlstate,
                detail,
                hint,
            } => {
                let mut err = DbError::execution(message).with_sqlstate(sqlstate);
                if let Some(detail) = detail {
                    err = err.with_field("detail", detail);
                }
                if let Some(hint) = hint {
                    err = err.with_field("hint", hint);
                }
                err
            }
            other => DbError::execution(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use sqlframe_error::DbErrorKind;

    use super::*;

    #[test]
    fn backend_errors_keep_sqlstate() {
        let err: DbError = PostgresError::Backend {
            message: "relation \"nope\" does not exist".to_string(),
            sqlstate: "42P01".to_string(),
            detail: None,
            hint: Some("check the name".to_string()),
        }
        .into();

        assert_eq!(DbErrorKind::Execution, err.kind());
        assert_eq!("relation \"nope\" does not exist", err.get_msg());
        assert_eq!(Some("42P01"), err.sqlstate());
        assert!(err.to_string().contains("hint: check the name"));
    }

    #[test]
    fn client_errors_are_execution_errors() {
        let err: DbError = PostgresError::Closed.into();
        assert_eq!(DbErrorKind::Execution, err.kind());
        assert_eq!(None, err.sqlstate());
    }
}
