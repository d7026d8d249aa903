mod setup;

use std::sync::Arc;

use setup::*;
use sqlframe_core::functions::{
    PlPgSqlEnvironment,
    RemoteFunction,
    ReturnShape,
    ScriptEnvironment,
    SqlEnvironment,
};
use sqlframe_core::{ApplyOptions, DataType, RecordField, RecordType, ScalarValue, lit};
use sqlframe_error::{ConstructionKind, DbError, DbErrorKind};

fn double(body: &str) -> Arc<RemoteFunction> {
    RemoteFunction::scalar()
        .name("double")
        .param("x", DataType::Int64)
        .returns(ReturnShape::Value(DataType::Int64))
        .body(SqlEnvironment, body)
        .build()
        .unwrap()
}

#[test]
fn functions_deployed_once() {
    let (db, executor) = database();
    let t = employees(&db);
    let f = double("SELECT x * 2");

    let doubled = t
        .assign([("doubled", f.call([t.col("salary").unwrap()]).unwrap())])
        .unwrap();
    doubled.fetch().unwrap();

    let sql = executor.sql();
    assert_eq!(2, sql.len());
    assert_eq!(
        "CREATE FUNCTION \"pg_temp\".\"double\"(\"x\" int8) RETURNS int8 AS $sqlframe$SELECT x * 2$sqlframe$ LANGUAGE \"sql\"",
        sql[0]
    );
    assert_eq!(
        "SELECT \"t_0\".\"id\" AS \"id\", \"t_0\".\"dept\" AS \"dept\", \"t_0\".\"salary\" AS \"salary\", \"pg_temp\".\"double\"(\"t_0\".\"salary\") AS \"doubled\" FROM \"employees\" AS \"t_0\"",
        sql[1]
    );

    // Using it again only runs the query.
    let filtered = t
        .filter(
            f.call([t.col("salary").unwrap()])
                .unwrap()
                .gt(lit(10_i64))
                .unwrap(),
        )
        .unwrap();
    filtered.fetch().unwrap();
    let sql = executor.sql();
    assert_eq!(3, sql.len());
    assert!(sql[2].starts_with("SELECT * FROM"), "{}", sql[2]);
}

#[test]
fn conflicting_definition_rejected() {
    let (db, _) = database();
    db.deploy_function(&double("SELECT x * 2")).unwrap();
    db.deploy_function(&double("SELECT x * 2")).unwrap();

    let err = db.deploy_function(&double("SELECT x + x")).unwrap_err();
    assert_eq!(DbErrorKind::DefinitionConflict, err.kind());
}

fn stored_function(body: &str, result: &str, language: &str) -> sqlframe_core::RowSet {
    rows(
        &[
            ("prosrc", DataType::Text),
            ("pg_get_function_result", DataType::Text),
            ("lanname", DataType::Text),
        ],
        vec![vec![
            ScalarValue::from(body),
            ScalarValue::from(result),
            ScalarValue::from(language),
        ]],
    )
}

fn duplicate_function() -> DbError {
    DbError::execution("function already exists").with_sqlstate("42723")
}

#[test]
fn existing_identical_definition_reused() {
    let (db, executor) = database();
    executor.push_error(duplicate_function());
    executor.push_rows(stored_function("SELECT x * 2", "bigint", "sql"));

    db.deploy_function(&double("SELECT x * 2")).unwrap();
    let statements = executor.statements();
    assert_eq!(2, statements.len());
    assert!(statements[1].sql.contains("to_regprocedure"), "{}", statements[1].sql);
    assert_eq!(
        vec![ScalarValue::from("\"pg_temp\".\"double\"(int8)")],
        statements[1].params
    );

    // Recorded, so it isn't checked again.
    db.deploy_function(&double("SELECT x * 2")).unwrap();
    assert_eq!(2, executor.statements().len());
}

#[test]
fn existing_different_definition_conflicts() {
    let (db, executor) = database();
    executor.push_error(duplicate_function());
    executor.push_rows(stored_function("SELECT x * 3", "bigint", "sql"));

    let err = db.deploy_function(&double("SELECT x * 2")).unwrap_err();
    assert_eq!(DbErrorKind::DefinitionConflict, err.kind());
}

#[test]
fn existing_definition_with_other_result_conflicts() {
    let (db, executor) = database();
    executor.push_error(duplicate_function());
    executor.push_rows(stored_function("SELECT x * 2", "double precision", "sql"));

    let err = db.deploy_function(&double("SELECT x * 2")).unwrap_err();
    assert_eq!(DbErrorKind::DefinitionConflict, err.kind());
}

#[test]
fn existing_definition_in_other_language_conflicts() {
    let (db, executor) = database();
    executor.push_error(duplicate_function());
    executor.push_rows(stored_function("SELECT x * 2", "bigint", "plpgsql"));

    let err = db.deploy_function(&double("SELECT x * 2")).unwrap_err();
    assert_eq!(DbErrorKind::DefinitionConflict, err.kind());
}

#[test]
fn existing_overload_with_other_signature_conflicts() {
    let (db, executor) = database();
    executor.push_error(duplicate_function());
    // No function with the exact signature.
    executor.push_rows(rows(
        &[
            ("prosrc", DataType::Text),
            ("pg_get_function_result", DataType::Text),
            ("lanname", DataType::Text),
        ],
        Vec::new(),
    ));

    let err = db.deploy_function(&double("SELECT x * 2")).unwrap_err();
    assert_eq!(DbErrorKind::DefinitionConflict, err.kind());
}

fn my_sum(initial: i64) -> Arc<RemoteFunction> {
    RemoteFunction::aggregate()
        .name("my_sum")
        .param("x", DataType::Int64)
        .state("acc", DataType::Int64)
        .transition(SqlEnvironment, "SELECT acc + x")
        .initial_state(initial)
        .build()
        .unwrap()
}

fn stored_aggregate(
    same_transition: bool,
    same_state: bool,
    initial: &str,
    same_final: bool,
) -> sqlframe_core::RowSet {
    rows(
        &[
            ("transition", DataType::Boolean),
            ("state", DataType::Boolean),
            ("agginitval", DataType::Text),
            ("final", DataType::Boolean),
        ],
        vec![vec![
            ScalarValue::from(same_transition),
            ScalarValue::from(same_state),
            ScalarValue::from(initial),
            ScalarValue::from(same_final),
        ]],
    )
}

#[test]
fn existing_identical_aggregate_reused() {
    let (db, executor) = database();
    executor.push_error(duplicate_function());
    executor.push_rows(stored_function("SELECT acc + x", "bigint", "sql"));
    executor.push_error(DbError::execution("function already exists").with_sqlstate("42723"));
    executor.push_rows(stored_aggregate(true, true, "0", true));

    db.deploy_function(&my_sum(0)).unwrap();
    let statements = executor.statements();
    assert_eq!(4, statements.len());
    assert!(statements[3].sql.contains("pg_aggregate"), "{}", statements[3].sql);
    assert_eq!(
        vec![
            ScalarValue::from("\"pg_temp\".\"my_sum\"(int8)"),
            ScalarValue::from("\"pg_temp\".\"my_sum__sfunc\"(int8, int8)"),
            ScalarValue::from("int8"),
            ScalarValue::Null,
        ],
        statements[3].params
    );
}

#[test]
fn existing_aggregate_with_other_initial_state_conflicts() {
    let (db, executor) = database();
    executor.push_error(duplicate_function());
    executor.push_rows(stored_function("SELECT acc + x", "bigint", "sql"));
    executor.push_error(duplicate_function());
    executor.push_rows(stored_aggregate(true, true, "0", true));

    let err = db.deploy_function(&my_sum(10)).unwrap_err();
    assert_eq!(DbErrorKind::DefinitionConflict, err.kind());
}

#[test]
fn existing_aggregate_with_other_transition_conflicts() {
    let (db, executor) = database();
    executor.push_empty();
    executor.push_error(duplicate_function());
    executor.push_rows(stored_aggregate(false, true, "0", true));

    let err = db.deploy_function(&my_sum(0)).unwrap_err();
    assert_eq!(DbErrorKind::DefinitionConflict, err.kind());
}

#[test]
fn other_backend_errors_propagate() {
    let (db, executor) = database();
    executor.push_error(DbError::execution("language \"plpython3u\" does not exist").with_sqlstate("42704"));

    let f = RemoteFunction::scalar()
        .name("py_double")
        .param("x", DataType::Int64)
        .returns(ReturnShape::Value(DataType::Int64))
        .body(ScriptEnvironment::new("plpython3u"), "return x * 2")
        .build()
        .unwrap();
    let err = db.deploy_function(&f).unwrap_err();
    assert_eq!(DbErrorKind::Execution, err.kind());
    assert_eq!(Some("42704"), err.sqlstate());

    // Nothing was recorded, so the next attempt deploys again.
    db.deploy_function(&f).unwrap();
    assert_eq!(2, executor.statements().len());
}

#[test]
fn drop_function_allows_redeploy() {
    let (db, executor) = database();
    let f = double("SELECT x * 2");
    db.deploy_function(&f).unwrap();
    db.drop_function(&f).unwrap();
    db.deploy_function(&double("SELECT x + x")).unwrap();

    let sql = executor.sql();
    assert_eq!(3, sql.len());
    assert_eq!("DROP FUNCTION IF EXISTS \"pg_temp\".\"double\"(int8)", sql[1]);
}

#[test]
fn record_types_deployed_before_functions() {
    let (db, executor) = database();
    let stats = RecordType::new(
        "stats",
        [
            RecordField::new("lo", DataType::Int64),
            RecordField::new("hi", DataType::Int64),
        ],
    );
    let f = RemoteFunction::array()
        .name("range_of")
        .aggregated_param("v", DataType::Int64)
        .returns(ReturnShape::Record(stats))
        .body(PlPgSqlEnvironment, "RETURN (min(v), max(v));")
        .build()
        .unwrap();

    let t = employees(&db);
    let df = t
        .group_by(&["dept"])
        .unwrap()
        .apply(
            f.call([t.col("salary").unwrap()]).unwrap(),
            ApplyOptions::expanded(),
        )
        .unwrap();
    let columns = df.columns().unwrap().unwrap();
    assert_eq!(vec!["dept", "lo", "hi"], columns.names().collect::<Vec<_>>());

    df.fetch().unwrap();
    let sql = executor.sql();
    assert_eq!(3, sql.len());
    assert_eq!(
        "CREATE TYPE \"pg_temp\".\"stats\" AS (\"lo\" int8, \"hi\" int8)",
        sql[0]
    );
    assert!(sql[1].starts_with("CREATE FUNCTION \"pg_temp\".\"range_of\""), "{}", sql[1]);
    assert!(
        sql[2].contains("\"pg_temp\".\"range_of\"(array_agg(\"t_0\".\"salary\")) AS \"__rv\""),
        "{}",
        sql[2]
    );
    assert!(sql[2].contains("(\"t_1\".\"__rv\").\"lo\" AS \"lo\""), "{}", sql[2]);
}

#[test]
fn array_functions_rejected_row_wise() {
    let (db, _) = database();
    let f = RemoteFunction::array()
        .name("total")
        .aggregated_param("v", DataType::Int64)
        .returns(ReturnShape::Value(DataType::Int64))
        .body(SqlEnvironment, "SELECT sum(x) FROM unnest(v) AS x")
        .build()
        .unwrap();
    let t = employees(&db);
    let err = t
        .assign([("total", f.call([t.col("salary").unwrap()]).unwrap())])
        .unwrap_err();
    assert_eq!(Some(ConstructionKind::InvalidArgument), err.construction_kind());
}

#[test]
fn frameless_apply() {
    let (db, executor) = database();
    let f = double("SELECT x * 2");
    let df = db
        .apply(f.call([lit(21_i64)]).unwrap(), ApplyOptions::named("answer"))
        .unwrap();
    df.fetch().unwrap();
    assert_eq!(
        "SELECT \"pg_temp\".\"double\"($1::int8) AS \"answer\"",
        executor.sql()[1]
    );
}

#[test]
fn function_schema_setting_applies() {
    let (db, executor) = database();
    db.set_setting("function_schema", "udfs").unwrap();
    db.deploy_function(&double("SELECT x * 2")).unwrap();
    assert!(
        executor.sql()[0].starts_with("CREATE FUNCTION \"udfs\".\"double\""),
        "{}",
        executor.sql()[0]
    );
}
