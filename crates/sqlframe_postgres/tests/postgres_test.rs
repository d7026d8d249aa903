mod setup;

use chrono::NaiveDate;
use sqlframe_core::functions::builtin::{count_all, sum};
use sqlframe_core::functions::{ReturnShape, SqlEnvironment};
use sqlframe_core::types::RecordValue;
use sqlframe_core::{ApplyOptions, DataType, RemoteFunction, SaveOptions, ScalarValue, lit};
use sqlframe_error::DbErrorKind;

macro_rules! connect_or_skip {
    () => {
        match setup::connect() {
            Some(db) => db,
            None => {
                eprintln!("{} not set, skipping", setup::POSTGRES_URL_VAR);
                return;
            }
        }
    };
}

#[test]
fn literals_decode_natively() {
    let db = connect_or_skip!();
    let rows = db
        .execute(
            "SELECT true AS b, 2::int2 AS s, 3::int4 AS i, 4::int8 AS l, 1.5::float4 AS f, 'x'::varchar AS t, '\\x0102'::bytea AS bin, DATE '2024-02-29' AS d, 12.50::numeric AS n",
            &[],
        )
        .unwrap()
        .unwrap();
    let row = rows.row(0).unwrap();
    assert_eq!(&ScalarValue::Boolean(true), row.try_get("b").unwrap());
    assert_eq!(&ScalarValue::Int32(2), row.try_get("s").unwrap());
    assert_eq!(&ScalarValue::Int32(3), row.try_get("i").unwrap());
    assert_eq!(&ScalarValue::Int64(4), row.try_get("l").unwrap());
    assert_eq!(&ScalarValue::Float64(1.5), row.try_get("f").unwrap());
    assert_eq!(&ScalarValue::from("x"), row.try_get("t").unwrap());
    assert_eq!(&ScalarValue::Binary(vec![1, 2]), row.try_get("bin").unwrap());
    assert_eq!(
        &ScalarValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()),
        row.try_get("d").unwrap()
    );
    assert_eq!(&ScalarValue::from("12.50"), row.try_get("n").unwrap());
}

#[test]
fn arrays_bind_and_decode() {
    let db = connect_or_skip!();
    let list = ScalarValue::list(
        DataType::Int64,
        [ScalarValue::Int64(1), ScalarValue::Null, ScalarValue::Int64(3)],
    );
    let rows = db
        .execute("SELECT $1::int8[] AS a", std::slice::from_ref(&list))
        .unwrap()
        .unwrap();
    assert_eq!(&list, rows.row(0).unwrap().try_get("a").unwrap());
}

#[test]
fn backend_errors_keep_sqlstate() {
    let db = connect_or_skip!();
    let err = db.table("sqlframe_missing_table").fetch().unwrap_err();
    assert_eq!(DbErrorKind::Execution, err.kind());
    assert_eq!(Some("42P01"), err.sqlstate());
    assert!(err.sql().is_some());
}

#[test]
fn save_and_group() {
    let db = connect_or_skip!();
    let df = db
        .from_rows(
            &["dept", "salary"],
            vec![
                vec![ScalarValue::from("eng"), ScalarValue::Int64(10)],
                vec![ScalarValue::from("eng"), ScalarValue::Int64(20)],
                vec![ScalarValue::from("ops"), ScalarValue::Int64(5)],
            ],
        )
        .unwrap();
    let saved = df
        .save_as(
            "sqlframe_salaries",
            SaveOptions::temporary().with_replace(true),
        )
        .unwrap();

    let totals = saved
        .group_by(&["dept"])
        .unwrap()
        .assign([
            ("n", count_all()),
            ("total", sum(saved.col("salary").unwrap()).unwrap()),
        ])
        .unwrap();
    let ordered = totals
        .order_by([totals.col("dept").unwrap().asc()])
        .unwrap();

    let rows: Vec<_> = ordered
        .iter()
        .unwrap()
        .map(|row| {
            (
                row.try_get("dept").unwrap().clone(),
                row.try_get("n").unwrap().clone(),
                row.try_get("total").unwrap().clone(),
            )
        })
        .collect();
    assert_eq!(
        vec![
            (ScalarValue::from("eng"), ScalarValue::Int64(2), ScalarValue::from("30")),
            (ScalarValue::from("ops"), ScalarValue::Int64(1), ScalarValue::from("5")),
        ],
        rows
    );
}

#[test]
fn remote_function_round_trip() {
    let db = connect_or_skip!();
    let double = RemoteFunction::scalar()
        .name("sqlframe_double")
        .param("x", DataType::Int64)
        .returns(ReturnShape::Value(DataType::Int64))
        .body(SqlEnvironment, "SELECT x * 2")
        .build()
        .unwrap();

    let df = db
        .apply(double.call([lit(21_i64)]).unwrap(), ApplyOptions::named("answer"))
        .unwrap();
    assert_eq!(
        &ScalarValue::Int64(42),
        df.row(0).unwrap().try_get("answer").unwrap()
    );
}

#[test]
fn composite_values_decode() {
    let db = connect_or_skip!();
    db.execute("CREATE TYPE pg_temp.sqlframe_pair AS (a int8, b text)", &[])
        .unwrap();
    let rows = db
        .execute("SELECT ROW(1, NULL)::pg_temp.sqlframe_pair AS p", &[])
        .unwrap()
        .unwrap();
    assert_eq!(
        &ScalarValue::Record(RecordValue {
            type_name: "sqlframe_pair".to_string(),
            fields: vec![
                ("a".to_string(), ScalarValue::Int64(1)),
                ("b".to_string(), ScalarValue::Null),
            ],
        }),
        rows.row(0).unwrap().try_get("p").unwrap()
    );
}

fn column_values(df: &sqlframe_core::DataFrame, column: &str) -> Vec<ScalarValue> {
    df.iter()
        .unwrap()
        .map(|row| row.try_get(column).unwrap().clone())
        .collect()
}

#[test]
fn distinct_on_keeps_one_row_per_key() {
    let db = connect_or_skip!();
    let df = db
        .from_rows(
            &["k", "v"],
            vec![
                vec![ScalarValue::from("a"), ScalarValue::Int64(1)],
                vec![ScalarValue::from("a"), ScalarValue::Int64(2)],
                vec![ScalarValue::from("b"), ScalarValue::Int64(3)],
                vec![ScalarValue::from("b"), ScalarValue::Int64(4)],
                vec![ScalarValue::from("c"), ScalarValue::Int64(5)],
            ],
        )
        .unwrap();
    let latest = df
        .order_by([df.col("v").unwrap().desc()])
        .unwrap()
        .distinct_on(&["k"])
        .unwrap();

    assert_eq!(3, latest.len().unwrap());
    assert_eq!(
        vec![ScalarValue::from("a"), ScalarValue::from("b"), ScalarValue::from("c")],
        column_values(&latest, "k")
    );
    assert_eq!(
        vec![ScalarValue::Int64(2), ScalarValue::Int64(4), ScalarValue::Int64(5)],
        column_values(&latest, "v")
    );
}

#[test]
fn remote_function_over_column_ordered() {
    let db = connect_or_skip!();
    let double = RemoteFunction::scalar()
        .name("sqlframe_double")
        .param("x", DataType::Int64)
        .returns(ReturnShape::Value(DataType::Int64))
        .body(SqlEnvironment, "SELECT x * 2")
        .build()
        .unwrap();
    let df = db
        .from_rows(
            &["x"],
            vec![
                vec![ScalarValue::Int64(3)],
                vec![ScalarValue::Int64(1)],
                vec![ScalarValue::Int64(2)],
            ],
        )
        .unwrap();
    let doubled = df
        .select_exprs([double.call([df.col("x").unwrap()]).unwrap().rename("y")])
        .unwrap();
    let ordered = doubled
        .order_by([doubled.col("y").unwrap().asc()])
        .unwrap();

    assert_eq!(
        vec![ScalarValue::Int64(2), ScalarValue::Int64(4), ScalarValue::Int64(6)],
        column_values(&ordered, "y")
    );
}

#[test]
fn cached_rows_until_refresh() {
    let db = connect_or_skip!();
    let df = db
        .from_rows(
            &["id"],
            vec![vec![ScalarValue::Int64(1)], vec![ScalarValue::Int64(2)]],
        )
        .unwrap();
    let saved = df
        .save_as("sqlframe_t1", SaveOptions::temporary().with_replace(true))
        .unwrap();
    assert_eq!(2, saved.len().unwrap());

    // Raw statements aren't tracked, so the cached rows are served as is.
    db.execute("INSERT INTO sqlframe_t1 (id) VALUES (3)", &[])
        .unwrap();
    assert_eq!(
        vec![ScalarValue::Int64(1), ScalarValue::Int64(2)],
        column_values(&saved, "id")
    );

    saved.refresh().unwrap();
    let mut ids = column_values(&saved, "id");
    ids.sort_by_key(|v| v.try_as_i64().unwrap());
    assert_eq!(
        vec![ScalarValue::Int64(1), ScalarValue::Int64(2), ScalarValue::Int64(3)],
        ids
    );
}

#[test]
fn inner_join_matches_shared_keys() {
    let db = connect_or_skip!();
    let a = db
        .from_rows(
            &["id", "a"],
            vec![
                vec![ScalarValue::Int64(1), ScalarValue::from("w")],
                vec![ScalarValue::Int64(2), ScalarValue::from("x")],
                vec![ScalarValue::Int64(3), ScalarValue::from("y")],
                vec![ScalarValue::Int64(4), ScalarValue::from("z")],
            ],
        )
        .unwrap();
    let b = db
        .from_rows(
            &["id", "b"],
            vec![
                vec![ScalarValue::Int64(1), ScalarValue::Int64(10)],
                vec![ScalarValue::Int64(2), ScalarValue::Int64(20)],
                vec![ScalarValue::Int64(3), ScalarValue::Int64(30)],
                vec![ScalarValue::Int64(5), ScalarValue::Int64(50)],
            ],
        )
        .unwrap();

    let joined = a.inner_join(&b, [("id", "id")]).unwrap();
    let ordered = joined
        .order_by([joined.col("id").unwrap().asc()])
        .unwrap();

    assert_eq!(3, ordered.len().unwrap());
    assert_eq!(
        vec![ScalarValue::Int64(1), ScalarValue::Int64(2), ScalarValue::Int64(3)],
        column_values(&ordered, "id")
    );
    assert_eq!(
        vec![ScalarValue::Int64(10), ScalarValue::Int64(20), ScalarValue::Int64(30)],
        column_values(&ordered, "b")
    );
}

#[test]
fn numeric_params_bind() {
    let db = connect_or_skip!();
    let rows = db
        .execute(
            "SELECT $1::numeric + 1 AS n",
            &[ScalarValue::from("-0.0001")],
        )
        .unwrap()
        .unwrap();
    assert_eq!(&ScalarValue::from("0.9999"), rows.row(0).unwrap().try_get("n").unwrap());
}
