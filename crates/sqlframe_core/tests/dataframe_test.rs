mod setup;

use setup::*;
use sqlframe_core::functions::builtin::{count_all, sum};
use sqlframe_core::{ApplyOptions, ColumnSelection, DataType, JoinKind, lit};
use sqlframe_error::{ConstructionKind, DbErrorKind};

#[test]
fn join_without_conflicts_resolves() {
    let (db, _) = database();
    let t = employees(&db);
    let d = departments(&db);

    let joined = t.inner_join(&d, [("dept", "dept_name")]).unwrap();
    let columns = joined.columns().unwrap().unwrap();
    assert_eq!(
        vec!["id", "dept", "salary", "dept_name", "budget"],
        columns.names().collect::<Vec<_>>()
    );
}

#[test]
fn join_with_conflicting_names_rejected() {
    let (db, _) = database();
    let t = employees(&db);
    let other = employees(&db);

    let err = t.inner_join(&other, [("dept", "dept")]).unwrap_err();
    assert_eq!(
        Some(ConstructionKind::AmbiguousColumn),
        err.construction_kind()
    );

    // Renaming the other side fixes it.
    t.join(&other)
        .on_columns([("dept", "dept")])
        .other_columns(ColumnSelection::renamed([("id", "other_id")]))
        .build()
        .unwrap();
}

#[test]
fn join_condition_from_inputs() {
    let (db, _) = database();
    let t = employees(&db);
    let d = departments(&db);

    let joined = t
        .join(&d)
        .kind(JoinKind::Left)
        .on(|l, r| {
            l.col("dept")?
                .eq(r.col("dept_name")?)?
                .and(r.col("budget")?.gt(l.col("salary")?)?)
        })
        .build()
        .unwrap();
    let sql = joined.sql().unwrap();
    assert!(
        sql.ends_with(
            "LEFT JOIN \"departments\" AS \"t_1\" ON ((\"t_0\".\"dept\" = \"t_1\".\"dept_name\") AND (\"t_1\".\"budget\" > \"t_0\".\"salary\"))"
        ),
        "{sql}"
    );
}

#[test]
fn join_condition_combined_with_pairs() {
    let (db, _) = database();
    let t = employees(&db);
    let m = managers(&db);

    let joined = t
        .join(&m)
        .on_columns([("dept", "dept")])
        .on(|l, r| {
            l.col("salary")?
                .gt(lit(0_i64))?
                .and(r.col("manager")?.is_not_null()?)
        })
        .other_columns(ColumnSelection::named(&["manager"]))
        .build()
        .unwrap();

    let columns = joined.columns().unwrap().unwrap();
    assert_eq!(
        vec!["id", "dept", "salary", "manager"],
        columns.names().collect::<Vec<_>>()
    );
    let sql = joined.sql().unwrap();
    assert!(sql.contains("JOIN \"managers\" AS \"t_1\" ON "), "{sql}");
    assert!(sql.contains("(\"t_0\".\"dept\" = \"t_1\".\"dept\")"), "{sql}");
    assert!(sql.contains("\"t_1\".\"manager\""), "{sql}");
}

#[test]
fn join_requires_condition() {
    let (db, _) = database();
    let t = employees(&db);
    let d = departments(&db);

    let err = t.join(&d).build().unwrap_err();
    assert_eq!(Some(ConstructionKind::InvalidArgument), err.construction_kind());

    let err = t
        .join(&d)
        .kind(JoinKind::Cross)
        .on_columns([("dept", "dept_name")])
        .build()
        .unwrap_err();
    assert_eq!(Some(ConstructionKind::InvalidArgument), err.construction_kind());

    t.cross_join(&d).unwrap();
}

#[test]
fn columns_of_other_frames_rejected() {
    let (db, _) = database();
    let t = employees(&db);
    let d = departments(&db);

    let err = t
        .filter(d.col("budget").unwrap().gt(lit(1_i64)).unwrap())
        .unwrap_err();
    assert_eq!(Some(ConstructionKind::SchemaMismatch), err.construction_kind());

    let err = t
        .col("salary")
        .unwrap()
        .eq(d.col("budget").unwrap())
        .unwrap_err();
    assert_eq!(Some(ConstructionKind::SchemaMismatch), err.construction_kind());
}

#[test]
fn frames_of_other_databases_rejected() {
    let (db1, _) = database();
    let (db2, _) = database();
    let err = employees(&db1)
        .inner_join(&departments(&db2), [("dept", "dept_name")])
        .unwrap_err();
    assert_eq!(Some(ConstructionKind::SchemaMismatch), err.construction_kind());
}

#[test]
fn unknown_column_suggests_name() {
    let (db, _) = database();
    let t = employees(&db);
    let err = t.col("salery").unwrap_err();
    assert_eq!(Some(ConstructionKind::UnresolvedColumn), err.construction_kind());
    assert!(err.to_string().contains("salary"), "{err}");
}

#[test]
fn filter_requires_boolean() {
    let (db, _) = database();
    let t = employees(&db);
    let err = t.filter(t.col("salary").unwrap()).unwrap_err();
    assert_eq!(Some(ConstructionKind::TypeMismatch), err.construction_kind());
}

#[test]
fn aggregates_rejected_row_wise() {
    let (db, _) = database();
    let t = employees(&db);
    let total = sum(t.col("salary").unwrap()).unwrap();

    let err = t.assign([("total", total.clone())]).unwrap_err();
    assert_eq!(Some(ConstructionKind::InvalidArgument), err.construction_kind());

    let err = t.select_exprs([total.rename("total")]).unwrap_err();
    assert_eq!(Some(ConstructionKind::InvalidArgument), err.construction_kind());
}

#[test]
fn assign_replaces_and_appends() {
    let (db, _) = database();
    let t = employees(&db);
    let df = t
        .assign([
            ("salary", t.col("salary").unwrap().mul(lit(2_i64)).unwrap()),
            ("bonus", lit(10_i64)),
        ])
        .unwrap();
    let columns = df.columns().unwrap().unwrap();
    assert_eq!(
        vec!["id", "dept", "salary", "bonus"],
        columns.names().collect::<Vec<_>>()
    );
}

#[test]
fn unresolved_relation() {
    let (db, _) = database();
    let raw = db.table("raw");

    // Columns of unresolved relations have deferred types.
    assert_eq!(DataType::Unknown, raw.col("anything").unwrap().datatype());

    let err = raw.assign([("x", lit(1_i64))]).unwrap_err();
    assert_eq!(Some(ConstructionKind::AmbiguousColumn), err.construction_kind());

    // Selecting resolves the schema.
    let selected = raw.select(&["a", "b"]).unwrap();
    assert!(selected.output_schema().unwrap().is_resolved());

    // Wildcard on an unresolved side with columns from the other side.
    let d = departments(&db);
    let err = raw.inner_join(&d, [("dept", "dept_name")]).unwrap_err();
    assert_eq!(Some(ConstructionKind::AmbiguousColumn), err.construction_kind());

    let joined = raw
        .join(&d)
        .on_columns([("dept", "dept_name")])
        .other_columns(ColumnSelection::None)
        .build()
        .unwrap();
    let sql = joined.sql().unwrap();
    assert!(sql.starts_with("SELECT \"t_0\".* FROM \"raw\""), "{sql}");
}

#[test]
fn grouped_non_key_columns_rejected() {
    let (db, _) = database();
    let t = employees(&db);
    let grouped = t.group_by(&["dept"]).unwrap();

    let err = grouped
        .assign([("x", t.col("salary").unwrap())])
        .unwrap_err();
    assert_eq!(Some(ConstructionKind::UnresolvedColumn), err.construction_kind());

    grouped
        .assign([
            ("n", count_all()),
            ("total", sum(t.col("salary").unwrap()).unwrap()),
        ])
        .unwrap();
}

#[test]
fn grouping_sets_union() {
    let (db, _) = database();
    let t = employees(&db);
    let by_dept = t.group_by(&["dept"]).unwrap();
    let by_id = t.group_by(&["id"]).unwrap();

    let df = by_dept
        .union(&by_id)
        .unwrap()
        .apply(count_all(), ApplyOptions::named("n"))
        .unwrap();
    let sql = df.sql().unwrap();
    assert!(
        sql.ends_with("GROUP BY GROUPING SETS ((\"t_0\".\"dept\"), (\"t_0\".\"id\"))"),
        "{sql}"
    );
    let columns = df.columns().unwrap().unwrap();
    assert_eq!(vec!["dept", "id", "n"], columns.names().collect::<Vec<_>>());

    let other = employees(&db).group_by(&["dept"]).unwrap();
    let err = by_dept.union(&other).unwrap_err();
    assert_eq!(
        Some(ConstructionKind::IncompatibleGrouping),
        err.construction_kind()
    );
}

#[test]
fn apply_output_conflicting_with_key() {
    let (db, _) = database();
    let t = employees(&db);
    let err = t
        .group_by(&["dept"])
        .unwrap()
        .apply(count_all(), ApplyOptions::named("dept"))
        .unwrap_err();
    assert_eq!(Some(ConstructionKind::AmbiguousColumn), err.construction_kind());
}

#[test]
fn apply_aggregate_to_whole_frame() {
    let (db, _) = database();
    let t = employees(&db);
    let df = t
        .apply(sum(t.col("salary").unwrap()).unwrap(), ApplyOptions::default())
        .unwrap();
    assert_eq!(
        "SELECT \"sum\"(\"t_0\".\"salary\") AS \"sum\" FROM \"employees\" AS \"t_0\"",
        df.sql().unwrap()
    );
}

#[test]
fn construction_errors_are_not_execution_errors() {
    let (db, executor) = database();
    let t = employees(&db);
    let err = t.select(&["missing"]).unwrap_err();
    assert!(matches!(err.kind(), DbErrorKind::Construction(_)));
    assert!(executor.statements().is_empty());
}
