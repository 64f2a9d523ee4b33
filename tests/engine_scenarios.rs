//! Drives the planner/executor through the public `Engine` API, end to
//! end, without a terminal in front of it.

use minidb::engine::{Engine, EngineConfig};
use minidb::executor::{execute, ExecOutput};
use minidb::sql::parser::Parser;

fn open(path: &std::path::Path) -> Engine {
    Engine::open(path.to_path_buf(), EngineConfig::default()).unwrap()
}

fn run(engine: &mut Engine, sql: &str) -> ExecOutput {
    let statement = Parser::parse(sql).unwrap();
    execute(engine, statement).unwrap()
}

fn rows(out: ExecOutput) -> Vec<String> {
    match out {
        ExecOutput::Rows(rows) => rows,
        _ => panic!("expected Rows"),
    }
}

#[test]
fn insert_then_select_returns_rows_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenario1.db");
    let mut engine = open(&path);

    run(&mut engine, "INSERT 1 alice alice@x;");
    run(&mut engine, "INSERT 2 bob bob@x;");
    let out = rows(run(&mut engine, "SELECT *;"));

    assert_eq!(out, vec!["(1, alice, alice@x)", "(2, bob, bob@x)"]);
}

#[test]
fn duplicate_key_insert_leaves_store_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenario2.db");
    let mut engine = open(&path);

    run(&mut engine, "INSERT 1 a a@x;");
    let statement = Parser::parse("INSERT 1 b b@x;").unwrap();
    let err = execute(&mut engine, statement).unwrap_err();
    assert!(matches!(err, minidb::errors::Error::DuplicateKey(1)));

    let out = rows(run(&mut engine, "SELECT *;"));
    assert_eq!(out, vec!["(1, a, a@x)"]);
}

#[test]
fn inserting_past_a_single_leaf_promotes_an_internal_root() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenario3.db");
    let mut engine = open(&path);

    for id in 1..=15u32 {
        run(&mut engine, &format!("INSERT {} user{} user{}@x;", id, id, id));
    }

    let out = rows(run(&mut engine, "SELECT *;"));
    assert_eq!(out.len(), 15);
    let ids: Vec<u32> = out
        .iter()
        .map(|r| {
            r.trim_start_matches('(')
                .split(',')
                .next()
                .unwrap()
                .parse()
                .unwrap()
        })
        .collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted, "full scan must come back in strictly increasing id order");

    let table = engine.tables.get_mut("users").unwrap();
    assert!(
        table.print_tree(table.root_page_num, 0).unwrap()[0].contains("internal"),
        "root should have split into an internal node by the 15th insert"
    );
}

#[test]
fn checkpoint_then_reopen_preserves_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenario4.db");

    {
        let mut engine = open(&path);
        for id in 1..=5u32 {
            run(&mut engine, &format!("INSERT {} user{} user{}@x;", id, id, id));
        }
        engine.checkpoint().unwrap();
        // Dropped here without calling close() to simulate a crash after
        // a checkpoint but before a clean shutdown.
    }

    let mut engine = open(&path);
    let out = rows(run(&mut engine, "SELECT *;"));
    assert_eq!(out.len(), 5);
}

#[test]
fn secondary_index_lookup_returns_all_matching_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenario5.db");
    let mut engine = open(&path);

    run(&mut engine, "CREATE INDEX ON users(username);");
    run(&mut engine, "INSERT 1 alice a@x;");
    run(&mut engine, "INSERT 2 alice b@x;");

    let out = rows(run(&mut engine, "SELECT * WHERE username='alice';"));
    assert_eq!(out.len(), 2);
    assert!(out.iter().all(|r| r.contains("alice")));
}

#[test]
fn explain_reports_index_search_on_id_and_full_scan_otherwise() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenario6.db");
    let mut engine = open(&path);

    for id in 1..=10u32 {
        run(&mut engine, &format!("INSERT {} user{} user{}@x;", id, id, id));
    }

    let plan = match run(&mut engine, "EXPLAIN SELECT * WHERE id=5;") {
        ExecOutput::Plan(p) => p,
        _ => panic!("expected Plan"),
    };
    assert!(plan.contains("INDEX SEARCH (B+Tree)"));
    assert!(plan.contains("Estimated Rows: 1"));

    let plan = match run(&mut engine, "EXPLAIN SELECT * WHERE username='x';") {
        ExecOutput::Plan(p) => p,
        _ => panic!("expected Plan"),
    };
    assert!(plan.contains("FULL TABLE SCAN"));
    assert!(plan.contains("Estimated Rows: 10"));
}

#[test]
fn closing_and_reopening_preserves_schema_and_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenario_persist.db");

    {
        let mut engine = open(&path);
        run(&mut engine, "CREATE TABLE widgets (id INT PRIMARY KEY, name VARCHAR(16));");
        run(&mut engine, "INSERT 1 alice a@x;");
        engine.close().unwrap();
    }

    let mut engine = open(&path);
    assert!(engine.schema.table_names().contains(&"widgets".to_string()));
    let out = rows(run(&mut engine, "SELECT *;"));
    assert_eq!(out, vec!["(1, alice, a@x)"]);
}
