//! End-to-end script execution: transactional blocks, retry recovery and
//! script-level control flow.

use std::sync::Arc;

use wrendb_exec::ast::{
    BinaryOp, Expr, InsertStatement, LetValue, SelectStatement, Statement,
};
use wrendb_exec::memory::MemorySession;
use wrendb_exec::{CommandContext, DatabaseSession, ScriptExecutor, Value};

fn setup() -> (Arc<MemorySession>, Arc<CommandContext>) {
    let session = Arc::new(MemorySession::new());
    session.create_class("Person", None).unwrap();
    let ctx = CommandContext::new(Arc::clone(&session) as Arc<dyn DatabaseSession>);
    (session, ctx)
}

fn insert(name: &str) -> Statement {
    Statement::Insert(InsertStatement {
        class_name: "Person".to_string(),
        set_items: vec![("name".to_string(), Expr::literal(name))],
        require_base: None,
    })
}

fn raise_conflict() -> Statement {
    Statement::Expr(Expr::Call { name: "raise_conflict".to_string(), args: vec![] })
}

/// `$retries` counts attempts from inside the block; each attempt below
/// the threshold raises a conflict itself. Variable state survives the
/// rollbacks, so the block converges.
#[test]
fn in_block_conflicts_retry_with_surviving_variables() {
    let (session, ctx) = setup();
    let script = vec![
        Statement::Let {
            name: "$retries".to_string(),
            value: LetValue::Expr(Expr::literal(0i64)),
        },
        Statement::Begin,
        Statement::Insert(InsertStatement {
            class_name: "Person".to_string(),
            set_items: vec![
                ("name".to_string(), Expr::literal("attempted")),
                ("attempt".to_string(), Expr::variable("$retries")),
            ],
            require_base: None,
        }),
        Statement::Let {
            name: "$retries".to_string(),
            value: LetValue::Expr(Expr::binary(
                BinaryOp::Add,
                Expr::variable("$retries"),
                Expr::literal(1i64),
            )),
        },
        Statement::If {
            condition: Expr::binary(
                BinaryOp::Lt,
                Expr::variable("$retries"),
                Expr::literal(5i64),
            ),
            block: vec![raise_conflict()],
        },
        Statement::commit_retry(10),
    ];

    ScriptExecutor::new().execute(&script, &ctx).unwrap();

    assert_eq!(ctx.variable("$retries"), Some(Value::Int(5)));
    assert!(!session.in_transaction());
    // The four failed attempts were rolled back; the surviving record
    // was written by the fifth, with the counter as it stood on entry.
    let records = session.scan_class("Person").unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].read().unwrap().get("attempt"), Some(&Value::Int(4)));
}

#[test]
fn else_block_runs_only_after_exhaustion() {
    let (session, ctx) = setup();
    session.inject_commit_conflicts(1);

    let script = vec![
        Statement::Begin,
        insert("a"),
        Statement::Commit {
            retry: 3,
            else_block: Some(vec![Statement::Let {
                name: "$gave_up".to_string(),
                value: LetValue::Expr(Expr::literal(true)),
            }]),
            else_fail: true,
        },
    ];
    ScriptExecutor::new().execute(&script, &ctx).unwrap();

    // One conflict, then success on the second attempt.
    assert_eq!(ctx.variable("$gave_up"), None);
    assert_eq!(session.record_count("Person").unwrap(), 1);
}

#[test]
fn else_fail_re_raises_after_the_else_block() {
    let (session, ctx) = setup();
    session.inject_commit_conflicts(10);

    let script = vec![
        Statement::Begin,
        insert("a"),
        Statement::Commit {
            retry: 2,
            else_block: Some(vec![Statement::Let {
                name: "$gave_up".to_string(),
                value: LetValue::Expr(Expr::literal(true)),
            }]),
            else_fail: true,
        },
    ];
    let err = ScriptExecutor::new().execute(&script, &ctx).unwrap_err();

    assert!(matches!(err, wrendb_exec::ExecutionError::Conflict(_)));
    assert_eq!(ctx.variable("$gave_up"), Some(Value::Bool(true)));
    assert_eq!(session.record_count("Person").unwrap(), 0);
}

#[test]
fn else_continue_swallows_the_exhausted_conflict() {
    let (session, ctx) = setup();
    session.inject_commit_conflicts(10);

    let script = vec![
        Statement::Begin,
        insert("a"),
        Statement::Commit { retry: 2, else_block: None, else_fail: false },
        insert("after"),
    ];
    ScriptExecutor::new().execute(&script, &ctx).unwrap();

    // The block never committed, but the script carried on.
    assert_eq!(session.record_count("Person").unwrap(), 1);
    assert!(!session.in_transaction());
}

#[test]
fn return_inside_a_transaction_block_ends_the_script() {
    let (session, ctx) = setup();
    let script = vec![
        Statement::Begin,
        insert("a"),
        Statement::commit(),
        Statement::Return(Some(Expr::literal("done"))),
        insert("never"),
    ];
    let output = ScriptExecutor::new().execute(&script, &ctx).unwrap();

    assert_eq!(output.len(), 1);
    assert_eq!(output[0].get("value"), Some(&Value::from("done")));
    assert_eq!(session.record_count("Person").unwrap(), 1);
}

#[test]
fn return_inside_a_retry_block_commits_and_ends_the_script() {
    let (session, ctx) = setup();
    let script = vec![
        Statement::Begin,
        insert("a"),
        Statement::Return(Some(Expr::literal("done"))),
        Statement::commit_retry(3),
        insert("after"),
    ];
    let output = ScriptExecutor::new().execute(&script, &ctx).unwrap();

    assert_eq!(output.len(), 1);
    assert_eq!(output[0].get("value"), Some(&Value::from("done")));
    assert!(!session.in_transaction());
    // The block committed on the way out; the trailing insert never ran.
    assert_eq!(session.record_count("Person").unwrap(), 1);
}

#[test]
fn uncaught_commit_conflict_leaves_the_transaction_rolled_back() {
    let (session, ctx) = setup();
    session.inject_commit_conflicts(1);

    let script = vec![Statement::Begin, insert("a"), Statement::commit()];
    let err = ScriptExecutor::new().execute(&script, &ctx).unwrap_err();

    assert!(matches!(err, wrendb_exec::ExecutionError::Conflict(_)));
    assert!(!session.in_transaction());
    assert_eq!(session.record_count("Person").unwrap(), 0);
}

#[test]
fn script_output_is_the_last_statements_rows() {
    let (_, ctx) = setup();
    let script = vec![
        insert("a"),
        insert("b"),
        Statement::Select(SelectStatement::from_class("Person")),
    ];
    let output = ScriptExecutor::new().execute(&script, &ctx).unwrap();
    assert_eq!(output.len(), 2);
}

#[test]
fn conflicts_outside_a_retry_block_propagate() {
    let (_, ctx) = setup();
    let script = vec![raise_conflict()];
    let err = ScriptExecutor::new().execute(&script, &ctx).unwrap_err();
    assert!(matches!(err, wrendb_exec::ExecutionError::Conflict(_)));
}
