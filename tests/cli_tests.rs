use predicates::prelude::PredicateBooleanExt;
use predicates::str::{contains, is_match};

mod common;
use common::{init_db_with_project, setup_test_db, zs};

#[test]
fn test_init_creates_database() {
    let db_path = setup_test_db("init");

    zs("init")
        .args(["--db", &db_path, "--test", "init"])
        .assert()
        .success()
        .stdout(contains("Database initialized"));

    assert!(std::path::Path::new(&db_path).exists());
}

#[test]
fn test_project_add_and_list() {
    let db_path = setup_test_db("project_list");
    init_db_with_project("project_list", &db_path);

    zs("project_list")
        .args(["--db", &db_path, "--test", "--as", "alice", "project", "list"])
        .assert()
        .success()
        .stdout(contains("Thesis"));

    // Another actor does not see alice's project unless universe mode is on.
    zs("project_list")
        .args(["--db", &db_path, "--test", "--as", "bob", "project", "list"])
        .assert()
        .success()
        .stdout(contains("Thesis").not());

    zs("project_list")
        .args(["--db", &db_path, "--test", "--as", "bob", "--all", "project", "list"])
        .assert()
        .success()
        .stdout(contains("Thesis"));
}

#[test]
fn test_project_add_requires_sign_in() {
    let db_path = setup_test_db("project_anon");
    zs("project_anon")
        .args(["--db", &db_path, "--test", "init"])
        .assert()
        .success();

    zs("project_anon")
        .args(["--db", &db_path, "--test", "--anonymous", "project", "add", "Nope"])
        .assert()
        .failure()
        .stderr(contains("Not authenticated"));
}

#[test]
fn test_project_edit_by_non_owner_is_rejected() {
    let db_path = setup_test_db("project_owner");
    init_db_with_project("project_owner", &db_path);

    zs("project_owner")
        .args([
            "--db", &db_path, "--test", "--as", "bob", "project", "edit", "1", "--name", "Mine",
        ])
        .assert()
        .failure()
        .stderr(contains("Only the owner"));

    zs("project_owner")
        .args([
            "--db", &db_path, "--test", "--as", "alice", "project", "edit", "1", "--name",
            "Dissertation",
        ])
        .assert()
        .success();

    zs("project_owner")
        .args(["--db", &db_path, "--test", "--as", "alice", "project", "show", "1"])
        .assert()
        .success()
        .stdout(contains("Dissertation"));
}

#[test]
fn test_start_then_stop_session() {
    let db_path = setup_test_db("start_stop");
    init_db_with_project("start_stop", &db_path);

    zs("start_stop")
        .args(["--db", &db_path, "--test", "--as", "alice", "start", "1", "Chapter one"])
        .assert()
        .success()
        .stdout(contains("started"));

    zs("start_stop")
        .args(["--db", &db_path, "--test", "--as", "alice", "active"])
        .assert()
        .success()
        .stdout(contains("Chapter one"))
        .stdout(contains("running"));

    zs("start_stop")
        .args(["--db", &db_path, "--test", "--as", "alice", "stop"])
        .assert()
        .success()
        .stdout(contains("ended after"));

    zs("start_stop")
        .args(["--db", &db_path, "--test", "--as", "alice", "active"])
        .assert()
        .success()
        .stdout(contains("No running sessions"));
}

#[test]
fn test_second_running_session_is_rejected() {
    let db_path = setup_test_db("second_start");
    init_db_with_project("second_start", &db_path);

    zs("second_start")
        .args(["--db", &db_path, "--test", "--as", "alice", "start", "1", "First"])
        .assert()
        .success();

    zs("second_start")
        .args(["--db", &db_path, "--test", "--as", "alice", "start", "1", "Second"])
        .assert()
        .failure()
        .stderr(contains("already have an active session"));

    // Another actor has their own slot.
    zs("second_start")
        .args(["--db", &db_path, "--test", "--as", "bob", "start", "1", "Bob's"])
        .assert()
        .success();
}

#[test]
fn test_stop_without_running_session_fails() {
    let db_path = setup_test_db("stop_idle");
    init_db_with_project("stop_idle", &db_path);

    zs("stop_idle")
        .args(["--db", &db_path, "--test", "--as", "alice", "stop"])
        .assert()
        .failure()
        .stderr(contains("No active session"));
}

#[test]
fn test_backfilled_session_and_edit() {
    let db_path = setup_test_db("backfill");
    init_db_with_project("backfill", &db_path);

    zs("backfill")
        .args([
            "--db",
            &db_path,
            "--test",
            "--as",
            "alice",
            "start",
            "1",
            "Reading",
            "--at",
            "2025-03-01T09:00",
            "--until",
            "2025-03-01T10:30",
        ])
        .assert()
        .success()
        .stdout(contains("logged (1 hour, 30 minutes)"));

    zs("backfill")
        .args([
            "--db", &db_path, "--test", "--as", "alice", "edit", "1", "--end",
            "2025-03-01T11:00",
        ])
        .assert()
        .success()
        .stdout(contains("2 hours"));

    zs("backfill")
        .args([
            "--db", &db_path, "--test", "--as", "alice", "edit", "1", "--end",
            "2025-03-01T08:00",
        ])
        .assert()
        .failure()
        .stderr(contains("Invalid time range"));

    zs("backfill")
        .args(["--db", &db_path, "--test", "--as", "alice", "sessions", "1"])
        .assert()
        .success()
        .stdout(contains("Reading"));
}

#[test]
fn test_rm_session_by_owner_only() {
    let db_path = setup_test_db("rm_session");
    init_db_with_project("rm_session", &db_path);

    zs("rm_session")
        .args([
            "--db", &db_path, "--test", "--as", "alice", "start", "1", "Draft", "--at",
            "2025-03-01T09:00", "--until", "2025-03-01T09:45",
        ])
        .assert()
        .success();

    zs("rm_session")
        .args(["--db", &db_path, "--test", "--as", "bob", "rm", "1"])
        .assert()
        .failure();

    zs("rm_session")
        .args(["--db", &db_path, "--test", "--as", "alice", "rm", "1"])
        .assert()
        .success()
        .stdout(contains("deleted"));
}

#[test]
fn test_stats_and_grid() {
    let db_path = setup_test_db("stats");
    init_db_with_project("stats", &db_path);

    zs("stats")
        .args([
            "--db", &db_path, "--test", "--as", "alice", "start", "1", "Outline", "--at",
            "2025-03-01T09:00", "--until", "2025-03-01T11:00",
        ])
        .assert()
        .success();

    zs("stats")
        .args(["--db", &db_path, "--test", "--as", "alice", "stats"])
        .assert()
        .success()
        .stdout(contains("Thesis"))
        .stdout(contains("2 hours"));

    zs("stats")
        .args([
            "--db", &db_path, "--test", "--as", "alice", "grid", "--days", "3", "--metric",
            "duration", "--day", "2025-03-01",
        ])
        .assert()
        .success()
        .stdout(contains("Your favorite pastime was \"Outline\" in Thesis"));

    zs("stats")
        .args([
            "--db", &db_path, "--test", "--as", "alice", "grid", "--metric", "sparkles",
        ])
        .assert()
        .failure()
        .stderr(contains("unknown metric"));

    for days in ["0", "200000000"] {
        zs("stats")
            .args(["--db", &db_path, "--test", "--as", "alice", "grid", "--days", days])
            .assert()
            .failure()
            .stderr(contains("--days"));
    }
}

#[test]
fn test_ideas_board() {
    let db_path = setup_test_db("ideas");
    zs("ideas")
        .args(["--db", &db_path, "--test", "init"])
        .assert()
        .success();

    zs("ideas")
        .args(["--db", &db_path, "--test", "--as", "alice", "idea", "add", "Dark mode"])
        .assert()
        .success()
        .stdout(contains("Idea #1 submitted"));

    zs("ideas")
        .args(["--db", &db_path, "--test", "--as", "bob", "idea", "react", "1", "heart"])
        .assert()
        .success()
        .stdout(contains("❤️ 1"));

    zs("ideas")
        .args(["--db", &db_path, "--test", "--as", "bob", "idea", "react", "1", "meh"])
        .assert()
        .failure()
        .stderr(contains("Unknown reaction"));

    zs("ideas")
        .args(["--db", &db_path, "--test", "idea", "list"])
        .assert()
        .success()
        .stdout(contains("Dark mode"));
}

#[test]
fn test_todo_list() {
    let db_path = setup_test_db("todos");
    zs("todos")
        .args(["--db", &db_path, "--test", "init"])
        .assert()
        .success();

    zs("todos")
        .args(["--db", &db_path, "--test", "--anonymous", "todo", "list"])
        .assert()
        .failure()
        .stderr(contains("Not authenticated"));

    for name in ["Water plants", "Call the bank"] {
        zs("todos")
            .args(["--db", &db_path, "--test", "--as", "alice", "todo", "add", name])
            .assert()
            .success()
            .stdout(contains("added"));
    }

    zs("todos")
        .args(["--db", &db_path, "--test", "--as", "alice", "todo", "add", "   "])
        .assert()
        .failure();

    zs("todos")
        .args(["--db", &db_path, "--test", "--as", "alice", "todo", "done", "1"])
        .assert()
        .success()
        .stdout(contains("[x] Water plants"));

    zs("todos")
        .args([
            "--db", &db_path, "--test", "--as", "alice", "todo", "rename", "2", "Call the bank today",
        ])
        .assert()
        .success()
        .stdout(contains("Call the bank today"));

    zs("todos")
        .args(["--db", &db_path, "--test", "--as", "bob", "todo", "done", "2"])
        .assert()
        .failure()
        .stderr(contains("Only the owner"));

    zs("todos")
        .args(["--db", &db_path, "--test", "--as", "bob", "todo", "list"])
        .assert()
        .success()
        .stdout(contains("Nothing to do"));

    zs("todos")
        .args(["--db", &db_path, "--test", "--as", "alice", "todo", "list"])
        .assert()
        .success()
        .stdout(is_match(r"(?s)\[ \] Call the bank today.*\[x\] Water plants").unwrap());
}

#[test]
fn test_log_print_shows_operations() {
    let db_path = setup_test_db("log_print");
    init_db_with_project("log_print", &db_path);

    zs("log_print")
        .args(["--db", &db_path, "--test", "--as", "alice", "start", "1", "Notes"])
        .assert()
        .success();

    zs("log_print")
        .args(["--db", &db_path, "--test", "log", "--print"])
        .assert()
        .success()
        .stdout(contains("init"))
        .stdout(contains("project_add"))
        .stdout(contains("session_start"));
}

#[test]
fn test_watch_exits_after_deadline() {
    let db_path = setup_test_db("watch");
    init_db_with_project("watch", &db_path);

    zs("watch")
        .args(["--db", &db_path, "--test", "--as", "alice", "start", "1", "Focus"])
        .assert()
        .success();

    zs("watch")
        .args(["--db", &db_path, "--test", "--as", "alice", "watch", "--seconds", "1"])
        .timeout(std::time::Duration::from_secs(20))
        .assert()
        .success()
        .stdout(contains("Focus"));
}

#[test]
fn test_local_backend_round_trip() {
    let db_path = setup_test_db("local_backend");
    let store = db_path.replace(".sqlite", ".json");
    std::fs::remove_file(&store).ok();

    zs("local_backend")
        .args(["--backend", "local", "--db", &store, "--test", "init"])
        .assert()
        .success()
        .stdout(contains("Local store ready"));

    zs("local_backend")
        .args([
            "--backend", "local", "--db", &store, "--test", "--as", "alice", "project", "add",
            "Garden",
        ])
        .assert()
        .success();

    zs("local_backend")
        .args([
            "--backend", "local", "--db", &store, "--test", "--as", "alice", "project", "list",
        ])
        .assert()
        .success()
        .stdout(contains("Garden"));
}
