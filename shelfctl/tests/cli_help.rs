use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn top_level_help_lists_commands() {
    cargo_bin_cmd!("shelfctl")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("scan"))
        .stdout(predicate::str::contains("resume"))
        .stdout(predicate::str::contains("--database-url"));
}

#[test]
fn detached_scan_is_documented_as_record_only() {
    cargo_bin_cmd!("shelfctl")
        .args(["scan", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--detach"))
        .stdout(predicate::str::contains("Only record a pending scan"));
}

#[test]
fn library_add_requires_paths() {
    cargo_bin_cmd!("shelfctl")
        .args(["library", "add", "--name", "Movies", "--type", "movies"])
        .assert()
        .failure();
}

#[test]
fn commands_needing_a_catalog_fail_without_database_url() {
    cargo_bin_cmd!("shelfctl")
        .env_remove("DATABASE_URL")
        .arg("interrupted")
        .assert()
        .failure()
        .stderr(predicate::str::contains("DATABASE_URL"));
}

#[test]
fn preview_scans_a_directory_without_a_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let movie_dir = dir.path().join("Heat (1995)");
    std::fs::create_dir_all(&movie_dir).expect("mkdir");
    std::fs::write(movie_dir.join("Heat.mkv"), b"x").expect("write");

    cargo_bin_cmd!("shelfctl")
        .env_remove("DATABASE_URL")
        .current_dir(dir.path())
        .arg("preview")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"title\":\"Heat\""))
        .stdout(predicate::str::contains("\"status\":\"completed\""));
}
