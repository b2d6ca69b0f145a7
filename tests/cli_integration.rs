//! Integration tests for the sensorlog binary
//!
//! These run the built binary against a temporary data directory:
//! - Exporting from missing, empty, mismatched and populated databases
//! - Status and config output
//! - Collecting from a local SSE server that drops the first connection

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use rusqlite::Connection;
use tempfile::TempDir;

const SCHEMA: &str = "CREATE TABLE sensor_data (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    receive_time TEXT NOT NULL,
    temp REAL, hum REAL, press REAL, gas REAL, aq REAL,
    dist INTEGER, lat REAL, lon REAL, alt REAL, sd_status INTEGER
)";

/// Helper to get the sensorlog binary path
fn sensorlog_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_sensorlog"))
}

/// Command with every config and log location pointed into `dir`
fn sensorlog(dir: &Path) -> Command {
    let mut cmd = Command::new(sensorlog_binary());
    cmd.current_dir(dir)
        .env("SENSORLOG_DIR", dir)
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir.join("config"))
        .env("XDG_DATA_HOME", dir.join("data"))
        .env_remove("SENSORLOG_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

fn run_sensorlog(dir: &Path, args: &[&str]) -> std::process::Output {
    sensorlog(dir).args(args).output().expect("Failed to execute sensorlog")
}

fn db_path(dir: &Path) -> PathBuf {
    dir.join("esp32_sse_data.sqlite3")
}

fn csv_path(dir: &Path) -> PathBuf {
    dir.join("sensor_data_export.csv")
}

fn seed_database(dir: &Path, rows: usize) {
    let conn = Connection::open(db_path(dir)).unwrap();
    conn.execute(SCHEMA, []).unwrap();
    for i in 0..rows {
        conn.execute(
            "INSERT INTO sensor_data (receive_time, temp, hum, press, gas, aq, dist, lat, lon, alt, sd_status)
             VALUES (?1, ?2, 50.0, 1012.0, 40.0, 95.0, ?3, 25.03, 121.56, 10.0, 1)",
            rusqlite::params![format!("2025-06-01 08:00:{:02}", i), 21.0 + i as f64, 200 + i as i64],
        )
        .unwrap();
    }
}

#[test]
fn test_export_missing_database() {
    let temp = TempDir::new().unwrap();

    let output = run_sensorlog(temp.path(), &["export"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("not found"), "stderr: {}", stderr);
    assert!(stderr.contains("sensorlog collect"));
    assert!(!db_path(temp.path()).exists());
    assert!(!csv_path(temp.path()).exists());
}

#[test]
fn test_export_empty_database_warns() {
    let temp = TempDir::new().unwrap();
    seed_database(temp.path(), 0);

    let output = run_sensorlog(temp.path(), &["export"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("Warning"), "stdout: {}", stdout);
    assert!(stdout.contains("empty"));
    assert!(!csv_path(temp.path()).exists());
}

#[test]
fn test_export_writes_all_rows() {
    let temp = TempDir::new().unwrap();
    seed_database(temp.path(), 4);

    let output = run_sensorlog(temp.path(), &["export"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("Exported 4 rows"), "stdout: {}", stdout);

    let content = fs::read_to_string(csv_path(temp.path())).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 5);
    assert!(lines[0].starts_with("ID,Time,Temp (C),Hum (%)"));
    assert_eq!(lines[4], "4,2025-06-01 08:00:03,24.0,50.0,1012.0,40.0,95.0,203,25.03,121.56,10.0,1");
}

#[test]
fn test_export_custom_output_path() {
    let temp = TempDir::new().unwrap();
    seed_database(temp.path(), 2);
    let out = temp.path().join("reports").join("june.csv");

    let output = run_sensorlog(temp.path(), &["export", "--output", out.to_str().unwrap()]);

    assert!(output.status.success());
    assert_eq!(fs::read_to_string(&out).unwrap().lines().count(), 3);
    assert!(!csv_path(temp.path()).exists());
}

#[cfg(unix)]
#[test]
fn test_export_read_only_destination() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    seed_database(temp.path(), 2);
    let out = csv_path(temp.path());
    fs::write(&out, "old export\n").unwrap();
    fs::set_permissions(&out, fs::Permissions::from_mode(0o444)).unwrap();

    let output = run_sensorlog(temp.path(), &["export"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("Cannot write file"), "stderr: {}", stderr);
    assert!(stderr.contains("sensor_data_export.csv"));
    assert_eq!(fs::read_to_string(&out).unwrap(), "old export\n");
}

#[cfg(unix)]
#[test]
fn test_export_unwritable_directory() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    seed_database(temp.path(), 2);
    let reports = temp.path().join("reports");
    fs::create_dir(&reports).unwrap();
    fs::set_permissions(&reports, fs::Permissions::from_mode(0o555)).unwrap();

    // Permission bits do not apply to root
    if fs::File::create(reports.join("check")).is_ok() {
        fs::remove_file(reports.join("check")).unwrap();
        fs::set_permissions(&reports, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let out = reports.join("june.csv");
    let output = run_sensorlog(temp.path(), &["export", "--output", out.to_str().unwrap()]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let entries = fs::read_dir(&reports).unwrap().count();
    fs::set_permissions(&reports, fs::Permissions::from_mode(0o755)).unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("Cannot write file"), "stderr: {}", stderr);
    assert_eq!(entries, 0);
}

#[test]
fn test_export_schema_mismatch() {
    let temp = TempDir::new().unwrap();
    let conn = Connection::open(db_path(temp.path())).unwrap();
    conn.execute(
        "CREATE TABLE sensor_data (id INTEGER PRIMARY KEY AUTOINCREMENT, receive_time TEXT NOT NULL, temp REAL)",
        [],
    )
    .unwrap();
    drop(conn);

    let output = run_sensorlog(temp.path(), &["export"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("mismatch"), "stderr: {}", stderr);
    assert!(!csv_path(temp.path()).exists());
}

#[test]
fn test_status_json() {
    let temp = TempDir::new().unwrap();
    seed_database(temp.path(), 3);

    let output = run_sensorlog(temp.path(), &["status", "--format", "json"]);
    assert!(output.status.success());

    let status: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(status["exists"], true);
    assert_eq!(status["schema_ok"], true);
    assert_eq!(status["readings"], 3);
    assert_eq!(status["latest"]["id"], 3);
}

#[test]
fn test_config_show_uses_sensorlog_dir() {
    let temp = TempDir::new().unwrap();

    let output = run_sensorlog(temp.path(), &["config", "show", "--format", "yaml"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("base_url: http://172.20.10.6"));
    assert!(stdout.contains(&db_path(temp.path()).display().to_string()));
}

/// Read the request head so closing the socket does not reset it
fn read_request(stream: &TcpStream) {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    while reader.read_line(&mut line).unwrap_or(0) > 0 {
        if line == "\r\n" {
            break;
        }
        line.clear();
    }
}

fn serve_events(mut stream: TcpStream, temps: &[f64]) {
    read_request(&stream);
    let mut response = String::from(
        "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n",
    );
    for temp in temps {
        response.push_str(&format!("data: {{\"temp\":{:?},\"hum\":40.0,\"sd\":1}}\n\n", temp));
    }
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

fn stored_temps(db: &Path) -> Vec<f64> {
    let Ok(conn) = Connection::open_with_flags(db, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY) else {
        return Vec::new();
    };
    let Ok(mut stmt) = conn.prepare("SELECT temp FROM sensor_data ORDER BY id") else {
        return Vec::new();
    };
    stmt.query_map([], |row| row.get(0))
        .map(|rows| rows.filter_map(|r| r.ok()).collect())
        .unwrap_or_default()
}

#[test]
fn test_collect_reconnects_after_disconnect() {
    let temp = TempDir::new().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    thread::spawn(move || {
        let mut connections = listener.incoming();

        // First connection: three events, then the device drops off
        if let Some(Ok(stream)) = connections.next() {
            serve_events(stream, &[20.5, 20.6, 20.7]);
        }

        // Second connection: two more events, then stay open
        if let Some(Ok(stream)) = connections.next() {
            let keep = stream.try_clone().unwrap();
            serve_events(stream, &[20.8, 20.9]);
            thread::sleep(Duration::from_secs(60));
            drop(keep);
        }
    });

    let config = temp.path().join("sensorlog.yaml");
    fs::write(
        &config,
        format!("device:\n  base_url: http://127.0.0.1:{}\n  retry_delay_secs: 0\n", port),
    )
    .unwrap();

    let mut child = sensorlog(temp.path())
        .args(["collect", "--quiet", "--config", config.to_str().unwrap()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to start collector");

    let db = db_path(temp.path());
    let deadline = Instant::now() + Duration::from_secs(20);
    let mut temps = Vec::new();
    while Instant::now() < deadline {
        temps = stored_temps(&db);
        if temps.len() >= 5 {
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }

    child.kill().unwrap();
    child.wait().unwrap();

    assert_eq!(temps, vec![20.5, 20.6, 20.7, 20.8, 20.9]);
}
