use std::io::Read;
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread::sleep;
use std::time::Duration;

use serial_test::serial;

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_eavlog")
}

struct Server {
    child: Child,
    intake_port: u16,
    query_port: u16,
    health_port: u16,
    db_path: PathBuf,
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn spawn_server(temp: &Path, config: &str) -> Server {
    let intake_port = free_port();
    let http_port = free_port();
    let query_port = free_port();
    let health_port = free_port();
    let db_path = temp.join("eavlog.duckdb");
    let config_path = temp.join("config.toml");
    std::fs::write(&config_path, config).unwrap();

    let child = Command::new(bin())
        .arg("run")
        .arg("--db-path")
        .arg(&db_path)
        .arg("--intake-addr")
        .arg(format!("127.0.0.1:{intake_port}"))
        .arg("--http-addr")
        .arg(format!("127.0.0.1:{http_port}"))
        .arg("--query-addr")
        .arg(format!("127.0.0.1:{query_port}"))
        .arg("--health-addr")
        .arg(format!("127.0.0.1:{health_port}"))
        .env("EAVLOG_CONFIG", &config_path)
        .env_remove("EAVLOG_INTAKE_ADDR")
        .env_remove("EAVLOG_QUERY_ADDR")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    Server {
        child,
        intake_port,
        query_port,
        health_port,
        db_path,
    }
}

fn wait_healthy(server: &mut Server) {
    for _ in 0..100 {
        assert!(
            server.child.try_wait().unwrap().is_none(),
            "eavlog exited early"
        );
        if let Ok(mut stream) = TcpStream::connect(("127.0.0.1", server.health_port)) {
            let mut reply = String::new();
            if stream.read_to_string(&mut reply).is_ok() && reply == "ok\n" {
                return;
            }
        }
        sleep(Duration::from_millis(100));
    }
    panic!("health endpoint not ready");
}

fn cli(args: &[&str]) -> Output {
    Command::new(bin())
        .args(args)
        .env_remove("EAVLOG_INTAKE_ADDR")
        .env_remove("EAVLOG_QUERY_ADDR")
        .output()
        .unwrap()
}

fn status_json(query_port: u16) -> serde_json::Value {
    let out = cli(&[
        "--json",
        "status",
        "--addr",
        &format!("127.0.0.1:{query_port}"),
    ]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    serde_json::from_slice(&out.stdout).unwrap()
}

fn wait_for_logs(query_port: u16, want: u64) -> serde_json::Value {
    let addr = format!("127.0.0.1:{query_port}");
    for _ in 0..100 {
        let out = cli(&["--json", "status", "--addr", &addr]);
        if out.status.success() {
            let status: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
            if status["Status"]["counts"]["logs"].as_u64() == Some(want) {
                return status;
            }
        }
        sleep(Duration::from_millis(100));
    }
    panic!("logs never reached {want}");
}

#[test]
#[serial]
fn e2e_send_then_query_by_correlation() {
    let temp = tempfile::tempdir().unwrap();
    let mut server = spawn_server(
        temp.path(),
        "max_batch_size = 1\nrefresh_enabled = false\n",
    );
    wait_healthy(&mut server);

    let correlation = "6f1c1f7e-2a55-4d1b-9a43-0b1f4f1e2c3d";
    let out = cli(&[
        "send",
        "payment accepted",
        "--intake-addr",
        &format!("127.0.0.1:{}", server.intake_port),
        "--count",
        "10",
        "--attr",
        "amount=12",
        "--attr",
        "ratio=0.25",
        "--attr",
        "region=eu",
        "--correlation-id",
        correlation,
    ]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(String::from_utf8_lossy(&out.stdout).contains("sent 10 record(s)"));

    let status = wait_for_logs(server.query_port, 10);
    let counts = &status["Status"]["counts"];
    assert_eq!(counts["vocab"], 4);
    assert_eq!(counts["field_int"], 1);
    assert_eq!(counts["field_float"], 1);
    assert_eq!(counts["field_text"], 1);
    assert_eq!(counts["log_field_int"], 10);
    assert_eq!(status["Status"]["pipeline"]["records_written"], 10);

    let out = cli(&[
        "correlation",
        correlation,
        "--addr",
        &format!("127.0.0.1:{}", server.query_port),
    ]);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("payment accepted"));
    assert!(stdout.contains("amount=12"));
    assert!(stdout.contains("region=\"eu\""));
    assert!(stdout.contains("-- 10 logs --"));

    let out = cli(&[
        "--json",
        "log",
        "1",
        "--addr",
        &format!("127.0.0.1:{}", server.query_port),
    ]);
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(value["Log"]["message"], "payment accepted");
    assert_eq!(value["Log"]["fields"].as_array().map(Vec::len), Some(3));

    assert!(server.db_path.exists());
}

#[test]
#[serial]
fn e2e_missing_log_and_empty_correlation() {
    let temp = tempfile::tempdir().unwrap();
    let mut server = spawn_server(temp.path(), "refresh_enabled = false\n");
    wait_healthy(&mut server);

    let addr = format!("127.0.0.1:{}", server.query_port);
    let out = cli(&["log", "42", "--addr", &addr]);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("-- no such log --"));

    let out = cli(&[
        "correlation",
        "00000000-0000-0000-0000-000000000000",
        "--addr",
        &addr,
    ]);
    assert!(String::from_utf8_lossy(&out.stdout).contains("-- 0 logs --"));

    let status = status_json(server.query_port);
    assert_eq!(status["Status"]["counts"]["logs"], 0);
}

#[test]
#[serial]
fn e2e_bad_config_exits_nonzero() {
    let temp = tempfile::tempdir().unwrap();
    let mut server = spawn_server(temp.path(), "max_batch_size = 0\n");
    let status = server.child.wait().unwrap();
    assert!(!status.success());
}
