#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use snapshotd::error::RepositoryError;
use snapshotd::filter::Predicate;
use snapshotd::model::{Bundle, SchoolSummary, Term};
use snapshotd::store::BackupRepository;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{oneshot, Notify};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn bundle(id: &str, school_id: &str, term: Term, ts: i64, data: Option<serde_json::Value>) -> Bundle {
    Bundle {
        id: id.to_string(),
        school_id: school_id.to_string(),
        term,
        academic_year: "2023-2024".to_string(),
        timestamp: ts,
        data,
    }
}

pub fn sample_payload() -> serde_json::Value {
    json!({
        "students": [
            { "id": "st1", "name": "Ama Boateng", "gender": "F", "classId": "c_p3" },
            { "id": "st2", "name": "Kojo Asante", "gender": "M", "classId": "c_jhs1" }
        ],
        "attendanceRecords": [
            { "classId": "c_p3", "presentStudentIds": ["st1"] },
            { "classId": "c_p3", "presentStudentIds": [] }
        ],
        "assessments": [
            { "studentId": "st1", "total": 72 },
            { "studentId": "st1", "classScore": 25, "examScore": 50 }
        ],
        "studentRemarks": [
            { "studentId": "st1", "remark": "Steady progress", "dateCreated": "2024-03-01T09:00:00Z" },
            { "studentId": "st1", "remark": "Excellent term", "dateCreated": "2024-03-20T09:00:00Z" }
        ],
        "classSubjects": [{ "classId": "c_p3", "subjects": ["Maths", "English"] }],
        "schoolSettings": { "schoolName": "Adenta Basic" },
        "notices": [{ "title": "PTA meeting" }]
    })
}

/// Holds one repository call until released.
pub struct Gate {
    entered: Arc<Notify>,
    release: oneshot::Sender<()>,
}

impl Gate {
    /// Resolves once the held call has reached the repository.
    pub async fn entered(&self) {
        self.entered.notified().await
    }

    pub fn release(self) {
        let _ = self.release.send(());
    }
}

type Held = (Arc<Notify>, oneshot::Receiver<()>);

/// In-memory store with call counters, gated calls and failure switches.
#[derive(Default)]
pub struct MemoryRepository {
    bundles: Mutex<Vec<Bundle>>,
    schools: Mutex<Vec<SchoolSummary>>,
    held: Mutex<HashMap<String, Vec<Held>>>,
    pub unavailable: AtomicBool,
    pub fail_deletes: AtomicBool,
    pub list_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
}

impl MemoryRepository {
    pub fn new(bundles: Vec<Bundle>) -> Self {
        let repo = Self::default();
        *repo.bundles.lock() = bundles;
        repo
    }

    pub fn with_schools(self, schools: Vec<SchoolSummary>) -> Self {
        *self.schools.lock() = schools;
        self
    }

    /// Holds the next call of `key` (`"list"` or `"get:<id>"`).
    pub fn hold(&self, key: &str) -> Gate {
        let entered = Arc::new(Notify::new());
        let (tx, rx) = oneshot::channel();
        self.held
            .lock()
            .entry(key.to_string())
            .or_default()
            .push((entered.clone(), rx));
        Gate {
            entered,
            release: tx,
        }
    }

    async fn pass(&self, key: &str) {
        let held = {
            let mut map = self.held.lock();
            match map.get_mut(key) {
                Some(queue) if !queue.is_empty() => Some(queue.remove(0)),
                _ => None,
            }
        };
        if let Some((entered, rx)) = held {
            entered.notify_one();
            let _ = rx.await;
        }
    }

    fn check(&self) -> Result<(), RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("store offline".into()));
        }
        Ok(())
    }

    pub fn ids(&self) -> Vec<String> {
        self.bundles.lock().iter().map(|b| b.id.clone()).collect()
    }
}

#[async_trait]
impl BackupRepository for MemoryRepository {
    async fn list_bundles(&self, predicate: &Predicate) -> Result<Vec<Bundle>, RepositoryError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let snapshot: Vec<Bundle> = {
            let bundles = self.bundles.lock();
            bundles
                .iter()
                .filter(|b| predicate.matches(b))
                .cloned()
                .collect()
        };
        self.pass("list").await;
        self.check()?;
        Ok(snapshot)
    }

    async fn get_bundle(&self, id: &str) -> Result<Bundle, RepositoryError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.pass(&format!("get:{id}")).await;
        self.check()?;
        let found = self.bundles.lock().iter().find(|b| b.id == id).cloned();
        found.ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn delete_bundle(&self, id: &str) -> Result<(), RepositoryError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("delete rejected upstream".into()));
        }
        let mut bundles = self.bundles.lock();
        let before = bundles.len();
        bundles.retain(|b| b.id != id);
        if bundles.len() == before {
            return Err(RepositoryError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list_schools(&self) -> Result<Vec<SchoolSummary>, RepositoryError> {
        self.check()?;
        Ok(self.schools.lock().clone())
    }
}

/// Writes schools and bundles straight into a workspace store.
pub fn seed_workspace(workspace: &Path, schools: &[(&str, &str)], bundles: &[Bundle]) {
    let conn = snapshotd::db::open_db(workspace).expect("open workspace db");
    for (id, name) in schools {
        conn.execute("INSERT INTO schools(id, name) VALUES(?, ?)", (id, name))
            .expect("insert school");
    }
    for b in bundles {
        let data = b.data.as_ref().map(|d| d.to_string());
        conn.execute(
            "INSERT INTO backups(id, school_id, term, academic_year, timestamp, data)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                &b.id,
                &b.school_id,
                b.term.as_str(),
                &b.academic_year,
                b.timestamp,
                data,
            ),
        )
        .expect("insert backup");
    }
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_snapshotd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn snapshotd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(serde_json::Value::Null)
}

pub fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}
