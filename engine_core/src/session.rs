/// session.rs — Session/run manager (C10)
///
/// Owns the on-disk layout `{data_root}/{YYYY-MM-DD}/run_N/`. `N` is one
/// more than the highest existing `run_N` under today's date directory.
/// Monotonic numbering under concurrent `initialize` calls is achieved by
/// racing `fs::create_dir` (which fails atomically if the directory
/// already exists) rather than trusting a scan-then-create two-step.
/// Every accessor/mutator takes the same mutex, so concurrent readers
/// always observe one consistent snapshot.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::{EngineError, ErrorCode, Result};
use crate::types::{Run, RunId};

const DATE_FMT: &str = "%Y-%m-%d";

struct SessionState {
    run_id: RunId,
    run_name: String,
    run_number: u64,
    session_start: DateTime<Utc>,
    current_date: String,
    current_run_path: PathBuf,
}

pub struct SessionManager {
    data_root: PathBuf,
    state: Mutex<SessionState>,
}

impl SessionManager {
    /// Creates `{data_root}/{today}/run_N/` where `N` is
    /// `max_existing_run_under_today + 1`, stamps `session_start`, and
    /// assigns a fresh `run_id`/`run_name`.
    pub fn initialize(data_root: impl Into<PathBuf>) -> Result<Self> {
        let data_root = data_root.into();
        let session_start = Utc::now();
        let current_date = session_start.format(DATE_FMT).to_string();
        let date_dir = data_root.join(&current_date);
        fs::create_dir_all(&date_dir).map_err(|e| io_err("create date directory", &date_dir, e))?;

        let (run_number, current_run_path) = create_next_run_dir(&date_dir)?;
        let run_name = format!("run_{run_number}");
        info!(run = %run_name, path = %current_run_path.display(), "session initialized");

        Ok(Self {
            data_root,
            state: Mutex::new(SessionState {
                run_id: RunId::new(),
                run_name,
                run_number,
                session_start,
                current_date,
                current_run_path,
            }),
        })
    }

    /// If `timestamp`'s formatted date differs from the current session
    /// date, creates a sibling folder under that date with the *same*
    /// `run_name`, updates state, and returns `true`. A same-day call is
    /// a no-op returning `false`.
    pub fn handle_date_boundary(&self, timestamp: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state.lock().expect("session lock poisoned");
        let new_date = timestamp.format(DATE_FMT).to_string();
        if new_date == state.current_date {
            return Ok(false);
        }
        let date_dir = self.data_root.join(&new_date);
        fs::create_dir_all(&date_dir).map_err(|e| io_err("create date directory", &date_dir, e))?;
        let run_path = date_dir.join(&state.run_name);
        fs::create_dir_all(&run_path).map_err(|e| io_err("create run directory", &run_path, e))?;

        debug!(from = %state.current_date, to = %new_date, run = %state.run_name, "date boundary crossed");
        state.current_date = new_date;
        state.current_run_path = run_path;
        Ok(true)
    }

    pub fn current_run_path(&self) -> PathBuf {
        self.state.lock().expect("session lock poisoned").current_run_path.clone()
    }

    pub fn run_id(&self) -> RunId {
        self.state.lock().expect("session lock poisoned").run_id
    }

    pub fn run_name(&self) -> String {
        self.state.lock().expect("session lock poisoned").run_name.clone()
    }

    pub fn run_number(&self) -> u64 {
        self.state.lock().expect("session lock poisoned").run_number
    }

    pub fn session_start(&self) -> DateTime<Utc> {
        self.state.lock().expect("session lock poisoned").session_start
    }

    pub fn current_date(&self) -> String {
        self.state.lock().expect("session lock poisoned").current_date.clone()
    }

    pub fn file_path(&self, name: &str) -> PathBuf {
        self.current_run_path().join(name)
    }

    pub fn as_run(&self) -> Run {
        let state = self.state.lock().expect("session lock poisoned");
        Run {
            run_id: state.run_id,
            run_name: state.run_name.clone(),
            session_start: state.session_start,
            current_date: state.current_date.clone(),
            current_run_path: state.current_run_path.clone(),
        }
    }

    /// Directory entries under `{data_root}/{date}/` matching `run_N`,
    /// sorted by `N` ascending.
    pub fn list_sessions_for_date(&self, date: &str) -> Result<Vec<String>> {
        let date_dir = self.data_root.join(date);
        let mut runs = list_run_numbers(&date_dir).map_err(|e| io_err("read date directory", &date_dir, e))?;
        runs.sort_unstable_by_key(|(n, _)| *n);
        Ok(runs.into_iter().map(|(_, name)| name).collect())
    }

    /// Entries directly under `data_root` matching `YYYY-MM-DD`, sorted
    /// ascending (lexicographic order matches chronological order for
    /// this format).
    pub fn all_dates(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.data_root).map_err(|e| io_err("read data root", &self.data_root, e))?;
        let mut dates: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| is_date_dir_name(name))
            .collect();
        dates.sort();
        Ok(dates)
    }
}

fn is_date_dir_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && name[0..4].bytes().all(|b| b.is_ascii_digit())
        && name[5..7].bytes().all(|b| b.is_ascii_digit())
        && name[8..10].bytes().all(|b| b.is_ascii_digit())
}

fn run_number_from_name(name: &str) -> Option<u64> {
    name.strip_prefix("run_").and_then(|suffix| suffix.parse::<u64>().ok())
}

fn list_run_numbers(date_dir: &Path) -> io::Result<Vec<(u64, String)>> {
    if !date_dir.exists() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in fs::read_dir(date_dir)? {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else { continue };
        if let Some(n) = run_number_from_name(&name) {
            out.push((n, name));
        }
    }
    Ok(out)
}

fn max_run_number(date_dir: &Path) -> io::Result<u64> {
    Ok(list_run_numbers(date_dir)?.into_iter().map(|(n, _)| n).max().unwrap_or(0))
}

/// Races `fs::create_dir` forward from `max_existing + 1` until one
/// succeeds, so concurrent initializers never collide on the same `N`
/// (property 8: pairwise-distinct, contiguous-from-`max+1` run names).
fn create_next_run_dir(date_dir: &Path) -> Result<(u64, PathBuf)> {
    let mut candidate = max_run_number(date_dir).map_err(|e| io_err("scan run directories", date_dir, e))? + 1;
    loop {
        let path = date_dir.join(format!("run_{candidate}"));
        match fs::create_dir(&path) {
            Ok(()) => return Ok((candidate, path)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                candidate += 1;
            }
            Err(e) => return Err(io_err("create run directory", &path, e)),
        }
    }
}

fn io_err(action: &str, path: &Path, cause: io::Error) -> EngineError {
    EngineError::SessionIo {
        code: ErrorCode::SessionIo,
        message: format!("failed to {action} at {}", path.display()),
        cause: Some(Box::new(cause)),
    }
}
