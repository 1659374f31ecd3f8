//! Best-run selection backed by a local SQLite registry.
//!
//! Any experiment tracker that can answer "which run is best on this metric"
//! and "where are its artifacts" can stand in through [`ExperimentTracker`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};

/// Identifier of a training run.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RunId(pub String);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Direction in which a metric improves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Objective {
    Minimize,
    Maximize,
}

impl FromStr for Objective {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "minimize" => Ok(Self::Minimize),
            "maximize" => Ok(Self::Maximize),
            other => Err(format!("unknown objective {other:?}")),
        }
    }
}

/// Source of finished runs.
pub trait ExperimentTracker {
    /// Run of `project` with the best value of `metric`.
    fn find_best_run(&self, project: &str, metric: &str, objective: Objective) -> Result<RunId>;

    /// Local directory holding the run's artifacts.
    fn materialize_run(&self, run: &RunId) -> Result<PathBuf>;
}

/// A registered run.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: RunId,
    pub project: String,
    pub artifact_dir: PathBuf,
    pub created_at: String,
}

/// SQLite-backed index of runs and their metrics.
pub struct RunRegistry {
    conn: Connection,
    root: PathBuf,
}

impl RunRegistry {
    /// Opens (or creates) the registry at `db_path`.
    ///
    /// Relative artifact directories resolve against the database's parent
    /// directory.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        let root = db_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        if !root.as_os_str().is_empty() {
            std::fs::create_dir_all(&root).map_err(|source| Error::Io {
                path: root.clone(),
                source,
            })?;
        }
        let conn = Connection::open(db_path)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                project TEXT NOT NULL,
                artifact_dir TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS metrics (
                run_id TEXT NOT NULL REFERENCES runs(id),
                name TEXT NOT NULL,
                value REAL NOT NULL,
                PRIMARY KEY (run_id, name)
            );",
        )?;

        Ok(Self { conn, root })
    }

    /// Records a run, replacing any earlier record with the same id.
    pub fn register_run(&self, project: &str, run: &RunId, artifact_dir: &Path) -> Result<()> {
        let created_at = chrono::Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT OR REPLACE INTO runs (id, project, artifact_dir, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![run.0, project, artifact_dir.to_string_lossy().into_owned(), created_at],
        )?;
        Ok(())
    }

    /// Stores the final value of a metric for a run.
    pub fn log_metric(&self, run: &RunId, name: &str, value: f64) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metrics (run_id, name, value) VALUES (?1, ?2, ?3)",
            params![run.0, name, value],
        )?;
        Ok(())
    }

    pub fn run(&self, run: &RunId) -> Result<Option<RunRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, project, artifact_dir, created_at FROM runs WHERE id = ?1",
                [&run.0],
                |row| {
                    Ok(RunRecord {
                        id: RunId(row.get(0)?),
                        project: row.get(1)?,
                        artifact_dir: PathBuf::from(row.get::<_, String>(2)?),
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    pub fn run_count(&self, project: &str) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM runs WHERE project = ?1",
            [project],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

impl ExperimentTracker for RunRegistry {
    fn find_best_run(&self, project: &str, metric: &str, objective: Objective) -> Result<RunId> {
        let order = match objective {
            Objective::Minimize => "ASC",
            Objective::Maximize => "DESC",
        };
        let sql = format!(
            "SELECT runs.id, metrics.value FROM runs
             JOIN metrics ON metrics.run_id = runs.id
             WHERE runs.project = ?1 AND metrics.name = ?2
             ORDER BY metrics.value {order}, runs.created_at ASC, runs.rowid ASC
             LIMIT 1"
        );
        let best: Option<(String, f64)> = self
            .conn
            .query_row(&sql, params![project, metric], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()?;
        match best {
            Some((id, value)) => {
                info!(run = %id, metric, value, "selected best run");
                Ok(RunId(id))
            }
            None => Err(Error::RunNotFound {
                project: project.to_string(),
                metric: metric.to_string(),
            }),
        }
    }

    fn materialize_run(&self, run: &RunId) -> Result<PathBuf> {
        let record = self.run(run)?.ok_or_else(|| Error::ArtifactMissing {
            path: PathBuf::from(&run.0),
        })?;
        let dir = if record.artifact_dir.is_absolute() {
            record.artifact_dir
        } else {
            self.root.join(record.artifact_dir)
        };
        if !dir.is_dir() {
            return Err(Error::ArtifactMissing { path: dir });
        }
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn objective_parses_case_insensitively() {
        assert_eq!("Minimize".parse::<Objective>(), Ok(Objective::Minimize));
        assert_eq!("maximize".parse::<Objective>(), Ok(Objective::Maximize));
        assert!("sideways".parse::<Objective>().is_err());
    }

    #[test]
    fn registry_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = RunRegistry::open(dir.path().join("runs.db")).unwrap();
        assert_eq!(registry.run_count("p").unwrap(), 0);
        assert!(matches!(
            registry.find_best_run("p", "test_loss", Objective::Minimize),
            Err(Error::RunNotFound { .. })
        ));
    }
}
