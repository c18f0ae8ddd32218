//! The storage module keeps an audit trail of runs in SQLite: the normalized
//! content and the formatted extraction output, keyed by run timestamp.
//! Nothing in the pipeline reads them back.

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Write-only audit store of raw and formatted run data.
pub struct Storage {
    /// The underlying SQLite connection wrapped in Arc<Mutex<>> to make it thread-safe
    conn: Arc<Mutex<Connection>>,
}

impl Storage {
    /// Creates a new Storage instance with a database at the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if database creation fails
    pub fn new(database_path: &str) -> Result<Self> {
        Self::from_connection(Connection::open(database_path)?)
    }

    /// Creates a Storage instance backed by a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if database creation fails
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Initializes the database schema if it doesn't exist.
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS raw_content (
                timestamp TEXT PRIMARY KEY,
                text TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS formatted_data (
                timestamp TEXT PRIMARY KEY,
                data TEXT NOT NULL
            );",
        )?;

        Ok(())
    }

    /// Stores the normalized content of a run.
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned
    pub fn save_raw(&self, text: &str, timestamp: &str) -> Result<()> {
        let conn = self.conn.lock().expect("Storage mutex poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO raw_content (timestamp, text) VALUES (?1, ?2)",
            params![timestamp, text],
        )?;

        Ok(())
    }

    /// Stores the structured output of a run.
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned
    pub fn save_formatted(&self, data: &Value, timestamp: &str) -> Result<()> {
        let conn = self.conn.lock().expect("Storage mutex poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO formatted_data (timestamp, data) VALUES (?1, ?2)",
            params![timestamp, data.to_string()],
        )?;

        Ok(())
    }

    /// Gets the normalized content stored for a run.
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned
    pub fn get_raw(&self, timestamp: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().expect("Storage mutex poisoned");
        let mut stmt = conn.prepare("SELECT text FROM raw_content WHERE timestamp = ?1")?;
        let text: Result<Option<String>, rusqlite::Error> =
            stmt.query_row([timestamp], |row| row.get(0)).optional();

        text.map_err(|e| e.into())
    }

    /// Gets the structured output stored for a run.
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails or the stored data is not JSON
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned
    pub fn get_formatted(&self, timestamp: &str) -> Result<Option<Value>> {
        let conn = self.conn.lock().expect("Storage mutex poisoned");
        let mut stmt = conn.prepare("SELECT data FROM formatted_data WHERE timestamp = ?1")?;
        let data: Option<String> = stmt.query_row([timestamp], |row| row.get(0)).optional()?;

        data.map(|data| serde_json::from_str::<Value>(&data))
            .transpose()
            .map_err(|e| e.into())
    }
}
