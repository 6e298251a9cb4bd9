//! Directory-backed document store.
//!
//! Layout: `<location>/<database>/<collection>.jsonl`, one JSON object per
//! line. The location directory must exist; database directories are
//! created on first write.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::StoreError;
use crate::store::{
    validate_collection_name, Access, Connector, Cursor, Document, DocumentSource,
    DocumentTarget,
};

const EXTENSION: &str = "jsonl";

/// A database directory.
#[derive(Debug, Clone)]
pub struct JsonlDatabase {
    root: PathBuf,
}

impl JsonlDatabase {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    fn collection_path(&self, collection: &str, access: Access) -> Result<PathBuf, StoreError> {
        validate_collection_name(collection, access)?;
        Ok(self.root.join(format!("{}.{}", collection, EXTENSION)))
    }

    fn io_error(path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl DocumentSource for JsonlDatabase {
    fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| StoreError::Read {
                collection: self.root.display().to_string(),
                reason: e.to_string(),
            })?;

            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(EXTENSION)
            {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        Ok(names)
    }

    fn count(&self, collection: &str) -> Result<u64, StoreError> {
        let path = self.collection_path(collection, Access::Read)?;
        if !path.exists() {
            return Ok(0);
        }

        let file = File::open(&path).map_err(|e| Self::io_error(&path, e))?;
        let mut count = 0;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| Self::io_error(&path, e))?;
            if !line.trim().is_empty() {
                count += 1;
            }
        }
        Ok(count)
    }

    fn open_cursor(&self, collection: &str) -> Result<Cursor, StoreError> {
        let path = self.collection_path(collection, Access::Read)?;
        if !path.exists() {
            return Ok(Box::new(std::iter::empty::<Result<Document, StoreError>>()));
        }

        let file = File::open(&path).map_err(|e| Self::io_error(&path, e))?;
        Ok(Box::new(JsonlCursor {
            path,
            lines: BufReader::new(file).lines(),
            line_number: 0,
            failed: false,
        }))
    }
}

impl DocumentTarget for JsonlDatabase {
    fn drop_collection(&self, collection: &str) -> Result<(), StoreError> {
        let path = self.collection_path(collection, Access::Write)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_error(&path, e)),
        }
    }

    fn insert_batch(&self, collection: &str, documents: &[Document]) -> Result<(), StoreError> {
        let path = self.collection_path(collection, Access::Write)?;
        fs::create_dir_all(&self.root).map_err(|e| Self::io_error(&self.root, e))?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Self::io_error(&path, e))?;
        let mut writer = BufWriter::new(file);

        for document in documents {
            let line = serde_json::to_string(document).map_err(|e| StoreError::Write {
                collection: collection.to_string(),
                reason: e.to_string(),
            })?;
            writeln!(writer, "{}", line).map_err(|e| Self::io_error(&path, e))?;
        }
        writer.flush().map_err(|e| Self::io_error(&path, e))?;
        Ok(())
    }
}

struct JsonlCursor {
    path: PathBuf,
    lines: std::io::Lines<BufReader<File>>,
    line_number: usize,
    failed: bool,
}

impl Iterator for JsonlCursor {
    type Item = Result<Document, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(StoreError::Io {
                        path: self.path.clone(),
                        source: e,
                    }));
                }
            };
            self.line_number += 1;

            if line.trim().is_empty() {
                continue;
            }

            let parsed = serde_json::from_str::<Document>(&line).map_err(|e| StoreError::Parse {
                path: self.path.clone(),
                line: self.line_number,
                source: e,
            });
            if parsed.is_err() {
                self.failed = true;
            }
            return Some(parsed);
        }
    }
}

/// Connector for directory-backed databases.
///
/// The location is a base directory that must already exist; the
/// database is a subdirectory of it.
#[derive(Debug, Default, Clone)]
pub struct JsonlConnector;

impl JsonlConnector {
    pub fn new() -> Self {
        Self
    }

    fn connect(&self, location: &str, database: &str) -> Result<JsonlDatabase, StoreError> {
        let base = Path::new(location);
        if !base.is_dir() {
            return Err(StoreError::Connection {
                location: location.to_string(),
                reason: "not an existing directory".to_string(),
            });
        }
        let invalid = database.is_empty()
            || database == "."
            || database == ".."
            || database.contains(['/', '\\']);
        if invalid {
            return Err(StoreError::Connection {
                location: location.to_string(),
                reason: format!("invalid database name '{}'", database),
            });
        }
        Ok(JsonlDatabase::new(base.join(database)))
    }
}

impl Connector for JsonlConnector {
    fn source(
        &self,
        location: &str,
        database: &str,
    ) -> Result<Box<dyn DocumentSource>, StoreError> {
        Ok(Box::new(self.connect(location, database)?))
    }

    fn target(
        &self,
        location: &str,
        database: &str,
    ) -> Result<Box<dyn DocumentTarget>, StoreError> {
        Ok(Box::new(self.connect(location, database)?))
    }
}
