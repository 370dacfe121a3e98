//! Incremental persistence: one record at a time into JSON Lines, a JSON
//! array and CSV.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::SinkError;
use crate::normalize::normalize;
use crate::types::{MovieRecord, RawMovie};

const UTF8_BOM: &str = "\u{feff}";

/// What to do with record fields the established CSV header lacks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HeaderPolicy {
    /// Drop them; the first header written stays authoritative.
    #[default]
    Fixed,
    /// Refuse the record.
    Strict,
}

/// Output files for one crawl source. Any of them may be disabled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkTargets {
    pub jsonl: Option<PathBuf>,
    pub json: Option<PathBuf>,
    pub csv: Option<PathBuf>,
}

impl SinkTargets {
    /// `<dir>/<stem>.jsonl`, `<dir>/<stem>.json` and `<dir>/<stem>.csv`.
    pub fn for_stem(dir: &Path, stem: &str) -> Self {
        Self {
            jsonl: Some(dir.join(format!("{stem}.jsonl"))),
            json: Some(dir.join(format!("{stem}.json"))),
            csv: Some(dir.join(format!("{stem}.csv"))),
        }
    }
}

#[derive(Debug, Default)]
pub struct Sink {
    policy: HeaderPolicy,
    headers: HashMap<PathBuf, Vec<String>>,
}

impl Sink {
    pub fn new(policy: HeaderPolicy) -> Self {
        Self {
            policy,
            headers: HashMap::new(),
        }
    }

    /// Persist one record to every enabled target before returning.
    pub fn append(&mut self, record: &MovieRecord, targets: &SinkTargets) -> Result<(), SinkError> {
        let fields = normalize(RawMovie::from(record)).to_map();

        if let Some(path) = &targets.jsonl {
            append_jsonl(path, &fields)?;
        }
        if let Some(path) = &targets.json {
            append_json_array(path, fields.clone())?;
        }
        if let Some(path) = &targets.csv {
            self.append_csv(path, &fields)?;
        }
        Ok(())
    }

    /// Replace `path` with the JSON array of `records`.
    pub fn write_aggregate(&self, path: &Path, records: &[MovieRecord]) -> Result<(), SinkError> {
        let array = records
            .iter()
            .map(|r| Value::Object(normalize(RawMovie::from(r)).to_map()))
            .collect();
        write_json_atomic(path, &Value::Array(array))
    }

    /// Delete the JSONL and CSV targets so a fresh crawl starts empty.
    pub fn reset(&mut self, targets: &SinkTargets) -> Result<(), SinkError> {
        for path in [&targets.jsonl, &targets.csv].into_iter().flatten() {
            self.headers.remove(path);
            match fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "removed stale output"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(SinkError::io(path, e)),
            }
        }
        Ok(())
    }

    fn append_csv(&mut self, path: &Path, fields: &Map<String, Value>) -> Result<(), SinkError> {
        ensure_parent(path)?;
        let is_fresh = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);

        let mut header = if is_fresh {
            Vec::new()
        } else {
            match self.headers.get(path) {
                Some(header) => header.clone(),
                None => read_csv_header(path)?,
            }
        };
        let write_header = header.is_empty();
        if write_header {
            header = fields.keys().cloned().collect();
        }

        let unknown: Vec<String> = fields
            .keys()
            .filter(|k| !header.contains(k))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            match self.policy {
                HeaderPolicy::Strict => {
                    return Err(SinkError::HeaderMismatch {
                        path: path.to_path_buf(),
                        fields: unknown,
                    })
                }
                HeaderPolicy::Fixed => {
                    debug!(path = %path.display(), dropped = ?unknown, "fields outside CSV header")
                }
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| SinkError::io(path, e))?;
        if is_fresh {
            file.write_all(UTF8_BOM.as_bytes())
                .map_err(|e| SinkError::io(path, e))?;
        }

        let csv_err = |source| SinkError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::CRLF)
            .from_writer(file);
        if write_header {
            writer.write_record(&header).map_err(csv_err)?;
        }
        let row: Vec<String> = header
            .iter()
            .map(|name| fields.get(name).map(cell_text).unwrap_or_default())
            .collect();
        writer.write_record(&row).map_err(csv_err)?;
        writer.flush().map_err(|e| SinkError::io(path, e))?;

        self.headers.insert(path.to_path_buf(), header);
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> Result<(), SinkError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| SinkError::io(parent, e))
        }
        _ => Ok(()),
    }
}

fn append_jsonl(path: &Path, fields: &Map<String, Value>) -> Result<(), SinkError> {
    ensure_parent(path)?;
    let mut line = serde_json::to_string(fields).map_err(|source| SinkError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    line.push('\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| SinkError::io(path, e))?;
    file.write_all(line.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|e| SinkError::io(path, e))
}

fn append_json_array(path: &Path, fields: Map<String, Value>) -> Result<(), SinkError> {
    let record = Value::Object(fields);
    let updated = match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<Value>(&content) {
            Ok(Value::Array(mut items)) => {
                items.push(record);
                Value::Array(items)
            }
            Ok(other) => Value::Array(vec![other, record]),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "existing JSON is unreadable, starting a new array");
                Value::Array(vec![record])
            }
        },
        Err(e) if e.kind() == ErrorKind::NotFound => Value::Array(vec![record]),
        Err(e) => return Err(SinkError::io(path, e)),
    };
    write_json_atomic(path, &updated)
}

/// Pretty-print into a temp file beside `path`, then rename it into place.
fn write_json_atomic(path: &Path, value: &Value) -> Result<(), SinkError> {
    ensure_parent(path)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| SinkError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| SinkError::io(dir, e))?;
    tmp.write_all(&bytes)
        .and_then(|_| tmp.flush())
        .map_err(|e| SinkError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| SinkError::io(path, e.error))?;
    Ok(())
}

fn read_csv_header(path: &Path) -> Result<Vec<String>, SinkError> {
    let file = File::open(path).map_err(|e| SinkError::io(path, e))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);
    let mut record = csv::StringRecord::new();
    let found = reader
        .read_record(&mut record)
        .map_err(|source| SinkError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
    if !found {
        return Ok(Vec::new());
    }
    Ok(record
        .iter()
        .enumerate()
        .map(|(i, name)| {
            if i == 0 {
                name.trim_start_matches(UTF8_BOM).to_string()
            } else {
                name.to_string()
            }
        })
        .filter(|name| !name.is_empty())
        .collect())
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u64, title: &str) -> MovieRecord {
        MovieRecord {
            movie_id: id,
            title: Some(title.into()),
            rating: 9.1,
            total_ratings: 1000,
            link: Some(format!("https://movie.douban.com/subject/{id}/")),
            ..Default::default()
        }
    }

    #[test]
    fn test_jsonl_appends_compact_lines() {
        let dir = tempfile::tempdir().unwrap();
        let targets = SinkTargets {
            jsonl: Some(dir.path().join("out/movies.jsonl")),
            ..Default::default()
        };
        let mut sink = Sink::default();
        sink.append(&record(1, "大话西游"), &targets).unwrap();
        sink.append(&record(2, "功夫"), &targets).unwrap();

        let content = fs::read_to_string(targets.jsonl.unwrap()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            r#"{"movie_id":1,"title":"大话西游","rating":9.1,"total_ratings":1000,"link":"https://movie.douban.com/subject/1/"}"#
        );
        assert!(content.ends_with('\n'));
    }

    #[test]
    fn test_csv_header_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("movies.csv");
        let targets = SinkTargets {
            csv: Some(path.clone()),
            ..Default::default()
        };
        let mut sink = Sink::default();

        let first = MovieRecord {
            title: Some("A".into()),
            rating: 8.5,
            ..Default::default()
        };
        let second = MovieRecord {
            title: Some("B".into()),
            rating: 7.0,
            poster: Some("https://img.example/b.jpg".into()),
            ..Default::default()
        };
        sink.append(&first, &targets).unwrap();
        sink.append(&second, &targets).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(UTF8_BOM));
        assert_eq!(
            content,
            "\u{feff}movie_id,title,rating,total_ratings\r\n0,A,8.5,0\r\n0,B,7.0,0\r\n"
        );
    }

    #[test]
    fn test_csv_header_read_back_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("movies.csv");
        let targets = SinkTargets {
            csv: Some(path.clone()),
            ..Default::default()
        };
        Sink::default().append(&record(1, "一"), &targets).unwrap();

        let mut extra = Map::new();
        extra.insert("box_office".into(), Value::from("1亿"));
        let mut richer = record(2, "二, 续集");
        richer.summary = Some("第二部".into());
        richer.extra = extra;
        Sink::default().append(&richer, &targets).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.split("\r\n").filter(|l| !l.is_empty()).collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "\u{feff}movie_id,title,rating,total_ratings,link");
        assert_eq!(
            lines[2],
            r#"2,"二, 续集",9.1,1000,https://movie.douban.com/subject/2/"#
        );
        assert_eq!(content.matches(UTF8_BOM).count(), 1);
    }

    #[test]
    fn test_csv_missing_fields_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("movies.csv");
        let targets = SinkTargets {
            csv: Some(path.clone()),
            ..Default::default()
        };
        let mut sink = Sink::default();
        sink.append(&record(1, "一"), &targets).unwrap();
        let mut sparse = record(2, "二");
        sparse.link = None;
        sink.append(&sparse, &targets).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.ends_with("2,二,9.1,1000,\r\n"));
    }

    #[test]
    fn test_strict_header_rejects_new_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("movies.csv");
        let targets = SinkTargets {
            csv: Some(path.clone()),
            ..Default::default()
        };
        let mut sink = Sink::new(HeaderPolicy::Strict);
        sink.append(&record(1, "一"), &targets).unwrap();

        let mut with_poster = record(2, "二");
        with_poster.poster = Some("p.jpg".into());
        match sink.append(&with_poster, &targets) {
            Err(SinkError::HeaderMismatch { fields, .. }) => assert_eq!(fields, vec!["poster"]),
            other => panic!("expected header mismatch, got {:?}", other),
        }
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_json_array_append_and_recovery() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("movies.json");
        let targets = SinkTargets {
            json: Some(path.clone()),
            ..Default::default()
        };
        let mut sink = Sink::default();

        sink.append(&record(1, "一"), &targets).unwrap();
        sink.append(&record(2, "二"), &targets).unwrap();
        let value: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
        assert_eq!(value[1]["movie_id"], Value::from(2));
        assert!(fs::read_to_string(&path).unwrap().contains("\n  {\n    \"movie_id\": 1,"));

        fs::write(&path, r#"{"legacy": true}"#).unwrap();
        sink.append(&record(3, "三"), &targets).unwrap();
        let value: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value[0]["legacy"], Value::Bool(true));
        assert_eq!(value[1]["title"], Value::from("三"));

        fs::write(&path, "[{\"truncated\": ").unwrap();
        sink.append(&record(4, "四"), &targets).unwrap();
        let value: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 1);
        assert_eq!(value[0]["movie_id"], Value::from(4));
    }

    #[test]
    fn test_write_aggregate_and_reset() {
        let dir = tempfile::tempdir().unwrap();
        let targets = SinkTargets::for_stem(dir.path(), "douban_top250");
        let mut sink = Sink::default();
        sink.append(&record(1, "一"), &targets).unwrap();

        let aggregate = targets.json.clone().unwrap();
        sink.write_aggregate(&aggregate, &[record(1, "一"), record(2, "二")])
            .unwrap();
        let value: Value = serde_json::from_str(&fs::read_to_string(&aggregate).unwrap()).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);

        sink.reset(&targets).unwrap();
        assert!(!targets.jsonl.as_ref().unwrap().exists());
        assert!(!targets.csv.as_ref().unwrap().exists());
        assert!(aggregate.exists());
        sink.reset(&targets).unwrap();
    }
}
