//! `duc` backed measurement.
//!
//! Each directory gets its own duc database under the output directory:
//! `duc index` builds it, `duc xml` reads the totals back.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use chrono::Utc;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use super::{Measure, Measurement};
use crate::config::DucConfig;
use crate::error::MeasureError;

/// Measures directories with the external `duc` tool.
#[derive(Debug, Clone)]
pub struct DucMeasurer {
    binary: String,
    low_priority: bool,
    output_dir: PathBuf,
}

impl DucMeasurer {
    /// Create a measurer writing databases into `output_dir`.
    pub fn new(config: &DucConfig, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: config.binary.clone(),
            low_priority: config.low_priority,
            output_dir: output_dir.into(),
        }
    }

    /// Database file for `dir`, e.g. `mnt.nfs.global.vol1.1714979289.db`.
    #[must_use]
    pub fn database_path(&self, dir: &Path, unix_secs: i64) -> PathBuf {
        let flattened = dir.to_string_lossy().replace('/', ".");
        let name = format!("{}.{unix_secs}.db", flattened.trim_start_matches('.'));
        self.output_dir.join(name)
    }

    /// `duc index <dir> -d <db> -m 2`, under nice/ionice when configured.
    #[must_use]
    pub fn index_command(&self, dir: &Path, database: &Path) -> Command {
        let mut command = if self.low_priority {
            let mut nice = Command::new("nice");
            nice.args(["-n", "19", "ionice", "-c", "3"]).arg(&self.binary);
            nice
        } else {
            Command::new(&self.binary)
        };
        command
            .arg("index")
            .arg(dir)
            .arg("-d")
            .arg(database)
            .args(["-m", "2"]);
        command
    }

    /// `duc xml <dir> -d <db>`.
    #[must_use]
    pub fn xml_command(&self, dir: &Path, database: &Path) -> Command {
        let mut command = Command::new(&self.binary);
        command.arg("xml").arg(dir).arg("-d").arg(database);
        command
    }
}

impl Measure for DucMeasurer {
    fn measure(&self, dir: &Path) -> Result<Option<Measurement>, MeasureError> {
        match dir.metadata() {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %dir.display(), "Target directory does not exist, skipping");
                return Ok(None);
            }
            Err(source) => {
                return Err(MeasureError::Stat {
                    path: dir.to_path_buf(),
                    source,
                })
            }
        }

        let database = self.database_path(dir, Utc::now().timestamp());
        tracing::debug!(path = %dir.display(), database = %database.display(), "Indexing with duc");
        run(self.index_command(dir, &database))?;

        if !database.exists() {
            tracing::info!(
                database = %database.display(),
                "duc database was not created, skipping directory"
            );
            return Ok(None);
        }

        let output = run(self.xml_command(dir, &database))?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            tracing::warn!(path = %dir.display(), "duc: {line}");
        }

        let xml = String::from_utf8_lossy(&output.stdout);
        let measurement = parse_duc_xml(&xml)?;
        tracing::debug!(
            path = %dir.display(),
            root = %measurement.root,
            size = %measurement.size,
            "Measured directory"
        );
        Ok(Some(measurement))
    }
}

/// Run a command to completion, failing on a non-zero exit.
fn run(mut command: Command) -> Result<Output, MeasureError> {
    let display = format!("{command:?}");
    let output = command.output().map_err(|e| MeasureError::Spawn {
        command: display.clone(),
        reason: e.to_string(),
    })?;

    if output.status.success() {
        Ok(output)
    } else {
        Err(MeasureError::CommandFailed {
            command: display,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Read the root path and total size from `duc xml` output.
///
/// Only the opening `<duc>` element is inspected. The size comes from the
/// `size` attribute, falling back to `size_actual` then `size_apparent`.
///
/// # Errors
///
/// Returns an error if the XML is malformed or the element lacks a root or size.
pub fn parse_duc_xml(xml: &str) -> Result<Measurement, MeasureError> {
    let mut reader = Reader::from_str(xml);

    loop {
        match reader.read_event() {
            Ok(Event::Start(element) | Event::Empty(element))
                if element.name().as_ref() == b"duc" =>
            {
                return measurement_from(&element);
            }
            Ok(Event::Eof) => return Err(MeasureError::Parse("no <duc> element".to_string())),
            Ok(_) => {}
            Err(e) => return Err(MeasureError::Parse(e.to_string())),
        }
    }
}

fn measurement_from(element: &BytesStart<'_>) -> Result<Measurement, MeasureError> {
    let mut root = None;
    let mut size = None;
    let mut size_actual = None;
    let mut size_apparent = None;

    for attribute in element.attributes() {
        let attribute = attribute.map_err(|e| MeasureError::Parse(e.to_string()))?;
        let value = attribute
            .unescape_value()
            .map_err(|e| MeasureError::Parse(e.to_string()))?
            .into_owned();
        match attribute.key.as_ref() {
            b"root" => root = Some(value),
            b"size" => size = Some(value),
            b"size_actual" => size_actual = Some(value),
            b"size_apparent" => size_apparent = Some(value),
            _ => {}
        }
    }

    let root = root.ok_or_else(|| MeasureError::Parse("missing root attribute".to_string()))?;
    let size = size
        .or(size_actual)
        .or(size_apparent)
        .ok_or_else(|| MeasureError::Parse("missing size attribute".to_string()))?;

    Ok(Measurement { root, size })
}
