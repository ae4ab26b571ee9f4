//! JSON load/save for note and feature collections.
//!
//! Readers take any `Read` (files, in-memory buffers, stdin); the path
//! helpers wrap them with buffered file IO.

use crate::error::{PipelineError, Result};
use crate::types::{HarmonicFeatureRecord, NoteEvent};
use log::info;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

pub type ModelRecords = BTreeMap<String, HarmonicFeatureRecord>;

pub fn from_reader<T: DeserializeOwned, R: Read>(reader: R) -> Result<T> {
    Ok(serde_json::from_reader(reader)?)
}

pub fn to_writer<T: Serialize, W: Write>(mut writer: W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, value)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path)?;
    from_reader(BufReader::new(file))
}

/// Write `value` as pretty JSON, creating parent directories as needed.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    to_writer(BufWriter::new(File::create(path)?), value)
}

/// Load a note collection. A note that ends before its onset is invalid.
pub fn load_notes(path: &Path) -> Result<Vec<NoteEvent>> {
    let notes: Vec<NoteEvent> = read_json(path)?;
    if let Some(bad) = notes.iter().find(|n| n.offset_s < n.onset_s) {
        return Err(PipelineError::InvalidInput(format!(
            "note {} ends before it starts ({} > {})",
            bad.id, bad.onset_s, bad.offset_s
        )));
    }
    info!("Loaded {} notes from {:?}", notes.len(), path);
    Ok(notes)
}

pub fn save_notes(path: &Path, notes: &[NoteEvent]) -> Result<()> {
    write_json(path, &notes)?;
    info!("Saved {} notes to {:?}", notes.len(), path);
    Ok(())
}

pub fn load_records(path: &Path) -> Result<Vec<HarmonicFeatureRecord>> {
    let records: Vec<HarmonicFeatureRecord> = read_json(path)?;
    info!("Loaded {} feature records from {:?}", records.len(), path);
    Ok(records)
}

pub fn save_records(path: &Path, records: &[HarmonicFeatureRecord]) -> Result<()> {
    write_json(path, &records)?;
    info!("Saved {} feature records to {:?}", records.len(), path);
    Ok(())
}

/// Model records keyed `"{midi}_{velocity_bucket}"`.
pub fn load_model_records(path: &Path) -> Result<ModelRecords> {
    let records: ModelRecords = read_json(path)?;
    info!("Loaded {} model records from {:?}", records.len(), path);
    Ok(records)
}

pub fn save_model_records(path: &Path, records: &ModelRecords) -> Result<()> {
    write_json(path, records)?;
    info!("Saved {} model records to {:?}", records.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IsolationTier;
    use tempfile::TempDir;

    const NOTES: &str = r#"[
        {"id": "a", "onset_s": 0.5, "offset_s": 1.2, "midi_note": 60, "amplitude": 0.4,
         "source_file": "take1.wav"},
        {"id": "obm_69", "onset_s": 0.0, "offset_s": 3.0, "midi_note": 69, "amplitude": 1.0,
         "velocity_midi": 100, "source_file": "obm.wav", "source_type": "obm_isolated",
         "isolation_tier": "gold", "isolation_score": 1.0}
    ]"#;

    #[test]
    fn test_parse_notes_from_reader() {
        let notes: Vec<NoteEvent> = from_reader(NOTES.as_bytes()).unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].isolation_tier, IsolationTier::Pending);
        assert_eq!(notes[0].velocity_midi, 80);
        assert!(notes[1].is_ground_truth());
    }

    #[test]
    fn test_notes_file_roundtrip_and_validation() {
        let tmp = TempDir::new().unwrap();
        // Parent directories are created on save.
        let path = tmp.path().join("stage").join("notes.json");
        let notes: Vec<NoteEvent> = from_reader(NOTES.as_bytes()).unwrap();
        save_notes(&path, &notes).unwrap();
        assert_eq!(load_notes(&path).unwrap(), notes);

        let mut bad = notes.clone();
        bad[0].offset_s = 0.1;
        save_notes(&path, &bad).unwrap();
        assert!(matches!(load_notes(&path), Err(PipelineError::InvalidInput(_))));
    }

    #[test]
    fn test_corrupt_and_missing_inputs_are_errors() {
        let r: Result<Vec<NoteEvent>> = from_reader("[{\"id\": ".as_bytes());
        assert!(matches!(r, Err(PipelineError::Json(_))));
        assert!(matches!(
            load_records(Path::new("/nonexistent/harmonics.json")),
            Err(PipelineError::Io(_))
        ));
    }
}
