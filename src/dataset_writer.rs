//! Writes the assembled dataset as a NumPy `.npz` archive plus a JSON
//! summary into one output directory.
//!
//! `training_data.npz` is an uncompressed zip (what `np.savez` produces)
//! with four members sharing row order:
//!   inputs.npy   float32 (N, 2)
//!   targets.npy  float32 (N, 11), zero where masked
//!   mask.npy     bool    (N, 11)
//!   weights.npy  float32 (N,)
//! `summary.json` holds assembly statistics and per-target coverage.

use crate::error::Result;
use crate::residuals::{AssemblyStats, TargetCoverage, TrainingDataset, N_TARGETS};
use crate::record_io::write_json;
use byteorder::{LittleEndian, WriteBytesExt};
use log::{debug, info};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const DATASET_FILE: &str = "training_data.npz";
pub const SUMMARY_FILE: &str = "summary.json";

const NPY_MAGIC: &[u8] = b"\x93NUMPY";
/// Header (magic + version + length + dict) is padded to this alignment.
const NPY_ALIGN: usize = 64;

/// Write an NPY v1.0 header for a C-ordered array.
fn write_npy_header<W: Write>(w: &mut W, descr: &str, shape: &[usize]) -> Result<()> {
    let shape_str = match shape {
        [n] => format!("({},)", n),
        dims => format!(
            "({})",
            dims.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ")
        ),
    };
    let mut dict = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
        descr, shape_str
    );
    // magic(6) + version(2) + header_len(2) + dict + '\n'
    let unpadded = NPY_MAGIC.len() + 2 + 2 + dict.len() + 1;
    let pad = (NPY_ALIGN - unpadded % NPY_ALIGN) % NPY_ALIGN;
    dict.extend(std::iter::repeat(' ').take(pad));
    dict.push('\n');

    w.write_all(NPY_MAGIC)?;
    w.write_all(&[1, 0])?;
    w.write_u16::<LittleEndian>(dict.len() as u16)?;
    w.write_all(dict.as_bytes())?;
    Ok(())
}

fn write_f32_npy<W: Write>(w: &mut W, shape: &[usize], values: impl Iterator<Item = f32>) -> Result<()> {
    write_npy_header(w, "<f4", shape)?;
    for v in values {
        w.write_f32::<LittleEndian>(v)?;
    }
    Ok(())
}

fn write_bool_npy<W: Write>(w: &mut W, shape: &[usize], values: impl Iterator<Item = bool>) -> Result<()> {
    write_npy_header(w, "|b1", shape)?;
    for v in values {
        w.write_u8(v as u8)?;
    }
    Ok(())
}

/// Write the four arrays as members of one `.npz` archive.
fn write_npz(path: &Path, dataset: &TrainingDataset) -> Result<()> {
    let rows = dataset.rows();
    let n = rows.len();
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let mut zip = ZipWriter::new(BufWriter::new(File::create(path)?));

    zip.start_file("inputs.npy", options)?;
    write_f32_npy(&mut zip, &[n, 2], rows.iter().flat_map(|r| r.inputs))?;
    zip.start_file("targets.npy", options)?;
    write_f32_npy(&mut zip, &[n, N_TARGETS], rows.iter().flat_map(|r| r.targets))?;
    zip.start_file("mask.npy", options)?;
    write_bool_npy(&mut zip, &[n, N_TARGETS], rows.iter().flat_map(|r| r.mask))?;
    zip.start_file("weights.npy", options)?;
    write_f32_npy(&mut zip, &[n], rows.iter().map(|r| r.weight))?;

    zip.finish()?.flush()?;
    debug!("Wrote {} rows to {:?}", n, path);
    Ok(())
}

#[derive(Serialize)]
struct Summary<'a> {
    observations: usize,
    n_targets: usize,
    stats: &'a AssemblyStats,
    coverage: &'a [TargetCoverage],
    ids: Vec<&'a str>,
}

/// Write `training_data.npz` and `summary.json` into `dir`, creating it if
/// needed. Returns the paths written.
pub fn write_dataset(
    dir: &Path,
    dataset: &TrainingDataset,
    stats: &AssemblyStats,
    coverage: &[TargetCoverage],
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let rows = dataset.rows();

    let npz = dir.join(DATASET_FILE);
    write_npz(&npz, dataset)?;

    let summary = dir.join(SUMMARY_FILE);
    write_json(
        &summary,
        &Summary {
            observations: rows.len(),
            n_targets: N_TARGETS,
            stats,
            coverage,
            ids: rows.iter().map(|r| r.id.as_str()).collect(),
        },
    )?;

    info!("Saved {} observations to {:?}", rows.len(), npz);
    Ok(vec![npz, summary])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::residuals::{DatasetRow, DS_INDEX};
    use std::io::Read;
    use tempfile::TempDir;
    use zip::ZipArchive;

    /// Parse a v1.0 header: returns (dict text, data offset).
    fn read_header(bytes: &[u8]) -> (String, usize) {
        assert_eq!(&bytes[..6], NPY_MAGIC);
        assert_eq!(&bytes[6..8], &[1, 0]);
        let len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        let dict = String::from_utf8(bytes[10..10 + len].to_vec()).unwrap();
        (dict, 10 + len)
    }

    fn member(archive: &mut ZipArchive<File>, name: &str) -> Vec<u8> {
        let mut bytes = Vec::new();
        archive.by_name(name).unwrap().read_to_end(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_header_alignment_and_shape() {
        let mut buf = Vec::new();
        write_npy_header(&mut buf, "<f4", &[3, 11]).unwrap();
        assert_eq!(buf.len() % NPY_ALIGN, 0);
        let (dict, offset) = read_header(&buf);
        assert_eq!(offset, buf.len());
        assert!(dict.starts_with("{'descr': '<f4', 'fortran_order': False, 'shape': (3, 11), }"));
        assert!(dict.ends_with('\n'));

        let mut buf = Vec::new();
        write_npy_header(&mut buf, "|b1", &[7]).unwrap();
        let (dict, _) = read_header(&buf);
        assert!(dict.contains("'shape': (7,)"));
    }

    #[test]
    fn test_write_dataset_archive() {
        let mut ds = TrainingDataset::new();
        let mut mask = [false; N_TARGETS];
        mask[0] = true;
        mask[DS_INDEX] = true;
        let mut targets = [0.0; N_TARGETS];
        targets[0] = 3.5;
        targets[DS_INDEX] = 1.25;
        ds.push(DatasetRow {
            id: "n1".into(),
            inputs: [0.25, 0.5],
            targets,
            mask,
            weight: 0.6,
        });

        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("ml_data");
        let stats = AssemblyStats {
            total: 1,
            matched: 1,
            emitted: 1,
            ..Default::default()
        };
        let paths = write_dataset(&dir, &ds, &stats, &[]).unwrap();
        assert_eq!(paths, vec![dir.join(DATASET_FILE), dir.join(SUMMARY_FILE)]);

        let mut archive = ZipArchive::new(File::open(dir.join(DATASET_FILE)).unwrap()).unwrap();
        let mut names: Vec<&str> = archive.file_names().collect();
        names.sort();
        assert_eq!(names, ["inputs.npy", "mask.npy", "targets.npy", "weights.npy"]);
        assert_eq!(
            archive.by_name("targets.npy").unwrap().compression(),
            CompressionMethod::Stored
        );

        let bytes = member(&mut archive, "targets.npy");
        let (dict, offset) = read_header(&bytes);
        assert!(dict.contains("(1, 11)"));
        let data = &bytes[offset..];
        assert_eq!(data.len(), N_TARGETS * 4);
        let first = f32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        assert_eq!(first, 3.5);
        let last = f32::from_le_bytes(data[40..44].try_into().unwrap());
        assert_eq!(last, 1.25);

        let bytes = member(&mut archive, "mask.npy");
        let (dict, offset) = read_header(&bytes);
        assert!(dict.contains("'|b1'"));
        let data = &bytes[offset..];
        assert_eq!(data.len(), N_TARGETS);
        assert_eq!(data[0], 1);
        assert_eq!(data[1], 0);
        assert_eq!(data[DS_INDEX], 1);

        let bytes = member(&mut archive, "inputs.npy");
        let (dict, offset) = read_header(&bytes);
        assert!(dict.contains("(1, 2)"));
        assert_eq!(f32::from_le_bytes(bytes[offset + 4..offset + 8].try_into().unwrap()), 0.5);

        let bytes = member(&mut archive, "weights.npy");
        let (dict, offset) = read_header(&bytes);
        assert!(dict.contains("(1,)"));
        assert_eq!(f32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()), 0.6);

        let summary: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.join(SUMMARY_FILE)).unwrap()).unwrap();
        assert_eq!(summary["observations"], 1);
        assert_eq!(summary["stats"]["emitted"], 1);
        assert_eq!(summary["ids"][0], "n1");
    }

    #[test]
    fn test_empty_dataset_writes_zero_row_arrays() {
        let tmp = TempDir::new().unwrap();
        write_dataset(tmp.path(), &TrainingDataset::new(), &AssemblyStats::default(), &[]).unwrap();
        let mut archive = ZipArchive::new(File::open(tmp.path().join(DATASET_FILE)).unwrap()).unwrap();
        let bytes = member(&mut archive, "targets.npy");
        let (dict, offset) = read_header(&bytes);
        assert!(dict.contains("(0, 11)"));
        assert_eq!(offset, bytes.len());
    }
}
