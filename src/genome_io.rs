// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The FASTA reader is an external collaborator; this module pins down a
//! minimal contig-producing contract plus a reference streaming reader.

use std::io::{BufRead, BufReader};
use std::path::Path;

/// One contig as read from a genome file: a name and its raw sequence
/// bytes (newlines stripped, everything else passed through verbatim for
/// [`crate::preprocess::preprocess`] to fold).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contig {
    /// The FASTA header token up to the first whitespace, `>` stripped.
    pub name: String,
    /// Concatenated sequence bytes, newlines removed.
    pub sequence: Vec<u8>,
}

/// Produces a sample's contigs from a genome file. Implementations may
/// read eagerly or stream; the core only ever consumes the resulting
/// `Vec<Contig>` per file.
pub trait GenomeIO: Send + Sync {
    /// Opens and fully parses `path`. Callers map a failure here to
    /// `Error::InputUnreadable` and skip the file rather than abort.
    fn open(&self, path: &Path) -> crate::Result<Vec<Contig>>;
}

/// Reference [`GenomeIO`]: a line-oriented FASTA parser.
#[derive(Debug, Default, Clone, Copy)]
pub struct FastaReader;

impl GenomeIO for FastaReader {
    fn open(&self, path: &Path) -> crate::Result<Vec<Contig>> {
        let file = std::fs::File::open(path).map_err(|source| crate::Error::InputUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let reader = BufReader::new(file);

        let mut contigs = Vec::new();
        let mut current_name: Option<String> = None;
        let mut current_seq = Vec::new();

        for line in reader.lines() {
            let line = line.map_err(|source| crate::Error::InputUnreadable {
                path: path.to_path_buf(),
                source,
            })?;
            if let Some(header) = line.strip_prefix('>') {
                if let Some(name) = current_name.take() {
                    contigs.push(Contig {
                        name,
                        sequence: std::mem::take(&mut current_seq),
                    });
                }
                current_name = Some(header.split_whitespace().next().unwrap_or("").to_string());
            } else {
                current_seq.extend_from_slice(line.trim_end().as_bytes());
            }
        }
        if let Some(name) = current_name {
            contigs.push(Contig { name, sequence: current_seq });
        }

        Ok(contigs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_multiple_records() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, ">chr1 description\nACGT\nACGT\n>chr2\nTTTT").unwrap();

        let contigs = FastaReader.open(file.path()).unwrap();
        assert_eq!(contigs.len(), 2);
        assert_eq!(contigs[0].name, "chr1");
        assert_eq!(contigs[0].sequence, b"ACGTACGT");
        assert_eq!(contigs[1].name, "chr2");
        assert_eq!(contigs[1].sequence, b"TTTT");
    }

    #[test]
    fn missing_file_is_input_unreadable() {
        let err = FastaReader.open(Path::new("/nonexistent/path.fa")).unwrap_err();
        assert!(matches!(err, crate::Error::InputUnreadable { .. }));
    }
}
