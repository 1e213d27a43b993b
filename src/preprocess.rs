// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! ASCII-to-2-bit contig preprocessing shared by `SplitterSelector` and
//! `CompressionPipeline`.

use crate::kmer::fold_base;

/// Marks a preprocessed position that was not `A/C/G/T` (case-insensitive).
pub const AMBIGUOUS: u8 = 4;

/// Folds raw FASTA-line bytes into `{0,1,2,3,AMBIGUOUS}`. Bytes `<= 64`
/// (newlines, headers' leading `>`, and anything below `'A'`) are dropped
/// entirely rather than turned into ambiguous symbols, matching the
/// "bytes <= 64 are dropped" preprocessing rule.
#[must_use]
pub fn preprocess(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    for &byte in raw {
        if byte <= 64 {
            continue;
        }
        out.push(fold_base(byte).unwrap_or(AMBIGUOUS));
    }
    out
}

/// Reverse-complements a preprocessed symbol slice (`{0,1,2,3,AMBIGUOUS}`);
/// ambiguous positions are preserved, just reversed in place.
#[must_use]
pub fn reverse_complement(symbols: &[u8]) -> Vec<u8> {
    symbols
        .iter()
        .rev()
        .map(|&s| if s == AMBIGUOUS { AMBIGUOUS } else { 3 - s })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_case_and_flags_ambiguous() {
        let out = preprocess(b"acgtNnRYkm");
        assert_eq!(out[0], 0);
        assert_eq!(out[1], 1);
        assert_eq!(out[2], 2);
        assert_eq!(out[3], 3);
        assert!(out[4..].iter().all(|&s| s == AMBIGUOUS));
    }

    #[test]
    fn drops_bytes_at_or_below_64() {
        let out = preprocess(b"\n\r>header\nACGT");
        assert_eq!(out.len(), 4 + "header".len());
    }

    #[test]
    fn reverse_complement_round_trips() {
        let symbols = preprocess(b"ACGTN");
        let rc = reverse_complement(&symbols);
        assert_eq!(reverse_complement(&rc), symbols);
        assert_eq!(rc, vec![AMBIGUOUS, 0, 1, 2, 3]);
    }
}
