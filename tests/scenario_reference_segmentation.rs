// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! S1 (spec §8): a single reference genome splits at a distinctive
//! marker, every segment is recorded against the reference sample/contig,
//! and every metadata stream exists once the archive is closed.

mod common;

use pancore::Config;
use test_log::test;

#[test]
fn reference_genome_segments_and_closes_cleanly() -> pancore::Result<()> {
    let work_dir = tempfile::tempdir()?;
    let sequence = common::marker_genome("ACGTGGCA", 40);
    let fasta = common::write_fasta(work_dir.path(), "reference.fa", "chr1", &sequence);

    let config = Config::new("ignored").k(6).segment_size(8).no_raw_groups(4);
    let (_guard, pipeline) = common::fresh_pipeline(config);

    pipeline.seed_reference("reference", &fasta)?;

    assert_eq!(pipeline.collection().samples(), vec!["reference".to_string()]);
    assert_eq!(pipeline.collection().contigs("reference"), vec!["chr1".to_string()]);

    let segments = pipeline.collection().segments("reference", "chr1").expect("contig was registered");
    assert!(!segments.is_empty(), "a genome this long should split into at least one segment");
    assert!(segments.iter().all(|s| s.raw_length > 0));
    assert!(!pipeline.splitter_index().is_empty(), "the marker should have produced at least one splitter");

    pipeline.close()?;

    for stream in ["file_type_info", "params", "splitters", "collection-main", "collection-details"] {
        assert!(pipeline.archive().part_count(stream)? >= 1, "{stream} should have at least one part");
    }
    Ok(())
}
