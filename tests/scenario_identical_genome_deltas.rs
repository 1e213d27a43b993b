// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! S2 (spec §8): a second genome identical to the reference lands every
//! segment on an already-existing group, as a delta (`in_group_id > 0`).

mod common;

use pancore::Config;
use test_log::test;

#[test]
fn identical_second_genome_reuses_every_group() -> pancore::Result<()> {
    let work_dir = tempfile::tempdir()?;
    let sequence = common::marker_genome("ACGTGGCA", 40);
    let reference_fasta = common::write_fasta(work_dir.path(), "reference.fa", "chr1", &sequence);
    let second_fasta = common::write_fasta(work_dir.path(), "second.fa", "chr1", &sequence);

    let config = Config::new("ignored").k(6).segment_size(8).no_raw_groups(4);
    let (_guard, pipeline) = common::fresh_pipeline(config);

    pipeline.seed_reference("reference", &reference_fasta)?;
    pipeline.append_file("second", &second_fasta)?;

    let reference_segments = pipeline.collection().segments("reference", "chr1").expect("reference registered");
    let second_segments = pipeline.collection().segments("second", "chr1").expect("second registered");

    assert_eq!(reference_segments.len(), second_segments.len(), "identical contigs should split identically");
    assert!(!reference_segments.is_empty());
    for (first, second) in reference_segments.iter().zip(second_segments.iter()) {
        assert_eq!(first.group_id, second.group_id, "an identical segment must land in the same group");
        assert_ne!(second.in_group_id, first.in_group_id, "the second sighting must be a distinct member of the group");
    }
    Ok(())
}
