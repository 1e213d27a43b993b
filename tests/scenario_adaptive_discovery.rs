// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! S5 (spec §8): a "hard" contig sharing none of the reference's splitters
//! still gets segmented, once adaptive discovery finds splitters local to
//! it and folds them into the splitter index.

mod common;

use pancore::Config;
use test_log::test;

#[test]
fn hard_contig_is_segmented_via_adaptive_discovery() -> pancore::Result<()> {
    let work_dir = tempfile::tempdir()?;
    // The reference's only distinctive region is this marker; every other
    // base is part of a homopolymer run that never yields a singleton.
    let reference_sequence = common::marker_genome("ACGTGGCA", 40);
    let reference_fasta = common::write_fasta(work_dir.path(), "reference.fa", "chr1", &reference_sequence);

    // The hard contig's marker shares no k-mer (forward or reverse
    // complement) with the reference's, so the reference's splitter never
    // occurs in it: the first segmentation pass can't find a single hit.
    let hard_sequence = common::marker_genome("TGCACCGT", 40);
    let hard_fasta = common::write_fasta(work_dir.path(), "hard.fa", "hard_chr", &hard_sequence);

    let config = Config::new("ignored").k(6).segment_size(8).no_raw_groups(4).adaptive_compression(true);
    let (_guard, pipeline) = common::fresh_pipeline(config);

    pipeline.seed_reference("reference", &reference_fasta)?;
    let splitters_after_seeding = pipeline.splitter_index().len();
    assert!(splitters_after_seeding > 0, "the reference marker should have produced at least one splitter");

    pipeline.append_file("hard_sample", &hard_fasta)?;

    let segments = pipeline.collection().segments("hard_sample", "hard_chr").expect("hard contig registered");
    assert!(!segments.is_empty());
    assert!(
        pipeline.splitter_index().len() > splitters_after_seeding,
        "adaptive discovery should have added at least one splitter local to the hard contig"
    );
    Ok(())
}
