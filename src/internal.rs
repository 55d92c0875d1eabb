// Shared helpers for unit tests.

use crate::{AlignmentStore, Genome, Segment, SequenceInfo, StoreParams};
use crate::utils;

use simple_sds::serialize;

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

//-----------------------------------------------------------------------------

// Alignment files.

pub(crate) fn small_params() -> StoreParams {
    StoreParams { chunk_size: 4, compression_level: 6 }
}

pub(crate) fn temp_alignment_name() -> PathBuf {
    let filename = serialize::temp_file_name("hal-base");
    assert!(!utils::file_exists(&filename), "Alignment {} already exists", filename.display());
    filename
}

// Creates a new alignment, builds it with the given function, and closes it.
pub(crate) fn create_alignment<F: FnOnce(&mut AlignmentStore)>(build: F) -> PathBuf {
    let filename = temp_alignment_name();
    let mut store = AlignmentStore::new(small_params());
    let result = store.create_new(&filename);
    assert!(result.is_ok(), "Failed to create alignment {}: {}", filename.display(), result.unwrap_err());
    build(&mut store);
    close_alignment(&mut store);
    filename
}

pub(crate) fn open_alignment(filename: &Path, read_only: bool) -> AlignmentStore {
    let mut store = AlignmentStore::new(StoreParams::default());
    let result = store.open(filename, read_only);
    assert!(result.is_ok(), "Failed to open alignment {}: {}", filename.display(), result.unwrap_err());
    store
}

pub(crate) fn close_alignment(store: &mut AlignmentStore) {
    let result = store.close();
    assert!(result.is_ok(), "Failed to close the alignment: {}", result.unwrap_err());
}

pub(crate) fn remove_alignment(filename: &Path) {
    let result = fs::remove_file(filename);
    assert!(result.is_ok(), "Failed to remove alignment {}: {}", filename.display(), result.unwrap_err());
}

//-----------------------------------------------------------------------------

// Genomes.

pub(crate) fn open_genome(store: &AlignmentStore, name: &str) -> Rc<Genome> {
    let result = store.open_genome(name);
    assert!(result.is_ok(), "Failed to open genome {}: {}", name, result.unwrap_err());
    let result = result.unwrap();
    assert!(result.is_some(), "Genome {} does not exist", name);
    result.unwrap()
}

pub(crate) fn set_contents(genome: &mut Genome, sequences: &[(&str, &[u8])]) {
    let infos: Vec<SequenceInfo> = sequences.iter().map(|(name, dna)| SequenceInfo::new(name, dna.len())).collect();
    let result = genome.set_dimensions(&infos);
    assert!(result.is_ok(), "Failed to set dimensions for {}: {}", genome.name(), result.unwrap_err());
    for (name, dna) in sequences {
        let result = genome.set_sequence_dna(name, dna);
        assert!(result.is_ok(), "Failed to set DNA for {} in {}: {}", name, genome.name(), result.unwrap_err());
    }
}

pub(crate) fn add_segments(genome: &mut Genome, segments: &[Segment]) {
    for segment in segments {
        let result = genome.add_segment(segment.clone());
        assert!(result.is_ok(), "Failed to add segment {:?} to {}: {}", segment, genome.name(), result.unwrap_err());
    }
}

// Root A with leaves B, C, P, and O.
//
// * B is aligned to A in the forward orientation.
// * C is aligned to the second half of A in the reverse orientation.
// * P has two copies of the first two bases of A.
// * O has three sequences (one of them empty) and no alignment.
pub(crate) fn build_example(store: &mut AlignmentStore) {
    let genome = store.add_root_genome("A", 0.0).unwrap();
    set_contents(genome, &[("a1", b"ACGTACGT")]);

    let genome = store.add_leaf_genome("B", "A", 1.0).unwrap();
    set_contents(genome, &[("b1", b"ACGTTCGT")]);
    add_segments(genome, &[Segment::new(0, 8, "A", 0, false)]);

    let genome = store.add_leaf_genome("C", "A", 2.0).unwrap();
    set_contents(genome, &[("c1", b"ACGT")]);
    add_segments(genome, &[Segment::new(0, 4, "A", 4, true)]);

    let genome = store.add_leaf_genome("P", "A", 0.5).unwrap();
    set_contents(genome, &[("p1", b"ACAC")]);
    add_segments(genome, &[Segment::new(0, 2, "A", 0, false), Segment::new(2, 2, "A", 0, false)]);

    let genome = store.add_leaf_genome("O", "A", 3.0).unwrap();
    set_contents(genome, &[("o1", b"GGA"), ("o2", b""), ("o3", b"TT")]);
}

//-----------------------------------------------------------------------------
