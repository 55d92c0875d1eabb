//! Alignment depth along a reference genome.
//!
//! For each sampled position in the reference, the scanner reports two values:
//!
//! * identical: the number of aligned bases that match the reference base (case-insensitive);
//! * aligned: the number of aligned bases.
//!
//! The reference genome itself is never counted.
//! By default, each other genome contributes at most once per column.
//! With [`DepthParams::count_dupes`], every aligned base from the other genomes is counted, including paralogous copies.
//!
//! The values are written as fixedStep wiggle tracks with one block per reference sequence.

use crate::{AlignmentStore, ColumnEntry, ColumnIterator, Genome, HalError, Result, SegmentColumnIterator, Sequence};
use crate::formats::WiggleTrack;

use std::collections::{BTreeSet, HashSet};
use std::io::Write;
use std::ops::RangeInclusive;
use std::rc::Rc;


//-----------------------------------------------------------------------------

/// Parameters for a depth scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepthParams {
    /// Scan only this sequence of the reference genome.
    ///
    /// If not set, the coordinates are genome-relative.
    pub sequence: Option<String>,
    /// Start of the scanned range.
    pub start: usize,
    /// Length of the scanned range, or `0` for the rest of the sequence or the genome.
    pub length: usize,
    /// Distance between sampled positions.
    pub step: usize,
    /// Genomes counted in the columns (all genomes if empty).
    pub targets: BTreeSet<String>,
    /// Count only the genomes in the subtree rooted at this genome.
    pub root: Option<String>,
    /// Do not count genomes that have children in the tree.
    pub no_ancestors: bool,
    /// Count every aligned base instead of every aligned genome.
    pub count_dupes: bool,
}

impl DepthParams {
    /// Default distance between sampled positions.
    pub const STEP: usize = 1;

    /// Empty entries are dropped from the column after this many positions.
    pub const DEFRAGMENT_INTERVAL: usize = 1000;
}

impl Default for DepthParams {
    fn default() -> Self {
        DepthParams {
            sequence: None,
            start: 0,
            length: 0,
            step: Self::STEP,
            targets: BTreeSet::new(),
            root: None,
            no_ancestors: false,
            count_dupes: false,
        }
    }
}

//-----------------------------------------------------------------------------

/// Depth values for a single column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Depth {
    /// Number of aligned bases matching the reference base.
    pub identical: usize,
    /// Number of aligned bases.
    pub aligned: usize,
}

/// Computes the depth of a column.
///
/// The reference base is the first base in the entry for the reference sequence.
/// Without `count_dupes`, each genome other than the reference counts once as aligned, and once as identical if any of its bases matches the reference base.
/// With `count_dupes`, every base from a genome other than the reference counts.
///
/// Returns [`HalError::InvariantViolation`] if the reference sequence has no bases in the column.
///
/// # Examples
///
/// ```
/// use hal_base::ColumnEntry;
/// use hal_base::depth::{self, Depth};
///
/// let mut reference = ColumnEntry::new("human", "chr1");
/// reference.bases.push(b'A');
/// let mut other = ColumnEntry::new("chimp", "chr1");
/// other.bases.push(b'a');
/// let column = vec![reference, other];
///
/// let depth = depth::column_depth(&column, "human", "chr1", false).unwrap();
/// assert_eq!(depth, Depth { identical: 1, aligned: 1 });
/// ```
pub fn column_depth(column: &[ColumnEntry], reference_genome: &str, reference_sequence: &str, count_dupes: bool) -> Result<Depth> {
    let reference = column.iter().find(|entry| {
        entry.genome == reference_genome && entry.sequence == reference_sequence && !entry.is_empty()
    }).ok_or_else(|| HalError::invariant(format!(
        "reference sequence {} of genome {} is missing from the column", reference_sequence, reference_genome
    )))?;
    let reference_base = reference.bases[0].to_ascii_lowercase();
    let matches = |base: &u8| base.to_ascii_lowercase() == reference_base;

    let mut result = Depth::default();
    if count_dupes {
        for entry in column.iter().filter(|entry| entry.genome != reference_genome) {
            result.aligned += entry.bases.len();
            result.identical += entry.bases.iter().filter(|base| matches(*base)).count();
        }
    } else {
        let mut aligned: HashSet<&str> = HashSet::new();
        let mut identical: HashSet<&str> = HashSet::new();
        for entry in column.iter() {
            if entry.genome == reference_genome || entry.is_empty() {
                continue;
            }
            aligned.insert(&entry.genome);
            if entry.bases.iter().any(matches) {
                identical.insert(&entry.genome);
            }
        }
        result.aligned = aligned.len();
        result.identical = identical.len();
    }

    Ok(result)
}

//-----------------------------------------------------------------------------

/// A pair of wiggle tracks for identical and aligned depth.
#[derive(Debug)]
pub struct DepthTracks<I: Write, A: Write> {
    /// Track for the number of identical bases.
    pub identical: WiggleTrack<I>,
    /// Track for the number of aligned bases.
    pub aligned: WiggleTrack<A>,
}

impl<I: Write, A: Write> DepthTracks<I, A> {
    /// Creates new tracks writing to the given streams.
    pub fn new(identical: I, aligned: A) -> Self {
        DepthTracks {
            identical: WiggleTrack::new(identical),
            aligned: WiggleTrack::new(aligned),
        }
    }

    /// Starts a new block in both tracks.
    pub fn start(&mut self, sequence: &str, start: usize, step: usize) -> Result<()> {
        self.identical.start(sequence, start, step)?;
        self.aligned.start(sequence, start, step)?;
        Ok(())
    }

    /// Writes the depth of the next sampled position.
    pub fn push(&mut self, depth: Depth) -> Result<()> {
        self.identical.push(depth.identical)?;
        self.aligned.push(depth.aligned)?;
        Ok(())
    }

    /// Flushes both tracks.
    pub fn flush(&mut self) -> Result<()> {
        self.identical.flush()?;
        self.aligned.flush()?;
        Ok(())
    }
}

//-----------------------------------------------------------------------------

/// A part of a sequence to be scanned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequenceRange {
    /// Name of the sequence.
    pub sequence: String,
    /// Sequence-relative start of the range.
    pub start: usize,
    /// Length of the range.
    pub length: usize,
}

/// Splits a genome-relative range into sequence-relative ranges.
///
/// If `length` is `0`, the range extends to the end of the genome.
/// Empty sequences and sequences outside the range are skipped.
///
/// Returns [`HalError::Range`] if the range extends past the end of the genome.
pub fn sequence_ranges(genome: &Genome, start: usize, length: usize) -> Result<Vec<SequenceRange>> {
    let total = genome.sequence_length();
    if start > total || length > total - start {
        return Err(HalError::range(format!(
            "{} bases starting from {} in genome {} of length {}", length, start, genome.name(), total
        )));
    }
    let end = if length == 0 { total } else { start + length };

    let mut result = Vec::new();
    for sequence in genome.sequences() {
        let interval = sequence.interval();
        let low = start.max(interval.start);
        let high = end.min(interval.end);
        if low < high {
            result.push(SequenceRange {
                sequence: sequence.name().to_string(),
                start: low - interval.start,
                length: high - low,
            });
        }
    }
    Ok(result)
}

/// Samples the columns in a range of reference positions and writes their depth to the tracks.
///
/// The iterator must be positioned at the start of `range`.
/// With step `1`, the iterator moves one column at a time and is defragmented periodically.
/// Otherwise it jumps directly to each sampled position.
/// The scan stops after the last column of the range or when the next sampled position is past the range.
pub fn scan_columns<C: ColumnIterator, I: Write, A: Write>(
    iterator: &mut C,
    reference: (&str, &str),
    range: RangeInclusive<usize>,
    step: usize,
    count_dupes: bool,
    tracks: &mut DepthTracks<I, A>
) -> Result<()> {
    let (reference_genome, reference_sequence) = reference;
    let last = *range.end();
    let mut position = *range.start();
    loop {
        let depth = column_depth(iterator.column(), reference_genome, reference_sequence, count_dupes)?;
        tracks.push(depth)?;
        if iterator.last_column() {
            break;
        }
        position += step;
        if position > last {
            break;
        }
        if step == 1 {
            iterator.to_right()?;
            if position % DepthParams::DEFRAGMENT_INTERVAL == 0 {
                iterator.defragment();
            }
        } else {
            iterator.to_site(position, last)?;
        }
    }
    Ok(())
}

//-----------------------------------------------------------------------------

/// Computes identical and aligned depth tracks for a reference genome.
///
/// The scanner validates the parameters against the alignment when it is created.
///
/// # Examples
///
/// ```
/// use hal_base::{AlignmentStore, DepthParams, DepthScanner, Segment, SequenceInfo, StoreParams};
/// use hal_base::depth::DepthTracks;
///
/// let filename = std::env::temp_dir().join(format!("hal-base-depth-doc-{}.db", std::process::id()));
/// let mut store = AlignmentStore::new(StoreParams::default());
/// store.create_new(&filename).unwrap();
/// let root = store.add_root_genome("A", 0.0).unwrap();
/// root.set_dimensions(&[SequenceInfo::new("a1", 2)]).unwrap();
/// root.set_sequence_dna("a1", b"AC").unwrap();
/// let leaf = store.add_leaf_genome("B", "A", 1.0).unwrap();
/// leaf.set_dimensions(&[SequenceInfo::new("b1", 2)]).unwrap();
/// leaf.set_sequence_dna("b1", b"AG").unwrap();
/// leaf.add_segment(Segment::new(0, 2, "A", 0, false)).unwrap();
///
/// let scanner = DepthScanner::new(&store, DepthParams::default()).unwrap();
/// let mut tracks = DepthTracks::new(Vec::new(), Vec::new());
/// scanner.scan("B", &mut tracks).unwrap();
/// let identical = String::from_utf8(tracks.identical.into_inner()).unwrap();
/// let aligned = String::from_utf8(tracks.aligned.into_inner()).unwrap();
/// assert_eq!(identical, "fixedStep chrom=b1 start=1 step=1\n1\n0\n");
/// assert_eq!(aligned, "fixedStep chrom=b1 start=1 step=1\n1\n1\n");
/// drop(scanner);
///
/// store.close().unwrap();
/// std::fs::remove_file(&filename).unwrap();
/// ```
#[derive(Debug)]
pub struct DepthScanner<'a> {
    store: &'a AlignmentStore,
    params: DepthParams,
    targets: Option<HashSet<String>>,
}

impl<'a> DepthScanner<'a> {
    /// Creates a scanner for the alignment.
    ///
    /// If a root genome is given and it is not the root of the tree, the counted genomes are restricted to its subtree.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::InvalidArgument`] if the step is `0`, both targets and a root are given, or the alignment is empty.
    /// Returns [`HalError::NotFound`] if a target genome or the root genome does not exist.
    pub fn new(store: &'a AlignmentStore, params: DepthParams) -> Result<Self> {
        if params.step == 0 {
            return Err(HalError::invalid("step must be positive"));
        }
        if params.root.is_some() && !params.targets.is_empty() {
            return Err(HalError::invalid("root and targets cannot be used together"));
        }
        if store.num_genomes() == 0 {
            return Err(HalError::invalid("the alignment is empty"));
        }

        let mut targets: Option<HashSet<String>> = None;
        if !params.targets.is_empty() {
            for target in params.targets.iter() {
                if !store.tree().contains(target) {
                    return Err(HalError::not_found(format!("target genome {}", target)));
                }
            }
            targets = Some(params.targets.iter().cloned().collect());
        }
        if let Some(root) = params.root.as_ref() {
            if !store.tree().contains(root) {
                return Err(HalError::not_found(format!("root genome {}", root)));
            }
            if store.tree().root_name() != Some(root.as_str()) {
                let subtree = store.genomes_in_subtree(root)?;
                targets = Some(subtree.into_iter().map(String::from).collect());
            }
        }

        Ok(DepthScanner { store, params, targets })
    }

    /// Returns the parameters of the scan.
    pub fn params(&self) -> &DepthParams {
        &self.params
    }

    /// Returns the counted genomes, or [`None`] if all genomes are counted.
    pub fn targets(&self) -> Option<&HashSet<String>> {
        self.targets.as_ref()
    }

    /// Scans the reference genome and writes the depth tracks.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::NotFound`] if the reference genome or the requested sequence does not exist.
    /// Returns [`HalError::InvalidArgument`] if ancestors are excluded and the reference has children in the tree.
    /// Returns [`HalError::Range`] if the requested range is out of bounds.
    /// Passes through any errors from building the columns and from writing the tracks.
    pub fn scan<I: Write, A: Write>(&self, reference: &str, tracks: &mut DepthTracks<I, A>) -> Result<()> {
        let genome = self.store.open_genome(reference)?.ok_or_else(
            || HalError::not_found(format!("reference genome {}", reference))
        )?;
        if self.params.no_ancestors {
            if let Some(node) = self.store.tree().node_by_name(reference) {
                if !node.is_leaf() {
                    return Err(HalError::invalid(format!(
                        "reference genome {} is an ancestor, but ancestors are excluded", reference
                    )));
                }
            }
        }

        match self.params.sequence.as_ref() {
            Some(name) => {
                let sequence = genome.sequence(name).ok_or_else(
                    || HalError::not_found(format!("sequence {} in genome {}", name, reference))
                )?.clone();
                self.scan_sequence(&genome, &sequence, self.params.start, self.params.length, tracks)?;
            },
            None => {
                for range in sequence_ranges(&genome, self.params.start, self.params.length)? {
                    let sequence = genome.sequence(&range.sequence).ok_or_else(
                        || HalError::invariant(format!("sequence {} disappeared from genome {}", range.sequence, reference))
                    )?.clone();
                    self.scan_sequence(&genome, &sequence, range.start, range.length, tracks)?;
                }
            },
        }
        tracks.flush()
    }

    fn scan_sequence<I: Write, A: Write>(
        &self,
        genome: &Rc<Genome>,
        sequence: &Sequence,
        start: usize, length: usize,
        tracks: &mut DepthTracks<I, A>
    ) -> Result<()> {
        let sequence_len = sequence.len();
        if sequence_len == 0 {
            return Ok(());
        }
        if start > sequence_len || length > sequence_len - start {
            return Err(HalError::range(format!(
                "{} bases starting from {} in sequence {} of length {}", length, start, sequence.name(), sequence_len
            )));
        }
        let length = if length == 0 { sequence_len - start } else { length };
        if length == 0 {
            return Ok(());
        }
        log::debug!("Scanning {} bases of sequence {} starting from {}", length, sequence.name(), start);

        let step = self.params.step;
        tracks.start(sequence.name(), start, step)?;
        let first = sequence.start() + start;
        let last = first + length - 1;
        let mut iterator = SegmentColumnIterator::new(
            self.store, genome.clone(), first, last, self.targets.clone(), self.params.no_ancestors
        )?;
        scan_columns(
            &mut iterator,
            (genome.name(), sequence.name()),
            first..=last, step,
            self.params.count_dupes,
            tracks
        )
    }
}

//-----------------------------------------------------------------------------
