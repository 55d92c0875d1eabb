//! Alignment columns.
//!
//! An alignment column is the set of bases in all genomes that are aligned to a single position in a reference genome.
//! The column is found by following segments from the reference genome to other genomes and segments from other genomes back to it.
//! Each genome position belongs to at most one place in a column.

use crate::{utils, AlignmentStore, Genome, HalError, Result};

use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;


//-----------------------------------------------------------------------------

/// Bases from a single sequence in an alignment column.
///
/// If the reference sequence is in the column, its first base is the reference base.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnEntry {
    /// Name of the genome.
    pub genome: String,
    /// Name of the sequence within the genome.
    pub sequence: String,
    /// Bases aligned to the column, in the orientation of the reference.
    pub bases: Vec<u8>,
}

impl ColumnEntry {
    /// Creates an empty entry for the sequence.
    pub fn new(genome: &str, sequence: &str) -> Self {
        ColumnEntry {
            genome: genome.to_string(),
            sequence: sequence.to_string(),
            bases: Vec::new(),
        }
    }

    /// Returns `true` if the sequence has no bases in the current column.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }
}

/// A cursor over the columns of an alignment, anchored to positions in a reference genome.
///
/// Positions are genome-relative coordinates in the reference genome.
/// The iterator covers an inclusive range of positions that is fixed at construction and can be changed with [`ColumnIterator::to_site`].
pub trait ColumnIterator {
    /// Returns the current column.
    ///
    /// Entries may be empty if their sequences were present in earlier columns.
    fn column(&self) -> &[ColumnEntry];

    /// Returns the current reference position.
    fn position(&self) -> usize;

    /// Moves to the next reference position.
    ///
    /// Returns [`HalError::Range`] if the current position is the last one.
    fn to_right(&mut self) -> Result<()>;

    /// Moves to the given reference position and sets the last position of the range.
    ///
    /// Returns [`HalError::Range`] if the position is past `last` or `last` is past the end of the reference.
    fn to_site(&mut self, position: usize, last: usize) -> Result<()>;

    /// Returns `true` if the current position is the last one in the range.
    fn last_column(&self) -> bool;

    /// Drops empty entries from the column.
    fn defragment(&mut self);
}

//-----------------------------------------------------------------------------

// Segments in other genomes that point to a specific genome, sorted by the position in the target.
#[derive(Debug, Default)]
struct IncomingSegments {
    segments: Vec<(Rc<Genome>, usize)>,
    max_len: usize,
}

impl IncomingSegments {
    fn new(target: &str, sources: &[Rc<Genome>]) -> Self {
        let mut segments: Vec<(Rc<Genome>, usize)> = Vec::new();
        let mut max_len = 0;
        for source in sources {
            for (index, segment) in source.segments().iter().enumerate() {
                if segment.other == target {
                    segments.push((source.clone(), index));
                    max_len = max_len.max(segment.length);
                }
            }
        }
        segments.sort_by_key(|(source, index)| source.segments()[*index].other_start);
        IncomingSegments { segments, max_len }
    }

    // Returns (source genome, position in the source, reversed) for each segment covering the target position.
    fn map_back(&self, position: usize) -> Vec<(Rc<Genome>, usize, bool)> {
        let low = position.saturating_sub(self.max_len.saturating_sub(1));
        let first = self.segments.partition_point(|(source, index)| source.segments()[*index].other_start < low);
        let mut result = Vec::new();
        for (source, index) in self.segments[first..].iter() {
            let segment = &source.segments()[*index];
            if segment.other_start > position {
                break;
            }
            if let Some(mapped) = segment.map_back(position) {
                result.push((source.clone(), mapped, segment.reversed));
            }
        }
        result
    }
}

//-----------------------------------------------------------------------------

/// A [`ColumnIterator`] that builds each column by traversing the alignment segments.
///
/// Starting from the reference position, the iterator follows segments from each genome to the genomes they point to, and segments pointing to each genome back to their source genomes.
/// Segments are looked up in the genome itself and in its children in the tree.
/// Bases reached through an odd number of reversed segments are complemented.
///
/// The reference genome is always included in the column.
/// Other genomes can be restricted to an allowlist, and internal nodes of the tree can be excluded.
/// Excluded genomes are still traversed, so genomes reachable only through them are found.
///
/// Genomes are opened lazily from the store and kept open for the lifetime of the iterator.
///
/// # Examples
///
/// ```
/// use hal_base::{AlignmentStore, ColumnIterator, Segment, SegmentColumnIterator, SequenceInfo, StoreParams};
///
/// let filename = std::env::temp_dir().join(format!("hal-base-column-doc-{}.db", std::process::id()));
/// let mut store = AlignmentStore::new(StoreParams::default());
/// store.create_new(&filename).unwrap();
/// let root = store.add_root_genome("A", 0.0).unwrap();
/// root.set_dimensions(&[SequenceInfo::new("a1", 4)]).unwrap();
/// root.set_sequence_dna("a1", b"ACGT").unwrap();
/// let leaf = store.add_leaf_genome("B", "A", 1.0).unwrap();
/// leaf.set_dimensions(&[SequenceInfo::new("b1", 4)]).unwrap();
/// leaf.set_sequence_dna("b1", b"ACGA").unwrap();
/// leaf.add_segment(Segment::new(0, 4, "A", 0, false)).unwrap();
///
/// let reference = store.open_genome("B").unwrap().unwrap();
/// let mut iter = SegmentColumnIterator::new(&store, reference, 0, 3, None, false).unwrap();
/// iter.to_site(3, 3).unwrap();
/// let column = iter.column();
/// assert_eq!(column.len(), 2);
/// assert_eq!(column[0].bases, b"A");
/// assert_eq!(column[1].genome, "A");
/// assert_eq!(column[1].bases, b"T");
/// drop(iter);
///
/// store.close().unwrap();
/// std::fs::remove_file(&filename).unwrap();
/// ```
#[derive(Debug)]
pub struct SegmentColumnIterator<'a> {
    store: &'a AlignmentStore,
    reference: Rc<Genome>,
    targets: Option<HashSet<String>>,
    no_ancestors: bool,
    position: usize,
    last: usize,
    genomes: HashMap<String, Rc<Genome>>,
    incoming: HashMap<String, Rc<IncomingSegments>>,
    entries: Vec<ColumnEntry>,
    entry_ids: HashMap<(String, String), usize>,
}

impl<'a> SegmentColumnIterator<'a> {
    /// Creates an iterator over reference positions `position..=last` and builds the first column.
    ///
    /// If `targets` is given, only the listed genomes and the reference genome are included in the columns.
    /// If `no_ancestors` is set, genomes with children in the tree are excluded, unless they are the reference.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::Range`] if the range is empty or out of bounds.
    /// Passes through errors from opening genomes and from traversing the segments.
    pub fn new(
        store: &'a AlignmentStore,
        reference: Rc<Genome>,
        position: usize, last: usize,
        targets: Option<HashSet<String>>,
        no_ancestors: bool
    ) -> Result<Self> {
        let mut genomes = HashMap::new();
        genomes.insert(reference.name().to_string(), reference.clone());
        let mut result = SegmentColumnIterator {
            store, reference, targets, no_ancestors,
            position, last,
            genomes,
            incoming: HashMap::new(),
            entries: Vec::new(),
            entry_ids: HashMap::new(),
        };
        result.check_range(position, last)?;
        result.build()?;
        Ok(result)
    }

    /// Returns the reference genome.
    pub fn reference(&self) -> &Genome {
        &self.reference
    }

    /// Returns the last reference position of the range.
    pub fn last(&self) -> usize {
        self.last
    }

    fn check_range(&self, position: usize, last: usize) -> Result<()> {
        if position > last || last >= self.reference.sequence_length() {
            return Err(HalError::range(format!(
                "columns {}..={} in genome {} of length {}", position, last, self.reference.name(), self.reference.sequence_length()
            )));
        }
        Ok(())
    }

    fn genome(&mut self, name: &str) -> Result<Rc<Genome>> {
        if let Some(genome) = self.genomes.get(name) {
            return Ok(genome.clone());
        }
        let genome = self.store.open_genome(name)?.ok_or_else(
            || HalError::not_found(format!("segment target genome {}", name))
        )?;
        self.genomes.insert(name.to_string(), genome.clone());
        Ok(genome)
    }

    fn incoming(&mut self, name: &str) -> Result<Rc<IncomingSegments>> {
        if let Some(incoming) = self.incoming.get(name) {
            return Ok(incoming.clone());
        }
        let mut sources = vec![self.genome(name)?];
        let children: Vec<String> = self.store.child_names(name)?.into_iter().map(String::from).collect();
        for child in children {
            sources.push(self.genome(&child)?);
        }
        let incoming = Rc::new(IncomingSegments::new(name, &sources));
        self.incoming.insert(name.to_string(), incoming.clone());
        Ok(incoming)
    }

    fn is_included(&self, genome: &str) -> bool {
        if genome == self.reference.name() {
            return true;
        }
        if let Some(targets) = self.targets.as_ref() {
            if !targets.contains(genome) {
                return false;
            }
        }
        if self.no_ancestors {
            if let Some(node) = self.store.tree().node_by_name(genome) {
                if !node.is_leaf() {
                    return false;
                }
            }
        }
        true
    }

    fn push_base(&mut self, genome: &Genome, position: usize, reversed: bool) -> Result<()> {
        let base = genome.base(position).ok_or_else(|| HalError::range(format!(
            "position {} in genome {} of length {}", position, genome.name(), genome.sequence_length()
        )))?;
        let base = if reversed { utils::complement(base) } else { base };
        let sequence = genome.sequence_at(position).ok_or_else(
            || HalError::invariant(format!("position {} in genome {} is not in a sequence", position, genome.name()))
        )?;
        let key = (genome.name().to_string(), sequence.name().to_string());
        let id = match self.entry_ids.get(&key) {
            Some(id) => *id,
            None => {
                self.entries.push(ColumnEntry::new(genome.name(), sequence.name()));
                self.entry_ids.insert(key, self.entries.len() - 1);
                self.entries.len() - 1
            },
        };
        self.entries[id].bases.push(base);
        Ok(())
    }

    // Builds the column for the current position.
    fn build(&mut self) -> Result<()> {
        for entry in self.entries.iter_mut() {
            entry.bases.clear();
        }

        let mut visited: HashSet<(String, usize)> = HashSet::new();
        let mut queue: VecDeque<(Rc<Genome>, usize, bool)> = VecDeque::new();
        queue.push_back((self.reference.clone(), self.position, false));
        while let Some((genome, position, reversed)) = queue.pop_front() {
            if !visited.insert((genome.name().to_string(), position)) {
                continue;
            }
            if self.is_included(genome.name()) {
                self.push_base(&genome, position, reversed)?;
            }

            for segment in genome.segments_at(position) {
                let other = self.genome(&segment.other)?;
                let mapped = segment.map(position).ok_or_else(
                    || HalError::invariant(format!("segment in genome {} does not cover position {}", genome.name(), position))
                )?;
                if mapped >= other.sequence_length() {
                    return Err(HalError::range(format!(
                        "segment from genome {} maps to position {} in genome {} of length {}",
                        genome.name(), mapped, other.name(), other.sequence_length()
                    )));
                }
                queue.push_back((other, mapped, reversed ^ segment.reversed));
            }

            let incoming = self.incoming(genome.name())?;
            for (source, mapped, segment_reversed) in incoming.map_back(position) {
                queue.push_back((source, mapped, reversed ^ segment_reversed));
            }
        }
        Ok(())
    }
}

impl<'a> ColumnIterator for SegmentColumnIterator<'a> {
    fn column(&self) -> &[ColumnEntry] {
        &self.entries
    }

    fn position(&self) -> usize {
        self.position
    }

    fn to_right(&mut self) -> Result<()> {
        if self.position >= self.last {
            return Err(HalError::range(format!("cannot move past the last column {}", self.last)));
        }
        self.position += 1;
        self.build()
    }

    fn to_site(&mut self, position: usize, last: usize) -> Result<()> {
        self.check_range(position, last)?;
        self.position = position;
        self.last = last;
        self.build()
    }

    fn last_column(&self) -> bool {
        self.position == self.last
    }

    fn defragment(&mut self) {
        self.entries.retain(|entry| !entry.is_empty());
        self.entry_ids.clear();
        for (id, entry) in self.entries.iter().enumerate() {
            self.entry_ids.insert((entry.genome.clone(), entry.sequence.clone()), id);
        }
    }
}

//-----------------------------------------------------------------------------
