//! Genomes and the cache of open genomes.
//!
//! A [`Genome`] is the payload stored for a single tree node: a list of sequences, the DNA of the genome, and alignment segments to other genomes.
//! Genome-relative coordinates are offsets in the concatenation of the sequences.
//! Sequence-relative coordinates are offsets in a single sequence.
//!
//! Genomes are materialized on demand through a [`GenomeCache`], which keeps at most one instance of each genome in memory.
//! Shared read handles are [`Rc<Genome>`] objects, while mutable access is only available through `&mut` borrows from the cache.

use crate::{HalError, MetaData, Result, StoreParams, TreeIndex};
use crate::utils;

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::ops::Range;
use std::rc::Rc;

use rusqlite::{Connection, OptionalExtension};


//-----------------------------------------------------------------------------

/// Name and length of a sequence, used for setting the dimensions of a genome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequenceInfo {
    /// Name of the sequence.
    pub name: String,
    /// Length of the sequence in bases.
    pub length: usize,
}

impl SequenceInfo {
    /// Creates a new sequence description.
    pub fn new(name: &str, length: usize) -> Self {
        SequenceInfo { name: name.to_string(), length }
    }
}

/// A named contiguous sequence (e.g. a chromosome) within a genome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sequence {
    name: String,
    start: usize,
    length: usize,
}

impl Sequence {
    /// Returns the name of the sequence.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the genome-relative start position of the sequence.
    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    /// Returns the length of the sequence.
    #[inline]
    pub fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if the sequence is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Returns the genome-relative interval covered by the sequence.
    #[inline]
    pub fn interval(&self) -> Range<usize> {
        self.start..self.start + self.length
    }
}

/// A gapless alignment block from an interval of this genome to an interval of another genome.
///
/// If the block is reversed, position `start + i` is aligned to position `other_start + length - 1 - i` on the opposite strand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    /// Genome-relative start position in this genome.
    pub start: usize,
    /// Length of the block.
    pub length: usize,
    /// Name of the other genome.
    pub other: String,
    /// Genome-relative start position in the other genome.
    pub other_start: usize,
    /// Is the block aligned to the reverse strand of the other genome?
    pub reversed: bool,
}

impl Segment {
    /// Creates a new segment.
    pub fn new(start: usize, length: usize, other: &str, other_start: usize, reversed: bool) -> Self {
        Segment { start, length, other: other.to_string(), other_start, reversed }
    }

    /// Returns the genome-relative interval covered by the segment in this genome.
    #[inline]
    pub fn interval(&self) -> Range<usize> {
        self.start..self.start + self.length
    }

    /// Returns the genome-relative interval covered by the segment in the other genome.
    #[inline]
    pub fn other_interval(&self) -> Range<usize> {
        self.other_start..self.other_start + self.length
    }

    /// Maps a position in this genome to the other genome.
    ///
    /// Returns [`None`] if the position is not covered by the segment.
    pub fn map(&self, position: usize) -> Option<usize> {
        if !self.interval().contains(&position) {
            return None;
        }
        let offset = position - self.start;
        if self.reversed {
            Some(self.other_start + self.length - 1 - offset)
        } else {
            Some(self.other_start + offset)
        }
    }

    /// Maps a position in the other genome back to this genome.
    ///
    /// Returns [`None`] if the position is not covered by the segment.
    pub fn map_back(&self, other_position: usize) -> Option<usize> {
        if !self.other_interval().contains(&other_position) {
            return None;
        }
        let offset = other_position - self.other_start;
        if self.reversed {
            Some(self.start + self.length - 1 - offset)
        } else {
            Some(self.start + offset)
        }
    }
}

//-----------------------------------------------------------------------------

/// A genome in the alignment.
///
/// Read access is available through shared references.
/// Any modification marks the genome dirty, and dirty genomes are written back to the container when they are closed.
#[derive(Debug)]
pub struct Genome {
    name: String,
    sequences: Vec<Sequence>,
    dna: Vec<u8>,
    // Sorted by start position.
    segments: Vec<Segment>,
    max_segment_len: usize,
    metadata: MetaData,
    dirty: bool,
}

/// Reading the genome.
impl Genome {
    /// Returns the name of the genome.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the total length of the sequences.
    #[inline]
    pub fn sequence_length(&self) -> usize {
        self.dna.len()
    }

    /// Returns the number of sequences.
    #[inline]
    pub fn num_sequences(&self) -> usize {
        self.sequences.len()
    }

    /// Returns the sequences in order.
    #[inline]
    pub fn sequences(&self) -> &[Sequence] {
        &self.sequences
    }

    /// Returns the sequence with the given name, or [`None`] if there is no such sequence.
    pub fn sequence(&self, name: &str) -> Option<&Sequence> {
        self.sequences.iter().find(|sequence| sequence.name == name)
    }

    /// Returns the sequence containing the genome-relative position, or [`None`] if the position is out of range.
    pub fn sequence_at(&self, position: usize) -> Option<&Sequence> {
        let index = self.sequences.partition_point(|sequence| sequence.start <= position);
        if index == 0 {
            return None;
        }
        let sequence = &self.sequences[index - 1];
        if sequence.interval().contains(&position) { Some(sequence) } else { None }
    }

    /// Returns the base at the genome-relative position, or [`None`] if the position is out of range.
    #[inline]
    pub fn base(&self, position: usize) -> Option<u8> {
        self.dna.get(position).copied()
    }

    /// Returns the DNA in the genome-relative interval.
    ///
    /// Returns [`HalError::Range`] if the interval is out of range.
    pub fn dna(&self, interval: Range<usize>) -> Result<&[u8]> {
        if interval.start > interval.end || interval.end > self.dna.len() {
            return Err(HalError::range(format!(
                "interval {}..{} in genome {} of length {}", interval.start, interval.end, self.name, self.dna.len()
            )));
        }
        Ok(&self.dna[interval])
    }

    /// Returns the DNA of the sequence with the given name, or [`None`] if there is no such sequence.
    pub fn sequence_dna(&self, name: &str) -> Option<&[u8]> {
        let sequence = self.sequence(name)?;
        Some(&self.dna[sequence.interval()])
    }

    /// Returns all segments sorted by start position.
    #[inline]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns an iterator over the segments covering the genome-relative position.
    pub fn segments_at(&self, position: usize) -> impl Iterator<Item = &Segment> {
        let low = position.saturating_sub(self.max_segment_len.saturating_sub(1));
        let first = self.segments.partition_point(|segment| segment.start < low);
        let last = self.segments.partition_point(|segment| segment.start <= position);
        let last = last.max(first);
        self.segments[first..last].iter().filter(move |segment| segment.interval().contains(&position))
    }

    /// Returns the metadata of the genome.
    #[inline]
    pub fn metadata(&self) -> &MetaData {
        &self.metadata
    }

    /// Returns `true` if the genome has been modified since it was read or written.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty || self.metadata.is_dirty()
    }
}

/// Modifying the genome.
impl Genome {
    /// Sets the sequences of the genome.
    ///
    /// The DNA is reset to `N` characters, and all segments are removed.
    /// Returns [`HalError::InvalidArgument`] if a sequence name is empty or occurs twice.
    pub fn set_dimensions(&mut self, sequences: &[SequenceInfo]) -> Result<()> {
        let mut names: HashSet<&str> = HashSet::new();
        for info in sequences {
            if info.name.is_empty() {
                return Err(HalError::invalid(format!("empty sequence name in genome {}", self.name)));
            }
            if !names.insert(&info.name) {
                return Err(HalError::invalid(format!("duplicate sequence name {} in genome {}", info.name, self.name)));
            }
        }

        let mut start = 0;
        self.sequences = sequences.iter().map(|info| {
            let sequence = Sequence { name: info.name.clone(), start, length: info.length };
            start += info.length;
            sequence
        }).collect();
        self.dna = vec![b'N'; start];
        self.segments.clear();
        self.max_segment_len = 0;
        self.dirty = true;
        Ok(())
    }

    /// Overwrites DNA starting from the genome-relative position.
    ///
    /// Returns [`HalError::Range`] if the bases would extend past the end of the genome.
    pub fn set_dna(&mut self, position: usize, bases: &[u8]) -> Result<()> {
        let end = position.checked_add(bases.len()).filter(|end| *end <= self.dna.len());
        let end = end.ok_or_else(|| HalError::range(format!(
            "writing {} bases at {} in genome {} of length {}", bases.len(), position, self.name, self.dna.len()
        )))?;
        self.dna[position..end].copy_from_slice(bases);
        self.dirty = true;
        Ok(())
    }

    /// Sets the DNA of the sequence with the given name.
    ///
    /// Returns [`HalError::NotFound`] if there is no such sequence and [`HalError::Range`] if the length is wrong.
    pub fn set_sequence_dna(&mut self, name: &str, bases: &[u8]) -> Result<()> {
        let sequence = self.sequence(name).ok_or_else(
            || HalError::not_found(format!("sequence {} in genome {}", name, self.name))
        )?;
        if sequence.length != bases.len() {
            return Err(HalError::range(format!(
                "sequence {} has length {}, got {} bases", name, sequence.length, bases.len()
            )));
        }
        let start = sequence.start;
        self.set_dna(start, bases)
    }

    /// Adds an alignment segment from this genome to another genome.
    ///
    /// Returns [`HalError::InvalidArgument`] if the segment is empty or the other genome is unnamed.
    /// Returns [`HalError::Range`] if the segment extends past the end of this genome.
    /// The other interval is checked when the alignment is traversed.
    pub fn add_segment(&mut self, segment: Segment) -> Result<()> {
        if segment.length == 0 {
            return Err(HalError::invalid(format!("empty segment in genome {}", self.name)));
        }
        if segment.other.is_empty() {
            return Err(HalError::invalid(format!("segment in genome {} has no target genome", self.name)));
        }
        if segment.start.checked_add(segment.length).filter(|end| *end <= self.dna.len()).is_none() {
            return Err(HalError::range(format!(
                "segment of length {} at {} in genome {} of length {}", segment.length, segment.start, self.name, self.dna.len()
            )));
        }
        if segment.other_start.checked_add(segment.length).is_none() {
            return Err(HalError::range(format!(
                "segment of length {} at {} in genome {}", segment.length, segment.other_start, segment.other
            )));
        }
        let index = self.segments.partition_point(|x| x.start <= segment.start);
        self.max_segment_len = self.max_segment_len.max(segment.length);
        self.segments.insert(index, segment);
        self.dirty = true;
        Ok(())
    }

    /// Returns a mutable reference to the metadata of the genome.
    #[inline]
    pub fn metadata_mut(&mut self) -> &mut MetaData {
        &mut self.metadata
    }
}

/// Persistence.
impl Genome {
    fn metadata_group(name: &str) -> String {
        format!("Genomes/{}/Meta", name)
    }

    // Creates a new empty genome that has not been written yet.
    pub(crate) fn new(name: &str) -> Self {
        Genome {
            name: name.to_string(),
            sequences: Vec::new(),
            dna: Vec::new(),
            segments: Vec::new(),
            max_segment_len: 0,
            metadata: MetaData::new(&Self::metadata_group(name)),
            dirty: true,
        }
    }

    // Reads the genome from the container.
    pub(crate) fn read(connection: &Connection, params: &StoreParams, name: &str) -> Result<Self> {
        let length: Option<usize> = connection.query_row(
            "SELECT length FROM Genomes WHERE name = ?1",
            (name,),
            |row| row.get(0)
        ).optional()?;
        let length = length.ok_or_else(
            || HalError::storage(format!("genome {} is missing from the container", name))
        )?;

        let mut get_sequences = connection.prepare(
            "SELECT name, start, length FROM Sequences WHERE genome = ?1 ORDER BY rank"
        )?;
        let sequences = get_sequences.query_map((name,), |row| {
            Ok(Sequence { name: row.get(0)?, start: row.get(1)?, length: row.get(2)? })
        })?.collect::<rusqlite::Result<Vec<Sequence>>>()?;

        let mut dna: Vec<u8> = Vec::with_capacity(length);
        let mut get_chunks = connection.prepare(
            "SELECT chunk, data FROM DnaChunks WHERE genome = ?1 ORDER BY chunk"
        )?;
        let mut rows = get_chunks.query((name,))?;
        while let Some(row) = rows.next()? {
            let chunk: usize = row.get(0)?;
            let data: Vec<u8> = row.get(1)?;
            if chunk * params.chunk_size != dna.len() {
                return Err(HalError::storage(format!("missing DNA chunk before chunk {} in genome {}", chunk, name)));
            }
            let expected = params.chunk_size.min(length - dna.len());
            dna.extend(utils::decompress_chunk(&data, expected)?);
        }
        if dna.len() != length {
            return Err(HalError::storage(format!("genome {} has {} bases (expected {})", name, dna.len(), length)));
        }

        let mut get_segments = connection.prepare(
            "SELECT start, length, other, other_start, reversed FROM Segments WHERE genome = ?1 ORDER BY rank"
        )?;
        let segments = get_segments.query_map((name,), |row| {
            Ok(Segment {
                start: row.get(0)?,
                length: row.get(1)?,
                other: row.get(2)?,
                other_start: row.get(3)?,
                reversed: row.get(4)?,
            })
        })?.collect::<rusqlite::Result<Vec<Segment>>>()?;
        let max_segment_len = segments.iter().map(|segment| segment.length).max().unwrap_or(0);

        let metadata = MetaData::load(connection, &Self::metadata_group(name))?;

        Ok(Genome {
            name: name.to_string(),
            sequences,
            dna,
            segments,
            max_segment_len,
            metadata,
            dirty: false,
        })
    }

    // Writes the genome to the container if it has been modified.
    // The instance is released after writing, so the dirty flags are left as they are.
    pub(crate) fn write(&self, connection: &Connection, params: &StoreParams) -> Result<()> {
        if self.dirty {
            let transaction = connection.unchecked_transaction()?;
            Self::delete_payload(&transaction, &self.name)?;
            transaction.execute(
                "INSERT INTO Genomes(name, length) VALUES (?1, ?2)",
                (&self.name, self.dna.len())
            )?;
            {
                let mut insert = transaction.prepare(
                    "INSERT INTO Sequences(genome, rank, name, start, length) VALUES (?1, ?2, ?3, ?4, ?5)"
                )?;
                for (rank, sequence) in self.sequences.iter().enumerate() {
                    insert.execute((&self.name, rank, &sequence.name, sequence.start, sequence.length))?;
                }

                let mut insert = transaction.prepare(
                    "INSERT INTO DnaChunks(genome, chunk, data) VALUES (?1, ?2, ?3)"
                )?;
                for (chunk, bases) in self.dna.chunks(params.chunk_size).enumerate() {
                    let data = utils::compress_chunk(bases, params.compression_level)?;
                    insert.execute((&self.name, chunk, data))?;
                }

                let mut insert = transaction.prepare(
                    "INSERT INTO Segments(genome, rank, start, length, other, other_start, reversed)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
                )?;
                for (rank, segment) in self.segments.iter().enumerate() {
                    insert.execute((
                        &self.name, rank,
                        segment.start, segment.length,
                        &segment.other, segment.other_start, segment.reversed
                    ))?;
                }
            }
            transaction.commit()?;
            log::debug!("Wrote genome {} ({} bases, {} segments)", self.name, self.dna.len(), self.segments.len());
        }
        self.metadata.store(connection)
    }

    fn delete_payload(connection: &Connection, name: &str) -> Result<()> {
        for table in ["Genomes", "Sequences", "DnaChunks", "Segments"] {
            let column = if table == "Genomes" { "name" } else { "genome" };
            connection.execute(&format!("DELETE FROM {} WHERE {} = ?1", table, column), (name,))?;
        }
        Ok(())
    }

    // Deletes the genome and its metadata from the container.
    pub(crate) fn delete(connection: &Connection, name: &str) -> Result<()> {
        let transaction = connection.unchecked_transaction()?;
        Self::delete_payload(&transaction, name)?;
        MetaData::delete_group(&transaction, &Self::metadata_group(name))?;
        transaction.commit()?;
        Ok(())
    }
}

//-----------------------------------------------------------------------------

/// Registry of open genomes.
///
/// The cache holds at most one instance of each genome.
/// A name that is in the tree but not in the cache refers to a genome that exists in the container but has not been materialized.
/// The cache does not own the container; operations that access it take a connection as an argument.
#[derive(Debug, Default)]
pub struct GenomeCache {
    genomes: RefCell<BTreeMap<String, Rc<Genome>>>,
}

impl GenomeCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of open genomes.
    pub fn len(&self) -> usize {
        self.genomes.borrow().len()
    }

    /// Returns `true` if there are no open genomes.
    pub fn is_empty(&self) -> bool {
        self.genomes.borrow().is_empty()
    }

    /// Returns `true` if the genome is open.
    pub fn contains(&self, name: &str) -> bool {
        self.genomes.borrow().contains_key(name)
    }

    /// Returns the names of the open genomes in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.genomes.borrow().keys().cloned().collect()
    }

    /// Returns a read handle to the genome, materializing it if necessary.
    ///
    /// Returns [`None`] if the genome does not exist in the tree.
    /// If the genome is already open, the same instance is returned.
    pub fn open(&self, connection: &Connection, params: &StoreParams, tree: &TreeIndex, name: &str) -> Result<Option<Rc<Genome>>> {
        if let Some(genome) = self.genomes.borrow().get(name) {
            return Ok(Some(genome.clone()));
        }
        if !tree.contains(name) {
            return Ok(None);
        }
        let genome = Rc::new(Genome::read(connection, params, name)?);
        log::debug!("Opened genome {}", name);
        self.genomes.borrow_mut().insert(name.to_string(), genome.clone());
        Ok(Some(genome))
    }

    /// Returns a mutable reference to the genome, materializing it if necessary.
    ///
    /// Returns [`None`] if the genome does not exist in the tree.
    /// Returns [`HalError::InvariantViolation`] if read handles to the genome are still held.
    pub fn open_mut(&mut self, connection: &Connection, params: &StoreParams, tree: &TreeIndex, name: &str) -> Result<Option<&mut Genome>> {
        let genomes = self.genomes.get_mut();
        if !genomes.contains_key(name) {
            if !tree.contains(name) {
                return Ok(None);
            }
            let genome = Genome::read(connection, params, name)?;
            log::debug!("Opened genome {} for writing", name);
            genomes.insert(name.to_string(), Rc::new(genome));
        }
        let genome = genomes.get_mut(name).ok_or_else(
            || HalError::invariant(format!("genome {} disappeared from the cache", name))
        )?;
        let genome = Rc::get_mut(genome).ok_or_else(
            || HalError::invariant(format!("genome {} has outstanding read handles", name))
        )?;
        Ok(Some(genome))
    }

    /// Inserts a new empty genome for a name that was just added to the tree.
    ///
    /// Returns [`HalError::InvariantViolation`] if the genome is already open.
    pub fn add_new(&mut self, name: &str) -> Result<&mut Genome> {
        let genomes = self.genomes.get_mut();
        if genomes.contains_key(name) {
            return Err(HalError::invariant(format!("new genome {} is already open", name)));
        }
        let genome = genomes.entry(name.to_string()).or_insert_with(|| Rc::new(Genome::new(name)));
        Rc::get_mut(genome).ok_or_else(
            || HalError::invariant(format!("new genome {} has outstanding read handles", name))
        )
    }

    /// Closes the genome, writing it back if it has been modified.
    ///
    /// Consumes the caller's read handle.
    /// Returns [`HalError::InvariantViolation`] if the genome is not open, the handle is stale, or other read handles are still held.
    /// If writing fails, the genome is still removed from the cache.
    pub fn close(&self, connection: &Connection, params: &StoreParams, genome: Rc<Genome>) -> Result<()> {
        let name = genome.name().to_string();
        let mut genomes = self.genomes.borrow_mut();
        let cached = genomes.get(&name).ok_or_else(
            || HalError::invariant(format!("attempt to close genome {}, which is not open", name))
        )?;
        if !Rc::ptr_eq(cached, &genome) {
            return Err(HalError::invariant(format!("attempt to close a stale handle to genome {}", name)));
        }
        drop(genome);
        if Rc::strong_count(cached) > 1 {
            return Err(HalError::invariant(format!("genome {} has outstanding read handles", name)));
        }
        let cached = genomes.remove(&name).ok_or_else(
            || HalError::invariant(format!("genome {} disappeared from the cache", name))
        )?;
        drop(genomes);
        log::debug!("Closing genome {}", name);
        cached.write(connection, params)
    }

    /// Removes the genome from the cache without writing it.
    ///
    /// Does nothing if the genome is not open.
    /// Returns [`HalError::InvariantViolation`] if read handles to the genome are still held.
    pub fn evict(&mut self, name: &str) -> Result<()> {
        let genomes = self.genomes.get_mut();
        if let Some(genome) = genomes.get(name) {
            if Rc::strong_count(genome) > 1 {
                return Err(HalError::invariant(format!("genome {} has outstanding read handles", name)));
            }
            genomes.remove(name);
        }
        Ok(())
    }

    /// Writes back and releases all open genomes.
    ///
    /// All genomes are released even if some writes fail.
    /// Returns the first error.
    pub fn close_all(&mut self, connection: &Connection, params: &StoreParams) -> Result<()> {
        let genomes = std::mem::take(self.genomes.get_mut());
        let mut result = Ok(());
        for (name, genome) in genomes {
            if Rc::strong_count(&genome) > 1 {
                log::debug!("Genome {} still has read handles at close", name);
            }
            if let Err(error) = genome.write(connection, params) {
                log::warn!("Failed to write genome {}: {}", name, error);
                if result.is_ok() {
                    result = Err(error);
                }
            }
        }
        result
    }

    /// Releases all open genomes without writing them.
    pub(crate) fn clear(&mut self) {
        self.genomes.get_mut().clear();
    }
}

//-----------------------------------------------------------------------------
