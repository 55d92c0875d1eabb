//! # HAL-base: hierarchical multi-genome alignments using SQLite databases.
//!
//! This is a prototype for storing a multiple alignment of genomes related by a phylogenetic tree in a SQLite database.
//! Each genome is a node in the tree.
//! The alignment is represented as gapless segments from each genome to other genomes, usually to its parent in the tree.
//!
//! See [`AlignmentStore`] for the database interface.
//! See [`TreeIndex`], [`Genome`], and [`MetaData`] for the related structures.
//!
//! ### Basic concepts
//!
//! The tree is persisted as a Newick string in table `MetaData` (group and key `Phylogeny`).
//! Global metadata is stored in group `Meta` and genome metadata in group `Genomes/<name>/Meta`.
//! An empty tree string marks an alignment without genomes.
//!
//! Genome payloads are stored in tables `Genomes`, `Sequences`, `DnaChunks`, and `Segments`.
//! DNA is stored as zlib-compressed chunks with the chunk size and the compression level given by [`StoreParams`].
//! Genomes are loaded when they are opened and written back when they are closed, if they have been modified.
//! At most one instance of each genome is in memory at a time (see [`GenomeCache`]).
//!
//! Alignment columns are built by following the segments from a reference position (see [`SegmentColumnIterator`]).
//! [`DepthScanner`] uses the columns for computing alignment depth along a reference genome.
//!
//! ### Errors
//!
//! All fallible operations return [`HalError`].
//! Database and file errors are reported as [`HalError::Storage`].

pub mod column;
pub mod db;
pub mod depth;
pub mod error;
pub mod formats;
pub mod genome;
pub mod metadata;
pub mod tree;
pub mod utils;

#[cfg(test)]
pub(crate) mod internal;

pub use column::{ColumnEntry, ColumnIterator, SegmentColumnIterator};
pub use db::{AlignmentStore, StoreParams, StoreState};
pub use depth::{DepthParams, DepthScanner};
pub use error::{HalError, Result};
pub use genome::{Genome, GenomeCache, Segment, Sequence, SequenceInfo};
pub use metadata::MetaData;
pub use tree::{TreeIndex, TreeNode};
