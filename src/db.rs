//! HAL-base: a hierarchical multi-genome alignment stored in a SQLite database.

use crate::{utils, Genome, GenomeCache, HalError, MetaData, Result, TreeIndex};

use std::fs;
use std::path::Path;
use std::rc::Rc;

use rusqlite::{Connection, OpenFlags, OptionalExtension};


//-----------------------------------------------------------------------------

/// Creation parameters for the DNA datasets in a new database.
///
/// The parameters are stored in the database and read back when it is opened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreParams {
    /// Number of bases in a compressed DNA chunk.
    pub chunk_size: usize,
    /// Zlib compression level (0 to 9).
    pub compression_level: u32,
}

impl StoreParams {
    /// Default chunk size in bases.
    pub const CHUNK_SIZE: usize = 2_000_000;

    /// Default compression level.
    pub const COMPRESSION_LEVEL: u32 = 9;

    /// Returns an error if the parameters are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(HalError::invalid("chunk size must be positive"));
        }
        if self.compression_level > 9 {
            return Err(HalError::invalid(format!("invalid compression level {}", self.compression_level)));
        }
        Ok(())
    }
}

impl Default for StoreParams {
    fn default() -> Self {
        StoreParams {
            chunk_size: Self::CHUNK_SIZE,
            compression_level: Self::COMPRESSION_LEVEL,
        }
    }
}

/// Lifecycle state of an [`AlignmentStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreState {
    /// No database has been opened yet.
    Unopened,
    /// A database is open.
    Open,
    /// The database has been closed.
    Closed,
}

//-----------------------------------------------------------------------------

/// A multi-genome alignment stored in a SQLite database.
///
/// The store owns the database connection, the phylogenetic tree ([`TreeIndex`]), the cache of open genomes ([`GenomeCache`]), and the global metadata.
/// Genomes are materialized lazily when they are opened and written back when they are closed.
/// The tree is written back on close if it has been modified.
///
/// Read handles to genomes are [`Rc<Genome>`] objects from [`AlignmentStore::open_genome`].
/// Mutable access requires a store opened for writing and is available through [`AlignmentStore::open_genome_mut`] and the methods that add genomes.
///
/// # Examples
///
/// ```
/// use hal_base::{AlignmentStore, SequenceInfo, StoreParams};
///
/// let filename = std::env::temp_dir().join(format!("hal-base-doc-{}.db", std::process::id()));
///
/// // Build a small alignment.
/// let mut store = AlignmentStore::new(StoreParams::default());
/// store.create_new(&filename).unwrap();
/// let root = store.add_root_genome("A", 0.0).unwrap();
/// root.set_dimensions(&[SequenceInfo::new("chr1", 4)]).unwrap();
/// root.set_sequence_dna("chr1", b"GATT").unwrap();
/// store.add_leaf_genome("B", "A", 1.0).unwrap();
/// store.add_leaf_genome("C", "A", 2.0).unwrap();
/// store.close().unwrap();
///
/// // Open it again and check the tree.
/// store.open(&filename, true).unwrap();
/// assert_eq!(store.num_genomes(), 3);
/// assert_eq!(store.newick_tree(), "(B:1,C:2)A;");
/// let genome = store.open_genome("A").unwrap().unwrap();
/// assert_eq!(genome.sequence_dna("chr1"), Some(&b"GATT"[..]));
/// drop(genome);
/// store.close().unwrap();
///
/// std::fs::remove_file(&filename).unwrap();
/// ```
#[derive(Debug)]
pub struct AlignmentStore {
    connection: Option<Connection>,
    state: StoreState,
    read_only: bool,
    params: StoreParams,
    tree: TreeIndex,
    cache: GenomeCache,
    metadata: Option<MetaData>,
    dirty: bool,
}

/// Lifecycle.
impl AlignmentStore {
    /// Current database version.
    pub const VERSION: &'static str = "HAL-base v0.1.0";

    // Key for database version.
    const KEY_VERSION: &'static str = "version";

    // Key for DNA chunk size.
    const KEY_CHUNK_SIZE: &'static str = "chunk_size";

    // Key for DNA compression level.
    const KEY_COMPRESSION_LEVEL: &'static str = "compression_level";

    /// Metadata group for global metadata.
    pub const META_GROUP: &'static str = "Meta";

    /// Metadata group and key for the serialized tree.
    pub const TREE_GROUP: &'static str = "Phylogeny";

    /// Creates a store without a database.
    ///
    /// The parameters are used when a new database is created.
    pub fn new(params: StoreParams) -> Self {
        AlignmentStore {
            connection: None,
            state: StoreState::Unopened,
            read_only: false,
            params,
            tree: TreeIndex::new(),
            cache: GenomeCache::new(),
            metadata: None,
            dirty: false,
        }
    }

    /// Creates a new empty database in the given file and opens it for writing.
    ///
    /// Closes the current database first.
    /// An existing file is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::InvalidArgument`] if the creation parameters are invalid.
    /// Passes through any errors from closing the current database and from creating the new one.
    pub fn create_new<P: AsRef<Path>>(&mut self, filename: P) -> Result<()> {
        self.close()?;
        self.params.validate()?;
        let filename = filename.as_ref();
        log::info!("Creating alignment {}", filename.display());
        if utils::file_exists(filename) {
            fs::remove_file(filename)?;
        }

        let connection = Connection::open(filename)?;
        Self::create_tables(&connection, &self.params)?;
        let mut tree_meta = MetaData::new(Self::TREE_GROUP);
        tree_meta.set(Self::TREE_GROUP, "");
        tree_meta.write(&connection)?;

        self.connection = Some(connection);
        self.state = StoreState::Open;
        self.read_only = false;
        self.tree = TreeIndex::new();
        self.metadata = Some(MetaData::new(Self::META_GROUP));
        self.dirty = true;
        Ok(())
    }

    pub(crate) fn create_tables(connection: &Connection, params: &StoreParams) -> Result<()> {
        let transaction = connection.unchecked_transaction()?;
        transaction.execute_batch(
            "CREATE TABLE Tags (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            ) STRICT;
            CREATE TABLE MetaData (
                grp TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (grp, key)
            ) STRICT;
            CREATE TABLE Genomes (
                name TEXT PRIMARY KEY,
                length INTEGER NOT NULL
            ) STRICT;
            CREATE TABLE Sequences (
                genome TEXT NOT NULL,
                rank INTEGER NOT NULL,
                name TEXT NOT NULL,
                start INTEGER NOT NULL,
                length INTEGER NOT NULL,
                PRIMARY KEY (genome, rank)
            ) STRICT;
            CREATE TABLE DnaChunks (
                genome TEXT NOT NULL,
                chunk INTEGER NOT NULL,
                data BLOB NOT NULL,
                PRIMARY KEY (genome, chunk)
            ) STRICT;
            CREATE TABLE Segments (
                genome TEXT NOT NULL,
                rank INTEGER NOT NULL,
                start INTEGER NOT NULL,
                length INTEGER NOT NULL,
                other TEXT NOT NULL,
                other_start INTEGER NOT NULL,
                reversed INTEGER NOT NULL,
                PRIMARY KEY (genome, rank)
            ) STRICT;"
        )?;
        {
            let mut insert = transaction.prepare(
                "INSERT INTO Tags(key, value) VALUES (?1, ?2)"
            )?;
            insert.execute((Self::KEY_VERSION, Self::VERSION))?;
            insert.execute((Self::KEY_CHUNK_SIZE, params.chunk_size.to_string()))?;
            insert.execute((Self::KEY_COMPRESSION_LEVEL, params.compression_level.to_string()))?;
        }
        transaction.commit()?;
        Ok(())
    }

    /// Opens an existing database.
    ///
    /// Closes the current database first.
    /// The tree is loaded eagerly, while genomes are loaded when they are opened.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::Storage`] if the file does not exist, the database version is unsupported, or the stored tree is invalid.
    /// Passes through any database errors.
    pub fn open<P: AsRef<Path>>(&mut self, filename: P, read_only: bool) -> Result<()> {
        self.close()?;
        let filename = filename.as_ref();
        if !utils::file_exists(filename) {
            return Err(HalError::storage(format!("alignment {} does not exist", filename.display())));
        }
        let flags = if read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX
        };
        let connection = Connection::open_with_flags(filename, flags)?;

        let version = get_tag(&connection, Self::KEY_VERSION)?;
        if version != Self::VERSION {
            return Err(HalError::storage(format!("Unsupported database version: {} (expected {})", version, Self::VERSION)));
        }
        let compression_level = get_numeric_tag(&connection, Self::KEY_COMPRESSION_LEVEL)?;
        let params = StoreParams {
            chunk_size: get_numeric_tag(&connection, Self::KEY_CHUNK_SIZE)?,
            compression_level: u32::try_from(compression_level).map_err(|_| HalError::storage(format!(
                "Invalid compression level: {}", compression_level
            )))?,
        };
        params.validate().map_err(|x| HalError::storage(x.to_string()))?;
        let metadata = MetaData::load(&connection, Self::META_GROUP)?;
        let tree = Self::load_tree(&connection)?;
        log::info!(
            "Opened alignment {} ({}) with {} genomes",
            filename.display(), if read_only { "read-only" } else { "read-write" }, tree.len()
        );

        self.connection = Some(connection);
        self.state = StoreState::Open;
        self.read_only = read_only;
        self.params = params;
        self.tree = tree;
        self.metadata = Some(metadata);
        self.dirty = false;
        Ok(())
    }

    fn load_tree(connection: &Connection) -> Result<TreeIndex> {
        let tree_meta = MetaData::load(connection, Self::TREE_GROUP)?;
        let newick = tree_meta.get(Self::TREE_GROUP).ok_or_else(
            || HalError::storage("the tree is missing from the database")
        )?;
        TreeIndex::parse(newick).map_err(|x| HalError::storage(format!("cannot parse the stored tree: {}", x)))
    }

    fn write_tree(&self, connection: &Connection) -> Result<()> {
        let mut tree_meta = MetaData::new(Self::TREE_GROUP);
        tree_meta.set(Self::TREE_GROUP, &self.tree.to_newick());
        tree_meta.write(connection)?;
        log::info!("Wrote a tree with {} genomes", self.tree.len());
        Ok(())
    }

    /// Closes the database.
    ///
    /// Writes the tree if it has been modified, then the global metadata and all open genomes.
    /// Does nothing if the database is not open.
    ///
    /// All in-memory resources are released even if some writes fail.
    /// In that case, the first error is returned.
    pub fn close(&mut self) -> Result<()> {
        let connection = match self.connection.take() {
            Some(connection) => connection,
            None => {
                if !self.tree.is_empty() || !self.cache.is_empty() {
                    return Err(HalError::invariant("a closed alignment has a tree or open genomes"));
                }
                return Ok(());
            },
        };

        let mut result = Ok(());
        if !self.read_only {
            if self.dirty {
                result = self.write_tree(&connection);
                if result.is_ok() {
                    self.dirty = false;
                }
            }
            if let Some(metadata) = self.metadata.as_mut() {
                keep_first_error(&mut result, metadata.write(&connection));
            }
            keep_first_error(&mut result, self.cache.close_all(&connection, &self.params));
        }
        self.cache.clear();
        self.metadata = None;
        self.tree = TreeIndex::new();

        let path = connection.path().unwrap_or("").to_string();
        keep_first_error(&mut result, connection.close().map_err(|(_, x)| HalError::from(x)));
        self.state = StoreState::Closed;
        log::info!("Closed alignment {}", path);
        result
    }

    /// Returns the lifecycle state of the store.
    #[inline]
    pub fn state(&self) -> StoreState {
        self.state
    }

    /// Returns `true` if the database was opened read-only.
    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Returns `true` if the tree has been modified since it was last written.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns the creation parameters of the database.
    #[inline]
    pub fn params(&self) -> &StoreParams {
        &self.params
    }

    /// Returns the filename of the database, or [`None`] if there is no open database.
    pub fn filename(&self) -> Option<&str> {
        self.connection.as_ref().and_then(|connection| connection.path())
    }

    /// Returns the size of the database file in a human-readable format.
    pub fn file_size(&self) -> Option<String> {
        let filename = self.filename()?;
        utils::file_size(filename)
    }

    fn connection(&self) -> Result<&Connection> {
        self.connection.as_ref().ok_or_else(|| HalError::invariant("the alignment is not open"))
    }

    fn check_writable(&self) -> Result<()> {
        self.connection()?;
        if self.read_only {
            return Err(HalError::invalid("the alignment is opened read-only"));
        }
        Ok(())
    }
}

impl Drop for AlignmentStore {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            log::warn!("Failed to close the alignment: {}", error);
        }
    }
}

//-----------------------------------------------------------------------------

/// Genomes.
impl AlignmentStore {
    /// Adds a new root genome and returns it for writing.
    ///
    /// If the tree already has a root, the old root becomes the child of the new root with the given branch length.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::InvalidArgument`] if the name is empty or the store is read-only.
    /// Returns [`HalError::DuplicateName`] if the name already exists.
    pub fn add_root_genome(&mut self, name: &str, branch_length: f64) -> Result<&mut Genome> {
        self.check_writable()?;
        if name.is_empty() {
            return Err(HalError::invalid("genome name can't be empty"));
        }
        self.tree.add_root(name, branch_length)?;
        self.dirty = true;
        self.cache.add_new(name)
    }

    /// Adds a new leaf genome below the parent and returns it for writing.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::InvalidArgument`] if a name is empty or the store is read-only.
    /// Returns [`HalError::DuplicateName`] if the name already exists and [`HalError::NotFound`] if the parent does not exist.
    pub fn add_leaf_genome(&mut self, name: &str, parent: &str, branch_length: f64) -> Result<&mut Genome> {
        self.check_writable()?;
        if name.is_empty() || parent.is_empty() {
            return Err(HalError::invalid("genome name can't be empty"));
        }
        self.tree.add_leaf(name, parent, branch_length)?;
        self.dirty = true;
        self.cache.add_new(name)
    }

    /// Removes a leaf genome from the tree and deletes its data.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::NotFound`] if the genome does not exist.
    /// Returns [`HalError::InvalidArgument`] if the genome has children or the store is read-only.
    /// Returns [`HalError::InvariantViolation`] if read handles to the genome are still held.
    pub fn remove_genome(&mut self, name: &str) -> Result<()> {
        self.check_writable()?;
        let node = self.tree.node_by_name(name).ok_or_else(
            || HalError::not_found(format!("genome {}", name))
        )?;
        if !node.is_leaf() {
            return Err(HalError::invalid(format!("genome {} has children", name)));
        }
        self.cache.evict(name)?;
        Genome::delete(self.connection()?, name)?;
        self.tree.remove_leaf(name)?;
        self.dirty = true;
        log::debug!("Removed genome {}", name);
        Ok(())
    }

    /// Returns a read handle to the genome, or [`None`] if the genome does not exist.
    ///
    /// Opening the same genome again without closing it returns the same instance.
    pub fn open_genome(&self, name: &str) -> Result<Option<Rc<Genome>>> {
        let connection = self.connection()?;
        self.cache.open(connection, &self.params, &self.tree, name)
    }

    /// Returns the genome for writing, or [`None`] if the genome does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::InvalidArgument`] if the store is read-only.
    /// Returns [`HalError::InvariantViolation`] if read handles to the genome are still held.
    pub fn open_genome_mut(&mut self, name: &str) -> Result<Option<&mut Genome>> {
        self.check_writable()?;
        let connection = self.connection.as_ref().ok_or_else(|| HalError::invariant("the alignment is not open"))?;
        self.cache.open_mut(connection, &self.params, &self.tree, name)
    }

    /// Closes the genome, writing it back if it has been modified.
    ///
    /// Returns [`HalError::InvariantViolation`] if the genome is not open or other read handles to it are still held.
    pub fn close_genome(&self, genome: Rc<Genome>) -> Result<()> {
        let connection = self.connection()?;
        self.cache.close(connection, &self.params, genome)
    }

    /// Returns the names of the open genomes in sorted order.
    pub fn open_genomes(&self) -> Vec<String> {
        self.cache.names()
    }
}

//-----------------------------------------------------------------------------

/// Tree and metadata.
impl AlignmentStore {
    /// Returns the tree.
    #[inline]
    pub fn tree(&self) -> &TreeIndex {
        &self.tree
    }

    /// Returns the number of genomes in the alignment.
    pub fn num_genomes(&self) -> usize {
        self.tree.len()
    }

    /// Returns the name of the root genome.
    ///
    /// Returns [`HalError::NotFound`] if the tree is empty.
    pub fn root_name(&self) -> Result<&str> {
        self.tree.root_name().ok_or_else(|| HalError::not_found("can't get root name of empty tree"))
    }

    /// Returns the name of the parent genome, or [`None`] for the root.
    pub fn parent_name(&self, name: &str) -> Result<Option<&str>> {
        self.tree.parent_of(name)
    }

    /// Returns the names of the child genomes in order.
    pub fn child_names(&self, name: &str) -> Result<Vec<&str>> {
        self.tree.children_of(name)
    }

    /// Returns the length of the branch from `parent` to `child`.
    pub fn branch_length(&self, parent: &str, child: &str) -> Result<f64> {
        self.tree.branch_length(parent, child)
    }

    /// Returns the names of the leaf genomes below the genome.
    pub fn leaf_names_below(&self, name: &str) -> Result<Vec<&str>> {
        self.tree.leaves_below(name)
    }

    /// Returns the names of all genomes in the subtree rooted at the genome, including the genome itself.
    pub fn genomes_in_subtree(&self, name: &str) -> Result<Vec<&str>> {
        self.tree.subtree(name)
    }

    /// Returns the tree in Newick format, or an empty string if the tree is empty.
    pub fn newick_tree(&self) -> String {
        self.tree.to_newick()
    }

    /// Returns the global metadata.
    pub fn metadata(&self) -> Result<&MetaData> {
        self.metadata.as_ref().ok_or_else(|| HalError::invariant("the alignment is not open"))
    }

    /// Returns the global metadata for writing.
    ///
    /// Returns [`HalError::InvalidArgument`] if the store is read-only.
    pub fn metadata_mut(&mut self) -> Result<&mut MetaData> {
        self.check_writable()?;
        self.metadata.as_mut().ok_or_else(|| HalError::invariant("the alignment is not open"))
    }
}

//-----------------------------------------------------------------------------

fn keep_first_error(result: &mut Result<()>, next: Result<()>) {
    if let Err(error) = next {
        log::warn!("Error while closing the alignment: {}", error);
        if result.is_ok() {
            *result = Err(error);
        }
    }
}

// Returns the value of a header tag.
fn get_tag(connection: &Connection, key: &str) -> Result<String> {
    let value: Option<String> = connection.query_row(
        "SELECT value FROM Tags WHERE key = ?1",
        (key,),
        |row| row.get(0)
    ).optional()?;
    value.ok_or_else(|| HalError::storage(format!("Key not found: {}", key)))
}

// Returns the value of a header tag as an integer.
fn get_numeric_tag(connection: &Connection, key: &str) -> Result<usize> {
    let value = get_tag(connection, key)?;
    value.parse::<usize>().map_err(|x| HalError::storage(format!("Invalid numeric value for key {}: {}", key, x)))
}

//-----------------------------------------------------------------------------
