use hal_base::{AlignmentStore, StoreParams};

use std::{env, process};

use getopts::Options;

//-----------------------------------------------------------------------------

fn main() -> Result<(), String> {
    env_logger::init();

    // Parse arguments.
    let config = Config::new()?;

    // Open the alignment.
    let mut store = AlignmentStore::new(StoreParams::default());
    store.open(&config.filename, true).map_err(|x| x.to_string())?;

    println!("{}", AlignmentStore::VERSION);
    if let Some(size) = store.file_size() {
        println!("File size: {}", size);
    }
    let params = store.params();
    println!("DNA chunk size: {}, compression level: {}", params.chunk_size, params.compression_level);
    println!();

    let metadata = store.metadata().map_err(|x| x.to_string())?;
    if !metadata.is_empty() {
        println!("Metadata:");
        for (key, value) in metadata.iter() {
            println!("  {}: {}", key, value);
        }
        println!();
    }

    println!("{}", store.newick_tree());
    println!();
    println!("{} genomes", store.num_genomes());
    println!();

    // Per-genome statistics in preorder.
    if store.num_genomes() > 0 {
        println!("GenomeName, Parent, NumChildren, NumSequences, Length, NumSegments");
        let root = store.root_name().map_err(|x| x.to_string())?.to_string();
        let names: Vec<String> = store.genomes_in_subtree(&root).map_err(|x| x.to_string())?.into_iter().map(String::from).collect();
        for name in names {
            let genome = store.open_genome(&name).map_err(|x| x.to_string())?;
            let genome = genome.ok_or(format!("Cannot open genome {}", name))?;
            let parent = store.parent_name(&name).map_err(|x| x.to_string())?.unwrap_or("");
            let children = store.child_names(&name).map_err(|x| x.to_string())?.len();
            println!(
                "{}, {}, {}, {}, {}, {}",
                name, parent, children, genome.num_sequences(), genome.sequence_length(), genome.segments().len()
            );
            if config.genome_metadata {
                for (key, value) in genome.metadata().iter() {
                    println!("    {}: {}", key, value);
                }
            }
            store.close_genome(genome).map_err(|x| x.to_string())?;
        }
    }

    store.close().map_err(|x| x.to_string())?;
    Ok(())
}

//-----------------------------------------------------------------------------

struct Config {
    pub filename: String,
    pub genome_metadata: bool,
}

impl Config {
    pub fn new() -> Result<Config, String> {
        let args: Vec<String> = env::args().collect();
        let program = args[0].clone();

        let mut opts = Options::new();
        opts.optflag("h", "help", "print this help");
        opts.optflag("m", "metadata", "print the metadata of each genome");
        let matches = opts.parse(&args[1..]).map_err(|x| x.to_string())?;

        let header = format!("Usage: {} [options] alignment.db", program);
        if matches.opt_present("h") {
            eprint!("{}", opts.usage(&header));
            process::exit(0);
        }

        let filename = if let Some(s) = matches.free.first() {
            s.clone()
        } else {
            eprint!("{}", opts.usage(&header));
            process::exit(1);
        };

        Ok(Config {
            filename,
            genome_metadata: matches.opt_present("metadata"),
        })
    }
}

//-----------------------------------------------------------------------------
