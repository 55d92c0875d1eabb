use hal_base::{AlignmentStore, DepthParams, DepthScanner, StoreParams};
use hal_base::depth::DepthTracks;

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::time::Instant;
use std::{env, process};

use getopts::Options;

//-----------------------------------------------------------------------------

fn main() -> Result<(), String> {
    let start_time = Instant::now();
    env_logger::init();

    // Parse arguments.
    let config = Config::new()?;

    // Open the alignment.
    let mut store = AlignmentStore::new(StoreParams::default());
    store.open(&config.filename, true).map_err(|x| x.to_string())?;
    let reference = match config.reference.as_ref() {
        Some(name) => name.clone(),
        None => store.root_name().map_err(|x| x.to_string())?.to_string(),
    };

    // Scan the reference genome.
    let identical = open_output(&config.identical)?;
    let aligned = open_output(&config.aligned)?;
    let mut tracks = DepthTracks::new(identical, aligned);
    {
        let scanner = DepthScanner::new(&store, config.params.clone()).map_err(|x| x.to_string())?;
        scanner.scan(&reference, &mut tracks).map_err(|x| x.to_string())?;
    }
    store.close().map_err(|x| x.to_string())?;

    let end_time = Instant::now();
    let seconds = end_time.duration_since(start_time).as_secs_f64();
    eprintln!(
        "Scanned {} positions of genome {} in {:.3} seconds",
        tracks.aligned.values(), reference, seconds
    );

    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Output {
    Stdout,
    File(String),
}

// At most one track may go to stdout, as interleaved tracks are unusable.
// A missing option or `-` means stdout.
fn choose_outputs(identical: Option<String>, aligned: Option<String>) -> Result<(Output, Output), String> {
    let output = |name: Option<String>| match name {
        Some(name) if name != "-" => Output::File(name),
        _ => Output::Stdout,
    };
    let identical = output(identical);
    let aligned = output(aligned);
    if identical == aligned {
        return Err(match identical {
            Output::Stdout => String::from("At least one of --outWiggleNIdentical and --outWiggleNAligned must be a file"),
            Output::File(name) => format!("Both tracks cannot be written to {}", name),
        });
    }
    Ok((identical, aligned))
}

fn open_output(output: &Output) -> Result<Box<dyn Write>, String> {
    match output {
        Output::File(name) => {
            let file = File::create(name).map_err(|x| format!("Cannot create {}: {}", name, x))?;
            Ok(Box::new(BufWriter::new(file)))
        },
        Output::Stdout => Ok(Box::new(io::stdout())),
    }
}

//-----------------------------------------------------------------------------

struct Config {
    pub filename: String,
    pub reference: Option<String>,
    pub identical: Output,
    pub aligned: Output,
    pub params: DepthParams,
}

impl Config {
    pub fn new() -> Result<Config, String> {
        let args: Vec<String> = env::args().collect();
        let program = args[0].clone();

        let mut opts = Options::new();
        opts.optflag("h", "help", "print this help");
        opts.optopt("", "outWiggleNIdentical", "output file for identical depth (default: stdout, if the other track goes to a file)", "FILE");
        opts.optopt("", "outWiggleNAligned", "output file for aligned depth (default: stdout, if the other track goes to a file)", "FILE");
        opts.optopt("", "refSequence", "scan only this sequence of the reference genome", "STR");
        opts.optopt("", "start", "start of the range (default: 0)", "INT");
        opts.optopt("", "length", "length of the range (default: 0 = to the end)", "INT");
        opts.optopt("", "step", "distance between sampled positions (default: 1)", "INT");
        opts.optopt("", "rootGenome", "count only genomes in the subtree rooted at this genome", "STR");
        opts.optopt("", "targetGenomes", "count only these genomes (comma-separated)", "STR");
        opts.optflag("", "countDupes", "count every aligned base instead of every aligned genome");
        opts.optflag("", "noAncestors", "do not count ancestral genomes");
        let matches = opts.parse(&args[1..]).map_err(|x| x.to_string())?;

        let header = format!("Usage: {} [options] alignment.db [refGenome]", program);
        if matches.opt_present("h") {
            eprint!("{}", opts.usage(&header));
            process::exit(0);
        }

        let mut params = DepthParams {
            sequence: matches.opt_str("refSequence"),
            root: matches.opt_str("rootGenome"),
            count_dupes: matches.opt_present("countDupes"),
            no_ancestors: matches.opt_present("noAncestors"),
            ..DepthParams::default()
        };
        if let Some(s) = matches.opt_str("start") {
            params.start = s.parse::<usize>().map_err(|x| format!("--start: {}", x))?;
        }
        if let Some(s) = matches.opt_str("length") {
            params.length = s.parse::<usize>().map_err(|x| format!("--length: {}", x))?;
        }
        if let Some(s) = matches.opt_str("step") {
            params.step = s.parse::<usize>().map_err(|x| format!("--step: {}", x))?;
        }
        if let Some(s) = matches.opt_str("targetGenomes") {
            params.targets = s.split(',').filter(|x| !x.is_empty()).map(String::from).collect::<BTreeSet<String>>();
        }

        let filename = if let Some(s) = matches.free.first() {
            s.clone()
        } else {
            eprint!("{}", opts.usage(&header));
            process::exit(1);
        };
        let reference = matches.free.get(1).cloned();
        let (identical, aligned) = choose_outputs(
            matches.opt_str("outWiggleNIdentical"), matches.opt_str("outWiggleNAligned")
        )?;

        Ok(Config {
            filename,
            reference,
            identical,
            aligned,
            params,
        })
    }
}

//-----------------------------------------------------------------------------


//-----------------------------------------------------------------------------
