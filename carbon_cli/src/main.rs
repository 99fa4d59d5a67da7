use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use carbon_archive::{
    bake_string_id_index, write_json_file, Archive, ArchiveOptions, Contains, Equals, StartsWith,
    StringPredicate,
};
use carbon_core::{CompressorKind, Strictness};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "carbon",
    about = "Columnar document archives: convert JSON, inspect, and query the string dictionary",
    version
)]
struct Cli {
    /// Log progress to stderr (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a JSON document into an archive
    Convert {
        /// JSON source ("-" reads stdin)
        input: PathBuf,
        /// Destination archive
        output: PathBuf,
        /// String compressor: none | huffman
        #[arg(short, long, default_value = "none")]
        compressor: String,
        /// Assign string ids in lexicographic order and sort groups by key
        #[arg(long)]
        read_optimized: bool,
        /// Append a string-id index after writing
        #[arg(long)]
        bake_index: bool,
        /// Panic on the first error instead of reporting it
        #[arg(long)]
        strict: bool,
        /// Fixed 24-bit object-id session
        #[arg(long)]
        session: Option<u32>,
    },
    /// Dump the archive structure
    Print {
        file: PathBuf,
        /// Write the dump to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print section sizes and dictionary statistics
    Info { file: PathBuf },
    /// List dictionary entries
    Strings {
        file: PathBuf,
        /// Stop after this many entries
        #[arg(short, long)]
        limit: Option<usize>,
        /// Print the decoded strings next to their ids
        #[arg(long)]
        decode: bool,
    },
    /// Resolve one string id
    Fetch {
        file: PathBuf,
        id: u64,
        /// Skip the string cache
        #[arg(long)]
        nocache: bool,
    },
    /// Search string ids by predicate
    Find {
        file: PathBuf,
        #[arg(long, group = "predicate")]
        equals: Option<String>,
        #[arg(long, group = "predicate")]
        contains: Option<String>,
        #[arg(long, group = "predicate")]
        starts_with: Option<String>,
        /// Maximum number of ids (negative = unbounded)
        #[arg(short, long, default_value_t = -1, allow_negative_numbers = true)]
        limit: i64,
    },
    /// Build the string-id index and append it to the archive
    Index { file: PathBuf },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn open(file: &PathBuf) -> anyhow::Result<Archive> {
    Archive::open(file).with_context(|| format!("opening archive {:?}", file))
}

// ── Subcommand implementations ─────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
fn run_convert(
    input: PathBuf,
    output: PathBuf,
    compressor: &str,
    read_optimized: bool,
    bake_index: bool,
    strict: bool,
    session: Option<u32>,
) -> anyhow::Result<()> {
    let kind: CompressorKind = compressor.parse()?;
    let json = if input.to_str() == Some("-") {
        let mut buf = String::new();
        io::stdin().lock().read_to_string(&mut buf)?;
        buf
    } else {
        fs::read_to_string(&input).with_context(|| format!("reading JSON file {:?}", input))?
    };

    let mut opts = ArchiveOptions::new()
        .with_compressor(kind)
        .with_read_optimized(read_optimized)
        .with_baked_index(bake_index)
        .with_strictness(if strict { Strictness::Strict } else { Strictness::Lenient });
    if let Some(session) = session {
        opts = opts.with_id_session(session);
    }

    let t0 = Instant::now();
    write_json_file(&output, &json, &opts)
        .with_context(|| format!("writing archive {:?}", output))?;
    let elapsed = t0.elapsed();
    tracing::debug!(output = ?output, "archive written");

    let archive = open(&output)?;
    let info = archive.info();
    let archive_size = fs::metadata(&output)?.len();

    eprintln!("  compressor  : {}", kind);
    eprintln!("  strings     : {}", info.num_embedded_strings);
    eprintln!("  json size   : {}", human_bytes(json.len() as u64));
    eprintln!("  archive     : {}", human_bytes(archive_size));
    eprintln!("  string table: {}", human_bytes(info.string_table_size));
    eprintln!("  records     : {}", human_bytes(info.record_table_size));
    if info.string_id_index_size > 0 {
        eprintln!("  index       : {}", human_bytes(info.string_id_index_size));
    }
    eprintln!(
        "  ratio       : {:.2}x",
        json.len() as f64 / archive_size.max(1) as f64
    );
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_print(file: PathBuf, output: Option<PathBuf>) -> anyhow::Result<()> {
    let archive = open(&file)?;
    match output {
        Some(path) => {
            let out = fs::File::create(&path)
                .with_context(|| format!("creating output file {:?}", path))?;
            let mut out = BufWriter::new(out);
            archive.print(&mut out)?;
            out.flush()?;
        }
        None => {
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            archive.print(&mut out)?;
            out.flush()?;
        }
    }
    Ok(())
}

fn run_info(file: PathBuf) -> anyhow::Result<()> {
    let archive = open(&file)?;
    let info = archive.info();
    let header = archive.header();
    let file_size = fs::metadata(&file)?.len();

    println!("=== Carbon archive: {:?} ===", file);
    println!();
    println!("  format version : {}", header.version);
    println!("  compressor     : {}", archive.string_table().compressor().name());
    println!("  strings        : {}", info.num_embedded_strings);
    println!("  string table   : {}", human_bytes(info.string_table_size));
    println!("  record table   : {}", human_bytes(info.record_table_size));
    println!("  sorted         : {}", archive.is_sorted());
    println!("  root object id : {}", archive.root()?.object_id());
    if archive.has_string_id_index() {
        println!(
            "  string-id index: {} at 0x{:x}",
            human_bytes(info.string_id_index_size),
            header.string_id_index_offset
        );
    } else {
        println!("  string-id index: none");
    }
    println!("  file on disk   : {}", human_bytes(file_size));
    Ok(())
}

fn run_strings(file: PathBuf, limit: Option<usize>, decode: bool) -> anyhow::Result<()> {
    let archive = open(&file)?;
    let query = archive.query();
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut left = limit.unwrap_or(usize::MAX);

    for batch in query.scan_string_ids() {
        if left == 0 {
            break;
        }
        let mut batch = batch?;
        batch.truncate(left);
        left -= batch.len();
        if decode {
            let strings = query.fetch_strings_by_offset(&batch)?;
            for (info, s) in batch.iter().zip(&strings) {
                writeln!(out, "{}\t0x{:x}\t{}\t{}", info.id, info.offset, info.len, s)?;
            }
        } else {
            for info in &batch {
                writeln!(out, "{}\t0x{:x}\t{}", info.id, info.offset, info.len)?;
            }
        }
    }
    out.flush()?;
    Ok(())
}

fn run_fetch(file: PathBuf, id: u64, nocache: bool) -> anyhow::Result<()> {
    let archive = open(&file)?;
    let t0 = Instant::now();
    let value = if nocache {
        archive.query().fetch_string_by_id_nocache(id)
    } else {
        archive.ensure_string_cache();
        archive.query().fetch_string_by_id(id)
    }
    .with_context(|| format!("fetching string id {}", id))?;
    let elapsed = t0.elapsed();

    println!("{}", value);
    eprintln!(
        "  resolved via {} in {:.3}ms",
        if archive.has_string_id_index() { "index" } else { "scan" },
        elapsed.as_secs_f64() * 1000.0
    );
    Ok(())
}

fn run_find(
    file: PathBuf,
    equals: Option<String>,
    contains: Option<String>,
    starts_with: Option<String>,
    limit: i64,
) -> anyhow::Result<()> {
    let predicate: Box<dyn StringPredicate> = match (equals, contains, starts_with) {
        (Some(s), _, _) => Box::new(Equals(s)),
        (_, Some(s), _) => Box::new(Contains(s)),
        (_, _, Some(s)) => Box::new(StartsWith(s)),
        _ => anyhow::bail!("one of --equals, --contains or --starts-with is required"),
    };

    let archive = open(&file)?;
    let query = archive.query();
    let t0 = Instant::now();
    let matches = query.find_strings(predicate.as_ref(), limit)?;
    let elapsed = t0.elapsed();

    for (id, s) in &matches {
        println!("{id}\t{s}");
    }
    eprintln!(
        "  {} match(es) among {} strings in {:.3}ms",
        matches.len(),
        archive.info().num_embedded_strings,
        elapsed.as_secs_f64() * 1000.0
    );
    Ok(())
}

fn run_index(file: PathBuf) -> anyhow::Result<()> {
    let t0 = Instant::now();
    let entries = bake_string_id_index(&file)
        .with_context(|| format!("baking string-id index into {:?}", file))?;
    let archive = open(&file)?;
    eprintln!("  entries     : {}", entries);
    eprintln!("  index size  : {}", human_bytes(archive.info().string_id_index_size));
    eprintln!("  elapsed     : {:.3}s", t0.elapsed().as_secs_f64());
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Convert {
            input,
            output,
            compressor,
            read_optimized,
            bake_index,
            strict,
            session,
        } => run_convert(
            input,
            output,
            &compressor,
            read_optimized,
            bake_index,
            strict,
            session,
        ),
        Commands::Print { file, output } => run_print(file, output),
        Commands::Info { file } => run_info(file),
        Commands::Strings {
            file,
            limit,
            decode,
        } => run_strings(file, limit, decode),
        Commands::Fetch { file, id, nocache } => run_fetch(file, id, nocache),
        Commands::Find {
            file,
            equals,
            contains,
            starts_with,
            limit,
        } => run_find(file, equals, contains, starts_with, limit),
        Commands::Index { file } => run_index(file),
    }
}
