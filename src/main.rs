use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use encoding_rs::Encoding;
use log::{info, warn};
use tracing::Level;

use rpt_codec::rpt::{batch, utils};
use rpt_codec::{
    BatchOptions, BuildOptions, ContentFilter, ExtractionSummary, RptBuilder, RptError, RptFile,
    SectionNameTable, SectionSpec, Selection,
};

/// Inspect, extract and build legacy report containers.
#[derive(Debug, Parser)]
#[command(name = "rptcodec", version)]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print header, section, page table and attachment summary.
    Info {
        file: PathBuf,
        /// CSV of `species,section,name` used to label sections.
        #[arg(long)]
        section_names: Option<PathBuf>,
    },
    /// Extract text pages and/or the attachment from one or more containers.
    Extract(ExtractArgs),
    /// Build a container from page text files.
    Build(BuildArgs),
}

#[derive(Debug, Args)]
struct ExtractArgs {
    /// Container files or directories of containers.
    inputs: Vec<PathBuf>,

    /// File listing container paths, one per line.
    #[arg(long)]
    list: Option<PathBuf>,

    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Inclusive page range, e.g. `3-10`.
    #[arg(long, value_parser = parse_range, allow_hyphen_values = true, conflicts_with = "section")]
    pages: Option<PageRange>,

    /// Section ids, in output order. Repeatable or comma-separated.
    #[arg(long, value_delimiter = ',')]
    section: Vec<u32>,

    /// Only write the attachment.
    #[arg(long, conflicts_with = "no_binary")]
    binary_only: bool,

    /// Only write text pages.
    #[arg(long)]
    no_binary: bool,

    /// One file per page instead of one combined text file.
    #[arg(long)]
    split_pages: bool,

    /// Encoding of page text.
    #[arg(long, default_value = "utf-8")]
    encoding: String,

    /// Worker threads for batches (0 = one per CPU).
    #[arg(long, default_value_t = 0)]
    workers: usize,

    /// Stop starting new files after this many seconds.
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Debug, Args)]
struct BuildArgs {
    /// Page text files, in page order.
    pages: Vec<PathBuf>,

    #[arg(short, long)]
    output: PathBuf,

    #[arg(long)]
    domain: u32,

    #[arg(long)]
    species: u32,

    /// Header timestamp (default: now).
    #[arg(long)]
    timestamp: Option<String>,

    /// Section as `ID:START:COUNT`. Repeatable, in page order.
    #[arg(long, value_parser = parse_section)]
    section: Vec<SectionSpec>,

    /// File to embed as the attachment.
    #[arg(long)]
    attachment: Option<PathBuf>,

    #[arg(long, default_value_t = rpt_codec::rpt::layout::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Encoding of page text.
    #[arg(long, default_value = "utf-8")]
    encoding: String,
}

#[derive(Debug, Clone, Copy)]
struct PageRange {
    start: i64,
    end: i64,
}

fn parse_range(s: &str) -> Result<PageRange, String> {
    let s = s.trim();
    // A leading '-' belongs to a negative start.
    let split = s.get(1..).and_then(|rest| rest.find('-')).map(|i| i + 1);
    let (start, end) = match split {
        Some(i) => (&s[..i], &s[i + 1..]),
        None => (s, s),
    };
    let parse = |v: &str| {
        v.trim()
            .parse::<i64>()
            .map_err(|e| format!("invalid page number {:?}: {}", v, e))
    };
    Ok(PageRange {
        start: parse(start)?,
        end: parse(end)?,
    })
}

fn parse_section(s: &str) -> Result<SectionSpec, String> {
    let fields: Vec<&str> = s.split(':').collect();
    let &[id, start, count] = fields.as_slice() else {
        return Err(format!("expected ID:START:COUNT, got {:?}", s));
    };
    let parse = |v: &str| v.trim().parse::<u32>().map_err(|e| format!("{:?}: {}", v, e));
    Ok(SectionSpec {
        section_id: parse(id)?,
        start_page: parse(start)?,
        page_count: parse(count)?,
    })
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::WARN,
        (false, 1) => Level::INFO,
        (false, 2) => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let outcome = match cli.command {
        Command::Info {
            file,
            section_names,
        } => run_info(&file, section_names.as_deref()),
        Command::Extract(args) => run_extract(&args),
        Command::Build(args) => run_build(&args),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("ERROR: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_info(path: &Path, section_names: Option<&Path>) -> anyhow::Result<ExitCode> {
    let file = RptFile::open(path).with_context(|| format!("cannot read {}", path.display()))?;
    let names = section_names
        .map(SectionNameTable::load)
        .transpose()
        .context("cannot load section names")?;

    let info = file.info();
    match &names {
        Some(names) => print!("{}", info.with_section_names(names)),
        None => print!("{}", info),
    }
    Ok(ExitCode::SUCCESS)
}

#[derive(Debug, Default)]
struct FileReport {
    pages: ExtractionSummary,
    attachment: Option<String>,
    attachment_failed: bool,
}

/// Containers named on the command line, plus whether this is a batch run
/// (a directory, a path list, or several files).
fn collect_inputs(args: &ExtractArgs) -> anyhow::Result<(Vec<PathBuf>, bool)> {
    let mut paths = Vec::new();
    let mut batch_mode = args.list.is_some() || args.inputs.len() > 1;
    for input in &args.inputs {
        if input.is_dir() {
            batch_mode = true;
            paths.extend(batch::discover(input).with_context(|| format!("cannot list {}", input.display()))?);
        } else {
            paths.push(input.clone());
        }
    }
    if let Some(list) = &args.list {
        paths.extend(batch::read_path_list(list).with_context(|| format!("cannot read {}", list.display()))?);
    }
    if paths.is_empty() {
        bail!("no containers to process");
    }
    Ok((paths, batch_mode))
}

fn run_extract(args: &ExtractArgs) -> anyhow::Result<ExitCode> {
    let (paths, batch_mode) = collect_inputs(args)?;

    let selection = match (&args.pages, args.section.is_empty()) {
        (Some(range), _) => Selection::Range {
            start: range.start,
            end: range.end,
        },
        (None, false) => Selection::Sections(args.section.clone()),
        (None, true) => Selection::All,
    };
    let filter = if args.binary_only {
        ContentFilter::BinaryOnly
    } else if args.no_binary {
        ContentFilter::TextOnly
    } else {
        ContentFilter::Everything
    };
    let encoding = utils::parse_encoding(&args.encoding);
    fs::create_dir_all(&args.output)
        .with_context(|| format!("cannot create {}", args.output.display()))?;

    let options = BatchOptions {
        workers: args.workers,
        timeout: args.timeout.map(Duration::from_secs),
        ..Default::default()
    };
    let items = batch::run(&paths, &options, |path| {
        extract_one(path, &selection, filter, encoding, &args.output, args.split_pages)
    });

    let mut totals = ExtractionSummary::default();
    let (mut ok, mut failed, mut cancelled) = (0, 0, 0);
    let (mut attachments, mut broken_attachments) = (0, 0);
    for item in &items {
        match &item.result {
            Ok(report) => {
                ok += 1;
                totals += report.pages;
                if report.attachment.is_some() {
                    attachments += 1;
                }
                if report.attachment_failed {
                    broken_attachments += 1;
                }
                println!(
                    "{}: {} pages extracted, {} failed{}",
                    item.path.display(),
                    report.pages.extracted,
                    report.pages.failed,
                    report
                        .attachment
                        .as_deref()
                        .map(|a| format!(", attachment {}", a))
                        .unwrap_or_default()
                );
            }
            Err(RptError::Cancelled) => cancelled += 1,
            Err(e) => {
                failed += 1;
                eprintln!("{}: {}", item.path.display(), e);
            }
        }
    }

    if batch_mode {
        println!(
            "Files: {} ok, {} failed, {} cancelled. Pages: {} selected, {} extracted, {} failed. Attachments: {} written, {} incomplete",
            ok,
            failed,
            cancelled,
            totals.selected,
            totals.extracted,
            totals.failed,
            attachments,
            broken_attachments
        );
    }

    Ok(if failed > 0 || cancelled > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn extract_one(
    path: &Path,
    selection: &Selection,
    filter: ContentFilter,
    encoding: &'static Encoding,
    output: &Path,
    split_pages: bool,
) -> rpt_codec::Result<FileReport> {
    let file = RptFile::open(path)?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("container")
        .to_string();
    let mut report = FileReport::default();

    if filter.wants_text() {
        match file.extract(selection) {
            Ok(extraction) => {
                for id in &extraction.skipped_sections {
                    warn!("{}: section {} not found", path.display(), id);
                }
                for failure in &extraction.failures {
                    warn!("{}: page {} skipped: {}", path.display(), failure.page_number, failure.error);
                }
                write_text(output, &stem, &extraction.texts(encoding), split_pages)?;
                report.pages = extraction.summary();
            }
            // A pure attachment container has no text pages to offer.
            Err(RptError::NoPagesSelected(reason))
                if file.has_attachment() && filter == ContentFilter::Everything =>
            {
                info!("{}: no text pages ({})", path.display(), reason);
            }
            Err(e) => return Err(e),
        }
    }

    if filter.wants_binary() {
        match file.assemble_attachment()? {
            Some(attachment) if attachment.is_complete() => {
                fs::write(output.join(&attachment.file_name), &attachment.bytes)?;
                info!(
                    "{}: attachment {} ({}, {} bytes)",
                    path.display(),
                    attachment.file_name,
                    attachment.kind,
                    attachment.bytes.len()
                );
                report.attachment = Some(attachment.file_name);
            }
            Some(attachment) => {
                warn!(
                    "{}: attachment not written, {} of {} chunks failed",
                    path.display(),
                    attachment.failures.len(),
                    attachment.chunk_count
                );
                report.attachment_failed = true;
            }
            None if filter == ContentFilter::BinaryOnly => {
                warn!("{}: container has no attachment", path.display());
            }
            None => {}
        }
    }
    Ok(report)
}

fn write_text(
    output: &Path,
    stem: &str,
    pages: &[(u32, String)],
    split_pages: bool,
) -> std::io::Result<()> {
    if split_pages {
        let dir = output.join(stem);
        fs::create_dir_all(&dir)?;
        for (seq, (page_number, text)) in pages.iter().enumerate() {
            let name = format!("{:05}_page_{:05}.txt", seq + 1, page_number);
            fs::write(dir.join(name), text)?;
        }
        return Ok(());
    }
    let combined = pages
        .iter()
        .map(|(_, text)| text.as_str())
        .collect::<Vec<_>>()
        .join("\x0c");
    fs::write(output.join(format!("{}.txt", stem)), combined)
}

fn run_build(args: &BuildArgs) -> anyhow::Result<ExitCode> {
    let encoding = utils::parse_encoding(&args.encoding);
    let mut pages = Vec::with_capacity(args.pages.len());
    for path in &args.pages {
        let bytes = fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
        pages.push(utils::decode_text(&bytes, encoding));
    }

    let mut builder = RptBuilder::new(args.domain, args.species)
        .pages(pages)
        .sections(args.section.iter().copied())
        .options(BuildOptions {
            chunk_size: args.chunk_size,
            encoding,
            ..Default::default()
        });
    if let Some(ts) = &args.timestamp {
        builder = builder.timestamp(ts.clone());
    }
    if let Some(path) = &args.attachment {
        let bytes = fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("attachment.bin")
            .to_string();
        builder = builder.attachment(name, bytes);
    }

    builder
        .write_to_path(&args.output)
        .with_context(|| format!("cannot build {}", args.output.display()))?;
    println!("Built {}", args.output.display());
    Ok(ExitCode::SUCCESS)
}
