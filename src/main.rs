use clap::{Args, Parser, Subcommand};
use packdir::utils::formatter::{format_file_size, pluralize};
use packdir::{
    extract_dir_needs_confirmation, list_entries, prepare_pack, prepare_unpack,
    suggested_destination, ArchiveFormat, FinishedTask, PackdirError, TaskHandle, TaskKind,
    TaskOutcome, TaskProgress,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

const EXIT_OK: i32 = 0;
const EXIT_TASK_FAILED: i32 = 1;
const EXIT_USAGE: i32 = 2;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(
    name = "packdir",
    version,
    about = "Pack a folder into an archive, or unpack an archive into a folder"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Pack a folder (or file) into an archive
    Pack(PackArgs),
    /// Unpack an archive into a folder
    Unpack(UnpackArgs),
    /// List the entries of an archive
    List(ListArgs),
}

#[derive(Args)]
struct PackArgs {
    /// Source folder or file to pack
    source: PathBuf,

    /// Archive format (zip, tar, tar.gz, tar.bz2, tar.xz, tar.zst)
    #[arg(short, long, value_parser = parse_format_arg, default_value = "zip")]
    format: ArchiveFormat,

    /// Destination archive path; defaults to `<parent>/<name>.<extension>`
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct UnpackArgs {
    /// Archive file to unpack
    archive: PathBuf,

    /// Destination folder; defaults to the archive's parent directory
    #[arg(short, long)]
    dest: Option<PathBuf>,

    /// Skip the confirmation prompt for a non-empty destination
    #[arg(short, long)]
    yes: bool,
}

#[derive(Args)]
struct ListArgs {
    /// Archive file to list
    archive: PathBuf,
}

fn parse_format_arg(value: &str) -> Result<ArchiveFormat, String> {
    ArchiveFormat::parse(value).ok_or_else(|| {
        format!(
            "unsupported format '{}' (expected one of: zip, tar, tar.gz, tar.bz2, tar.xz, tar.zst)",
            value
        )
    })
}

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let exit_code = match cli.command {
        Command::Pack(args) => run_pack(args),
        Command::Unpack(args) => run_unpack(args),
        Command::List(args) => run_list(args),
    };

    std::process::exit(exit_code);
}

fn run_pack(args: PackArgs) -> i32 {
    let dest = match &args.output {
        Some(path) => path.clone(),
        None => match suggested_destination(&args.source, args.format) {
            Ok(path) => path,
            Err(error) => return report_error(&error),
        },
    };

    let request = match prepare_pack(&args.source, &dest, args.format) {
        Ok(request) => request,
        Err(error) => return report_error(&error),
    };

    log::info!(
        "packing '{}' as {}",
        args.source.display(),
        args.format.display_name()
    );
    let finished = drive(TaskHandle::spawn_pack(request));
    report_outcome(finished)
}

fn run_unpack(args: UnpackArgs) -> i32 {
    if !args.archive.is_file() {
        return report_error(&PackdirError::InvalidInput {
            reason: format!("'{}' is not an archive file", args.archive.display()),
        });
    }

    let dest = args.dest.clone().unwrap_or_else(|| {
        match args.archive.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    });

    if !args.yes && extract_dir_needs_confirmation(&dest) {
        let question = format!(
            "Destination '{}' already contains files; existing entries will be replaced. Continue?",
            dest.display()
        );
        if !confirm(&question) {
            println!("aborted; '{}' left untouched", dest.display());
            return EXIT_OK;
        }
    }

    let request = match prepare_unpack(&args.archive, &dest) {
        Ok(request) => request,
        Err(error) => return report_error(&error),
    };

    log::info!("unpacking '{}'", args.archive.display());
    let finished = drive(TaskHandle::spawn_unpack(request));
    report_outcome(finished)
}

fn run_list(args: ListArgs) -> i32 {
    match list_entries(&args.archive) {
        Ok(entries) => {
            let total_bytes: u64 = entries.iter().map(|e| e.size).sum();
            for entry in &entries {
                if entry.is_dir {
                    println!("{:>10}  {}", "-", entry.path);
                } else {
                    println!("{:>10}  {}", format_file_size(entry.size), entry.path);
                }
            }
            println!(
                "{}, {} total",
                pluralize(entries.len(), "entry", "entries"),
                format_file_size(total_bytes)
            );
            EXIT_OK
        }
        Err(error) => report_error(&error),
    }
}

/// Poll the single in-flight task to completion, rendering the status line.
fn drive(mut handle: TaskHandle) -> FinishedTask {
    let kind = handle.kind();
    loop {
        render_progress(kind, handle.poll_progress());
        if handle.is_finished() {
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    let finished = handle.join();
    render_progress(kind, &finished.progress);
    eprintln!();
    finished
}

fn render_progress(kind: TaskKind, progress: &TaskProgress) {
    let line = format!(
        "{}: {:3}% ({}/{} entries, {}) {}",
        kind.name(),
        progress.percentage(),
        progress.entries_completed,
        progress.total_entries,
        format_file_size(progress.bytes_processed),
        progress.current_entry
    );
    eprint!("\r{:<78}", line);
    let _ = io::stderr().flush();
}

fn confirm(question: &str) -> bool {
    eprint!("{} [y/N] ", question);
    let _ = io::stderr().flush();

    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn report_outcome(finished: FinishedTask) -> i32 {
    match finished.outcome {
        TaskOutcome::Success { message } => {
            println!("{}", message);
            EXIT_OK
        }
        TaskOutcome::Failure { error } => {
            eprintln!("error: {}", error);
            EXIT_TASK_FAILED
        }
    }
}

fn report_error(error: &PackdirError) -> i32 {
    eprintln!("error: {}", error);
    match error {
        PackdirError::InvalidInput { .. } => EXIT_USAGE,
        _ => EXIT_TASK_FAILED,
    }
}
