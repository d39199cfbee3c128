use std::fs;
use std::io::{self, prelude::*};
use std::path::{Path, PathBuf};
use std::process;

use bytesize::ByteSize;
use clap::Parser;
use env_logger;
use log;

use spill_sort::{ArithmeticTraits, ElementTraits, Reversed, RmpTraits, Sorter, SorterBuilder};

/// External merge sort of text lines.
#[derive(Parser)]
#[clap(name = "spill-sort", version)]
struct Args {
    /// File to be sorted
    #[clap(short, long, parse(from_os_str))]
    input: PathBuf,
    /// Result file
    #[clap(short, long, parse(from_os_str))]
    output: PathBuf,
    /// Sorting order
    #[clap(short, long, arg_enum, default_value = "asc")]
    sort: Order,
    /// Compare lines as integers
    #[clap(short, long)]
    numeric: bool,
    /// Logging level
    #[clap(short, long = "loglevel", arg_enum, default_value = "info")]
    log_level: LogLevel,
    /// Path prefix of temporary segment files
    #[clap(short = 'p', long, parse(from_os_str))]
    tmp_prefix: Option<PathBuf>,
    /// In-memory buffer size
    #[clap(short, long, default_value = "64MiB")]
    buffer_size: ByteSize,
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum Order {
    Asc,
    Desc,
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn main() {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level.into())
        .format_timestamp_millis()
        .init();

    if let Err(err) = run(&args) {
        log::error!("{}", err);
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), String> {
    let input_stream = fs::File::open(&args.input)
        .map(io::BufReader::new)
        .map_err(|err| format!("{}: input file opening error: {}", args.input.display(), err))?;
    let output_stream = fs::File::create(&args.output)
        .map(io::BufWriter::new)
        .map_err(|err| format!("{}: output file creation error: {}", args.output.display(), err))?;

    let buffer_size = usize::try_from(args.buffer_size.as_u64()).unwrap_or(usize::MAX);
    let tmp_prefix = args.tmp_prefix.as_deref();

    return match (args.numeric, args.sort) {
        (true, Order::Asc) => sort_lines(
            build_sorter::<i64, ArithmeticTraits<i64>>(buffer_size, tmp_prefix),
            input_stream,
            output_stream,
            parse_number,
        ),
        (true, Order::Desc) => sort_lines(
            build_sorter::<i64, ArithmeticTraits<i64, true>>(buffer_size, tmp_prefix),
            input_stream,
            output_stream,
            parse_number,
        ),
        (false, Order::Asc) => sort_lines(
            build_sorter::<String, RmpTraits<String>>(buffer_size, tmp_prefix),
            input_stream,
            output_stream,
            Some,
        ),
        (false, Order::Desc) => sort_lines(
            build_sorter::<String, Reversed<RmpTraits<String>>>(buffer_size, tmp_prefix),
            input_stream,
            output_stream,
            Some,
        ),
    };
}

fn build_sorter<T, Tr>(buffer_size: usize, tmp_prefix: Option<&Path>) -> Sorter<'static, T, Tr>
where
    Tr: ElementTraits<T, Context = ()>,
{
    let mut sorter_builder = SorterBuilder::new().with_buffer_size(buffer_size);
    if let Some(tmp_prefix) = tmp_prefix {
        sorter_builder = sorter_builder.with_tmp_prefix(tmp_prefix);
    }

    return sorter_builder.build();
}

fn parse_number(line: String) -> Option<i64> {
    line.trim().parse().ok()
}

/// Sorts input lines into the output. The sorter is dropped (and its segments removed) before returning.
fn sort_lines<T, Tr, F>(
    mut sorter: Sorter<'_, T, Tr>,
    input_stream: impl BufRead,
    mut output_stream: impl Write,
    parse: F,
) -> Result<(), String>
where
    T: std::fmt::Display,
    Tr: ElementTraits<T>,
    F: Fn(String) -> Option<T>,
{
    for (line_number, line) in input_stream.lines().enumerate() {
        let line = line.map_err(|err| format!("input data reading error: {}", err))?;
        let item = parse(line).ok_or_else(|| format!("line {} format incorrect", line_number + 1))?;
        sorter
            .add(item)
            .map_err(|err| format!("data sorting error: {}", err))?;
    }

    log::info!("{} segments spilled", sorter.segments().len());

    let mut sorted_stream = sorter.iter().map_err(|err| format!("data sorting error: {}", err))?;
    while sorted_stream
        .advance()
        .map_err(|err| format!("sorting stream error: {}", err))?
    {
        writeln!(output_stream, "{}", sorted_stream.current()).map_err(|err| format!("data saving error: {}", err))?;
    }

    output_stream
        .flush()
        .map_err(|err| format!("data flushing error: {}", err))?;

    return Ok(());
}
