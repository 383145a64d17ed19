use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use histond_common::Config;
use histond_core::export::{print_summary, write_csv, write_json, write_table};
use histond_core::{
    list_columns, load_table, resolve_paths, HistogramDataSource, HistogramSpec, MemoryTable,
    OutputDataset, Weights,
};
use notify::{RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tracing::{info, warn};

fn parse_range(s: &str) -> Result<(String, [f64; 2]), String> { // "x=0:10"
    let (name, bounds) = s.split_once('=').ok_or_else(|| format!("expected NAME=MIN:MAX, got {s}"))?;
    let (lo, hi) = bounds.split_once(':').ok_or_else(|| format!("expected MIN:MAX, got {bounds}"))?;
    let lo: f64 = lo.trim().parse().map_err(|_| format!("not a float: {lo}"))?;
    let hi: f64 = hi.trim().parse().map_err(|_| format!("not a float: {hi}"))?;
    Ok((name.to_string(), [lo, hi]))
}

fn parse_aux(s: &str) -> Result<(String, String), String> { // "name=weight_column"
    let (name, col) = s.split_once('=').ok_or_else(|| format!("expected NAME=COLUMN, got {s}"))?;
    Ok((name.to_string(), col.to_string()))
}

#[derive(Parser)]
#[command(name = "histond", version, about = "N-dimensional histograms over Parquet columns")]
struct Cli {
    /// error, warn, info, debug or trace
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bin the input once and print or export the result
    Bin(BinArgs),
    /// List the columns of every input file
    Columns { input: String },
    /// Bin the input, then rebin whenever its files change
    Watch(BinArgs),
}

#[derive(Args, Clone)]
struct BinArgs {
    /// Parquet file, directory or glob pattern
    input: String,
    #[arg(long = "var")]
    vars: Vec<String>,
    /// one count for every axis, or one per axis
    #[arg(long, value_delimiter = ',')]
    bins: Vec<usize>,
    #[arg(long = "range", value_parser = parse_range)]
    ranges: Vec<(String, [f64; 2])>,
    #[arg(long)]
    weights: Option<String>,
    #[arg(long = "aux", value_parser = parse_aux)]
    aux: Vec<(String, String)>,
    /// TOML histogram definition; flags override its fields
    #[arg(long)]
    spec: Option<PathBuf>,
    #[arg(long, value_enum)]
    format: Option<Format>,
    #[arg(long)]
    output: Option<PathBuf>,
    /// write to the configured output directory
    #[arg(long)]
    save: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
enum Format {
    Json,
    Csv,
}

impl Format {
    fn extension(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Csv => "csv",
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    let config = Config::load().unwrap_or_else(|e| {
        warn!(error = %e, "unreadable config, using defaults");
        Config::default()
    });
    match cli.command {
        Commands::Bin(args) => run_bin(&args, &config)?,
        Commands::Columns { input } => run_columns(&input)?,
        Commands::Watch(args) => run_watch(args, config)?,
    }
    Ok(())
}

fn rp(input: &str) -> anyhow::Result<Vec<PathBuf>> {
    let paths = resolve_paths(input)?;
    if paths.is_empty() { anyhow::bail!("No Parquet files found: {input}"); }
    Ok(paths)
}

fn build_spec(args: &BinArgs, config: &Config) -> anyhow::Result<HistogramSpec> {
    let mut spec = match &args.spec {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => HistogramSpec::new(Vec::<String>::new(), Vec::new()),
    };
    if !args.vars.is_empty() {
        spec.sample_variables = args.vars.clone();
        spec.range = None; // file ranges belong to the file's axes
    }
    if spec.sample_variables.is_empty() { anyhow::bail!("no sample variables: pass --var or --spec"); }
    let dim = spec.dim();
    match args.bins.as_slice() {
        [] if spec.nbins.len() == dim => {}
        [] => spec.nbins = vec![config.binning.default_bins; dim],
        [n] => spec.nbins = vec![*n; dim],
        many => spec.nbins = many.to_vec(),
    }
    if !args.ranges.is_empty() {
        let mut range = spec.range.take().unwrap_or_else(|| vec![None; dim]);
        range.resize(dim, None);
        for (name, bounds) in &args.ranges {
            let axis = spec.sample_variables.iter().position(|v| v == name)
                .with_context(|| format!("--range for unknown variable {name}"))?;
            range[axis] = Some(*bounds);
        }
        spec.range = Some(range);
    }
    if let Some(w) = &args.weights {
        spec.weights = Weights::column(w.clone());
    }
    for (name, col) in &args.aux {
        spec = spec.with_histogram(name.clone(), Weights::column(col.clone()));
    }
    spec.validate()?;
    Ok(spec)
}

fn load_for(spec: &HistogramSpec, input: &str, config: &Config) -> anyhow::Result<MemoryTable> {
    let paths = rp(input)?;
    let columns = spec.referenced_columns();
    Ok(load_table(&paths, Some(&columns), config.binning.batch_size)?)
}

fn emit(output: &OutputDataset, args: &BinArgs, config: &Config) -> anyhow::Result<()> {
    let configured = Format::from_str(&config.export.format, true).unwrap_or(Format::Json);
    let out_path = match (&args.output, args.save) {
        (Some(o), _) => Some(o.clone()),
        (None, true) => {
            let format = args.format.unwrap_or(configured);
            Some(Path::new(&config.export.output_dir).join(format!("histogram.{}", format.extension())))
        }
        (None, false) => None,
    };
    let Some(out_path) = out_path else {
        let stdout = std::io::stdout().lock();
        match args.format {
            Some(Format::Json) => write_json(stdout, output)?,
            Some(Format::Csv) => write_csv(stdout, output)?,
            None => {
                print_summary(output);
                write_table(stdout, output)?;
            }
        }
        return Ok(());
    };
    // an explicit --format wins, then the file extension, then the config
    let format = args.format
        .or_else(|| out_path.extension().and_then(|e| e.to_str()).and_then(|e| Format::from_str(e, true).ok()))
        .unwrap_or(configured);
    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() { std::fs::create_dir_all(parent)?; }
    }
    let file = std::io::BufWriter::new(std::fs::File::create(&out_path)?);
    match format {
        Format::Json => write_json(file, output)?,
        Format::Csv => write_csv(file, output)?,
    }
    println!("Histogram saved to {}", out_path.display());
    Ok(())
}

fn run_bin(args: &BinArgs, config: &Config) -> anyhow::Result<()> {
    let spec = build_spec(args, config)?;
    let table = load_for(&spec, &args.input, config)?;
    let ds = HistogramDataSource::new(table, spec)?;
    emit(ds.output(), args, config)
}

fn run_columns(input: &str) -> anyhow::Result<()> {
    for path in rp(input)? {
        let listing = list_columns(&path)?;
        println!("{}", listing.path.display());
        println!("  {:<12} {}", "rows:", listing.row_count);
        println!("  {:<12} {}", "numeric:", listing.numeric_columns.join(", "));
        if !listing.other_columns.is_empty() {
            println!("  {:<12} {}", "other:", listing.other_columns.join(", "));
        }
    }
    Ok(())
}

fn watch_roots(input: &str) -> anyhow::Result<Vec<(PathBuf, RecursiveMode)>> {
    let path = Path::new(input);
    if path.is_dir() {
        return Ok(vec![(path.to_path_buf(), RecursiveMode::Recursive)]);
    }
    if path.is_file() {
        return Ok(vec![(path.to_path_buf(), RecursiveMode::NonRecursive)]);
    }
    // glob: watch the directories holding the matches
    let mut dirs: Vec<PathBuf> = rp(input)?
        .iter()
        .filter_map(|p| p.parent().map(Path::to_path_buf))
        .collect();
    dirs.sort();
    dirs.dedup();
    Ok(dirs.into_iter().map(|d| (d, RecursiveMode::NonRecursive)).collect())
}

fn is_relevant(event: &notify::Event) -> bool {
    !event.kind.is_access()
        && event.paths.iter().any(|p| p.extension().is_some_and(|e| e == "parquet"))
}

fn run_watch(args: BinArgs, config: Config) -> anyhow::Result<()> {
    let spec = build_spec(&args, &config)?;
    let table = load_for(&spec, &args.input, &config)?;
    let mut ds = HistogramDataSource::new(table, spec.clone())?;
    emit(ds.output(), &args, &config)?;
    {
        let (args, config) = (args.clone(), config.clone());
        ds.subscribe(move |output| {
            if let Err(e) = emit(output, &args, &config) {
                warn!(error = %e, "could not write histogram");
            }
        });
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || r.store(false, Ordering::SeqCst))?;

    let (tx, rx) = mpsc::channel::<notify::Result<notify::Event>>();
    let mut watcher = notify::recommended_watcher(tx)?;
    for (root, mode) in watch_roots(&args.input)? {
        watcher.watch(&root, mode)?;
        info!(path = %root.display(), "watching");
    }
    eprintln!("Watching {} (Ctrl-C to stop)", args.input);

    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(Duration::from_millis(250)) {
            Ok(Ok(event)) if is_relevant(&event) => {
                // writers touch a file several times; let the burst settle
                std::thread::sleep(Duration::from_millis(200));
                rx.try_iter().for_each(drop);
                match load_for(&spec, &args.input, &config) {
                    Ok(table) => {
                        if let Err(e) = ds.replace_source(table) {
                            warn!(error = %e, "rebin failed, keeping previous histogram");
                        }
                    }
                    Err(e) => warn!(error = %e, "reload failed, keeping previous histogram"),
                }
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(error = %e, "watch error"),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> BinArgs {
        let mut argv = vec!["histond", "bin", "data.parquet"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Bin(a) => a,
            _ => unreachable!(),
        }
    }

    #[test]
    fn range_flag_parses() {
        assert_eq!(parse_range("x=-1.5:10").unwrap(), ("x".to_string(), [-1.5, 10.0]));
        assert!(parse_range("x=1").is_err());
        assert!(parse_range("x").is_err());
        assert!(parse_range("x=a:b").is_err());
    }

    #[test]
    fn flags_build_a_spec() {
        let a = args(&["--var", "x", "--var", "y", "--bins", "4", "--range", "y=0:1", "--weights", "w", "--aux", "raw=r"]);
        let spec = build_spec(&a, &Config::default()).unwrap();
        assert_eq!(spec.sample_variables, vec!["x", "y"]);
        assert_eq!(spec.nbins, vec![4, 4]);
        assert_eq!(spec.range, Some(vec![None, Some([0.0, 1.0])]));
        assert_eq!(spec.weights, Weights::column("w"));
        assert_eq!(spec.histograms["raw"].weights, Weights::column("r"));
    }

    #[test]
    fn bins_default_from_config() {
        let mut config = Config::default();
        config.binning.default_bins = 7;
        let spec = build_spec(&args(&["--var", "x"]), &config).unwrap();
        assert_eq!(spec.nbins, vec![7]);
    }

    #[test]
    fn unknown_range_variable_is_rejected() {
        assert!(build_spec(&args(&["--var", "x", "--range", "z=0:1"]), &Config::default()).is_err());
        assert!(build_spec(&args(&[]), &Config::default()).is_err());
    }

    #[test]
    fn spec_file_with_flag_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hist.toml");
        std::fs::write(&path, "sample_variables = [\"x\"]\nnbins = [3]\nrange = [[0.0, 3.0]]\n").unwrap();
        let a = args(&["--spec", path.to_str().unwrap(), "--weights", "w"]);
        let spec = build_spec(&a, &Config::default()).unwrap();
        assert_eq!(spec.nbins, vec![3]);
        assert_eq!(spec.range, Some(vec![Some([0.0, 3.0])]));
        assert_eq!(spec.weights, Weights::column("w"));
    }
}
