//! vacuum-mc CLI - run and inspect rarefied-gas Monte Carlo simulations.

use std::env;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;
use vacuum_mc::geometry::DesorptionLaw;
use vacuum_mc::prelude::*;

/// Options shared by the commands.
struct Options {
    threads: usize,
    desorptions: Option<u64>,
    seconds: Option<f64>,
    output: Option<String>,
    mode: SimulationMode,
    seed: Option<u64>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            threads: thread::available_parallelism().map_or(1, |n| n.get()),
            desorptions: None,
            seconds: None,
            output: None,
            mode: SimulationMode::MonteCarlo,
            seed: None,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let prog = args.first().map_or("vacuum-mc", String::as_str);

    // Parse global flags
    let mut level = "info";
    let mut opts = Options::default();
    let mut positional: Vec<&str> = Vec::new();
    let mut it = args.iter().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-v" | "--verbose" => level = "debug",
            "-vv" | "--trace" => level = "trace",
            "-q" | "--quiet" => level = "warn",
            "-t" | "--threads" => opts.threads = parse_value(arg, it.next())?,
            "-d" | "--desorptions" => opts.desorptions = Some(parse_value(arg, it.next())?),
            "-s" | "--seconds" => opts.seconds = Some(parse_value(arg, it.next())?),
            "-o" | "--output" => opts.output = Some(parse_value(arg, it.next())?),
            "--seed" => opts.seed = Some(parse_value(arg, it.next())?),
            "--ac" => opts.mode = SimulationMode::AngularCoefficient,
            _ => positional.push(arg),
        }
    }
    init_tracing(level);

    match positional.as_slice() {
        ["run" | "r", config] => cmd_run(config, &opts),
        ["check" | "c", config] => cmd_check(config),
        ["template", output] => cmd_template(output),
        ["help" | "h" | "-h" | "--help"] | [] => {
            print_usage(prog);
            Ok(())
        }
        [other, ..] => {
            eprintln!("Unknown command: {other}");
            print_usage(prog);
            std::process::exit(1);
        }
    }
}

fn print_usage(prog: &str) {
    println!("vacuum-mc - Monte Carlo simulation of rarefied-gas transport");
    println!();
    println!("Usage: {prog} [options] <command> <file.json>");
    println!();
    println!("Commands:");
    println!("  r, run <config>       Run a simulation and print a summary");
    println!("  c, check <config>     Validate a configuration and print its totals");
    println!("  template <output>     Write a sample configuration (closed box with a pump)");
    println!("  h, help               Show this help");
    println!();
    println!("Options:");
    println!("  -t, --threads <n>       Simulation threads (default: all cores, max 32)");
    println!("  -d, --desorptions <n>   Stop after n desorbed particles");
    println!("  -s, --seconds <s>       Stop after s seconds of wall time");
    println!("  -o, --output <file>     Write the final results as JSON");
    println!("      --seed <n>          Seed of the first thread");
    println!("      --ac                Angular coefficient mode (needs --seconds)");
    println!("  -v, --verbose           Debug output");
    println!("  -vv, --trace            Trace output (very verbose)");
    println!("  -q, --quiet             Warnings and errors only");
    println!();
    println!("RUST_LOG overrides the log level.");
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init();
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: Option<&String>) -> anyhow::Result<T> {
    let Some(value) = value else {
        bail!("{flag} needs a value");
    };
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid value for {flag}: {value}"))
}

fn cmd_check(path: &str) -> anyhow::Result<()> {
    let config = RunConfig::load(path).with_context(|| format!("loading {path}"))?;
    let model = SimulationModel::prepare(&config)?;
    let p = &model.params;
    println!("File: {path}");
    println!("  Facets:             {}", model.geometry.facet_count());
    println!("  Structures:         {}", model.geometry.structure_count);
    println!("  Moments:            {}", model.moments.len());
    println!("  Latest moment:      {:.3e} s", p.latest_moment);
    println!("  Desorbed molecules: {:.4e}", p.total_desorbed_molecules);
    println!("  Outgassing rate:    {:.4e} molecules/s", p.final_outgassing_rate);
    println!("  Outgassing:         {:.4e} Pa.m3/s", p.final_outgassing_rate_pa_m3_s);
    Ok(())
}

/// Reject runs that would never stop on their own.
fn check_bounded(opts: &Options, desorption_limit: u64) -> anyhow::Result<()> {
    if opts.seconds.is_some() {
        return Ok(());
    }
    match opts.mode {
        SimulationMode::AngularCoefficient => bail!("angular coefficient runs need --seconds"),
        SimulationMode::MonteCarlo if desorption_limit == 0 => {
            bail!("unbounded run: give --desorptions, --seconds or a desorption limit in the file")
        }
        SimulationMode::MonteCarlo => Ok(()),
    }
}

fn cmd_run(path: &str, opts: &Options) -> anyhow::Result<()> {
    let mut config = RunConfig::load(path).with_context(|| format!("loading {path}"))?;
    if let Some(limit) = opts.desorptions {
        config.otf.desorption_limit = limit;
    }
    check_bounded(opts, config.otf.desorption_limit)?;

    let mut worker = match opts.seed {
        Some(seed) => Worker::with_seed(opts.threads, seed)?,
        None => Worker::new(opts.threads)?,
    };
    worker.load(config)?;
    info!(threads = worker.thread_count(), "starting");

    let start = Instant::now();
    worker.start_stop(opts.mode)?;
    while worker.update()? {
        if opts.seconds.is_some_and(|s| start.elapsed().as_secs_f64() >= s) {
            worker.stop()?;
            break;
        }
        thread::sleep(Duration::from_millis(200));
        info!(progress = worker.progress(), "running");
    }
    let elapsed = start.elapsed().as_secs_f64();

    match opts.mode {
        SimulationMode::MonteCarlo => print_mc_summary(&worker, elapsed),
        SimulationMode::AngularCoefficient => print_ac_summary(&mut worker, elapsed)?,
    }

    if let Some(output) = &opts.output {
        let json = serde_json::to_string_pretty(&*worker.shared_results())?;
        std::fs::write(output, json).with_context(|| format!("writing {output}"))?;
        println!("Results written to {output}");
    }
    Ok(())
}

fn print_mc_summary(worker: &Worker, elapsed: f64) {
    let results = worker.shared_results();
    let g = &results.global_hits;
    println!("Simulation finished in {elapsed:.2} s");
    println!("  Desorbed:   {}", g.hits.nb_desorbed);
    println!("  MC hits:    {}", g.hits.nb_mc_hit);
    println!("  Absorbed:   {:.1}", g.hits.nb_abs_equiv);
    println!("  Leaks:      {}", g.nb_leak_total);
    if g.hits.nb_desorbed > 0 {
        println!(
            "  Mean free path: {:.4} cm",
            g.dist_traveled_full_hits_only / g.hits.nb_desorbed as f64
        );
    }
    println!();
    println!("  Facet      Hits        Absorbed    Desorbed");
    for (i, state) in results.facet_states.iter().enumerate() {
        let c = state.steady();
        println!("  {:<10} {:<11} {:<11.1} {}", i + 1, c.nb_mc_hit, c.nb_abs_equiv, c.nb_desorbed);
    }
}

fn print_ac_summary(worker: &mut Worker, elapsed: f64) -> anyhow::Result<()> {
    let mut delta = f64::INFINITY;
    for _ in 0..1000 {
        delta = worker.step_ac()?;
        if delta < 1e-9 {
            break;
        }
    }
    println!("Angular coefficients computed in {elapsed:.2} s (last flux change {delta:.3e})");
    for (i, flux) in worker.ac_flux().iter().enumerate() {
        println!("  Facet {:<6} incident flux {:.4e} /s", i + 1, flux);
    }
    Ok(())
}

fn cmd_template(output: &str) -> anyhow::Result<()> {
    if Path::new(output).exists() {
        bail!("{output} already exists");
    }
    let mut geometry = Geometry::closed_box(DVec3::new(10.0, 10.0, 100.0))?;
    let inlet = &mut geometry.facets[0].props;
    inlet.desorption = DesorptionLaw::Cosine;
    inlet.outgassing = 1e-3;
    geometry.facets[1].props.sticking = 1.0;

    let mut config = RunConfig {
        geometry,
        ..Default::default()
    };
    config.otf.desorption_limit = 100_000;
    config.save(output)?;
    println!("Template written to {output}");
    Ok(())
}
