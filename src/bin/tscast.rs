use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use tscast::config::{create_default_config_template, Config};
use tscast::format::{FileSource, UdpSink};
use tscast::splice::{LoopMode, SourceSequencer};
use tscast::streamer::Streamer;
use tscast::Result;

/// Stream MPEG-TS files to a UDP destination in real time.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Opt {
    /// Path to a TOML configuration file. Defaults to ./tscast.toml or ./config.toml.
    #[arg(long, env = "TSCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Write a configuration template to this path and exit.
    #[arg(long)]
    init_config: Option<PathBuf>,

    /// Destination IP address, unicast or multicast.
    #[arg(long)]
    address: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Time to live of outgoing datagrams.
    #[arg(long)]
    ttl: Option<u32>,

    /// "once", "infinite" or a number of passes over the inputs.
    #[arg(long)]
    loops: Option<LoopMode>,

    /// Queue capacity in packets.
    #[arg(long)]
    buffer: Option<usize>,

    /// Pass continuity counters and timestamps through unmodified.
    #[arg(long)]
    no_fix_continuity: bool,

    /// Milliseconds of clock gap inserted at each splice point.
    #[arg(long)]
    splice_gap_ms: Option<u64>,

    /// OFF, ERROR, WARN, INFO, DEBUG or TRACE.
    #[arg(long)]
    log_level: Option<String>,

    /// Transport stream files, played in order.
    inputs: Vec<PathBuf>,
}

impl Opt {
    /// Layers command line options over the configuration file.
    fn build_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => {
                let mut config = Config::load(path)?;
                config.apply_env()?;
                config
            }
            None => Config::load_default()?,
        };

        if let Some(address) = &self.address {
            config.output.address = address.clone();
        }
        if let Some(port) = self.port {
            config.output.port = port;
        }
        if let Some(ttl) = self.ttl {
            config.output.ttl = ttl;
        }
        if let Some(loops) = self.loops {
            config.stream.loops = loops;
        }
        if let Some(buffer) = self.buffer {
            config.stream.buffer_capacity = buffer;
        }
        if self.no_fix_continuity {
            config.stream.fix_continuity = false;
        }
        if let Some(gap) = self.splice_gap_ms {
            config.stream.splice_gap_ms = gap;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if !self.inputs.is_empty() {
            config.inputs = self.inputs.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

fn setup_logging(config: &Config) {
    let mut log_builder = env_logger::Builder::new();
    log_builder.parse_filters(&config.log_level.to_lowercase());
    log_builder.init();
}

async fn run(config: Config) -> Result<()> {
    let mut builder = SourceSequencer::builder()
        .with_loop_mode(config.stream.loops)
        .with_fix_continuity(config.stream.fix_continuity)
        .with_splice_gap(config.splice_gap());
    for path in &config.inputs {
        builder = builder.add_source(FileSource::open(path).await?);
    }
    let sequencer = builder.build().await?;

    let target = config.target()?;
    let sink = UdpSink::connect(target, config.output.ttl).await?;
    info!(
        "Streaming {} inputs to {} ({:?})",
        config.inputs.len(),
        target,
        config.stream.loops
    );

    let mut streamer = Streamer::new(
        Box::new(sequencer),
        Box::new(sink),
        config.streamer_options(),
    )?;
    streamer.start().await?;

    let finished = tokio::select! {
        stats = streamer.wait() => Some(stats),
        _ = tokio::signal::ctrl_c() => None,
    };
    let stats = match finished {
        Some(stats) => stats?,
        None => {
            info!("Interrupted, stopping");
            streamer.stop().await?
        }
    };

    info!(
        "Done: {} packets sent, {} PCR discontinuities, {} send errors",
        stats.packets_sent, stats.discontinuities, stats.sink_errors
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    let opt = Opt::parse();

    if let Some(path) = &opt.init_config {
        match create_default_config_template(path) {
            Ok(()) => println!("Wrote {}", path.display()),
            Err(e) => {
                eprintln!("Failed to write {}: {}", path.display(), e);
                std::process::exit(1);
            }
        }
        return;
    }

    let config = match opt.build_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };
    setup_logging(&config);

    if let Err(e) = run(config).await {
        error!("{}", e);
        std::process::exit(1);
    }
}
