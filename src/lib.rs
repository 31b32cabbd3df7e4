#![doc(html_root_url = "https://docs.rs/tscast/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # tscast - real-time MPEG-TS splicing and streaming
//!
//! `tscast` plays one or more MPEG transport stream assets back to back,
//! repairs continuity counters and clock references at every join, and sends
//! the result to a UDP unicast or multicast destination at the pace set by
//! the stream's own Program Clock Reference.
//!
//! ## Features
//!
//! - 188-byte TS packet codec with lazy re-serialization of edited packets
//! - PAT/PMT parsing to locate the PCR PID
//! - Seamless splicing of consecutive sources (continuity counter, PTS and
//!   PCR rebasing per PID)
//! - Finite or infinite looping and hot replacement of the source list
//! - PCR-paced delivery through a bounded queue with backpressure
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tscast::format::{FileSource, UdpSink};
//! use tscast::splice::{LoopMode, SourceSequencer};
//! use tscast::streamer::{Streamer, StreamerOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sequencer = SourceSequencer::builder()
//!         .add_source(FileSource::open("intro.ts").await?)
//!         .add_source(FileSource::open("main.ts").await?)
//!         .with_loop_mode(LoopMode::Infinite)
//!         .build()
//!         .await?;
//!
//!     let sink = UdpSink::connect("239.0.0.1:1234".parse()?, 1).await?;
//!     let mut streamer = Streamer::new(
//!         Box::new(sequencer),
//!         Box::new(sink),
//!         StreamerOptions::default(),
//!     )?;
//!
//!     streamer.start().await?;
//!     tokio::signal::ctrl_c().await?;
//!     let stats = streamer.stop().await?;
//!     println!("sent {} packets", stats.packets_sent);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - `format`: packet sources and sinks, and the `ts` packet layer
//! - `splice`: source sequencing and continuity repair
//! - `streamer`: the PCR-paced streaming engine
//! - `config`: TOML configuration with environment overrides
//! - `error`: error type and `Result` alias

/// TOML configuration
pub mod config;

/// Error types and utilities
pub mod error;

/// Packet sources, sinks and the transport stream packet layer
pub mod format;

/// Joining sources into one continuous stream
pub mod splice;

/// PCR-paced streaming engine
pub mod streamer;

pub use config::Config;
pub use error::{Result, TsError};
pub use format::{PacketSink, PacketSource};
pub use splice::{ContinuityFixer, LoopMode, SourceSequencer};
pub use streamer::{StreamStats, Streamer, StreamerOptions, StreamerState};
