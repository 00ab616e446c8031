//! Piezotone library: DAC tone engine for a passive piezo buzzer.
//!
//! A periodic timer interrupt replays one precomputed waveform cycle through
//! the DAC, one sample per tick. This crate holds everything that does not
//! touch hardware, testable on any host with `cargo test`. The firmware
//! binaries (bare-metal `src/main.rs`, ESP-IDF `firmware-std`) are thin
//! consumers that provide the timer, the DAC and a request source.
//!
//! - `waveform`: frequency → samples-per-cycle, table generation
//! - `emitter`: ISR tick and the pause/resume discipline around table rewrites
//! - `controller`: clamps, rebuilds and reports on each frequency request
//! - `config`, `board`: build-time constants and startup validation
//! - `protocol`, `comm`: NDJSON commands/records and the HTTP form

#![cfg_attr(not(test), no_std)]

pub mod board;
pub mod comm;
pub mod config;
pub mod controller;
pub mod emitter;
pub mod error;
pub mod protocol;
pub mod waveform;

pub use config::{FrequencyRequest, ToneConfig, TABLE_CAPACITY, TICK_PERIOD_US};
pub use controller::{FrequencyController, ToneSettings};
pub use emitter::{EmitterControl, IsrSlot, SampleEmitter, SampleSink, ToneTimer};
pub use error::ToneError;
pub use waveform::{SampleTable, WaveShape, AMPLITUDE_MAX};

/// Emitter sized for the fixed table capacity.
pub type ToneEmitter = SampleEmitter<TABLE_CAPACITY>;
