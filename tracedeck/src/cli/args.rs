//! CLI argument definitions

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracedeck_common::ToolKind;

use crate::capture_model::DetailsKind;
use crate::clock::ClockType;
use crate::stage::{default_configuration, LongTracePolicy, ProfilingConfiguration, StageOptions};

#[derive(Parser, Debug)]
#[command(
    name = "tracedeck",
    about = "Record, parse and inspect CPU traces",
    after_help = "\
EXAMPLES:
    tracedeck                                    Record 500 ms on the simulated device
    tracedeck --native --details top-down        Native sampling, top-down view
    tracedeck --replay trace.json --tool art     Inspect a trace file"
)]
pub struct Args {
    /// Replay a trace file instead of recording on the simulated device
    #[arg(long, value_name = "FILE")]
    pub replay: Option<PathBuf>,

    /// Recording tool (defaults to the default configuration's tool)
    #[arg(long, value_enum)]
    pub tool: Option<ToolArg>,

    /// Sampling mode (only ART supports instrumented)
    #[arg(long, value_enum, default_value = "sampled")]
    pub mode: ModeArg,

    /// How long to record, in milliseconds
    #[arg(long, default_value = "500")]
    pub record_ms: u64,

    /// Details view to print
    #[arg(long, value_enum, default_value = "bottom-up")]
    pub details: DetailsArg,

    /// Clock used for the details view
    #[arg(long, value_enum, default_value = "global")]
    pub clock: ClockArg,

    /// Traces larger than this need --parse-oversized
    #[arg(long, default_value = "100", value_name = "MB")]
    pub max_trace_mb: usize,

    /// Parse traces over the size limit anyway
    #[arg(long)]
    pub parse_oversized: bool,

    /// Prefer native sampling as the default configuration
    #[arg(long)]
    pub native: bool,

    /// Number of entries to print
    #[arg(long, default_value = "10")]
    pub top: usize,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolArg {
    Art,
    Simpleperf,
    Atrace,
}

impl From<ToolArg> for ToolKind {
    fn from(tool: ToolArg) -> Self {
        match tool {
            ToolArg::Art => ToolKind::Art,
            ToolArg::Simpleperf => ToolKind::Simpleperf,
            ToolArg::Atrace => ToolKind::Atrace,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeArg {
    Sampled,
    Instrumented,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetailsArg {
    CallChart,
    TopDown,
    BottomUp,
}

impl From<DetailsArg> for DetailsKind {
    fn from(details: DetailsArg) -> Self {
        match details {
            DetailsArg::CallChart => DetailsKind::CallChart,
            DetailsArg::TopDown => DetailsKind::TopDown,
            DetailsArg::BottomUp => DetailsKind::BottomUp,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockArg {
    Global,
    Thread,
}

impl From<ClockArg> for ClockType {
    fn from(clock: ClockArg) -> Self {
        match clock {
            ClockArg::Global => ClockType::Global,
            ClockArg::Thread => ClockType::Thread,
        }
    }
}

impl Args {
    /// Built-in configuration matching `--tool` / `--mode` / `--native`
    #[must_use]
    pub fn configuration(&self) -> ProfilingConfiguration {
        match (self.tool, self.mode) {
            (None, _) => default_configuration(self.native),
            (Some(ToolArg::Art), ModeArg::Sampled) => ProfilingConfiguration::sampled_java(),
            (Some(ToolArg::Art), ModeArg::Instrumented) => ProfilingConfiguration::instrumented_java(),
            (Some(ToolArg::Simpleperf), _) => ProfilingConfiguration::sampled_native(),
            (Some(ToolArg::Atrace), _) => ProfilingConfiguration::system_trace(),
        }
    }

    #[must_use]
    pub fn stage_options(&self) -> StageOptions {
        StageOptions {
            max_trace_size: self.max_trace_mb.saturating_mul(1024 * 1024),
            long_trace_policy: if self.parse_oversized {
                LongTracePolicy::Accept
            } else {
                LongTracePolicy::Reject
            },
            prefer_native: self.native,
            ..StageOptions::default()
        }
    }
}
