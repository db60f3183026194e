//! Profiling configurations and stage options.

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracedeck_common::ToolKind;

use crate::capture::DEFAULT_MAX_TRACE_SIZE;

/// How the device collects call stacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfilingMode {
    /// Periodic stack samples
    Sampled,
    /// Every method entry and exit
    Instrumented,
}

impl fmt::Display for ProfilingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfilingMode::Sampled => f.write_str("sampled"),
            ProfilingMode::Instrumented => f.write_str("instrumented"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfilingConfiguration {
    pub name: String,
    pub tool: ToolKind,
    pub mode: ProfilingMode,
    pub sampling_interval_us: u32,
    pub buffer_size_mb: u32,
}

/// Sampling interval used by the built-in sampled configurations
pub const DEFAULT_SAMPLING_INTERVAL_US: u32 = 1000;
/// Recording buffer size used by the built-in configurations
pub const DEFAULT_BUFFER_SIZE_MB: u32 = 8;

impl ProfilingConfiguration {
    #[must_use]
    pub fn new(name: impl Into<String>, tool: ToolKind, mode: ProfilingMode) -> Self {
        Self {
            name: name.into(),
            tool,
            mode,
            sampling_interval_us: DEFAULT_SAMPLING_INTERVAL_US,
            buffer_size_mb: DEFAULT_BUFFER_SIZE_MB,
        }
    }

    #[must_use]
    pub fn sampled_java() -> Self {
        Self::new("Sampled (Java)", ToolKind::Art, ProfilingMode::Sampled)
    }

    #[must_use]
    pub fn instrumented_java() -> Self {
        Self::new("Instrumented (Java)", ToolKind::Art, ProfilingMode::Instrumented)
    }

    #[must_use]
    pub fn sampled_native() -> Self {
        Self::new("Sampled (Native)", ToolKind::Simpleperf, ProfilingMode::Sampled)
    }

    #[must_use]
    pub fn system_trace() -> Self {
        Self::new("System Trace", ToolKind::Atrace, ProfilingMode::Sampled)
    }
}

impl fmt::Display for ProfilingConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.tool, self.mode)
    }
}

/// Built-in configurations, in menu order
#[must_use]
pub fn default_configurations() -> Vec<ProfilingConfiguration> {
    vec![
        ProfilingConfiguration::sampled_java(),
        ProfilingConfiguration::instrumented_java(),
        ProfilingConfiguration::sampled_native(),
        ProfilingConfiguration::system_trace(),
    ]
}

/// Configuration selected when a stage is created
#[must_use]
pub fn default_configuration(prefer_native: bool) -> ProfilingConfiguration {
    if prefer_native {
        ProfilingConfiguration::sampled_native()
    } else {
        ProfilingConfiguration::sampled_java()
    }
}

/// One row of the configuration picker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationEntry {
    Config(ProfilingConfiguration),
    /// "Edit configurations..." row; opens an editor, never selected
    EditConfigurations,
    /// Visual separator, never selected
    Separator,
}

impl From<ProfilingConfiguration> for ConfigurationEntry {
    fn from(config: ProfilingConfiguration) -> Self {
        ConfigurationEntry::Config(config)
    }
}

/// What to do with a trace larger than the parser's limit
pub enum LongTracePolicy {
    /// Never parse it (headless default)
    Reject,
    /// Always parse it
    Accept,
    /// Ask; the callback receives the trace size in bytes
    Ask(Box<dyn Fn(usize) -> bool>),
}

impl LongTracePolicy {
    #[must_use]
    pub fn allows(&self, size: usize) -> bool {
        match self {
            LongTracePolicy::Reject => false,
            LongTracePolicy::Accept => true,
            LongTracePolicy::Ask(prompt) => prompt(size),
        }
    }
}

impl fmt::Debug for LongTracePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LongTracePolicy::Reject => f.write_str("Reject"),
            LongTracePolicy::Accept => f.write_str("Accept"),
            LongTracePolicy::Ask(_) => f.write_str("Ask(..)"),
        }
    }
}

#[derive(Debug)]
pub struct StageOptions {
    /// Size above which traces need the long-trace policy's approval
    pub max_trace_size: usize,
    pub long_trace_policy: LongTracePolicy,
    /// Select the native configuration by default
    pub prefer_native: bool,
    /// Default wait used by `CpuProfilerStage::settle`
    pub pump_timeout: Duration,
}

impl Default for StageOptions {
    fn default() -> Self {
        Self {
            max_trace_size: DEFAULT_MAX_TRACE_SIZE,
            long_trace_policy: LongTracePolicy::Reject,
            prefer_native: false,
            pump_timeout: Duration::from_secs(10),
        }
    }
}
