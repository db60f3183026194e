//! # tracedeck - CPU Profiling Session Controller
//!
//! tracedeck drives a device-side CPU recording through its start / stop /
//! parse lifecycle, decodes each trace at most once, and derives call-chart,
//! top-down and bottom-up views of the decoded call tree under either the
//! wall clock or the thread clock.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    UI / CLI (main context)                       │
//! │      accessors · mutators · on_change(StageAspect, listener)     │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  CpuProfilerStage (stage)                        │
//! │  state machine · metadata · timeline ranges · configurations     │
//! │                                                                  │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐          │
//! │  │ MainExecutor │   │ CaptureParser│   │ CaptureModel │          │
//! │  │  (executor)  │   │   (capture)  │   │ details+clock│          │
//! │  └──────┬───────┘   └──────┬───────┘   └──────┬───────┘          │
//! └─────────┼──────────────────┼──────────────────┼──────────────────┘
//!           │ pooled work      │ decode           │ aggregations
//!           ▼                  ▼                  ▼
//! ┌──────────────────┐ ┌──────────────────┐ ┌──────────────────┐
//! │ RecordingService │ │ tokio blocking   │ │ analysis         │
//! │ (recording)      │ │ pool             │ │ top-down/bottom-up│
//! └──────────────────┘ └──────────────────┘ └──────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`stage`]: the session controller, its configuration, metadata and timeline
//! - [`capture`]: call-tree types, the trace decoder and the single-flight cache
//! - [`capture_model`]: details builder and selection binding
//! - [`analysis`]: top-down and bottom-up aggregations
//! - [`clock`]: clock types and selection re-projection
//! - [`executor`]: main-context job queue fed by the tokio pool
//! - [`recording`]: recording service trait, simulated device and file replay
//! - [`model`]: observable ranges and per-aspect notification
//! - [`domain`]: ID newtypes and error types
//! - [`cli`]: command-line arguments and terminal reports
//!
//! ## Typical Usage
//!
//! ```bash
//! # Record 500 ms on the simulated device and print the bottom-up view
//! ./tracedeck
//!
//! # Inspect a trace file in the thread clock
//! ./tracedeck --replay trace.json --tool art --details top-down --clock thread
//! ```
//!
//! ## Key Concepts
//!
//! - **Trace**: raw bytes produced by one recording
//! - **Capture**: decoded, immutable call trees of one trace
//! - **Details**: the view derived from (capture, thread, kind, clock)
//! - **Single-flight**: concurrent requests for one trace share one parse

pub mod analysis;
pub mod capture;
pub mod capture_model;
pub mod cli;
pub mod clock;
pub mod domain;
pub mod executor;
pub mod model;
pub mod recording;
pub mod stage;
