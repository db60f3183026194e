//! Command-line interface: arguments and terminal reports

pub mod args;
pub mod report;

pub use args::Args;
pub use report::{render_capture_summary, render_details};
