//! Model-size reporting.

use mf_core::{ParameterCount, ParameterReporter};

/// Writes one `log::info!` line per constructed model.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ParameterReporter for LogReporter {
    fn report(&self, model: &str, count: ParameterCount) {
        log::info!(
            "{model} has {:.1} M parameters ({:.1} M trainable) with an estimated size of {:.1} MB",
            count.total as f64 / 1.0e6,
            count.trainable as f64 / 1.0e6,
            count.size_bytes_f32() as f64 / 1.0e6,
        );
    }
}

/// Discards reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl ParameterReporter for NullReporter {
    fn report(&self, _model: &str, _count: ParameterCount) {}
}
