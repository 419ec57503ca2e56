//! Error types for the frame core
//!
//! Three layers:
//! - [`GpuError`] is what a [`DrawableProvider`](crate::surface::DrawableProvider) returns.
//! - [`InitializationError`] is returned by renderer construction.
//! - [`RendererError`] is delivered to the host's [`ErrorReporter`] while the renderer runs.

use std::time::Duration;

use thiserror::Error;

use crate::surface::SurfaceSize;

/// Errors reported by a drawable provider (device, queue, or surface).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GpuError {
    /// No drawable became available within the allotted wait
    #[error("timed out waiting for the GPU")]
    Timeout,
    /// The surface no longer matches the drawable and must be reconfigured
    #[error("surface is outdated")]
    Outdated,
    /// Allocation of a GPU resource failed
    #[error("out of GPU memory: {0}")]
    OutOfMemory(String),
    /// The device became unusable (driver reset, external reclaim)
    #[error("device lost: {0}")]
    DeviceLost(String),
    /// Any other backend failure
    #[error("GPU error: {0}")]
    Other(String),
}

/// Renderer construction failed; no partial renderer is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InitializationError {
    #[error("no compatible GPU device: {0}")]
    NoCompatibleDevice(String),

    #[error("invalid drawable size {width}x{height}")]
    InvalidSurfaceSize { width: u32, height: u32 },

    #[error("failed to allocate initial surface resources: {0}")]
    ResourceAllocation(String),
}

/// Errors raised while the renderer is running.
///
/// Only fatal errors and allocation warnings reach the [`ErrorReporter`];
/// [`RendererError::DrawableTimeout`] is recovered locally by dropping the frame.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RendererError {
    #[error("drawable acquisition exceeded {waited:?}")]
    DrawableTimeout { waited: Duration },

    #[error("GPU device lost: {0}")]
    DeviceLost(String),

    #[error(
        "failed to reallocate surface resources for {size} ({reason}), attempt {consecutive_failures}"
    )]
    ResourceAllocation {
        size: SurfaceSize,
        reason: String,
        consecutive_failures: u32,
    },

    #[error("giving up on surface resources for {size} after {attempts} consecutive failures")]
    ResourceAllocationExhausted { size: SurfaceSize, attempts: u32 },
}

impl RendererError {
    /// Whether this error ends the renderer instance.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DeviceLost(_) | Self::ResourceAllocationExhausted { .. }
        )
    }
}

/// Channel through which the renderer surfaces errors to its host.
///
/// Chosen once at construction. Fatal errors are reported exactly once, at the
/// point of detection.
pub trait ErrorReporter: Send {
    fn report(&mut self, error: &RendererError);
}

impl<F> ErrorReporter for F
where
    F: FnMut(&RendererError) + Send,
{
    fn report(&mut self, error: &RendererError) {
        (self)(error)
    }
}

/// Default reporter: forwards everything to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&mut self, error: &RendererError) {
        if error.is_fatal() {
            tracing::error!("Renderer error: {}", error);
        } else {
            tracing::warn!("Renderer warning: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(RendererError::DeviceLost("reset".into()).is_fatal());
        assert!(
            RendererError::ResourceAllocationExhausted {
                size: SurfaceSize::new(8, 8),
                attempts: 3,
            }
            .is_fatal()
        );
        assert!(
            !RendererError::ResourceAllocation {
                size: SurfaceSize::new(8, 8),
                reason: "oom".into(),
                consecutive_failures: 1,
            }
            .is_fatal()
        );
        assert!(
            !RendererError::DrawableTimeout {
                waited: Duration::from_millis(16),
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_display_messages() {
        let err = RendererError::ResourceAllocation {
            size: SurfaceSize::new(800, 600),
            reason: "out of GPU memory: depth".into(),
            consecutive_failures: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("800x600"));
        assert!(msg.contains("attempt 2"));

        let init = InitializationError::InvalidSurfaceSize {
            width: 0,
            height: 300,
        };
        assert_eq!(init.to_string(), "invalid drawable size 0x300");

        assert_eq!(
            GpuError::DeviceLost("driver reset".into()).to_string(),
            "device lost: driver reset"
        );
    }

    #[test]
    fn test_closure_reporter_receives_errors() {
        let mut seen = Vec::new();
        {
            let mut reporter = |e: &RendererError| seen.push(e.clone());
            reporter.report(&RendererError::DeviceLost("gone".into()));
        }
        assert_eq!(seen, vec![RendererError::DeviceLost("gone".into())]);
    }
}
