//! Options controlling the offload pass.

/// Pass configuration, filled in by the driver from its command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassOptions {
    /// Accelerator code generation was requested; gates the whole pass.
    pub offload_requested: bool,
    /// Parallel-algorithm offloading: scan every definition for offload
    /// candidates and give universal clones program-wide linkage.
    pub parallel_offload: bool,
    /// Report each function rejected by the candidate scan.
    pub verbose: bool,
    /// Warn when a function cannot be cloned.
    pub warn_offload: bool,
}

impl Default for PassOptions {
    fn default() -> Self {
        Self {
            offload_requested: false,
            parallel_offload: false,
            verbose: false,
            warn_offload: true,
        }
    }
}

impl PassOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offload_requested(mut self, on: bool) -> Self {
        self.offload_requested = on;
        self
    }

    pub fn parallel_offload(mut self, on: bool) -> Self {
        self.parallel_offload = on;
        self
    }

    pub fn verbose(mut self, on: bool) -> Self {
        self.verbose = on;
        self
    }

    pub fn warn_offload(mut self, on: bool) -> Self {
        self.warn_offload = on;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_only_warn() {
        let opts = PassOptions::default();
        assert!(!opts.offload_requested);
        assert!(!opts.parallel_offload);
        assert!(!opts.verbose);
        assert!(opts.warn_offload);
    }

    #[test]
    fn builder_sets_flags() {
        let opts = PassOptions::new()
            .offload_requested(true)
            .parallel_offload(true)
            .verbose(true)
            .warn_offload(false);
        assert!(opts.offload_requested && opts.parallel_offload && opts.verbose);
        assert!(!opts.warn_offload);
    }
}
