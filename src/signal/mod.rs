//! Interrupt handling (SIGINT/SIGTERM)
//!
//! Signals only set a flag; the pipeline checks it between stages and
//! returns, so the backup and staging guards always run. Repeated signals
//! are acknowledged but never terminate the process directly.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Signal handler state
#[derive(Debug, Default)]
pub struct SignalState {
    /// First signal received
    interrupt_requested: AtomicBool,
    /// Signals received so far
    signal_count: AtomicU8,
}

impl SignalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if an interrupt has been requested
    pub fn is_interrupted(&self) -> bool {
        self.interrupt_requested.load(Ordering::SeqCst)
    }

    pub fn signal_count(&self) -> u8 {
        self.signal_count.load(Ordering::SeqCst)
    }

    /// Record a signal and decide what to do about it
    pub fn handle_signal(&self) -> SignalAction {
        let count = self.signal_count.fetch_add(1, Ordering::SeqCst);

        self.interrupt_requested.store(true, Ordering::SeqCst);
        match count {
            0 => SignalAction::Interrupt,
            1 => SignalAction::Remind,
            _ => SignalAction::Ignore,
        }
    }
}

/// Action to take after receiving a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First signal: stop after the current stage
    Interrupt,
    /// Second signal: tell the user cleanup is still running
    Remind,
    /// Third+ signal: ignore
    Ignore,
}

/// Shared view of the interrupt state, cheap to clone
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag {
    state: Arc<SignalState>,
}

impl InterruptFlag {
    /// A flag no signal handler is attached to
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the process signal handler feeding this flag.
    ///
    /// Must be called once at program startup.
    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let state = Arc::clone(&self.state);
        ctrlc::set_handler(move || match state.handle_signal() {
            SignalAction::Interrupt => {
                eprintln!("\nReceived interrupt signal, stopping after the current step...");
            }
            SignalAction::Remind => {
                eprintln!("\nStill stopping, restoring project files before exit...");
            }
            SignalAction::Ignore => {}
        })
    }

    pub fn is_interrupted(&self) -> bool {
        self.state.is_interrupted()
    }

    /// Simulate a signal
    pub fn trigger(&self) -> SignalAction {
        self.state.handle_signal()
    }
}
