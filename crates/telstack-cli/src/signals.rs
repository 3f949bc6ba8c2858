//! Deferral of termination signals while the stack is changing.
//!
//! An interrupted teardown can leave modules half removed, so lifecycle
//! commands hold termination signals until the orchestrator returns.

use std::io;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::warn;

use crate::CLI_TARGET;

const DEFERRED: [i32; 4] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP];

pub(crate) struct SignalDeferral {
    signals: Signals,
}

impl SignalDeferral {
    pub(crate) fn install() -> io::Result<Self> {
        Ok(Self {
            signals: Signals::new(DEFERRED)?,
        })
    }

    /// Stops collecting and returns the signals received meanwhile.
    pub(crate) fn finish(mut self) -> Vec<i32> {
        let received: Vec<i32> = self.signals.pending().collect();
        self.signals.handle().close();
        for signal in &received {
            warn!(
                target: CLI_TARGET,
                signal,
                "termination signal deferred until the invocation finished"
            );
        }
        received
    }
}
