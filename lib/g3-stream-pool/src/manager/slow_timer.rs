/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 G3-OSS developers.
 */

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

struct TimerState {
    // None while paused
    deadline: Option<Instant>,
    fired: bool,
}

/// One-shot timer marking an attempt as slow. Paused while a TLS
/// attempt waits for crypto metadata so resolver latency is not counted
/// as transport slowness; resuming re-arms the full delay.
pub(crate) struct SlowTimer {
    delay: Duration,
    state: Mutex<TimerState>,
    notify: Notify,
}

impl SlowTimer {
    pub(crate) fn new(delay: Duration) -> Self {
        SlowTimer {
            delay,
            state: Mutex::new(TimerState {
                deadline: Some(Instant::now() + delay),
                fired: false,
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn pause(&self) {
        let mut state = self.lock();
        if !state.fired {
            state.deadline = None;
        }
        drop(state);
        self.notify.notify_one();
    }

    pub(crate) fn resume(&self) {
        let mut state = self.lock();
        if !state.fired && state.deadline.is_none() {
            state.deadline = Some(Instant::now() + self.delay);
        }
        drop(state);
        self.notify.notify_one();
    }

    pub(crate) fn is_fired(&self) -> bool {
        self.lock().fired
    }

    /// Resolves once the armed delay elapses. Never resolves while
    /// paused. Intended for a single waiter.
    pub(crate) async fn fired(&self) {
        loop {
            let notified = self.notify.notified();
            let deadline = {
                let state = self.lock();
                if state.fired {
                    return;
                }
                state.deadline
            };
            match deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline) => {
                            let mut state = self.lock();
                            if state.deadline == Some(deadline) {
                                state.fired = true;
                                return;
                            }
                            // re-armed or paused while sleeping
                        }
                        _ = notified => {}
                    }
                }
                None => notified.await,
            }
        }
    }
}
