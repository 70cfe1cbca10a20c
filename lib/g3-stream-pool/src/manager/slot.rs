/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 G3-OSS developers.
 */

use std::net::SocketAddr;

use crate::attempt::LoadState;
use crate::session::StreamCloseReason;
use crate::types::AddressFamily;

use super::AttemptHandle;

/// Groups at most one IPv4 and one IPv6 attempt into a single unit that
/// counts as one entry against pool limits. Keeps a slow address family
/// from starving the fast one while still bounding concurrency.
pub(crate) struct TcpBasedAttemptSlot {
    ipv4_attempt: Option<AttemptHandle>,
    ipv6_attempt: Option<AttemptHandle>,
    // false if either contained attempt is present and not slow
    is_slow: bool,
}

impl TcpBasedAttemptSlot {
    pub(crate) fn new() -> Self {
        TcpBasedAttemptSlot {
            ipv4_attempt: None,
            ipv6_attempt: None,
            is_slow: false,
        }
    }

    fn side(&self, family: AddressFamily) -> &Option<AttemptHandle> {
        match family {
            AddressFamily::Ipv4 => &self.ipv4_attempt,
            AddressFamily::Ipv6 => &self.ipv6_attempt,
        }
    }

    pub(crate) fn family_occupied(&self, family: AddressFamily) -> bool {
        self.side(family).is_some()
    }

    /// The slot must not already hold an attempt of the same family.
    pub(crate) fn allocate_attempt(&mut self, attempt: AttemptHandle) {
        let side = match attempt.family() {
            AddressFamily::Ipv4 => &mut self.ipv4_attempt,
            AddressFamily::Ipv6 => &mut self.ipv6_attempt,
        };
        debug_assert!(side.is_none());
        *side = Some(attempt);
        self.update_is_slow();
    }

    /// Transfers ownership of the matching attempt to the caller. The
    /// slot may become empty; empty slots must be removed right away.
    pub(crate) fn take_attempt(&mut self, id: u64) -> Option<AttemptHandle> {
        let taken = if self.ipv4_attempt.as_ref().is_some_and(|a| a.id() == id) {
            self.ipv4_attempt.take()
        } else if self.ipv6_attempt.as_ref().is_some_and(|a| a.id() == id) {
            self.ipv6_attempt.take()
        } else {
            None
        };
        if taken.is_some() {
            self.update_is_slow();
        }
        taken
    }

    pub(crate) fn empty(&self) -> bool {
        self.ipv4_attempt.is_none() && self.ipv6_attempt.is_none()
    }

    pub(crate) fn attempt_count(&self) -> usize {
        self.ipv4_attempt.is_some() as usize + self.ipv6_attempt.is_some() as usize
    }

    pub(crate) fn has_ip_endpoint(&self, addr: &SocketAddr) -> bool {
        self.iter().any(|a| a.ip_endpoint() == *addr)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &AttemptHandle> {
        self.ipv4_attempt.iter().chain(self.ipv6_attempt.iter())
    }

    pub(crate) fn into_attempts(self) -> impl Iterator<Item = AttemptHandle> {
        self.ipv4_attempt.into_iter().chain(self.ipv6_attempt)
    }

    /// The most advanced load state of the contained attempts.
    pub(crate) fn load_state(&self) -> LoadState {
        self.iter()
            .map(|a| a.load_state())
            .max()
            .unwrap_or(LoadState::Idle)
    }

    pub(crate) fn is_slow(&self) -> bool {
        self.is_slow
    }

    pub(crate) fn update_is_slow(&mut self) {
        self.is_slow = !self.empty() && self.iter().all(|a| a.is_slow());
    }

    pub(crate) fn set_cancel_reason(&self, reason: StreamCloseReason) {
        for attempt in self.iter() {
            attempt.set_cancel_reason(reason);
        }
    }
}
