//! Protocol/Service Multiplexer (PSM) handling for L2CAP
//!
//! [`PsmRegistry`] binds PSMs to the handler set of the service owning them;
//! [`PsmAllocator`] hands out unused dynamic PSMs from the classic, LE and
//! classic virtual spaces.

use std::collections::HashMap;

use super::constants::*;
use super::types::{ConnectionType, L2capError, L2capResult};

/// PSM to handler bookkeeping for one transport.
///
/// A PSM may be reserved without a handler; binding a handler to a PSM that
/// already has one is a programming error.
#[derive(Debug)]
pub struct PsmRegistry<H> {
    entries: HashMap<u16, Option<H>>,
}

impl<H> Default for PsmRegistry<H> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<H> PsmRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_registered(&self, psm: u16) -> bool {
        self.entries.contains_key(&psm)
    }

    /// Registered and bound to a handler
    pub fn has_handler(&self, psm: u16) -> bool {
        matches!(self.entries.get(&psm), Some(Some(_)))
    }

    /// Bind `handler` to `psm`, or reserve it when `handler` is `None`.
    ///
    /// # Panics
    ///
    /// Panics if a handler is already bound to `psm`.
    pub fn register(&mut self, psm: u16, handler: Option<H>) {
        assert!(
            !self.has_handler(psm),
            "psm 0x{:04x} already has a registered handler",
            psm
        );
        self.entries.insert(psm, handler);
    }

    /// Reserve `psm` without binding a handler
    pub fn reserve(&mut self, psm: u16) {
        self.register(psm, None);
    }

    /// # Panics
    ///
    /// Panics if `psm` is not registered.
    pub fn unregister(&mut self, psm: u16) {
        assert!(
            self.entries.remove(&psm).is_some(),
            "psm 0x{:04x} is not registered",
            psm
        );
    }

    /// Handler set bound to `psm`.
    ///
    /// # Panics
    ///
    /// Panics if no handler is bound to `psm`.
    pub fn handlers(&self, psm: u16) -> &H {
        match self.get(psm) {
            Some(handler) => handler,
            None => panic!("psm 0x{:04x} has no registered handler", psm),
        }
    }

    /// Handler set bound to `psm`, if any
    pub fn get(&self, psm: u16) -> Option<&H> {
        self.entries.get(&psm).and_then(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Number of candidates in each dynamic space; a search visiting this many
/// occupied candidates has cycled through the whole space.
const CLASSIC_DYNAMIC_SPAN: usize =
    ((CLASSIC_DYNAMIC_PSM_MAX - CLASSIC_DYNAMIC_PSM_MIN) / 2 + 1) as usize;
const CLASSIC_VIRTUAL_SPAN: usize =
    ((CLASSIC_VIRTUAL_PSM_MAX - CLASSIC_VIRTUAL_PSM_MIN) / 2 + 1) as usize;
const LE_DYNAMIC_SPAN: usize = (LE_DYNAMIC_PSM_MAX - LE_DYNAMIC_PSM_MIN + 1) as usize;

/// Dynamic PSM allocation cursors.
///
/// Allocation only searches; it does not reserve. Callers register the value
/// they get back before allocating again.
#[derive(Debug, Clone)]
pub struct PsmAllocator {
    classic_dynamic: u16,
    le_dynamic: u16,
    classic_virtual: u16,
}

impl Default for PsmAllocator {
    fn default() -> Self {
        Self {
            classic_dynamic: CLASSIC_DYNAMIC_PSM_MIN,
            le_dynamic: LE_DYNAMIC_PSM_MIN,
            classic_virtual: CLASSIC_VIRTUAL_PSM_MIN,
        }
    }
}

impl PsmAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next classic dynamic PSM not registered in `classic`.
    ///
    /// Steps by 2, keeps the high byte even and skips the vendor reserved
    /// range, wrapping back to the floor past the ceiling.
    pub fn next_classic_dynamic<H>(&mut self, classic: &PsmRegistry<H>) -> L2capResult<u16> {
        let mut visited = 0;
        while classic.is_registered(self.classic_dynamic) {
            if visited == CLASSIC_DYNAMIC_SPAN {
                return Err(L2capError::PsmSpaceExhausted(ConnectionType::Classic));
            }
            visited += 1;

            let mut candidate = self.classic_dynamic + 2;
            if candidate > CLASSIC_DYNAMIC_PSM_MAX {
                candidate = CLASSIC_DYNAMIC_PSM_MIN;
            } else {
                candidate = even_high_byte(candidate);
            }

            if (RESERVED_PSM_START..=RESERVED_PSM_END).contains(&candidate) {
                candidate = even_high_byte(RESERVED_PSM_END + 2);
            }
            self.classic_dynamic = candidate;
        }
        Ok(self.classic_dynamic)
    }

    /// Next LE dynamic PSM not registered in `le`
    pub fn next_le_dynamic<H>(&mut self, le: &PsmRegistry<H>) -> L2capResult<u16> {
        let mut visited = 0;
        while le.is_registered(self.le_dynamic) {
            if visited == LE_DYNAMIC_SPAN {
                return Err(L2capError::PsmSpaceExhausted(ConnectionType::LE));
            }
            visited += 1;

            self.le_dynamic += 1;
            if self.le_dynamic > LE_DYNAMIC_PSM_MAX {
                self.le_dynamic = LE_DYNAMIC_PSM_MIN;
            }
        }
        Ok(self.le_dynamic)
    }

    /// Virtual PSM standing in for `real_psm` on an outgoing-only connection.
    ///
    /// Fixed PSMs are never virtualised and come back unchanged.
    pub fn next_virtual<H>(&mut self, real_psm: u16, classic: &PsmRegistry<H>) -> L2capResult<u16> {
        if real_psm < CLASSIC_DYNAMIC_PSM_MIN {
            return Ok(real_psm);
        }

        let mut visited = 0;
        while classic.is_registered(self.classic_virtual) {
            if visited == CLASSIC_VIRTUAL_SPAN {
                return Err(L2capError::PsmSpaceExhausted(ConnectionType::Classic));
            }
            visited += 1;

            self.classic_virtual += 2;
            // The ceiling itself is a valid virtual PSM
            if self.classic_virtual > CLASSIC_VIRTUAL_PSM_MAX {
                self.classic_virtual = CLASSIC_VIRTUAL_PSM_MIN;
            }
        }
        Ok(self.classic_virtual)
    }
}

/// The most significant PSM octet must be even
fn even_high_byte(psm: u16) -> u16 {
    if psm & 0x0100 != 0 {
        psm + 0x0100
    } else {
        psm
    }
}
