// Copyright (C) Microsoft Corporation. All rights reserved.

//! The device handle serializing access to the shared accelerator.

use parking_lot::Mutex;
use rsa_padding::DigestKind;

use crate::hw::PkaHardware;

/// Handle to one accelerator instance.
///
/// All engine entry points hang off this type. The mutex serializes the
/// hardware; it is taken per raw-primitive call and never held across
/// padding or marshalling work, keeping the critical section as short as
/// the hardware allows.
pub struct Device<H> {
    pub(crate) hw: Mutex<H>,
}

impl<H: PkaHardware> Device<H> {
    /// Wraps a hardware instance into a device handle.
    pub fn new(hw: H) -> Self {
        Self { hw: Mutex::new(hw) }
    }

    /// Releases the handle and returns the hardware.
    pub fn into_inner(self) -> H {
        self.hw.into_inner()
    }

    /// RNG closure for the padding/marshalling layers. Locks per call, like
    /// every other raw-primitive access.
    pub(crate) fn hw_rng(&self) -> impl FnMut(&mut [u8]) -> Result<(), ()> + '_ {
        move |buf: &mut [u8]| self.hw.lock().fill_random(buf).map_err(|_| ())
    }

    /// Hash closure for the padding layers. Locks per call.
    pub(crate) fn hw_hash(&self, kind: DigestKind) -> impl FnMut(&[u8]) -> Vec<u8> + '_ {
        move |data: &[u8]| self.hw.lock().digest(kind, data)
    }
}
