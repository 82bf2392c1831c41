//! Simulated SPI flash memory
//!
//! The console reads controller identity and stick calibration from the
//! controller's SPI flash. This module keeps a read-only 512 KiB image in
//! memory: either a blank default image with factory calibration, or a dump
//! taken from a real controller.

use log::{debug, info};
use std::path::Path;

use crate::protocol::constants::*;
use crate::protocol::error::ProtocolError;

/// Read-only flash image
#[derive(Debug, Clone)]
pub struct FlashMemory {
    data: Vec<u8>,
}

impl FlashMemory {
    /// Create the default image: blank except for the factory stick calibration
    pub fn new() -> Self {
        let mut data = vec![FLASH_BLANK_BYTE; FLASH_SIZE];
        data[FACTORY_LEFT_STICK_CALIBRATION_OFFSET..FACTORY_LEFT_STICK_CALIBRATION_OFFSET + STICK_CALIBRATION_LEN]
            .copy_from_slice(&FACTORY_LEFT_STICK_CALIBRATION);
        data[FACTORY_RIGHT_STICK_CALIBRATION_OFFSET..FACTORY_RIGHT_STICK_CALIBRATION_OFFSET + STICK_CALIBRATION_LEN]
            .copy_from_slice(&FACTORY_RIGHT_STICK_CALIBRATION);
        Self { data }
    }

    /// Use an externally supplied image (e.g. a dump of a real controller)
    pub fn from_image(data: Vec<u8>) -> Result<Self, ProtocolError> {
        if data.len() != FLASH_SIZE {
            return Err(ProtocolError::SizeMismatch {
                expected: FLASH_SIZE,
                actual: data.len(),
            });
        }
        Ok(Self { data })
    }

    /// Load an image dump from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ProtocolError> {
        let path_ref = path.as_ref();
        info!("Loading SPI flash image from: {}", path_ref.display());
        let data = std::fs::read(path_ref)?;
        Self::from_image(data)
    }

    /// Read `length` bytes starting at `offset`
    pub fn read(&self, offset: usize, length: usize) -> Result<&[u8], ProtocolError> {
        let end = offset.checked_add(length).filter(|end| *end <= self.data.len());
        match end {
            Some(end) => Ok(&self.data[offset..end]),
            None => Err(ProtocolError::RangeError {
                offset,
                length,
                limit: self.data.len(),
            }),
        }
    }

    pub fn factory_left_stick_calibration(&self) -> [u8; STICK_CALIBRATION_LEN] {
        self.block(FACTORY_LEFT_STICK_CALIBRATION_OFFSET)
    }

    pub fn factory_right_stick_calibration(&self) -> [u8; STICK_CALIBRATION_LEN] {
        self.block(FACTORY_RIGHT_STICK_CALIBRATION_OFFSET)
    }

    /// User calibration of the left stick, if the magic marker is present
    pub fn user_left_stick_calibration(&self) -> Option<[u8; STICK_CALIBRATION_LEN]> {
        self.has_user_calibration(USER_LEFT_STICK_MAGIC_OFFSET)
            .then(|| self.block(USER_LEFT_STICK_CALIBRATION_OFFSET))
    }

    /// User calibration of the right stick, if the magic marker is present
    pub fn user_right_stick_calibration(&self) -> Option<[u8; STICK_CALIBRATION_LEN]> {
        self.has_user_calibration(USER_RIGHT_STICK_MAGIC_OFFSET)
            .then(|| self.block(USER_RIGHT_STICK_CALIBRATION_OFFSET))
    }

    /// Effective left stick calibration: user block over factory block
    pub fn left_stick_calibration(&self) -> [u8; STICK_CALIBRATION_LEN] {
        match self.user_left_stick_calibration() {
            Some(user) => {
                debug!("Using user left stick calibration");
                user
            }
            None => self.factory_left_stick_calibration(),
        }
    }

    /// Effective right stick calibration: user block over factory block
    pub fn right_stick_calibration(&self) -> [u8; STICK_CALIBRATION_LEN] {
        match self.user_right_stick_calibration() {
            Some(user) => {
                debug!("Using user right stick calibration");
                user
            }
            None => self.factory_right_stick_calibration(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn has_user_calibration(&self, magic_offset: usize) -> bool {
        self.data[magic_offset..magic_offset + 2] == USER_CALIBRATION_MAGIC
    }

    fn block(&self, offset: usize) -> [u8; STICK_CALIBRATION_LEN] {
        let mut block = [0u8; STICK_CALIBRATION_LEN];
        block.copy_from_slice(&self.data[offset..offset + STICK_CALIBRATION_LEN]);
        block
    }
}

impl Default for FlashMemory {
    fn default() -> Self {
        Self::new()
    }
}
