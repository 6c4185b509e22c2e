//! CRT container writer primitives
//!
//! Emits the 64-byte file header and 16-byte CHIP packages used by every
//! encoder. The writer owns the destination file; `discard` removes a
//! partially written container so a failed conversion never leaves a
//! corrupt file on disk.
//!
//! This program is unlicensed and dedicated to the public domain.
//! Developed by Tommy Olsen.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::ConvertError;
use crate::load_input::{CRT_SIGNATURE, ConversionContext};

/// Placeholder cartridge name when none is given.
pub const DEFAULT_CART_NAME: &str = "VICE CART";

pub struct CrtWriter {
    file: File,
    path: PathBuf,
}

impl CrtWriter {
    /// Open (and truncate) the destination container.
    pub fn create(path: &Path) -> Result<Self, ConvertError> {
        let file = File::create(path).map_err(|e| ConvertError::open(path, e))?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Write the 64-byte container header.
    ///
    /// The version minor is 1 when a hardware subtype is present. The
    /// cartridge name is upper-cased and NUL-padded/truncated to 32 bytes.
    pub fn write_header(
        &mut self,
        cart_type: i32,
        subtype: u8,
        name: Option<&str>,
        game: u8,
        exrom: u8,
    ) -> Result<(), ConvertError> {
        let mut header = [0u8; 0x40];
        header[..0x10].copy_from_slice(CRT_SIGNATURE);
        header[0x10..0x14].copy_from_slice(&0x40u32.to_be_bytes());

        header[0x14] = 1;
        header[0x15] = if subtype > 0 { 1 } else { 0 };

        header[0x16] = 0;
        header[0x17] = cart_type as u8;

        header[0x18] = exrom;
        header[0x19] = game;
        header[0x1a] = subtype;

        let name = name.unwrap_or(DEFAULT_CART_NAME).to_ascii_uppercase();
        let bytes = name.as_bytes();
        let len = bytes.len().min(32);
        header[0x20..0x20 + len].copy_from_slice(&bytes[..len]);

        self.file
            .write_all(&header)
            .map_err(|e| ConvertError::write(&self.path, e))
    }

    /// Write one chip package: 16-byte header plus `length` bytes taken from
    /// the flat image at the context's read cursor, advancing the cursor.
    pub fn write_chip(
        &mut self,
        ctx: &mut ConversionContext,
        length: u32,
        bank: u32,
        address: u32,
        chip_type: u8,
    ) -> Result<(), ConvertError> {
        let mut chip = [0u8; 0x10];
        chip[..4].copy_from_slice(b"CHIP");
        chip[4..8].copy_from_slice(&(length + 0x10).to_be_bytes());
        chip[8] = 0;
        chip[9] = chip_type;
        chip[0xa..0xc].copy_from_slice(&(bank as u16).to_be_bytes());
        chip[0xc..0xe].copy_from_slice(&(address as u16).to_be_bytes());
        chip[0xe..0x10].copy_from_slice(&(length as u16).to_be_bytes());

        self.file
            .write_all(&chip)
            .map_err(|e| ConvertError::write(&self.path, e))?;

        let start = ctx.offset;
        let end = start + length as usize;
        self.file
            .write_all(&ctx.image[start..end])
            .map_err(|e| ConvertError::write(&self.path, e))?;
        ctx.offset = end;
        Ok(())
    }

    /// Close the finished container.
    pub fn finish(self) -> Result<(), ConvertError> {
        // drop closes the file
        Ok(())
    }

    /// Close and delete a partially written container.
    pub fn discard(self) {
        let path = self.path.clone();
        drop(self);
        let _ = std::fs::remove_file(path);
    }
}
