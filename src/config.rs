//! Conversion options and output target selection
//!
//! Holds everything the CLI hands to the conversion core: the ordered input
//! file list, the destination, the resolved output target and the policy
//! flags (repair, padding, bank retention, quiet).
//!
//! This program is unlicensed and dedicated to the public domain.
//! Developed by Tommy Olsen.

use std::path::PathBuf;

use crate::cartridge::{self, CARTRIDGE_MAX_BASIC};

/// Application version
pub const VERSION: &str = "3.5";

/// Output target of a conversion.
///
/// `Cart` covers both real hardware types and the generic pseudo-targets
/// (`normal` is hardware id 0, `ulti` is id 0 with the ultimax flag).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Plain binary output (CRT input only).
    Bin,
    /// Binary output with a 2-byte little-endian load address prefix.
    Prg,
    /// CRT output for the given hardware id.
    Cart { id: i32, ultimax: bool },
}

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub input_files: Vec<PathBuf>,
    pub output_file: PathBuf,
    /// `None` means no `-t` was given: CRT input falls back to binary output.
    pub target: Option<Target>,
    pub cart_name: Option<String>,
    /// 0 means "take the load address from the first chip package".
    pub load_address: u16,
    pub subtype: u8,
    pub repair_mode: bool,
    pub accept_padded: bool,
    /// When false (`-b`), empty EasyFlash half-banks are written out too.
    pub omit_empty_banks: bool,
    pub quiet: bool,
}

impl ConvertOptions {
    pub fn new(input_files: Vec<PathBuf>, output_file: PathBuf) -> Self {
        Self {
            input_files,
            output_file,
            target: None,
            cart_name: None,
            load_address: 0,
            subtype: 0,
            repair_mode: false,
            accept_padded: false,
            omit_empty_banks: true,
            quiet: false,
        }
    }
}

/// Resolve a `-t` token to a target.
///
/// Hardware option tokens match case-insensitively; the four pseudo-targets
/// (`bin`, `prg`, `normal`, `ulti`) match exactly. MAX Basic is saved through
/// the generic encoder in ultimax mode.
pub fn resolve_target(token: &str) -> Option<Target> {
    if let Some(id) = cartridge::cart_type_from_option(token) {
        return Some(Target::Cart {
            id,
            ultimax: id == CARTRIDGE_MAX_BASIC,
        });
    }
    match token {
        "bin" => Some(Target::Bin),
        "prg" => Some(Target::Prg),
        "normal" => Some(Target::Cart {
            id: 0,
            ultimax: false,
        }),
        "ulti" => Some(Target::Cart {
            id: 0,
            ultimax: true,
        }),
        _ => None,
    }
}
