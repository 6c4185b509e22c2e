//! Input loading and the flat cartridge image
//!
//! Both input forms (raw binary/PRG and CRT container) load into one flat
//! memory image owned by the `ConversionContext`. The image is pre-filled
//! with 0xFF so unpopulated regions read like erased EPROM cells. CRT chip
//! packages are appended in file order; only EasyFlash containers place
//! their chips by bank geometry instead.
//!
//! This program is unlicensed and dedicated to the public domain.
//! Developed by Tommy Olsen.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::cartridge::{
    CARTRIDGE_EASYFLASH, CARTRIDGE_LAST, CARTRIDGE_SIZE_32KB, CARTRIDGE_SIZE_MAX, LEGAL_SIZES,
};
use crate::config::ConvertOptions;
use crate::error::ConvertError;

/// Largest supported cartridge image.
pub const CART_IMAGE_MAX: usize = CARTRIDGE_SIZE_MAX as usize;

/// CRT file signature (16 bytes).
pub const CRT_SIGNATURE: &[u8; 16] = b"C64 CARTRIDGE   ";

/// Erased-EPROM fill value.
pub const ERASED_BYTE: u8 = 0xff;

/* ======================= Conversion context ======================= */

/// All mutable state of one conversion: the flat image plus the metadata of
/// the most recently loaded input file. The image buffer has two spare bytes
/// so a maximum-size image with a load-address prefix still fits.
pub struct ConversionContext {
    pub image: Box<[u8]>,
    /// Logical image size in bytes.
    pub size: usize,
    /// Read cursor: skips a stripped load-address prefix and advances as
    /// chip packages are written out.
    pub offset: usize,
    /// 0 until set from the first chip package or a caller override.
    pub load_address: u16,
    pub is_crt: bool,
    pub is_ultimax: bool,
    /// Hardware id of the last CRT input (0 for raw input).
    pub crt_id: i32,
    /// Raw copy of the last CRT header read.
    pub header: [u8; 0x40],
}

impl ConversionContext {
    pub fn new(load_address: u16) -> Self {
        Self {
            image: vec![ERASED_BYTE; CART_IMAGE_MAX + 2].into_boxed_slice(),
            size: 0,
            offset: 0,
            load_address,
            is_crt: false,
            is_ultimax: false,
            crt_id: 0,
            header: [0; 0x40],
        }
    }

    fn reset_for_load(&mut self) {
        self.image.fill(ERASED_BYTE);
        self.size = 0;
        self.offset = 0;
        self.is_crt = false;
        self.is_ultimax = false;
        self.crt_id = 0;
    }
}

/* ======================= Read helpers ======================= */

fn be16(hi: u8, lo: u8) -> u16 {
    u16::from_be_bytes([hi, lo])
}

/// Read until the buffer is full or EOF; returns the byte count actually
/// read. Short reads keep their partial data, which repair mode relies on.
fn read_full(f: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = f.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

/* ======================= Input loading ======================= */

/// Load one input file into the context, resetting the flat image first.
///
/// CRT containers are recognized by signature, validated and unpacked; any
/// other content is treated as a raw binary and checked against the legal
/// size classes (with load-address prefixes stripped). In repair mode,
/// structural CRT violations degrade to warnings and the partial image is
/// kept.
pub fn load_input_file(
    ctx: &mut ConversionContext,
    path: &Path,
    opts: &ConvertOptions,
) -> Result<(), ConvertError> {
    ctx.reset_for_load();

    let mut f = File::open(path).map_err(|e| ConvertError::open(path, e))?;

    let mut first = [0u8; 16];
    f.read_exact(&mut first)
        .map_err(|e| ConvertError::read(path, e))?;

    if &first == CRT_SIGNATURE {
        load_crt_file(ctx, &mut f, path, opts)
    } else {
        load_raw_file(ctx, &mut f, &first, path, opts)
    }
}

fn load_crt_file(
    ctx: &mut ConversionContext,
    f: &mut File,
    path: &Path,
    opts: &ConvertOptions,
) -> Result<(), ConvertError> {
    ctx.header[..0x10].copy_from_slice(CRT_SIGNATURE);
    f.read_exact(&mut ctx.header[0x10..0x40])
        .map_err(|e| ConvertError::read(path, e))?;

    if ctx.header[0x10..0x14] != [0, 0, 0, 0x40] {
        if opts.repair_mode {
            eprintln!("Warning: illegal header size in {}", path.display());
        } else {
            return Err(ConvertError::MalformedHeader {
                path: path.display().to_string(),
            });
        }
    }

    ctx.is_ultimax = ctx.header[0x18] == 1 && ctx.header[0x19] == 0;

    // 16-bit hardware id; internal test ids are negative, flagged by the
    // sign bit of the low byte
    let mut id = ((ctx.header[0x16] as i32) << 8) + ctx.header[0x17] as i32;
    if ctx.header[0x17] & 0x80 != 0 {
        id -= 0x10000;
    }
    if !(0..=CARTRIDGE_LAST).contains(&id) {
        return Err(ConvertError::UnknownHardwareId(id));
    }

    ctx.is_crt = true;
    ctx.crt_id = id;
    ctx.size = 0;

    let result = if id == CARTRIDGE_EASYFLASH {
        load_easyflash_banks(ctx, f, path)
    } else {
        load_all_banks(ctx, f, path, opts.repair_mode)
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) if opts.repair_mode => {
            eprintln!("Warning: can't load all banks of {} ({})", path.display(), e);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Generic chip-package load loop: packages are concatenated into the flat
/// image in file order, not placed by address.
fn load_all_banks(
    ctx: &mut ConversionContext,
    f: &mut File,
    path: &Path,
    repair: bool,
) -> Result<(), ConvertError> {
    loop {
        let mut chip = [0u8; 16];
        let got = read_full(f, &mut chip).map_err(|e| ConvertError::read(path, e))?;
        if got < 16 {
            // end of stream: fine after at least one package
            if ctx.size == 0 {
                return Err(ConvertError::TruncatedStream {
                    path: path.display().to_string(),
                });
            }
            return Ok(());
        }

        if &chip[..4] != b"CHIP" {
            return Err(ConvertError::BadChipTag {
                path: path.display().to_string(),
            });
        }

        // the image's load address is the one of the first chip package
        if ctx.load_address == 0 {
            ctx.load_address = be16(chip[0xc], chip[0xd]);
        }

        let length = u32::from_be_bytes([chip[4], chip[5], chip[6], chip[7]]);
        let datasize = be16(chip[14], chip[15]) as u32;
        let mut loadsize = datasize;

        if datasize + 0x10 > length {
            if repair {
                eprintln!(
                    "Warning: data size exceeds chunk length. (data:{:04x} chunk:{:04x})",
                    datasize, length
                );
                loadsize = length.saturating_sub(0x10);
            } else {
                return Err(ConvertError::ChunkSizeMismatch {
                    data: datasize,
                    chunk: length,
                });
            }
        }

        let start = ctx.size;
        let end = start + loadsize as usize;
        if end > ctx.image.len() {
            return Err(ConvertError::InvalidSize {
                size: end,
                context: format!("{} (beyond the maximum cartridge size)", path.display()),
            });
        }

        let got = read_full(f, &mut ctx.image[start..end])
            .map_err(|e| ConvertError::read(path, e))?;
        if got < loadsize as usize {
            if repair {
                eprintln!("Warning: unexpected end of file.");
                ctx.size += datasize as usize;
                return Ok(());
            }
            return Err(ConvertError::TruncatedStream {
                path: path.display().to_string(),
            });
        }

        // chunks larger than header + data carry padding; skip it
        if length > datasize + 0x10 {
            let pad = length - (datasize + 0x10);
            eprintln!(
                "Warning: chunk length exceeds data size (data:{:04x} chunk:{:04x}), skipping {:04x} bytes.",
                datasize, length, pad
            );
            f.seek(SeekFrom::Current(pad as i64))
                .map_err(|e| ConvertError::read(path, e))?;
        }

        ctx.size += datasize as usize;
    }
}

/// EasyFlash containers interleave two 8 KiB sub-banks per bank index; each
/// chip is placed at an address computed from its bank number and the high
/// byte of its load address, ignoring the generic chunk-length field.
fn load_easyflash_banks(
    ctx: &mut ConversionContext,
    f: &mut File,
    path: &Path,
) -> Result<(), ConvertError> {
    loop {
        let mut chip = [0u8; 16];
        let got = read_full(f, &mut chip).map_err(|e| ConvertError::read(path, e))?;
        if got < 16 {
            if ctx.size == 0 {
                return Err(ConvertError::TruncatedStream {
                    path: path.display().to_string(),
                });
            }
            return Ok(());
        }
        ctx.size = 0x10_0000;

        if &chip[..4] != b"CHIP" {
            return Err(ConvertError::BadChipTag {
                path: path.display().to_string(),
            });
        }
        if ctx.load_address == 0 {
            ctx.load_address = be16(chip[0xc], chip[0xd]);
        }

        // low half of the 16 KiB window for ROML (0x80xx), high half otherwise
        let pos = chip[0xb] as usize * 0x4000 + if chip[0xc] == 0x80 { 0 } else { 0x2000 };
        let got = read_full(f, &mut ctx.image[pos..pos + 0x2000])
            .map_err(|e| ConvertError::read(path, e))?;
        if got < 0x2000 {
            return Err(ConvertError::TruncatedStream {
                path: path.display().to_string(),
            });
        }
    }
}

fn load_raw_file(
    ctx: &mut ConversionContext,
    f: &mut File,
    first: &[u8; 16],
    path: &Path,
    opts: &ConvertOptions,
) -> Result<(), ConvertError> {
    ctx.image[..16].copy_from_slice(first);
    let rest = read_full(f, &mut ctx.image[16..]).map_err(|e| ConvertError::read(path, e))?;
    ctx.size = 16 + rest;

    let size = ctx.size as u32;
    if LEGAL_SIZES.contains(&size) {
        ctx.offset = 0;
    } else if size > 2 && LEGAL_SIZES.contains(&(size - 2)) {
        // 2-byte PRG load-address prefix
        ctx.size -= 2;
        ctx.offset = 2;
    } else if size == CARTRIDGE_SIZE_32KB + 4 {
        ctx.size -= 4;
        ctx.offset = 4;
    } else if !opts.accept_padded {
        return Err(ConvertError::InvalidSize {
            size: ctx.size,
            context: path.display().to_string(),
        });
    }
    Ok(())
}

/* ======================= Chip directory ======================= */

/// One chip package header as found while walking a container file.
pub struct ChipDirEntry {
    pub offset: u64,
    pub tag: [u8; 4],
    pub chip_type: u16,
    pub bank: u16,
    pub start: u16,
    pub size: u16,
    pub chunk_len: u32,
    /// data size + 0x10 exceeds the chunk length
    pub oversize_data: bool,
    /// chunk length runs past the end of the file
    pub beyond_eof: bool,
}

/// Walk the chip packages of a container without unpacking them, for the
/// info listing. Stops at the first chunk that runs past the end of the
/// file or is too short to step over.
pub fn chip_directory(path: &Path) -> Result<Vec<ChipDirEntry>, ConvertError> {
    let mut f = File::open(path).map_err(|e| ConvertError::open(path, e))?;
    let file_len = f
        .metadata()
        .map_err(|e| ConvertError::read(path, e))?
        .len();

    let mut entries = Vec::new();
    let mut pos = 0x40u64;
    while pos + 16 <= file_len {
        f.seek(SeekFrom::Start(pos))
            .map_err(|e| ConvertError::read(path, e))?;
        let mut b = [0u8; 16];
        if read_full(&mut f, &mut b).map_err(|e| ConvertError::read(path, e))? < 16 {
            break;
        }
        let chunk_len = u32::from_be_bytes([b[4], b[5], b[6], b[7]]);
        let size = be16(b[14], b[15]);
        let entry = ChipDirEntry {
            offset: pos,
            tag: [b[0], b[1], b[2], b[3]],
            chip_type: be16(b[8], b[9]),
            bank: be16(b[10], b[11]),
            start: be16(b[12], b[13]),
            size,
            chunk_len,
            oversize_data: size as u32 + 0x10 > chunk_len,
            beyond_eof: chunk_len as u64 > file_len - pos,
        };
        let stop = entry.beyond_eof || chunk_len < 0x10;
        entries.push(entry);
        if stop {
            break;
        }
        pos += chunk_len as u64;
    }
    Ok(entries)
}


#[cfg(test)]
mod tests {
    use super::testutil::{build_crt, tmp_path, write_tmp};
    use super::*;

    fn opts_for(path: &Path) -> ConvertOptions {
        ConvertOptions::new(vec![path.to_path_buf()], tmp_path("unused-out"))
    }

    #[test]
    fn test_load_raw_8k() {
        let path = write_tmp("raw8k.bin", &vec![0x41; 0x2000]);
        let mut ctx = ConversionContext::new(0);
        load_input_file(&mut ctx, &path, &opts_for(&path)).unwrap();
        assert_eq!(ctx.size, 0x2000);
        assert_eq!(ctx.offset, 0);
        assert!(!ctx.is_crt);
        // sentinel invariant: everything past the logical size reads erased
        assert!(ctx.image[0x2000..].iter().all(|&b| b == ERASED_BYTE));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_load_raw_with_prg_prefix() {
        let mut data = vec![0x00, 0x80];
        data.extend_from_slice(&vec![0x42; 0x2000]);
        let path = write_tmp("raw8k.prg", &data);
        let mut ctx = ConversionContext::new(0);
        load_input_file(&mut ctx, &path, &opts_for(&path)).unwrap();
        assert_eq!(ctx.size, 0x2000);
        assert_eq!(ctx.offset, 2);
        assert_eq!(ctx.image[2], 0x42);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_load_raw_illegal_size() {
        let path = write_tmp("raw-odd.bin", &vec![0; 5000]);
        let mut ctx = ConversionContext::new(0);
        let err = load_input_file(&mut ctx, &path, &opts_for(&path)).unwrap_err();
        assert!(matches!(err, ConvertError::InvalidSize { size: 5000, .. }));

        // the padding-tolerant flag accepts the size as-is
        let mut opts = opts_for(&path);
        opts.accept_padded = true;
        load_input_file(&mut ctx, &path, &opts).unwrap();
        assert_eq!(ctx.size, 5000);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_load_crt_appends_chips_in_file_order() {
        let crt = build_crt(
            0,
            0,
            1,
            &[
                (0, 0x8000, vec![0x11; 0x100]),
                (1, 0x8000, vec![0x22; 0x80]),
            ],
        );
        let path = write_tmp("append.crt", &crt);
        let mut ctx = ConversionContext::new(0);
        load_input_file(&mut ctx, &path, &opts_for(&path)).unwrap();
        assert!(ctx.is_crt);
        assert_eq!(ctx.crt_id, 0);
        assert_eq!(ctx.size, 0x180);
        assert_eq!(ctx.load_address, 0x8000);
        assert!(ctx.image[..0x100].iter().all(|&b| b == 0x11));
        assert!(ctx.image[0x100..0x180].iter().all(|&b| b == 0x22));
        assert!(ctx.image[0x180..0x200].iter().all(|&b| b == ERASED_BYTE));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_load_crt_ultimax_mode_lines() {
        let crt = build_crt(0, 1, 0, &[(0, 0xe000, vec![0; 0x2000])]);
        let path = write_tmp("ulti.crt", &crt);
        let mut ctx = ConversionContext::new(0);
        load_input_file(&mut ctx, &path, &opts_for(&path)).unwrap();
        assert!(ctx.is_ultimax);
        assert_eq!(ctx.load_address, 0xe000);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_load_crt_unknown_hardware_id() {
        let crt = build_crt(9999, 0, 0, &[(0, 0x8000, vec![0; 0x2000])]);
        let path = write_tmp("unknown-id.crt", &crt);
        let mut ctx = ConversionContext::new(0);
        let err = load_input_file(&mut ctx, &path, &opts_for(&path)).unwrap_err();
        assert!(matches!(err, ConvertError::UnknownHardwareId(9999)));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_load_crt_negative_internal_id_rejected() {
        // id -6 encodes as 0xfffa; the low-byte sign bit marks it internal
        let crt = build_crt(-6i32 & 0xffff, 1, 0, &[(0, 0xe000, vec![0; 0x2000])]);
        let path = write_tmp("internal-id.crt", &crt);
        let mut ctx = ConversionContext::new(0);
        let err = load_input_file(&mut ctx, &path, &opts_for(&path)).unwrap_err();
        assert!(matches!(err, ConvertError::UnknownHardwareId(-6)));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_load_crt_bad_chip_tag() {
        let mut crt = build_crt(0, 0, 1, &[(0, 0x8000, vec![0; 0x100])]);
        crt[0x40] = b'X';
        let path = write_tmp("badtag.crt", &crt);
        let mut ctx = ConversionContext::new(0);
        let err = load_input_file(&mut ctx, &path, &opts_for(&path)).unwrap_err();
        assert!(matches!(err, ConvertError::BadChipTag { .. }));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_oversize_chunk_fatal_without_repair() {
        let mut crt = build_crt(0, 0, 1, &[(0, 0x8000, vec![0x33; 0x100])]);
        // claim more data than the chunk holds
        crt[0x4e..0x50].copy_from_slice(&0x200u16.to_be_bytes());
        let path = write_tmp("oversize.crt", &crt);
        let mut ctx = ConversionContext::new(0);
        let err = load_input_file(&mut ctx, &path, &opts_for(&path)).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::ChunkSizeMismatch {
                data: 0x200,
                chunk: 0x110
            }
        ));

        // repair mode clamps the read to the chunk length and keeps going
        let mut opts = opts_for(&path);
        opts.repair_mode = true;
        load_input_file(&mut ctx, &path, &opts).unwrap();
        assert!(ctx.image[..0x100].iter().all(|&b| b == 0x33));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_truncated_chip_data() {
        let mut crt = build_crt(0, 0, 1, &[(0, 0x8000, vec![0x44; 0x100])]);
        crt.truncate(crt.len() - 0x80);
        let path = write_tmp("trunc.crt", &crt);
        let mut ctx = ConversionContext::new(0);
        let err = load_input_file(&mut ctx, &path, &opts_for(&path)).unwrap_err();
        assert!(matches!(err, ConvertError::TruncatedStream { .. }));

        let mut opts = opts_for(&path);
        opts.repair_mode = true;
        load_input_file(&mut ctx, &path, &opts).unwrap();
        assert_eq!(ctx.size, 0x100);
        assert!(ctx.image[..0x80].iter().all(|&b| b == 0x44));
        assert!(ctx.image[0x80..0x100].iter().all(|&b| b == ERASED_BYTE));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_malformed_header_length() {
        let mut crt = build_crt(0, 0, 1, &[(0, 0x8000, vec![0; 0x100])]);
        crt[0x13] = 0x20;
        let path = write_tmp("badhdr.crt", &crt);
        let mut ctx = ConversionContext::new(0);
        let err = load_input_file(&mut ctx, &path, &opts_for(&path)).unwrap_err();
        assert!(matches!(err, ConvertError::MalformedHeader { .. }));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_chip_directory() {
        let crt = build_crt(
            0,
            0,
            1,
            &[(0, 0x8000, vec![0; 0x2000]), (1, 0xa000, vec![0; 0x1000])],
        );
        let path = write_tmp("dir.crt", &crt);
        let dir = chip_directory(&path).unwrap();
        assert_eq!(dir.len(), 2);
        assert_eq!(dir[0].offset, 0x40);
        assert_eq!(dir[0].size, 0x2000);
        assert_eq!(dir[0].chunk_len, 0x2010);
        assert_eq!(dir[1].start, 0xa000);
        assert!(!dir[0].oversize_data);
        assert!(!dir[0].beyond_eof);
        let _ = std::fs::remove_file(&path);
    }
}
