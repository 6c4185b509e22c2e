//! Cartridge hardware descriptor table
//!
//! One entry per CRT hardware id, describing the legal input sizes, bank
//! geometry, default mode lines and the encoder used to build a container
//! for that hardware. The table is read-only and indexed directly by id.
//!
//! This program is unlicensed and dedicated to the public domain.
//! Developed by Tommy Olsen.

/* ======================= Image sizes ======================= */

pub const CARTRIDGE_SIZE_2KB: u32 = 0x0000_0800;
pub const CARTRIDGE_SIZE_4KB: u32 = 0x0000_1000;
pub const CARTRIDGE_SIZE_8KB: u32 = 0x0000_2000;
pub const CARTRIDGE_SIZE_12KB: u32 = 0x0000_3000;
pub const CARTRIDGE_SIZE_16KB: u32 = 0x0000_4000;
pub const CARTRIDGE_SIZE_20KB: u32 = 0x0000_5000;
pub const CARTRIDGE_SIZE_24KB: u32 = 0x0000_6000;
pub const CARTRIDGE_SIZE_32KB: u32 = 0x0000_8000;
pub const CARTRIDGE_SIZE_64KB: u32 = 0x0001_0000;
pub const CARTRIDGE_SIZE_96KB: u32 = 0x0001_8000;
pub const CARTRIDGE_SIZE_128KB: u32 = 0x0002_0000;
pub const CARTRIDGE_SIZE_256KB: u32 = 0x0004_0000;
pub const CARTRIDGE_SIZE_512KB: u32 = 0x0008_0000;
pub const CARTRIDGE_SIZE_1024KB: u32 = 0x0010_0000;
pub const CARTRIDGE_SIZE_2048KB: u32 = 0x0020_0000;
pub const CARTRIDGE_SIZE_4096KB: u32 = 0x0040_0000;
pub const CARTRIDGE_SIZE_8192KB: u32 = 0x0080_0000;
pub const CARTRIDGE_SIZE_16384KB: u32 = 0x0100_0000;
pub const CARTRIDGE_SIZE_MAX: u32 = CARTRIDGE_SIZE_16384KB;

/// Exact sizes accepted for raw binary input, smallest first.
pub const LEGAL_SIZES: [u32; 18] = [
    CARTRIDGE_SIZE_2KB,
    CARTRIDGE_SIZE_4KB,
    CARTRIDGE_SIZE_8KB,
    CARTRIDGE_SIZE_12KB,
    CARTRIDGE_SIZE_16KB,
    CARTRIDGE_SIZE_20KB,
    CARTRIDGE_SIZE_24KB,
    CARTRIDGE_SIZE_32KB,
    CARTRIDGE_SIZE_64KB,
    CARTRIDGE_SIZE_96KB,
    CARTRIDGE_SIZE_128KB,
    CARTRIDGE_SIZE_256KB,
    CARTRIDGE_SIZE_512KB,
    CARTRIDGE_SIZE_1024KB,
    CARTRIDGE_SIZE_2048KB,
    CARTRIDGE_SIZE_4096KB,
    CARTRIDGE_SIZE_8192KB,
    CARTRIDGE_SIZE_16384KB,
];

/* ======================= Hardware ids ======================= */

pub const CARTRIDGE_CRT: i32 = 0;
pub const CARTRIDGE_DELA_EP64: i32 = 24;
pub const CARTRIDGE_DELA_EP7X8: i32 = 25;
pub const CARTRIDGE_DELA_EP256: i32 = 26;
pub const CARTRIDGE_REX_EP256: i32 = 27;
pub const CARTRIDGE_EASYFLASH: i32 = 32;
pub const CARTRIDGE_MAX_BASIC: i32 = 61;
pub const CARTRIDGE_LAST: i32 = 74;

/// The four EPROM-multiplexing carts that accept extra input files.
pub fn is_insertion_cart(id: i32) -> bool {
    matches!(
        id,
        CARTRIDGE_DELA_EP64 | CARTRIDGE_DELA_EP7X8 | CARTRIDGE_DELA_EP256 | CARTRIDGE_REX_EP256
    )
}

/* ======================= Descriptor table ======================= */

/// Encoding strategy used when converting a binary image to a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMethod {
    /// N uniform banks of `bank_size` at `load_address`.
    Regular,
    /// Size-switched generic geometry (hardware id 0 and MAX Basic).
    Generic,
    /// Two fixed 8 KiB chips (0x8000 plus 0xA000 or 0xE000).
    TwoBlocks,
    /// One 32 KiB chip at 0x0000; 24 KiB images shifted to the top.
    FinalPlus,
    /// 64 banks x 2 half-banks, empty half-banks omitted.
    EasyFlash,
    /// Regular 8 KiB banks, except the 256 KiB split layout.
    Ocean,
    /// 16 chips with the interleaved stride-8 bank numbering.
    FunPlay,
    /// 4 KiB + 8 KiB + 8 KiB fixed layout.
    Zaxxon,
    /// 8 KiB at 0x8000 and 0xE000, bank 0.
    Stardos,
    /// 8 KiB at 0x8000 and two 8 KiB at 0xA000.
    EasyCalc,
    /// 8 KiB base plus 32 KiB EPROM images, one bank slot each.
    DelaEp64,
    /// 8 KiB base plus 32/16/8 KiB images packed into seven 8 KiB slots.
    DelaEp7x8,
    /// 8 KiB base plus same-size 32 KiB or 8 KiB images.
    DelaEp256,
    /// 8 KiB base plus 32 KiB/8 KiB images with 1/2/4-per-chip packing.
    RexEp256,
}

/// One hardware variant. `banks == 0` means the bank count is derived from
/// the image size and bank size; `save == None` means the hardware has no
/// binary-to-container conversion support.
pub struct CartInfo {
    pub exrom: u8,
    pub game: u8,
    pub sizes: u32,
    pub bank_size: u32,
    pub load_address: u32,
    pub banks: u32,
    pub data_type: u8,
    pub name: &'static str,
    pub opt: Option<&'static str>,
    pub save: Option<SaveMethod>,
}

#[allow(clippy::too_many_arguments)]
const fn cart(
    exrom: u8,
    game: u8,
    sizes: u32,
    bank_size: u32,
    load_address: u32,
    banks: u32,
    data_type: u8,
    name: &'static str,
    opt: Option<&'static str>,
    save: Option<SaveMethod>,
) -> CartInfo {
    CartInfo {
        exrom,
        game,
        sizes,
        bank_size,
        load_address,
        banks,
        data_type,
        name,
        opt,
        save,
    }
}

use SaveMethod::*;

const S2: u32 = CARTRIDGE_SIZE_2KB;
const S4: u32 = CARTRIDGE_SIZE_4KB;
const S8: u32 = CARTRIDGE_SIZE_8KB;
const S12: u32 = CARTRIDGE_SIZE_12KB;
const S16: u32 = CARTRIDGE_SIZE_16KB;
const S20: u32 = CARTRIDGE_SIZE_20KB;
const S24: u32 = CARTRIDGE_SIZE_24KB;
const S32: u32 = CARTRIDGE_SIZE_32KB;
const S64: u32 = CARTRIDGE_SIZE_64KB;
const S96: u32 = CARTRIDGE_SIZE_96KB;
const S128: u32 = CARTRIDGE_SIZE_128KB;
const S256: u32 = CARTRIDGE_SIZE_256KB;
const S512: u32 = CARTRIDGE_SIZE_512KB;
const S1M: u32 = CARTRIDGE_SIZE_1024KB;
const S2M: u32 = CARTRIDGE_SIZE_2048KB;
const S4M: u32 = CARTRIDGE_SIZE_4096KB;
const S8M: u32 = CARTRIDGE_SIZE_8192KB;
const S16M: u32 = CARTRIDGE_SIZE_16384KB;

/// Descriptor table, indexed by hardware id.
///
/// The size masks double as absolute values, so the size check also accepts
/// sums of listed sizes for multi-size entries; that behavior is kept as-is.
/// NOTE: several initial exrom/game values are unverified against real
/// hardware and are carried here literally.
#[rustfmt::skip]
pub static CART_INFO: [CartInfo; 75] = [
    cart(0, 1, S4 | S8 | S12 | S16, 0, 0, 0, 0, "Generic Cartridge", None, Some(Generic)),
    cart(0, 1, S32, 0x2000, 0x8000, 4, 0, "Action Replay V5", Some("ar5"), Some(Regular)),
    cart(0, 0, S16, 0x2000, 0, 2, 0, "KCS Power Cartridge", Some("kcs"), Some(TwoBlocks)),
    cart(0, 0, S64 | S256, 0x4000, 0x8000, 0, 0, "The Final Cartridge III", Some("fc3"), Some(Regular)),
    cart(0, 0, S16, 0x2000, 0, 2, 0, "Simons' BASIC", Some("simon"), Some(TwoBlocks)),
    cart(0, 0, S32 | S128 | S256 | S512, 0x2000, 0, 0, 0, "Ocean", Some("ocean"), Some(Ocean)),
    cart(1, 0, S8, 0x2000, 0x8000, 1, 2, "Expert Cartridge", Some("expert"), None),
    cart(0, 1, S128, 0x2000, 0x8000, 16, 0, "Fun Play", Some("fp"), Some(FunPlay)),
    cart(0, 0, S64, 0x4000, 0x8000, 4, 0, "Super Games", Some("sg"), Some(Regular)),
    cart(0, 1, S32, 0x2000, 0x8000, 4, 0, "Atomic Power", Some("ap"), Some(Regular)),
    cart(0, 1, S8, 0x2000, 0x8000, 1, 0, "Epyx FastLoad", Some("epyx"), Some(Regular)),
    cart(0, 0, S16, 0x4000, 0x8000, 1, 0, "Westermann Learning", Some("wl"), Some(Regular)),
    cart(0, 1, S8, 0x2000, 0x8000, 1, 0, "REX Utility", Some("ru"), Some(Regular)),
    cart(0, 0, S16, 0x4000, 0x8000, 1, 0, "The Final Cartridge", Some("fc1"), Some(Regular)),
    cart(1, 0, S64 | S96 | S128, 0x2000, 0xe000, 0, 0, "Magic Formel", Some("mf"), Some(Regular)),
    cart(0, 1, S512, 0x2000, 0x8000, 64, 0, "C64 Games System", Some("gs"), Some(Regular)),
    cart(0, 0, S16, 0x4000, 0x8000, 1, 0, "Warp Speed", Some("ws"), Some(Regular)),
    cart(0, 1, S128, 0x2000, 0x8000, 16, 0, "Dinamic", Some("din"), Some(Regular)),
    cart(0, 0, S20, 0, 0, 3, 0, "Zaxxon", Some("zaxxon"), Some(Zaxxon)),
    cart(0, 1, S32 | S64 | S128 | S256 | S512 | S1M, 0x2000, 0x8000, 0, 0, "Magic Desk", Some("md"), Some(Regular)),
    cart(0, 0, S64, 0x4000, 0x8000, 4, 0, "Super Snapshot V5", Some("ss5"), Some(Regular)),
    cart(0, 0, S64 | S128, 0x4000, 0x8000, 0, 0, "Comal 80", Some("comal"), Some(Regular)),
    cart(1, 0, S16, 0x2000, 0x8000, 2, 0, "Structured BASIC", Some("sb"), Some(Regular)),
    cart(0, 0, S16 | S32, 0x4000, 0x8000, 0, 0, "ROSS", Some("ross"), Some(Regular)),
    cart(0, 1, S8, 0, 0x8000, 0, 0, "Dela EP64", Some("dep64"), Some(DelaEp64)),
    cart(0, 1, S8, 0x2000, 0x8000, 0, 0, "Dela EP7x8", Some("dep7x8"), Some(DelaEp7x8)),
    cart(0, 1, S8, 0x2000, 0x8000, 0, 0, "Dela EP256", Some("dep256"), Some(DelaEp256)),
    cart(0, 1, S8, 0, 0x8000, 0, 0, "REX 256K EPROM Cart", Some("rep256"), Some(RexEp256)),
    cart(0, 1, S8, 0x2000, 0x8000, 1, 0, "Mikro Assembler", Some("mikro"), Some(Regular)),
    cart(1, 0, S24 | S32, 0x8000, 0x0000, 1, 0, "Final Cartridge Plus", Some("fcp"), Some(FinalPlus)),
    cart(0, 1, S32, 0x2000, 0x8000, 4, 0, "Action Replay MK4", Some("ar4"), Some(Regular)),
    cart(1, 0, S16, 0x2000, 0, 4, 0, "Stardos", Some("star"), Some(Stardos)),
    cart(1, 0, S1M, 0x2000, 0, 128, 0, "EasyFlash", Some("easy"), Some(EasyFlash)),
    cart(0, 0, 0, 0, 0, 0, 0, "EasyFlash Xbank", None, None),
    cart(1, 1, S8, 0x2000, 0x8000, 1, 0, "Capture", Some("cap"), Some(Regular)),
    cart(0, 1, S16, 0x2000, 0x8000, 2, 0, "Action Replay MK3", Some("ar3"), Some(Regular)),
    cart(0, 1, S32 | S64 | S128, 0x2000, 0x8000, 0, 0, "Retro Replay", Some("rr"), Some(Regular)),
    cart(0, 1, S8, 0x2000, 0x8000, 1, 0, "MMC64", Some("mmc64"), Some(Regular)),
    cart(0, 0, S64 | S512, 0x2000, 0x8000, 0, 0, "MMC Replay", Some("mmcr"), Some(Regular)),
    cart(0, 1, S64 | S128 | S512, 0x4000, 0x8000, 0, 2, "IDE64", Some("ide64"), Some(Regular)),
    cart(0, 0, S32, 0x4000, 0x8000, 2, 0, "Super Snapshot V4", Some("ss4"), Some(Regular)),
    cart(0, 1, S4, 0x1000, 0x8000, 1, 0, "IEEE-488 Interface", Some("ieee"), Some(Regular)),
    cart(1, 0, S8, 0x2000, 0xe000, 1, 0, "Game Killer", Some("gk"), Some(Regular)),
    cart(0, 1, S256, 0x2000, 0x8000, 32, 0, "Prophet64", Some("p64"), Some(Regular)),
    cart(1, 0, S8, 0x2000, 0xe000, 1, 0, "EXOS", Some("exos"), Some(Regular)),
    cart(0, 1, S8, 0x2000, 0x8000, 1, 0, "Freeze Frame", Some("ff"), Some(Regular)),
    cart(0, 1, S16 | S32, 0x4000, 0x8000, 0, 0, "Freeze Machine", Some("fm"), Some(Regular)),
    cart(0, 0, S4, 0x1000, 0xe000, 1, 0, "Snapshot 64", Some("s64"), Some(Regular)),
    cart(0, 1, S16, 0x2000, 0x8000, 2, 0, "Super Explode V5.0", Some("se5"), Some(Regular)),
    cart(1, 0, S16, 0x4000, 0x8000, 1, 0, "Magic Voice", Some("mv"), Some(Regular)),
    cart(0, 1, S16, 0x2000, 0x8000, 2, 0, "Action Replay MK2", Some("ar2"), Some(Regular)),
    cart(0, 1, S4 | S8, 0x2000, 0x8000, 0, 0, "MACH 5", Some("mach5"), Some(Regular)),
    cart(0, 1, S8, 0x2000, 0x8000, 1, 0, "Diashow-Maker", Some("dsm"), Some(Regular)),
    cart(0, 0, S64, 0x4000, 0x8000, 4, 0, "Pagefox", Some("pf"), Some(Regular)),
    cart(0, 0, S24, 0x2000, 0x8000, 3, 0, "Kingsoft", Some("ks"), Some(Regular)),
    cart(0, 1, S128, 0x2000, 0x8000, 16, 0, "Silverrock 128KiB Cartridge", Some("silver"), Some(Regular)),
    cart(1, 0, S32, 0x2000, 0xe000, 4, 0, "Formel 64", Some("f64"), Some(Regular)),
    cart(0, 1, S64, 0x2000, 0x8000, 8, 0, "RGCD", Some("rgcd"), Some(Regular)),
    cart(0, 1, S8, 0x2000, 0x8000, 1, 0, "RR-Net MK3", Some("rrnet"), Some(Regular)),
    cart(0, 0, S24, 0, 0, 3, 0, "Easy Calc Result", Some("ecr"), Some(EasyCalc)),
    cart(0, 1, S512, 0x2000, 0x8000, 64, 0, "GMod2", Some("gmod2"), Some(Regular)),
    cart(1, 0, S16, 0x2000, 0, 0, 0, "MAX Basic", Some("max"), Some(Generic)),
    cart(0, 1, S2M | S4M | S8M | S16M, 0x2000, 0x8000, 0, 0, "GMod3", Some("gmod3"), Some(Regular)),
    cart(0, 1, S8, 0x2000, 0x8000, 1, 0, "ZIPP-CODE 48", Some("zipp"), Some(Regular)),
    cart(0, 0, S32 | S64, 0x4000, 0x8000, 0, 0, "Blackbox V8", Some("bb8"), Some(Regular)),
    cart(0, 1, S8, 0x2000, 0x8000, 1, 0, "Blackbox V3", Some("bb3"), Some(Regular)),
    cart(0, 0, S16, 0x4000, 0x8000, 1, 0, "Blackbox V4", Some("bb4"), Some(Regular)),
    cart(0, 1, S8, 0x2000, 0x8000, 1, 0, "REX RAM-Floppy", Some("rrf"), Some(Regular)),
    cart(0, 1, S2 | S4 | S8, 0x2000, 0x8000, 0, 0, "BIS-Plus", Some("bis"), Some(Regular)),
    cart(0, 0, S128, 0x4000, 0x8000, 8, 0, "SD-BOX", Some("sdbox"), Some(Regular)),
    cart(1, 0, S1M, 0x4000, 0x8000, 64, 0, "MultiMAX", Some("mm"), Some(Regular)),
    cart(0, 0, S32, 0x4000, 0x8000, 0, 0, "Blackbox V9", Some("bb9"), Some(Regular)),
    cart(0, 1, S8, 0x2000, 0x8000, 1, 0, "Lt. Kernal Host Adaptor", Some("ltk"), Some(Regular)),
    cart(0, 1, S64, 0x2000, 0x8000, 8, 0, "RAMLink", Some("rl"), Some(Regular)),
    cart(0, 1, S32, 0x2000, 0x8000, 4, 0, "H.E.R.O. (Drean)", Some("hero"), Some(Regular)),
];

/* ======================= Lookups ======================= */

/// Descriptor for a hardware id, if the id is in the known range.
pub fn cart_info(id: i32) -> Option<&'static CartInfo> {
    if (0..=CARTRIDGE_LAST).contains(&id) {
        Some(&CART_INFO[id as usize])
    } else {
        None
    }
}

/// Resolve a command-line option token to a hardware id (case-insensitive).
pub fn cart_type_from_option(token: &str) -> Option<i32> {
    CART_INFO.iter().position(|info| {
        info.opt
            .is_some_and(|opt| opt.eq_ignore_ascii_case(token))
    }).map(|i| i as i32)
}

/// One row of the supported-types listing.
pub struct TypeListEntry {
    pub opt: &'static str,
    pub crt_id: i32,
    pub name: &'static str,
    pub insertion: bool,
}

/// All hardware types with an option token, sorted by token.
pub fn supported_types() -> Vec<TypeListEntry> {
    let mut entries: Vec<TypeListEntry> = CART_INFO
        .iter()
        .enumerate()
        .skip(1)
        .filter_map(|(id, info)| {
            info.opt.map(|opt| TypeListEntry {
                opt,
                crt_id: id as i32,
                name: info.name,
                insertion: is_insertion_cart(id as i32),
            })
        })
        .collect();
    entries.sort_by(|a, b| a.opt.cmp(b.opt));
    entries
}
