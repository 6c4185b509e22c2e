//! Per-hardware container encoders
//!
//! One encoder per `SaveMethod`, selected from the descriptor table and
//! dispatched by `save_cartridge`. Every encoder writes the header and chip
//! packages through `CrtWriter`; any failure discards the partial output.
//! The EPROM-multiplexing encoders additionally load and validate their
//! auxiliary input files one by one.
//!
//! This program is unlicensed and dedicated to the public domain.
//! Developed by Tommy Olsen.

use std::path::Path;

use crate::cartridge::{
    CART_INFO, CARTRIDGE_SIZE_2KB, CARTRIDGE_SIZE_4KB, CARTRIDGE_SIZE_8KB, CARTRIDGE_SIZE_12KB,
    CARTRIDGE_SIZE_16KB, CARTRIDGE_SIZE_32KB, CARTRIDGE_SIZE_256KB, CartInfo, SaveMethod,
};
use crate::config::ConvertOptions;
use crate::crt_writer::CrtWriter;
use crate::error::ConvertError;
use crate::load_input::{ConversionContext, ERASED_BYTE, load_input_file};

/// Convert the loaded binary image to a container for hardware `id`.
///
/// `ultimax` selects the ultimax geometry of the generic encoder (pseudo
/// target `ulti`, and MAX Basic).
pub fn save_cartridge(
    ctx: &mut ConversionContext,
    opts: &ConvertOptions,
    id: i32,
    ultimax: bool,
) -> Result<(), ConvertError> {
    let info = &CART_INFO[id as usize];
    let method = info.save.ok_or_else(|| {
        ConvertError::UnsupportedConversion(format!(
            "no .crt conversion support for {}",
            info.name
        ))
    })?;

    match method {
        SaveMethod::Regular => with_output(opts, |w| {
            save_regular(
                ctx,
                w,
                opts,
                id,
                info.bank_size,
                info.banks,
                info.load_address,
                info.data_type,
                info.game,
                info.exrom,
            )
        }),
        SaveMethod::Generic => save_generic(ctx, opts, id, ultimax),
        SaveMethod::TwoBlocks => with_output(opts, |w| {
            save_two_blocks(ctx, w, opts, id, 0xa000, info.game, info.exrom)
        }),
        SaveMethod::FinalPlus => with_output(opts, |w| save_fcplus(ctx, w, opts, id, info)),
        SaveMethod::EasyFlash => with_output(opts, |w| save_easyflash(ctx, w, opts, id)),
        SaveMethod::Ocean => with_output(opts, |w| save_ocean(ctx, w, opts, id)),
        SaveMethod::FunPlay => with_output(opts, |w| save_funplay(ctx, w, opts, id)),
        SaveMethod::Zaxxon => with_output(opts, |w| save_zaxxon(ctx, w, opts, id)),
        SaveMethod::Stardos => with_output(opts, |w| save_stardos(ctx, w, opts, id)),
        SaveMethod::EasyCalc => with_output(opts, |w| save_easycalc(ctx, w, opts, id)),
        SaveMethod::DelaEp64 => save_dela_ep64(ctx, opts, id, info),
        SaveMethod::DelaEp7x8 => save_dela_ep7x8(ctx, opts, id, info),
        SaveMethod::DelaEp256 => save_dela_ep256(ctx, opts, id, info),
        SaveMethod::RexEp256 => save_rex_ep256(ctx, opts, id, info),
    }?;

    if !opts.quiet {
        println!("Input file : {}", opts.input_files[0].display());
        println!("Output file : {}", opts.output_file.display());
        println!(
            "Conversion from binary format to {} .crt successful.",
            info.name
        );
    }
    Ok(())
}

/// Run an encoder body against a fresh output file; on any failure the
/// partial container is closed and deleted before the error propagates.
fn with_output<F>(opts: &ConvertOptions, body: F) -> Result<(), ConvertError>
where
    F: FnOnce(&mut CrtWriter) -> Result<(), ConvertError>,
{
    let mut writer = CrtWriter::create(&opts.output_file)?;
    match body(&mut writer) {
        Ok(()) => writer.finish(),
        Err(e) => {
            writer.discard();
            Err(e)
        }
    }
}

fn write_header(
    w: &mut CrtWriter,
    opts: &ConvertOptions,
    id: i32,
    game: u8,
    exrom: u8,
) -> Result<(), ConvertError> {
    w.write_header(id, opts.subtype, opts.cart_name.as_deref(), game, exrom)
}

/* ======================= Uniform geometries ======================= */

#[allow(clippy::too_many_arguments)]
fn save_regular(
    ctx: &mut ConversionContext,
    w: &mut CrtWriter,
    opts: &ConvertOptions,
    id: i32,
    mut length: u32,
    banks: u32,
    address: u32,
    chip_type: u8,
    game: u8,
    exrom: u8,
) -> Result<(), ConvertError> {
    write_header(w, opts, id, game, exrom)?;

    let mut real_banks = banks;
    if real_banks == 0 {
        // a chip of half or a quarter of the regular size on otherwise
        // identical hardware (eg a 2k/4k chip on an 8k cart)
        if ctx.size as u32 == length / 2 {
            length /= 2;
        } else if ctx.size as u32 == length / 4 {
            length /= 4;
        }
        real_banks = ctx.size as u32 / length;
    }

    for i in 0..real_banks {
        w.write_chip(ctx, length, i, address, chip_type)?;
    }
    Ok(())
}

fn save_two_blocks(
    ctx: &mut ConversionContext,
    w: &mut CrtWriter,
    opts: &ConvertOptions,
    id: i32,
    second_address: u32,
    game: u8,
    exrom: u8,
) -> Result<(), ConvertError> {
    write_header(w, opts, id, game, exrom)?;
    w.write_chip(ctx, 0x2000, 0, 0x8000, 0)?;
    w.write_chip(ctx, 0x2000, 0, second_address, 0)?;
    Ok(())
}

fn save_generic(
    ctx: &mut ConversionContext,
    opts: &ConvertOptions,
    id: i32,
    ultimax: bool,
) -> Result<(), ConvertError> {
    let size = ctx.size as u32;

    if ultimax {
        if size == CARTRIDGE_SIZE_16KB {
            return with_output(opts, |w| save_two_blocks(ctx, w, opts, id, 0xe000, 0, 1));
        }
        let (length, address) = match size {
            CARTRIDGE_SIZE_2KB => (0x0800, 0xf800),
            CARTRIDGE_SIZE_4KB => (0x1000, 0xf000),
            CARTRIDGE_SIZE_8KB => (0x2000, 0xe000),
            _ => {
                return Err(ConvertError::InvalidSize {
                    size: ctx.size,
                    context: "generic ultimax cartridge".to_string(),
                });
            }
        };
        return with_output(opts, |w| {
            save_regular(ctx, w, opts, id, length, 1, address, 0, 0, 1)
        });
    }

    // mode lines stay at the descriptor defaults (8k game config) for all
    // plain generic sizes
    let (length, banks) = match size {
        CARTRIDGE_SIZE_2KB => (0x0800, 0),
        CARTRIDGE_SIZE_4KB => (0x1000, 0),
        CARTRIDGE_SIZE_8KB => (0x2000, 0),
        CARTRIDGE_SIZE_12KB => (0x3000, 1),
        CARTRIDGE_SIZE_16KB => (0x4000, 1),
        _ => {
            return Err(ConvertError::InvalidSize {
                size: ctx.size,
                context: "generic cartridge".to_string(),
            });
        }
    };
    with_output(opts, |w| {
        save_regular(ctx, w, opts, id, length, banks, 0x8000, 0, 1, 0)
    })
}

/* ======================= Fixed and irregular layouts ======================= */

fn save_fcplus(
    ctx: &mut ConversionContext,
    w: &mut CrtWriter,
    opts: &ConvertOptions,
    id: i32,
    info: &CartInfo,
) -> Result<(), ConvertError> {
    write_header(w, opts, id, info.game, info.exrom)?;

    let length = info.bank_size;
    let mut real_banks = info.banks;
    if real_banks == 0 {
        real_banks = ctx.size as u32 / length;
    }

    // a 24 KiB image occupies the top of the 32 KiB chip, the low 8 KiB
    // stays erased
    if ctx.size != CARTRIDGE_SIZE_32KB as usize {
        ctx.image
            .copy_within(ctx.offset..ctx.offset + 0x6000, ctx.offset + 0x2000);
        ctx.image[ctx.offset..ctx.offset + 0x2000].fill(ERASED_BYTE);
    }

    for i in 0..real_banks {
        w.write_chip(ctx, length, i, info.load_address, info.data_type)?;
    }
    Ok(())
}

fn half_bank_is_empty(ctx: &ConversionContext) -> bool {
    ctx.image[ctx.offset..ctx.offset + 0x2000]
        .iter()
        .all(|&b| b == ERASED_BYTE)
}

fn save_easyflash(
    ctx: &mut ConversionContext,
    w: &mut CrtWriter,
    opts: &ConvertOptions,
    id: i32,
) -> Result<(), ConvertError> {
    write_header(w, opts, id, 0, 0)?;

    for bank in 0..64 {
        for half in 0..2 {
            if opts.omit_empty_banks && half_bank_is_empty(ctx) {
                ctx.offset += 0x2000;
            } else {
                let address = if half == 0 { 0x8000 } else { 0xa000 };
                w.write_chip(ctx, 0x2000, bank, address, 2)?;
            }
        }
    }
    Ok(())
}

fn save_ocean(
    ctx: &mut ConversionContext,
    w: &mut CrtWriter,
    opts: &ConvertOptions,
    id: i32,
) -> Result<(), ConvertError> {
    if ctx.size != CARTRIDGE_SIZE_256KB as usize {
        return save_regular(ctx, w, opts, id, 0x2000, 0, 0x8000, 0, 0, 0);
    }

    // 256 KiB splits into 16 banks at 0x8000 and 16 more at 0xa000
    write_header(w, opts, id, 1, 0)?;
    for i in 0..16 {
        w.write_chip(ctx, 0x2000, i, 0x8000, 0)?;
    }
    for i in 0..16 {
        w.write_chip(ctx, 0x2000, i + 16, 0xa000, 0)?;
    }
    Ok(())
}

fn save_funplay(
    ctx: &mut ConversionContext,
    w: &mut CrtWriter,
    opts: &ConvertOptions,
    id: i32,
) -> Result<(), ConvertError> {
    write_header(w, opts, id, 1, 0)?;

    // bank numbers run 0, 8, .., 56, then 1, 9, .., 57
    let mut i = 0;
    while i != 0x41 {
        w.write_chip(ctx, 0x2000, i, 0x8000, 0)?;
        i += 8;
        if i == 0x40 {
            i = 1;
        }
    }
    Ok(())
}

fn save_zaxxon(
    ctx: &mut ConversionContext,
    w: &mut CrtWriter,
    opts: &ConvertOptions,
    id: i32,
) -> Result<(), ConvertError> {
    write_header(w, opts, id, 0, 0)?;
    w.write_chip(ctx, 0x1000, 0, 0x8000, 0)?;
    w.write_chip(ctx, 0x2000, 0, 0xa000, 0)?;
    w.write_chip(ctx, 0x2000, 1, 0xa000, 0)?;
    Ok(())
}

fn save_stardos(
    ctx: &mut ConversionContext,
    w: &mut CrtWriter,
    opts: &ConvertOptions,
    id: i32,
) -> Result<(), ConvertError> {
    write_header(w, opts, id, 1, 0)?;
    w.write_chip(ctx, 0x2000, 0, 0x8000, 0)?;
    w.write_chip(ctx, 0x2000, 0, 0xe000, 0)?;
    Ok(())
}

fn save_easycalc(
    ctx: &mut ConversionContext,
    w: &mut CrtWriter,
    opts: &ConvertOptions,
    id: i32,
) -> Result<(), ConvertError> {
    write_header(w, opts, id, 1, 1)?;
    w.write_chip(ctx, 0x2000, 0, 0x8000, 0)?;
    w.write_chip(ctx, 0x2000, 0, 0xa000, 0)?;
    w.write_chip(ctx, 0x2000, 1, 0xa000, 0)?;
    Ok(())
}

/* ======================= EPROM-multiplexing encoders ======================= */

fn check_base_size(
    ctx: &ConversionContext,
    opts: &ConvertOptions,
    info: &CartInfo,
) -> Result<(), ConvertError> {
    if ctx.size != CARTRIDGE_SIZE_8KB as usize {
        return Err(ConvertError::WrongBaseSize {
            cart: info.name,
            path: opts.input_files[0].display().to_string(),
            size: ctx.size,
        });
    }
    Ok(())
}

/// Inserted containers must be plain generic images at 0x8000.
fn check_generic_insert_crt(
    ctx: &ConversionContext,
    path: &Path,
    info: &CartInfo,
    kib: u32,
) -> Result<(), ConvertError> {
    if ctx.is_crt && (ctx.crt_id != 0 || ctx.is_ultimax) {
        return Err(ConvertError::UnsupportedConversion(format!(
            "({}) only generic {}KiB .crt images can be inserted into a {} .crt",
            path.display(),
            kib,
            info.name
        )));
    }
    Ok(())
}

fn save_dela_ep64(
    ctx: &mut ConversionContext,
    opts: &ConvertOptions,
    id: i32,
    info: &CartInfo,
) -> Result<(), ConvertError> {
    check_base_size(ctx, opts, info)?;

    with_output(opts, |w| {
        write_header(w, opts, id, 1, 0)?;
        w.write_chip(ctx, 0x2000, 0, 0x8000, 0)?;

        // one reserved 32 KiB bank slot per EPROM image
        for (bank, path) in opts.input_files.iter().enumerate().skip(1) {
            load_input_file(ctx, path, opts)?;
            if ctx.is_crt {
                return Err(ConvertError::UnsupportedConversion(format!(
                    "({}) inserted files can only be binaries for {}",
                    path.display(),
                    info.name
                )));
            }
            if ctx.size != CARTRIDGE_SIZE_32KB as usize {
                return Err(ConvertError::InvalidSize {
                    size: ctx.size,
                    context: format!(
                        "{} (inserted {} images must be 32KiB)",
                        path.display(),
                        info.name
                    ),
                });
            }
            w.write_chip(ctx, 0x8000, bank as u32, 0x8000, 0)?;
            if !opts.quiet {
                println!(
                    "inserted {} in bank {} of the {} .crt",
                    path.display(),
                    bank,
                    info.name
                );
            }
        }
        Ok(())
    })
}

fn save_dela_ep256(
    ctx: &mut ConversionContext,
    opts: &ConvertOptions,
    id: i32,
    info: &CartInfo,
) -> Result<(), ConvertError> {
    check_base_size(ctx, opts, info)?;
    if opts.input_files.len() == 1 {
        return Err(ConvertError::NothingToInsert);
    }

    with_output(opts, |w| {
        write_header(w, opts, id, 1, 0)?;
        w.write_chip(ctx, 0x2000, 0, 0x8000, 0)?;

        let mut insert_size = 0usize;
        for (i, path) in opts.input_files.iter().enumerate().skip(1) {
            load_input_file(ctx, path, opts)?;

            if ctx.size != CARTRIDGE_SIZE_32KB as usize && ctx.size != CARTRIDGE_SIZE_8KB as usize
            {
                return Err(ConvertError::InvalidSize {
                    size: ctx.size,
                    context: format!(
                        "{} (only 32KiB binary or 8KiB bin/crt files can be inserted in {})",
                        path.display(),
                        info.name
                    ),
                });
            }
            if insert_size == 0 {
                insert_size = ctx.size;
            }
            if insert_size == CARTRIDGE_SIZE_32KB as usize && opts.input_files.len() > 8 {
                return Err(ConvertError::TooManyInputs);
            }
            if insert_size != ctx.size {
                return Err(ConvertError::MixedInsertionSizes);
            }
            if ctx.is_crt
                && (ctx.size != CARTRIDGE_SIZE_8KB as usize
                    || ctx.load_address != 0x8000
                    || ctx.is_ultimax
                    || ctx.crt_id != 0)
            {
                return Err(ConvertError::UnsupportedConversion(format!(
                    "({}) only generic 8KiB .crt images can be inserted into a {} .crt",
                    path.display(),
                    info.name
                )));
            }

            let aux = i - 1;
            if insert_size == CARTRIDGE_SIZE_32KB as usize {
                // a 32 KiB EPROM spans four 8 KiB bank slots
                for j in 0..4 {
                    w.write_chip(ctx, 0x2000, (aux * 4 + j + 1) as u32, 0x8000, 0)?;
                }
                if !opts.quiet {
                    println!(
                        "inserted {} in banks {}-{} of the {} .crt",
                        path.display(),
                        aux * 4 + 1,
                        aux * 4 + 4,
                        info.name
                    );
                }
            } else {
                w.write_chip(ctx, 0x2000, (aux + 1) as u32, 0x8000, 0)?;
                if !opts.quiet {
                    println!(
                        "inserted {} in bank {} of the {} .crt",
                        path.display(),
                        aux + 1,
                        info.name
                    );
                }
            }
        }
        Ok(())
    })
}

fn save_dela_ep7x8(
    ctx: &mut ConversionContext,
    opts: &ConvertOptions,
    id: i32,
    info: &CartInfo,
) -> Result<(), ConvertError> {
    check_base_size(ctx, opts, info)?;
    if opts.input_files.len() == 1 {
        return Err(ConvertError::NothingToInsert);
    }

    with_output(opts, |w| {
        write_header(w, opts, id, 1, 0)?;
        w.write_chip(ctx, 0x2000, 0, 0x8000, 0)?;

        let mut inserted_size = 0usize;
        let mut chip_counter = 1u32;
        for path in opts.input_files.iter().skip(1) {
            load_input_file(ctx, path, opts)?;

            match ctx.size as u32 {
                CARTRIDGE_SIZE_32KB => {
                    if ctx.is_crt {
                        return Err(ConvertError::UnsupportedConversion(format!(
                            "({}) only binary 32KiB images can be inserted into a {} .crt",
                            path.display(),
                            info.name
                        )));
                    }
                    if inserted_size != 0 {
                        return Err(ConvertError::UnsupportedConversion(format!(
                            "({}) only the first inserted image can be a 32KiB image for {}",
                            path.display(),
                            info.name
                        )));
                    }
                    for j in 0..4 {
                        w.write_chip(ctx, 0x2000, chip_counter + j, 0x8000, 0)?;
                    }
                    if !opts.quiet {
                        println!(
                            "inserted {} in banks {}-{} of the {} .crt",
                            path.display(),
                            chip_counter,
                            chip_counter + 3,
                            info.name
                        );
                    }
                    chip_counter += 4;
                    inserted_size += 0x8000;
                }
                CARTRIDGE_SIZE_16KB => {
                    check_generic_insert_crt(ctx, path, info, 16)?;
                    if inserted_size >= 0xc000 {
                        return Err(ConvertError::NoRoomForInsertion {
                            path: path.display().to_string(),
                        });
                    }
                    w.write_chip(ctx, 0x2000, chip_counter, 0x8000, 0)?;
                    w.write_chip(ctx, 0x2000, chip_counter + 1, 0x8000, 0)?;
                    if !opts.quiet {
                        println!(
                            "inserted {} in banks {} and {} of the {} .crt",
                            path.display(),
                            chip_counter,
                            chip_counter + 1,
                            info.name
                        );
                    }
                    chip_counter += 2;
                    inserted_size += 0x4000;
                }
                CARTRIDGE_SIZE_8KB => {
                    check_generic_insert_crt(ctx, path, info, 8)?;
                    if inserted_size >= 0xe000 {
                        return Err(ConvertError::NoRoomForInsertion {
                            path: path.display().to_string(),
                        });
                    }
                    w.write_chip(ctx, 0x2000, chip_counter, 0x8000, 0)?;
                    if !opts.quiet {
                        println!(
                            "inserted {} in bank {} of the {} .crt",
                            path.display(),
                            chip_counter,
                            info.name
                        );
                    }
                    chip_counter += 1;
                    inserted_size += 0x2000;
                }
                _ => {
                    return Err(ConvertError::InvalidSize {
                        size: ctx.size,
                        context: format!(
                            "{} (only 32KiB, 16KiB or 8KiB images can be inserted into a {} .crt)",
                            path.display(),
                            info.name
                        ),
                    });
                }
            }
        }
        Ok(())
    })
}

/// Packing plan for 8 KiB-class images: the smallest of 1, 2 or 4 images
/// per chip that fits `remaining` files into `slots` bank slots. `None`
/// when even 4-way packing does not fit.
fn rexep_packing(slots: u32, remaining: u32) -> Option<u32> {
    if slots * 4 < remaining {
        None
    } else if remaining <= slots {
        Some(1)
    } else if remaining <= slots * 2 {
        Some(2)
    } else {
        Some(4)
    }
}

fn save_rex_ep256(
    ctx: &mut ConversionContext,
    opts: &ConvertOptions,
    id: i32,
    info: &CartInfo,
) -> Result<(), ConvertError> {
    check_base_size(ctx, opts, info)?;
    if opts.input_files.len() == 1 {
        return Err(ConvertError::NothingToInsert);
    }

    with_output(opts, |w| {
        write_header(w, opts, id, 1, 0)?;
        w.write_chip(ctx, 0x2000, 0, 0x8000, 0)?;

        let total = opts.input_files.len();
        let mut chip_counter = 1u32;
        // chips per group, decided when the first 8 KiB image shows up
        let mut packing = 0u32;
        let mut scratch = vec![ERASED_BYTE; 0x8000];
        let mut group_len = 0usize;
        let mut group_names: Vec<String> = Vec::new();

        for (idx, path) in opts.input_files.iter().enumerate().skip(1) {
            load_input_file(ctx, path, opts)?;

            if chip_counter > 8 {
                return Err(ConvertError::NoRoomForInsertion {
                    path: path.display().to_string(),
                });
            }

            match ctx.size as u32 {
                CARTRIDGE_SIZE_32KB => {
                    if ctx.is_crt {
                        return Err(ConvertError::UnsupportedConversion(format!(
                            "({}) only binary 32KiB images can be inserted into a {} .crt",
                            path.display(),
                            info.name
                        )));
                    }
                    if packing != 0 {
                        return Err(ConvertError::UnsupportedConversion(format!(
                            "({}) only the first inserted images can be 32KiB images for {}",
                            path.display(),
                            info.name
                        )));
                    }
                    w.write_chip(ctx, 0x8000, chip_counter, 0x8000, 0)?;
                    if !opts.quiet {
                        println!(
                            "inserted {} in bank {} as a 32KiB eprom of the {} .crt",
                            path.display(),
                            chip_counter,
                            info.name
                        );
                    }
                    chip_counter += 1;
                }
                CARTRIDGE_SIZE_8KB => {
                    check_generic_insert_crt(ctx, path, info, 8)?;

                    if packing == 0 {
                        let slots = 9 - chip_counter;
                        let remaining = (total - idx) as u32;
                        packing = rexep_packing(slots, remaining).ok_or_else(|| {
                            ConvertError::NoRoomForInsertion {
                                path: path.display().to_string(),
                            }
                        })?;
                    }

                    if packing == 1 {
                        w.write_chip(ctx, 0x2000, chip_counter, 0x8000, 0)?;
                        if !opts.quiet {
                            println!(
                                "inserted {} as an 8KiB eprom in bank {} of the {} .crt",
                                path.display(),
                                chip_counter,
                                info.name
                            );
                        }
                        chip_counter += 1;
                    } else {
                        let at = group_len * 0x2000;
                        scratch[at..at + 0x2000]
                            .copy_from_slice(&ctx.image[ctx.offset..ctx.offset + 0x2000]);
                        group_len += 1;
                        group_names.push(path.display().to_string());

                        if group_len == packing as usize || idx == total - 1 {
                            // flush the accumulated group as one larger chip
                            let chip_len = packing as usize * 0x2000;
                            ctx.image[..chip_len].copy_from_slice(&scratch[..chip_len]);
                            ctx.offset = 0;
                            w.write_chip(ctx, chip_len as u32, chip_counter, 0x8000, 0)?;
                            if !opts.quiet {
                                println!(
                                    "inserted {} as a {}KiB eprom in bank {} of the {} .crt",
                                    group_names.join(", "),
                                    packing * 8,
                                    chip_counter,
                                    info.name
                                );
                            }
                            chip_counter += 1;
                            group_len = 0;
                            group_names.clear();
                            scratch.fill(ERASED_BYTE);
                        }
                    }
                }
                _ => {
                    return Err(ConvertError::InvalidSize {
                        size: ctx.size,
                        context: format!(
                            "{} (only 32KiB or 8KiB images can be inserted into a {} .crt)",
                            path.display(),
                            info.name
                        ),
                    });
                }
            }
        }
        Ok(())
    })
}
