//! Top-level conversion orchestrator
//!
//! Loads the first input, decides the conversion direction (binary to
//! container, container to binary, or container passthrough into the
//! multiplexing encoders), validates sizes and input counts and dispatches
//! to the encoder selected by the descriptor table.
//!
//! This program is unlicensed and dedicated to the public domain.
//! Developed by Tommy Olsen.

use std::fs::File;
use std::io::Write;

use crate::cartridge::{
    CART_INFO, CARTRIDGE_DELA_EP64, CARTRIDGE_DELA_EP7X8, cart_info, is_insertion_cart,
};
use crate::config::{ConvertOptions, Target};
use crate::error::ConvertError;
use crate::load_input::{CART_IMAGE_MAX, ConversionContext, load_input_file};
use crate::save_crt::save_cartridge;

/// Dela EP64 bank slots available for inserted EPROM images.
const DELA_EP64_MAX_IMAGES: usize = 4;

/// Dela EP7x8 input file ceiling (base plus seven 8 KiB sockets).
const DELA_EP7X8_MAX_FILES: usize = 8;

pub struct Converter {
    opts: ConvertOptions,
}

impl Converter {
    pub fn new(opts: ConvertOptions) -> Self {
        Self { opts }
    }

    /// Run one conversion from start to finish.
    pub fn convert(&self) -> Result<(), ConvertError> {
        let opts = &self.opts;
        let mut ctx = ConversionContext::new(opts.load_address);
        load_input_file(&mut ctx, &opts.input_files[0], opts)?;

        let target_id = match opts.target {
            Some(Target::Cart { id, .. }) => Some(id),
            _ => None,
        };
        let source_id = if ctx.is_crt { Some(ctx.crt_id) } else { None };

        // multiple inputs only make sense for the EPROM-multiplexing carts
        let insertion = target_id.is_some_and(is_insertion_cart)
            || source_id.is_some_and(is_insertion_cart);
        if opts.input_files.len() > 1 && !insertion {
            return Err(ConvertError::TooManyInputs);
        }
        if (target_id == Some(CARTRIDGE_DELA_EP64) || source_id == Some(CARTRIDGE_DELA_EP64))
            && opts.input_files.len() > 1 + DELA_EP64_MAX_IMAGES
        {
            return Err(ConvertError::TooManyInputs);
        }
        if (target_id == Some(CARTRIDGE_DELA_EP7X8) || source_id == Some(CARTRIDGE_DELA_EP7X8))
            && opts.input_files.len() > DELA_EP7X8_MAX_FILES
        {
            return Err(ConvertError::TooManyInputs);
        }

        if ctx.is_crt {
            match opts.target {
                // a container base feeds the multiplexing encoders directly
                Some(Target::Cart { id, ultimax }) if is_insertion_cart(id) => {
                    save_cartridge(&mut ctx, opts, id, ultimax)
                }
                None | Some(Target::Bin) | Some(Target::Prg) => self.save_binary(&mut ctx),
                Some(Target::Cart { .. }) => Err(ConvertError::UnsupportedConversion(
                    "file is already in .crt format".to_string(),
                )),
            }
        } else {
            let Some(Target::Cart { id, ultimax }) = opts.target else {
                return Err(ConvertError::UnsupportedConversion(
                    "file is already in binary format".to_string(),
                ));
            };
            let info = cart_info(id).ok_or(ConvertError::UnknownHardwareId(id))?;

            // the size masks double as absolute values, so this test also
            // accepts combinations of the listed sizes
            if opts.accept_padded {
                while ctx.size as u32 & info.sizes != ctx.size as u32 {
                    ctx.size += 1;
                    if ctx.size > CART_IMAGE_MAX {
                        return Err(ConvertError::InvalidSize {
                            size: ctx.size,
                            context: format!("{} requirements", info.name),
                        });
                    }
                }
            } else if ctx.size as u32 & info.sizes != ctx.size as u32 {
                return Err(ConvertError::InvalidSize {
                    size: ctx.size,
                    context: format!("{} requirements", info.name),
                });
            }

            save_cartridge(&mut ctx, opts, id, ultimax)
        }
    }

    /// Container passthrough: write the flat image back out as a plain
    /// binary, optionally prefixed with the PRG load address.
    fn save_binary(&self, ctx: &mut ConversionContext) -> Result<(), ConvertError> {
        let opts = &self.opts;
        let path = &opts.output_file;
        let mut f = File::create(path).map_err(|e| ConvertError::open(path, e))?;

        let result = (|| {
            if opts.target == Some(Target::Prg) {
                f.write_all(&ctx.load_address.to_le_bytes())
                    .map_err(|e| ConvertError::write(path, e))?;
            }
            f.write_all(&ctx.image[..ctx.size])
                .map_err(|e| ConvertError::write(path, e))
        })();

        match result {
            Ok(()) => {
                if !opts.quiet {
                    println!("Input file : {}", opts.input_files[0].display());
                    println!("Output file : {}", path.display());
                    println!(
                        "Conversion from {} .crt to binary format successful.",
                        CART_INFO[ctx.crt_id as usize].name
                    );
                }
                Ok(())
            }
            Err(e) => {
                drop(f);
                let _ = std::fs::remove_file(path);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::{CARTRIDGE_LAST, SaveMethod};
    use crate::load_input::ERASED_BYTE;
    use crate::load_input::testutil::{build_crt, tmp_path, write_tmp};
    use std::path::{Path, PathBuf};

    fn quiet_opts(inputs: Vec<PathBuf>, output: PathBuf) -> ConvertOptions {
        let mut opts = ConvertOptions::new(inputs, output);
        opts.quiet = true;
        opts
    }

    fn synth_image(len: usize, seed: u8) -> Vec<u8> {
        (0..len)
            .map(|i| seed ^ (i as u8) ^ ((i >> 8) as u8) ^ ((i >> 16) as u8))
            .collect()
    }

    fn decode(path: &Path) -> ConversionContext {
        let mut ctx = ConversionContext::new(0);
        let opts = quiet_opts(vec![path.to_path_buf()], tmp_path("decode-unused"));
        load_input_file(&mut ctx, path, &opts).unwrap();
        ctx
    }

    fn cleanup(paths: &[&Path]) {
        for p in paths {
            let _ = std::fs::remove_file(p);
        }
    }

    #[test]
    fn test_roundtrip_every_regular_variant() {
        for (id, info) in CART_INFO.iter().enumerate() {
            if info.save != Some(SaveMethod::Regular) {
                continue;
            }
            // smallest legal size for this hardware
            let size = (info.sizes & info.sizes.wrapping_neg()) as usize;
            let data = synth_image(size, id as u8);

            let input = write_tmp(&format!("rt-{}.bin", id), &data);
            let output = tmp_path(&format!("rt-{}.crt", id));
            let mut opts = quiet_opts(vec![input.clone()], output.clone());
            opts.target = Some(Target::Cart {
                id: id as i32,
                ultimax: false,
            });
            Converter::new(opts).convert().unwrap();

            let ctx = decode(&output);
            assert_eq!(ctx.crt_id, id as i32, "hardware id of {}", info.name);
            assert_eq!(ctx.size, size, "image size of {}", info.name);
            assert_eq!(&ctx.image[..size], &data[..], "image bytes of {}", info.name);
            cleanup(&[&input, &output]);
        }
    }

    #[test]
    fn test_easyflash_roundtrip_with_all_banks() {
        let size = 0x10_0000;
        let data = synth_image(size, 0xe5);
        let input = write_tmp("ef-rt.bin", &data);
        let output = tmp_path("ef-rt.crt");
        let mut opts = quiet_opts(vec![input.clone()], output.clone());
        opts.target = Some(Target::Cart {
            id: 32,
            ultimax: false,
        });
        opts.omit_empty_banks = false;
        Converter::new(opts).convert().unwrap();

        // the interleaved loader reassembles the flat image
        let ctx = decode(&output);
        assert_eq!(ctx.crt_id, 32);
        assert_eq!(ctx.size, size);
        assert_eq!(&ctx.image[..size], &data[..]);
        cleanup(&[&input, &output]);
    }

    #[test]
    fn test_crt_to_bin_concatenates_chip_payloads() {
        let chips = vec![
            (0u16, 0x8000u16, synth_image(0x2000, 1)),
            (1, 0x8000, synth_image(0x1000, 2)),
            (2, 0xa000, synth_image(0x800, 3)),
        ];
        let crt = build_crt(19, 0, 1, &chips);
        let input = write_tmp("cat.crt", &crt);
        let output = tmp_path("cat.bin");
        let opts = quiet_opts(vec![input.clone()], output.clone());
        Converter::new(opts).convert().unwrap();

        let expected: Vec<u8> = chips.iter().flat_map(|c| c.2.clone()).collect();
        assert_eq!(std::fs::read(&output).unwrap(), expected);
        cleanup(&[&input, &output]);
    }

    #[test]
    fn test_crt_to_prg_prefixes_load_address() {
        let crt = build_crt(0, 0, 1, &[(0, 0x8000, synth_image(0x2000, 9))]);
        let input = write_tmp("prg.crt", &crt);
        let output = tmp_path("prg.prg");
        let mut opts = quiet_opts(vec![input.clone()], output.clone());
        opts.target = Some(Target::Prg);
        Converter::new(opts).convert().unwrap();

        let data = std::fs::read(&output).unwrap();
        assert_eq!(&data[..2], &[0x00, 0x80]);
        assert_eq!(data.len(), 0x2002);
        cleanup(&[&input, &output]);
    }

    #[test]
    fn test_padding_rounds_up_never_down() {
        // 5000 bytes against an 8 KiB-only cart must pad up to 8 KiB
        let data = synth_image(5000, 4);
        let input = write_tmp("pad.bin", &data);
        let output = tmp_path("pad.crt");
        let mut opts = quiet_opts(vec![input.clone()], output.clone());
        opts.target = Some(Target::Cart {
            id: 10,
            ultimax: false,
        });
        opts.accept_padded = true;
        Converter::new(opts).convert().unwrap();

        let ctx = decode(&output);
        assert_eq!(ctx.size, 0x2000);
        assert_eq!(&ctx.image[..5000], &data[..]);
        assert!(ctx.image[5000..0x2000].iter().all(|&b| b == ERASED_BYTE));
        cleanup(&[&input, &output]);
    }

    #[test]
    fn test_padding_without_flag_is_rejected() {
        let input = write_tmp("nopad.bin", &synth_image(5000, 5));
        let output = tmp_path("nopad.crt");
        let mut opts = quiet_opts(vec![input.clone()], output.clone());
        opts.target = Some(Target::Cart {
            id: 10,
            ultimax: false,
        });
        let err = Converter::new(opts).convert().unwrap_err();
        assert!(matches!(err, ConvertError::InvalidSize { .. }));
        assert!(!output.exists());
        cleanup(&[&input]);
    }

    #[test]
    fn test_size_mask_mismatch() {
        // 16 KiB against the 32 KiB-only Action Replay V5
        let input = write_tmp("mask.bin", &synth_image(0x4000, 6));
        let output = tmp_path("mask.crt");
        let mut opts = quiet_opts(vec![input.clone()], output.clone());
        opts.target = Some(Target::Cart {
            id: 1,
            ultimax: false,
        });
        let err = Converter::new(opts).convert().unwrap_err();
        assert!(matches!(err, ConvertError::InvalidSize { size: 0x4000, .. }));
        cleanup(&[&input]);
    }

    #[test]
    fn test_unknown_hardware_id_leaves_no_output() {
        let crt = build_crt(9999, 0, 0, &[(0, 0x8000, vec![0; 0x2000])]);
        let input = write_tmp("unknown.crt", &crt);
        let output = tmp_path("unknown.bin");
        let opts = quiet_opts(vec![input.clone()], output.clone());
        let err = Converter::new(opts).convert().unwrap_err();
        assert!(matches!(err, ConvertError::UnknownHardwareId(9999)));
        assert!(!output.exists());
        cleanup(&[&input]);
    }

    #[test]
    fn test_crt_to_crt_is_rejected() {
        let crt = build_crt(0, 0, 1, &[(0, 0x8000, vec![0; 0x2000])]);
        let input = write_tmp("twice.crt", &crt);
        let output = tmp_path("twice-out.crt");
        let mut opts = quiet_opts(vec![input.clone()], output.clone());
        opts.target = Some(Target::Cart {
            id: 10,
            ultimax: false,
        });
        let err = Converter::new(opts).convert().unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedConversion(_)));
        cleanup(&[&input]);
    }

    #[test]
    fn test_bin_to_bin_is_rejected() {
        let input = write_tmp("plain.bin", &synth_image(0x2000, 7));
        let output = tmp_path("plain-out.bin");
        let opts = quiet_opts(vec![input.clone()], output.clone());
        let err = Converter::new(opts).convert().unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedConversion(_)));
        cleanup(&[&input]);
    }

    #[test]
    fn test_multiple_inputs_need_insertion_cart() {
        let a = write_tmp("multi-a.bin", &synth_image(0x2000, 8));
        let b = write_tmp("multi-b.bin", &synth_image(0x2000, 9));
        let output = tmp_path("multi.crt");
        let mut opts = quiet_opts(vec![a.clone(), b.clone()], output.clone());
        opts.target = Some(Target::Cart {
            id: 10,
            ultimax: false,
        });
        let err = Converter::new(opts).convert().unwrap_err();
        assert!(matches!(err, ConvertError::TooManyInputs));
        cleanup(&[&a, &b]);
    }

    fn ep64_inputs(tag: &str, aux_count: usize) -> Vec<PathBuf> {
        let base = write_tmp(&format!("{}-base.bin", tag), &synth_image(0x2000, 0x10));
        let mut inputs = vec![base];
        for i in 0..aux_count {
            inputs.push(write_tmp(
                &format!("{}-aux{}.bin", tag, i),
                &synth_image(0x8000, 0x20 + i as u8),
            ));
        }
        inputs
    }

    #[test]
    fn test_dela_ep64_insertion() {
        let files = ep64_inputs("ep64-ok", 2);
        let output = tmp_path("ep64.crt");
        let mut opts = quiet_opts(files.clone(), output.clone());
        opts.target = Some(Target::Cart {
            id: CARTRIDGE_DELA_EP64,
            ultimax: false,
        });
        Converter::new(opts).convert().unwrap();

        let ctx = decode(&output);
        assert_eq!(ctx.crt_id, CARTRIDGE_DELA_EP64);
        // base chip plus two 32 KiB chips, concatenated on decode
        assert_eq!(ctx.size, 0x2000 + 2 * 0x8000);
        for f in &files {
            let _ = std::fs::remove_file(f);
        }
        cleanup(&[&output]);
    }

    #[test]
    fn test_dela_ep64_rejects_fifth_auxiliary_file() {
        let files = ep64_inputs("ep64-cap", 5);
        let output = tmp_path("ep64-full.crt");
        let mut opts = quiet_opts(files.clone(), output.clone());
        opts.target = Some(Target::Cart {
            id: CARTRIDGE_DELA_EP64,
            ultimax: false,
        });
        let err = Converter::new(opts).convert().unwrap_err();
        assert!(matches!(err, ConvertError::TooManyInputs));
        assert!(!output.exists());
        for f in &files {
            let _ = std::fs::remove_file(f);
        }
    }

    #[test]
    fn test_dela_ep64_wrong_base_size() {
        // a raw base is caught by the size mask; a container base of the
        // wrong size reaches the encoder's own base check
        let crt = build_crt(0, 0, 1, &[(0, 0x8000, synth_image(0x4000, 0x11))]);
        let base = write_tmp("ep64-bad-base.crt", &crt);
        let output = tmp_path("ep64-bad.crt");
        let mut opts = quiet_opts(vec![base.clone()], output.clone());
        opts.target = Some(Target::Cart {
            id: CARTRIDGE_DELA_EP64,
            ultimax: false,
        });
        let err = Converter::new(opts).convert().unwrap_err();
        assert!(matches!(err, ConvertError::WrongBaseSize { .. }));
        assert!(!output.exists());
        cleanup(&[&base]);
    }

    #[test]
    fn test_dela_ep256_rejects_mixed_sizes() {
        let base = write_tmp("ep256-base.bin", &synth_image(0x2000, 0x30));
        let big = write_tmp("ep256-32k.bin", &synth_image(0x8000, 0x31));
        let small = write_tmp("ep256-8k.bin", &synth_image(0x2000, 0x32));
        let output = tmp_path("ep256.crt");
        let mut opts = quiet_opts(
            vec![base.clone(), big.clone(), small.clone()],
            output.clone(),
        );
        opts.target = Some(Target::Cart {
            id: 26,
            ultimax: false,
        });
        let err = Converter::new(opts).convert().unwrap_err();
        assert!(matches!(err, ConvertError::MixedInsertionSizes));
        assert!(!output.exists());
        cleanup(&[&base, &big, &small]);
    }

    #[test]
    fn test_dela_ep7x8_capacity_ceiling() {
        let base = write_tmp("ep7x8-base.bin", &synth_image(0x2000, 0x40));
        let big = write_tmp("ep7x8-32k.bin", &synth_image(0x8000, 0x41));
        let a = write_tmp("ep7x8-16k-a.bin", &synth_image(0x4000, 0x42));
        let b = write_tmp("ep7x8-16k-b.bin", &synth_image(0x4000, 0x43));
        let output = tmp_path("ep7x8.crt");

        // 32K + 16K fills 0xc000; a further 16 KiB image no longer fits
        let mut opts = quiet_opts(
            vec![base.clone(), big.clone(), a.clone(), b.clone()],
            output.clone(),
        );
        opts.target = Some(Target::Cart {
            id: CARTRIDGE_DELA_EP7X8,
            ultimax: false,
        });
        let err = Converter::new(opts).convert().unwrap_err();
        assert!(matches!(err, ConvertError::NoRoomForInsertion { .. }));
        assert!(!output.exists());
        cleanup(&[&base, &big, &a, &b]);
    }

    #[test]
    fn test_rex_ep256_packs_pairs_and_pads_final_group() {
        let base = write_tmp("rex-base.bin", &synth_image(0x2000, 0x50));
        let mut inputs = vec![base.clone()];
        for i in 0..9usize {
            inputs.push(write_tmp(
                &format!("rex-aux{}.bin", i),
                &synth_image(0x2000, 0x60 + i as u8),
            ));
        }
        let output = tmp_path("rex.crt");
        let mut opts = quiet_opts(inputs.clone(), output.clone());
        opts.target = Some(Target::Cart {
            id: 27,
            ultimax: false,
        });
        Converter::new(opts).convert().unwrap();

        // 9 files in 8 slots: packed two per 16 KiB chip, 5 chips total;
        // the final odd group is padded with erased bytes
        let data = std::fs::read(&output).unwrap();
        let mut sizes = Vec::new();
        let mut pos = 0x40;
        while pos + 0x10 <= data.len() {
            let total =
                u32::from_be_bytes(data[pos + 4..pos + 8].try_into().unwrap()) as usize;
            sizes.push(total - 0x10);
            pos += total;
        }
        assert_eq!(sizes, vec![0x2000, 0x4000, 0x4000, 0x4000, 0x4000, 0x4000]);
        let tail = &data[data.len() - 0x2000..];
        assert!(tail.iter().all(|&b| b == ERASED_BYTE));
        for f in &inputs {
            let _ = std::fs::remove_file(f);
        }
        cleanup(&[&output]);
    }

    #[test]
    fn test_source_id_survives_roundtrip_range() {
        // sanity: every id in range decodes back out of a written header
        let input = write_tmp("last.bin", &synth_image(0x8000, 0x70));
        let output = tmp_path("last.crt");
        let mut opts = quiet_opts(vec![input.clone()], output.clone());
        opts.target = Some(Target::Cart {
            id: CARTRIDGE_LAST,
            ultimax: false,
        });
        Converter::new(opts).convert().unwrap();
        assert_eq!(decode(&output).crt_id, CARTRIDGE_LAST);
        cleanup(&[&input, &output]);
    }
}
