//! Command-line interface for the C64 Cartridge Converter
//!
//! Thin glue around the conversion core: argument parsing, the supported
//! types listing, the file info dump and exit codes live here.
//!
//! This program is unlicensed and dedicated to the public domain.
//! Developed by Tommy Olsen.

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Result, bail};
use clap::Parser;

use c64_cartridge_converter::cartridge::{cart_info, supported_types};
use c64_cartridge_converter::config::{ConvertOptions, VERSION, resolve_target};
use c64_cartridge_converter::convert::Converter;
use c64_cartridge_converter::load_input::{
    CRT_SIGNATURE, ConversionContext, chip_directory, load_input_file,
};

#[derive(Parser)]
#[command(
    name = "cartconv",
    version = VERSION,
    about = "Convert C64 cartridge images between raw binary/PRG and .crt format"
)]
struct Args {
    /// Input filename (repeat for carts that take extra files)
    #[arg(short = 'i', value_name = "name")]
    input: Vec<PathBuf>,

    /// Output filename
    #[arg(short = 'o', value_name = "name")]
    output: Option<PathBuf>,

    /// Output cart type
    #[arg(short = 't', value_name = "type")]
    cart_type: Option<String>,

    /// CRT cart name
    #[arg(short = 'n', value_name = "name")]
    name: Option<String>,

    /// Load address (decimal)
    #[arg(short = 'l', value_name = "addr")]
    load_address: Option<u16>,

    /// Output cart revision/subtype
    #[arg(short = 's', value_name = "rev")]
    subtype: Option<u8>,

    /// Repair mode (accept broken input files)
    #[arg(short = 'r')]
    repair: bool,

    /// Accept non padded binaries as input
    #[arg(short = 'p')]
    accept_padded: bool,

    /// Output all banks (do not optimize the .crt file)
    #[arg(short = 'b')]
    all_banks: bool,

    /// Quiet
    #[arg(short = 'q')]
    quiet: bool,

    /// Print info on file
    #[arg(short = 'f', value_name = "name")]
    info: Option<PathBuf>,

    /// Show the supported cart types
    #[arg(long)]
    types: bool,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    if args.types {
        print_types();
        return Ok(());
    }
    if let Some(path) = &args.info {
        return print_info(path, args.repair);
    }

    let Some(output) = args.output else {
        bail!("no output filename");
    };
    if args.input.is_empty() {
        bail!("no input filename");
    }
    if args.input.len() > 33 {
        bail!("too many input files");
    }
    if output == args.input[0] {
        bail!("output filename = input filename");
    }

    let mut opts = ConvertOptions::new(args.input, output);
    if let Some(token) = &args.cart_type {
        let Some(target) = resolve_target(token) else {
            bail!("unknown cart type '{}' (see --types)", token);
        };
        opts.target = Some(target);
    }
    opts.cart_name = args.name;
    opts.load_address = args.load_address.unwrap_or(0);
    opts.subtype = args.subtype.unwrap_or(0);
    opts.repair_mode = args.repair;
    opts.accept_padded = args.accept_padded;
    opts.omit_empty_banks = !args.all_banks;
    opts.quiet = args.quiet;

    Converter::new(opts).convert()?;
    Ok(())
}

fn print_types() {
    println!("supported cart types:\n");
    println!("bin      Binary .bin file (Default crt->bin)");
    println!("prg      Binary C64 .prg file with load-address\n");
    println!("normal   Generic 8KiB/12KiB/16KiB .crt file (Default bin->crt)");
    println!("ulti     Ultimax mode 4KiB/8KiB/16KiB .crt file\n");

    for entry in supported_types() {
        println!(
            "{:<8} {:2} {} .crt file{}",
            entry.opt,
            entry.crt_id,
            entry.name,
            if entry.insertion {
                ", extra files can be inserted"
            } else {
                ""
            }
        );
    }
}

fn trim_nul(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).to_string()
}

fn print_info(path: &Path, repair: bool) -> Result<()> {
    let mut opts = ConvertOptions::new(vec![path.to_path_buf()], PathBuf::new());
    opts.repair_mode = repair;
    opts.quiet = true;

    let mut ctx = ConversionContext::new(0);
    if let Err(e) = load_input_file(&mut ctx, path, &opts) {
        println!("Error: this file seems broken. ({})\n", e);
    }
    if &ctx.header[..0x10] != CRT_SIGNATURE {
        bail!("{} is not a .crt file", path.display());
    }

    // decode the id straight from the header so broken files still report it
    let mut crtid = ((ctx.header[0x16] as i32) << 8) + ctx.header[0x17] as i32;
    if ctx.header[0x17] & 0x80 != 0 {
        crtid -= 0x10000;
    }
    let info = cart_info(crtid);
    let idname = info.map_or("unknown", |i| i.name);

    let exrom = ctx.header[0x18];
    let game = ctx.header[0x19];
    let modename = match (exrom, game) {
        (1, 0) => "ultimax",
        (0, 0) => "16k Game",
        (0, 1) => "8k Game",
        _ => "?",
    };

    println!("CRT Version: {}.{}", ctx.header[0x14], ctx.header[0x15]);
    println!("Name: {}", trim_nul(&ctx.header[0x20..0x40]));
    println!("Hardware ID: {} ({})", crtid, idname);
    println!("Hardware Revision: {}", ctx.header[0x1a]);
    println!("Mode: exrom: {} game: {} ({})", exrom, game, modename);
    if let Some(info) = info {
        if crtid != 0 && exrom != info.exrom {
            println!("Warning: exrom in crt image set incorrectly.");
        }
        if crtid != 0 && game != info.game {
            println!("Warning: game in crt image set incorrectly.");
        }
    }

    println!();
    println!("offset  sig  type  bank start size  chunklen");
    let mut numbanks = 0u32;
    let mut tsize = 0u64;
    for entry in chip_directory(path)? {
        let typestr = match entry.chip_type {
            0 => "ROM",
            1 => "RAM",
            2 => "FLASH",
            _ => "UNK",
        };
        println!(
            "${:06x} {} {:<5} #{:03} ${:04x} ${:04x} ${:04x}",
            entry.offset,
            String::from_utf8_lossy(&entry.tag),
            typestr,
            entry.bank,
            entry.start,
            entry.size,
            entry.chunk_len
        );
        if entry.oversize_data {
            println!("  Error: data size exceeds chunk length");
        }
        if entry.beyond_eof {
            println!("  Error: data size exceeds end of file");
            break;
        }
        numbanks += 1;
        tsize += entry.size as u64;
    }
    println!();
    println!("total banks: {} size: ${:06x}", numbanks, tsize);
    Ok(())
}
