//! descry - recursive-descent disassembler for raw images
//!
//! Usage:
//!   descry <image>                       Disassemble from the base address
//!   descry <image> -b 0x1000 -e 0x1010   Custom base and entry point
//!   descry <image> --symbols             List discovered symbols instead

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use descry_core::Address;
use descry_disasm::X86Assembler;
use descry_engine::{Disassembler, ListingItemKind};
use descry_formats::FlatLoader;

#[derive(Parser)]
#[command(name = "descry")]
#[command(about = "A recursive-descent disassembler for raw images", long_about = None)]
struct Cli {
    /// Path to the raw image file
    image: PathBuf,

    /// Load address of the image
    #[arg(short, long, value_parser = parse_hex, default_value = "0x1000")]
    base: Address,

    /// Entry point (defaults to the base address)
    #[arg(short, long, value_parser = parse_hex)]
    entry: Option<Address>,

    /// List discovered symbols instead of the listing
    #[arg(long)]
    symbols: bool,

    /// Print basic-block boundaries after the listing
    #[arg(long)]
    blocks: bool,
}

fn parse_hex(s: &str) -> Result<u64, String> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16).map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let image = fs::read(&cli.image)
        .with_context(|| format!("failed to read {}", cli.image.display()))?;
    log::info!("loaded {} bytes at {:#x}", image.len(), cli.base);

    let loader = FlatLoader::new(image, cli.base, "x86").entry(cli.entry.unwrap_or(cli.base));
    let mut disassembler =
        Disassembler::new(Box::new(loader), Box::new(X86Assembler::new()));

    disassembler.disassemble();

    if cli.symbols {
        print_symbols(&disassembler);
    } else {
        print_listing(&disassembler);
    }

    if cli.blocks {
        print_blocks(&disassembler);
    }

    let document = disassembler.document();
    eprintln!(
        "{} items, {} functions, {} symbols, {} references",
        document.len(),
        document.functions().len(),
        document.symbols().len(),
        disassembler.references().len(),
    );

    Ok(())
}

fn print_symbols(disassembler: &Disassembler) {
    for symbol in disassembler.document().symbols().iter() {
        println!(
            "{:#010x}  {:<24} refs={}",
            symbol.address,
            symbol.name,
            disassembler.references().reference_count(symbol.address),
        );
    }
}

fn print_listing(disassembler: &Disassembler) {
    let document = disassembler.document();

    for item in document.iter() {
        match item.kind {
            ListingItemKind::Segment => {
                let segment = document
                    .segment_at(item.address)
                    .filter(|s| s.address == item.address);
                if let Some(segment) = segment {
                    println!(
                        "; segment {} [{:#x}..{:#x})",
                        segment.name,
                        segment.address,
                        segment.end()
                    );
                }
            }
            ListingItemKind::Empty => println!(),
            ListingItemKind::Info => {
                if let Some(text) = document.info_at(item.address) {
                    println!("; {}", text);
                }
            }
            ListingItemKind::Function | ListingItemKind::Symbol => {
                if let Some(symbol) = document.symbol_at(item.address) {
                    println!("{}:", symbol.name);
                }
            }
            ListingItemKind::Instruction => {
                if let Some(handle) = document.instruction_at(item.address) {
                    let comments: Vec<&str> = document
                        .comment_at(item.address)
                        .into_iter()
                        .chain(document.auto_comments_at(item.address))
                        .collect();

                    if comments.is_empty() {
                        println!("    {}", handle.borrow());
                    } else {
                        println!("    {:<40} ; {}", handle.borrow().to_string(), comments.join("; "));
                    }
                }
            }
        }
    }
}

fn print_blocks(disassembler: &Disassembler) {
    println!();
    for block in disassembler.basic_blocks() {
        println!(
            "; bb{}: {:#x}..{:#x} ({} bytes)",
            block.id,
            block.start,
            block.end,
            block.size()
        );
    }
}
