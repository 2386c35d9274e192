//! Engine throughput over a synthetic call-chained image.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use descry_disasm::X86Assembler;
use descry_engine::Disassembler;
use descry_formats::FlatLoader;

/// 256 sixteen-byte blocks; each calls the next, pads with nops, and
/// returns, so the whole image is reachable from the entry point.
fn build_image() -> Vec<u8> {
    let mut image = Vec::with_capacity(256 * 16);

    for block in 0..256 {
        if block < 255 {
            // call <next block>: rel32 = 16 - 5
            image.extend_from_slice(&[0xE8, 0x0B, 0x00, 0x00, 0x00]);
            image.extend_from_slice(&[0x90; 10]);
            image.push(0xC3);
        } else {
            image.extend_from_slice(&[0x90; 15]);
            image.push(0xC3);
        }
    }

    image
}

fn bench_disassemble(c: &mut Criterion) {
    let image = build_image();

    c.bench_function("disassemble_flat_4k", |b| {
        b.iter(|| {
            let loader = FlatLoader::new(image.clone(), 0x1000, "x86");
            let mut disassembler =
                Disassembler::new(Box::new(loader), Box::new(X86Assembler::new()));
            disassembler.disassemble();
            black_box(disassembler.document().len())
        })
    });
}

criterion_group!(benches, bench_disassemble);
criterion_main!(benches);
