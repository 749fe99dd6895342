use criterion::{criterion_group, criterion_main, Criterion};
use nestrel_core::{
    control_deck::{Config, ControlDeck},
    mem::RamState,
};

/// Minimal iNES image running a tight NOP loop with rendering enabled.
fn spin_rom() -> Vec<u8> {
    let mut rom = vec![
        0x4E, 0x45, 0x53, 0x1A, // NES\x1a
        0x01, 0x01, // 16K PRG, 8K CHR
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];
    let mut prg = vec![0x00; 0x4000];
    // LDA #$1E; STA $2001; NOP; JMP $8005
    prg[..9].copy_from_slice(&[0xA9, 0x1E, 0x8D, 0x01, 0x20, 0xEA, 0x4C, 0x05, 0x80]);
    prg[0x3FFC] = 0x00;
    prg[0x3FFD] = 0x80;
    rom.extend(prg);
    rom.extend(vec![0x00; 0x2000]);
    rom
}

fn deck() -> ControlDeck {
    let mut deck = ControlDeck::with_config(Config {
        ram_state: RamState::AllZeros,
        ..Config::default()
    });
    let rom = spin_rom();
    deck.load_rom("bench", &mut rom.as_slice()).expect("valid rom");
    deck
}

fn bench_clock_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("clock");

    group.bench_function("clock_step", |b| {
        let mut deck = deck();
        b.iter(|| deck.clock_step().expect("clock"));
    });

    group.bench_function("clock_frame", |b| {
        let mut deck = deck();
        b.iter(|| {
            let frame = deck.frame_number();
            while deck.frame_number() == frame {
                deck.clock_step().expect("clock");
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_clock_step);
criterion_main!(benches);
