use rand::{Rng, SeedableRng, rngs::StdRng};
use std::fmt::Write;

#[cfg(feature = "tracing")]
#[must_use]
pub fn init_tracing() -> impl Drop {
    use tracing_flame::FlameLayer;
    use tracing_subscriber::{fmt, prelude::*};
    let filter_layer = tracing_subscriber::EnvFilter::from_default_env();
    let fmt_layer = fmt::Layer::default();
    let (flame_layer, _guard) = FlameLayer::with_file("./tracing.folded").unwrap();

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(flame_layer)
        .init();

    _guard
}

#[cfg(not(feature = "tracing"))]
#[allow(clippy::missing_const_for_fn)]
pub fn init_tracing() {}

const PHASES: usize = 3;

/// A trace of `regions` regions over `blocks` blocks, cycling through a few phases,
/// each phase hot in its own slice of the blocks
#[must_use]
pub fn synthetic_trace(regions: usize, blocks: usize) -> String {
    // use pseudo random for consistent metrics
    let mut rng = StdRng::seed_from_u64(0);
    let width = (blocks / PHASES).max(1);
    let mut trace = String::from("type,region,thread,data\n");

    for region in 0..regions {
        let phase = (region / 4) % PHASES;
        let hot = phase * width..(phase + 1) * width;
        let ids: Vec<String> = (0..blocks).map(|b| b.to_string()).collect();
        let bbv: Vec<String> = (0..blocks)
            .map(|b| {
                let count = if hot.contains(&b) {
                    rng.random_range(500..1000)
                } else {
                    rng.random_range(0..5)
                };
                count.to_string()
            })
            .collect();
        let csv: Vec<String> = (0..blocks)
            .map(|_| rng.random_range(0..100_000_000u64).to_string())
            .collect();
        for thread in 0..2 {
            writeln!(trace, "bb_id,{region},{thread},{}", ids.join(",")).unwrap();
            writeln!(trace, "bbv,{region},{thread},{}", bbv.join(",")).unwrap();
            writeln!(trace, "csv,{region},{thread},{}", csv.join(",")).unwrap();
        }
    }
    trace
}

/// Static info naming every block of [`synthetic_trace`], ten blocks per function
#[must_use]
pub fn synthetic_static_info(blocks: usize) -> String {
    let mut info = String::new();
    for function in 0..blocks.div_ceil(10) {
        write!(info, "[{function}:f{function}]").unwrap();
        for block in function * 10..((function + 1) * 10).min(blocks) {
            write!(info, " [{block}:bb{block}:{}]", block % 7 + 1).unwrap();
        }
        info.push('\n');
    }
    info
}
