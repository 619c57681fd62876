use std::io::Write;

use env_logger::Builder;
use log::LevelFilter;

/// Modules whose verbosity is raised together when debugging the pool.
const CORE_MODULES: &[&str] = &[
    "pagepool::buffer_pool",
    "pagepool::replacer",
    "pagepool::disk_manager",
];

fn core_builder(default_level: LevelFilter, core_level: LevelFilter) -> Builder {
    let mut builder = env_logger::builder();
    builder.filter_level(default_level);
    for module in CORE_MODULES {
        builder.filter_module(module, core_level);
    }
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{:5} {}:{} {}",
            record.level(),
            record.file().unwrap_or("?"),
            record.line().unwrap_or(0),
            record.args()
        )
    });
    builder
}

pub fn init_logger() {
    let _ = core_builder(LevelFilter::Error, LevelFilter::Error).try_init();
}

#[allow(dead_code)]
#[cfg(test)]
pub fn init_test_logger() {
    let mut builder = core_builder(LevelFilter::Info, LevelFilter::Trace);
    builder.is_test(true);
    let _ = builder.try_init();
}
