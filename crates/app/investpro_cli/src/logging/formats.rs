use std::io::Write;

use flexi_logger::DeferredNow;
use log::Record;

/// `12:04:05.123 INFO  investpro_core::session::orchestrator: login succeeded`
pub fn cli_format(
    w: &mut dyn Write,
    now: &mut DeferredNow,
    record: &Record,
) -> Result<(), std::io::Error> {
    write!(
        w,
        "{} {:<5} {}: {}",
        now.format("%H:%M:%S%.3f"),
        record.level(),
        record.target(),
        record.args()
    )
}
