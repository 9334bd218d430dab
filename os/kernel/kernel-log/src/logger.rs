use core::fmt::{self, Write};
use kernel_sync::{SpinLock, SyncOnceCell};
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// Where formatted records go.
pub type Sink = &'static mut (dyn Write + Send);

pub struct KernelLogger {
    max_level: LevelFilter,
    sink: SpinLock<Option<Sink>>,
}

impl KernelLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self {
            max_level,
            sink: SpinLock::new(None),
        }
    }

    /// Install the kernel-wide logger. Call this once during early init.
    #[allow(clippy::missing_errors_doc)]
    pub fn init(max_level: LevelFilter) -> Result<&'static Self, SetLoggerError> {
        static LOGGER: SyncOnceCell<KernelLogger> = SyncOnceCell::new();

        let logger = LOGGER.get_or_init(|| Self::new(max_level));
        log::set_logger(logger)?;
        log::set_max_level(logger.max_level);
        Ok(logger)
    }

    #[must_use]
    pub const fn max_level(&self) -> LevelFilter {
        self.max_level
    }

    /// Route records to `sink`, returning the previous one.
    pub fn set_sink(&self, sink: Sink) -> Option<Sink> {
        self.sink.lock_irq().replace(sink)
    }

    /// Stop writing records anywhere.
    pub fn take_sink(&self) -> Option<Sink> {
        self.sink.lock_irq().take()
    }

    /// Write preformatted output to the sink, bypassing level filtering.
    pub fn write_fmt(&self, args: fmt::Arguments<'_>) {
        if let Some(sink) = self.sink.lock_irq().as_mut() {
            // Best effort; a console that fails has nowhere to report to.
            let _ = sink.write_fmt(args);
        }
    }
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.write_fmt(format_args!(
            "[{}] {}: {}\n",
            record.level(),
            record.target(),
            record.args()
        ));
    }

    fn flush(&self) {}
}
