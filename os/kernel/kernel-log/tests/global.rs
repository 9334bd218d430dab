use core::fmt::{self, Write};
use kernel_log::KernelLogger;
use log::{LevelFilter, debug, info, trace};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct Console(Arc<Mutex<String>>);

impl Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.lock().unwrap().push_str(s);
        Ok(())
    }
}

#[test]
fn installed_logger_receives_the_log_macros() {
    let logger = KernelLogger::init(LevelFilter::Debug).unwrap();
    assert_eq!(log::max_level(), LevelFilter::Debug);
    assert!(KernelLogger::init(LevelFilter::Trace).is_err());

    let console = Console::default();
    logger.set_sink(Box::leak(Box::new(console.clone())));
    info!(target: "boot", "memory manager up");
    debug!(target: "boot", "{} frames", 32768);
    trace!(target: "boot", "filtered");
    logger.write_fmt(format_args!("raw\n"));

    assert_eq!(
        *console.0.lock().unwrap(),
        "[INFO] boot: memory manager up\n[DEBUG] boot: 32768 frames\nraw\n"
    );
}
