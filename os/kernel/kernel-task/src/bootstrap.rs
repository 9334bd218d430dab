//! # First task
//!
//! Setup leaves the application image mapped in the master directory and
//! describes where in the [`SystemInfo`]. The first task wraps those
//! mappings instead of building new ones, and gets the idle thread as its
//! second thread.

use crate::error::TaskError;
use crate::task::{Task, TaskKernelContext};
use crate::thread::{Configuration, Criterion, State};
use kernel_info::SystemInfo;
use kernel_info::config::IDLE_STACK_SIZE;
use kernel_memory_addresses::{LogicalAddress, PhysicalAddress};
use kernel_vmem::{AddressTranslator, Chunk, PageFlags, Segment};
use log::{info, trace, warn};

/// Build the first task from the boot image: a `RUNNING` main thread at the
/// image's entry point and a `READY` idle thread at `idle`.
///
/// On flat targets the `*_pt` fields of the physical memory map hold the
/// physical base of the code and data instead of table addresses.
pub fn bootstrap<'k, A: AddressTranslator>(
    kernel: &'k TaskKernelContext<'k, A>,
    si: &SystemInfo,
    idle: LogicalAddress,
) -> Result<Task<'k, A>, TaskError> {
    trace!("bootstrap(idle={idle})");
    let (lm, pmm) = (&si.lm, &si.pmm);
    if !lm.has_app {
        warn!("bootstrap: no application in the boot image");
        return Err(TaskError::NoImage);
    }

    let code = Chunk::wrap(
        kernel.memory,
        PhysicalAddress::new(pmm.app_code_pt),
        PhysicalAddress::new(pmm.app_code_at),
        0,
        A::pages(lm.app_code_size),
        PageFlags::APPC,
    );
    let data = Chunk::wrap(
        kernel.memory,
        PhysicalAddress::new(pmm.app_data_pt),
        PhysicalAddress::new(pmm.app_data_at),
        0,
        A::pages(lm.app_data_size),
        PageFlags::APPD,
    );

    let arg = match lm.extra() {
        Some((at, size)) => {
            info!("bootstrap: additional data at {at}:{size}");
            at.as_u64()
        }
        None => 0,
    };

    let mut task = Task::bootstrap(
        kernel,
        (Segment::from_chunk(code), lm.code()),
        (Segment::from_chunk(data), lm.data()),
        lm.entry(),
        arg,
    )?;
    let idle_conf =
        Configuration::new(State::Ready, Criterion::IDLE).with_stack_size(IDLE_STACK_SIZE);
    task.spawn(idle_conf, idle, 0)?;
    Ok(task)
}
