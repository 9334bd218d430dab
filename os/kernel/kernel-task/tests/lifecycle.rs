mod common;

use common::{Event, FRAME, with_machine};
use kernel_info::boot::{FreeRange, LoadMap, MAX_FREE_RANGES, PhysicalMemoryMap};
use kernel_info::config::{IDLE_STACK_SIZE, MAX_THREADS, STACK_SIZE};
use kernel_info::SystemInfo;
use kernel_memory_addresses::LogicalAddress;
use kernel_task::{Configuration, Criterion, State, Task, TaskError, ThreadId, bootstrap};
use kernel_vmem::arch::{Flat, Sv39};
use kernel_vmem::{Chunk, Color, Directory, FrameAlloc, PageFlags, Segment};

#[test]
fn joined_task_releases_everything() {
    with_machine::<Sv39, _>(256, |m| {
        let before = m.frames.allocable(Color::WHITE);
        let code = Segment::new(m.memory, 2 * 4096, PageFlags::APPC, Color::WHITE).unwrap();
        let data = Segment::new(m.memory, 3 * 4096, PageFlags::APPD, Color::WHITE).unwrap();
        let code_frame = code.phy_address().unwrap();

        let mut task = Task::new(m.kernel, code, data, 0x40).unwrap();
        assert_eq!(task.code(), m.slot(0));
        assert_eq!(task.data(), m.slot(1));
        assert_eq!(task.entry(), m.slot(0) + 0x40);
        assert!(task.owns_segments());
        assert_eq!(task.address_space().physical(m.slot(0) + 8), Some(code_frame + 8));

        let main = task.main();
        let thread = task.thread(main).unwrap();
        assert_eq!(thread.state(), State::Ready);
        assert_eq!(thread.priority(), Criterion::MAIN);
        // Stacks go to the first free slot after code and data.
        assert_eq!(thread.stack(), Some((m.slot(2), STACK_SIZE)));
        assert_eq!(thread.context(), m.slot(2) + (STACK_SIZE - FRAME));
        assert_eq!(
            m.cpu.frames.borrow().as_slice(),
            &[(m.slot(2) + STACK_SIZE, task.entry(), 0)]
        );
        assert!(m.frames.allocable(Color::WHITE) < before);

        task.exit(main, 7).unwrap();
        assert_eq!(task.join(), Ok(7));
        assert_eq!(
            m.scheduler.take(),
            [
                Event::Insert(main, State::Ready),
                Event::Remove(main),
                Event::Wakeup(main)
            ]
        );

        drop(task);
        assert_eq!(m.frames.allocable(Color::WHITE), before);
    });
}

#[test]
fn joined_task_releases_everything_without_an_mmu() {
    with_machine::<Flat, _>(16, |m| {
        let before = m.frames.allocable(Color::WHITE);
        let code = Segment::new(m.memory, 1024, PageFlags::APPC, Color::WHITE).unwrap();
        let data = Segment::new(m.memory, 512, PageFlags::APPD, Color::WHITE).unwrap();
        let at = m.memory.phy_to_log(code.phy_address().unwrap());

        let mut task = Task::new(m.kernel, code, data, 0).unwrap();
        assert_eq!(Some(task.code()), at);
        task.exit(task.main(), 0).unwrap();
        assert_eq!(task.join(), Ok(0));
        drop(task);
        assert_eq!(m.frames.allocable(Color::WHITE), before);
    });
}

#[test]
fn join_waits_for_unfinished_threads() {
    with_machine::<Sv39, _>(128, |m| {
        let code = Segment::new(m.memory, 4096, PageFlags::APPC, Color::WHITE).unwrap();
        let data = Segment::new(m.memory, 4096, PageFlags::APPD, Color::WHITE).unwrap();
        let mut task = Task::new(m.kernel, code, data, 0).unwrap();
        let main = task.main();
        m.scheduler.take();

        // The scheduler here returns right away, as if woken too early.
        assert_eq!(task.join(), Err(TaskError::NotFinished(main)));
        assert_eq!(m.scheduler.take(), [Event::WaitFor(main)]);

        m.scheduler.running.set(Some(main));
        assert_eq!(task.join(), Err(TaskError::JoinSelf(main)));
    });
}

#[test]
fn entry_must_lie_in_the_code() {
    with_machine::<Sv39, _>(64, |m| {
        let before = m.frames.allocable(Color::WHITE);
        let code = Segment::new(m.memory, 4096, PageFlags::APPC, Color::WHITE).unwrap();
        let data = Segment::new(m.memory, 4096, PageFlags::APPD, Color::WHITE).unwrap();
        assert!(matches!(
            Task::new(m.kernel, code, data, 4096),
            Err(TaskError::EntryOutsideCode { offset: 4096, size: 4096 })
        ));
        assert_eq!(m.frames.allocable(Color::WHITE), before);
    });
}

#[test]
fn forked_task_shares_code_and_data() {
    with_machine::<Sv39, _>(256, |m| {
        let before = m.frames.allocable(Color::WHITE);
        let code = Segment::new(m.memory, 4096, PageFlags::APPC, Color::WHITE).unwrap();
        let data = Segment::new(m.memory, 4096, PageFlags::APPD, Color::WHITE).unwrap();
        let parent = Task::new(m.kernel, code, data, 0).unwrap();
        let code_frame = parent.code_segment().phy_address();
        let data_frame = parent.data_segment().phy_address();

        let child = parent.fork(0x10).unwrap();
        assert!(!child.owns_segments());
        assert_ne!(child.id(), parent.id());
        assert_ne!(child.address_space().pd(), parent.address_space().pd());
        assert_eq!(child.code(), parent.code());
        assert_eq!(child.entry(), parent.code() + 0x10);
        assert_eq!(child.address_space().physical(child.code()), code_frame);
        assert_eq!(child.address_space().physical(child.data()), data_frame);

        // The parent goes first; the child keeps the memory alive.
        drop(parent);
        assert_eq!(child.address_space().physical(child.code()), code_frame);
        assert_eq!(child.code_segment().phy_address(), code_frame);

        drop(child);
        assert_eq!(m.frames.allocable(Color::WHITE), before);
    });
}

#[test]
fn threads_come_and_go() {
    with_machine::<Sv39, _>(256, |m| {
        let code = Segment::new(m.memory, 4096, PageFlags::APPC, Color::WHITE).unwrap();
        let data = Segment::new(m.memory, 4096, PageFlags::APPD, Color::WHITE).unwrap();
        let mut task = Task::new(m.kernel, code, data, 0).unwrap();
        m.scheduler.take();

        let entry = task.code() + 0x100;
        let worker = task.spawn(Configuration::default(), entry, 42).unwrap();
        let (stack, size) = task.thread(worker).unwrap().stack().unwrap();
        assert_eq!((stack, size), (m.slot(3), STACK_SIZE));
        assert_eq!(m.cpu.frames.borrow().last(), Some(&(stack + size, entry, 42)));
        assert!(task.address_space().physical(stack).is_some());

        task.suspend(worker).unwrap();
        task.suspend(worker).unwrap();
        assert_eq!(task.thread(worker).unwrap().state(), State::Suspended);
        task.resume(worker).unwrap();
        assert_eq!(task.thread(worker).unwrap().state(), State::Ready);
        task.set_priority(worker, Criterion::HIGH).unwrap();
        assert_eq!(task.thread(worker).unwrap().priority(), Criterion::HIGH);

        task.destroy_thread(worker).unwrap();
        assert_eq!(task.address_space().physical(stack), None);
        assert_eq!(
            task.destroy_thread(worker),
            Err(TaskError::NoSuchThread(worker))
        );
        assert_eq!(
            m.scheduler.take(),
            [
                Event::Insert(worker, State::Ready),
                Event::Suspend(worker),
                Event::Resume(worker),
                Event::Update(worker, Criterion::HIGH),
                Event::Remove(worker),
                Event::Wakeup(worker),
            ]
        );
        assert_eq!(task.threads().count(), 1);
    });
}

#[test]
fn running_threads_give_up_the_cpu() {
    with_machine::<Sv39, _>(128, |m| {
        let code = Segment::new(m.memory, 4096, PageFlags::APPC, Color::WHITE).unwrap();
        let data = Segment::new(m.memory, 4096, PageFlags::APPD, Color::WHITE).unwrap();
        let mut task = Task::new(m.kernel, code, data, 0).unwrap();
        let conf = Configuration::new(State::Running, Criterion::NORMAL).with_stack_size(0);
        let t = task.spawn(conf, task.entry(), 0).unwrap();
        assert_eq!(task.thread(t).unwrap().stack(), None);
        m.scheduler.take();

        task.exit(t, -1).unwrap();
        task.exit(t, 5).unwrap();
        assert_eq!(task.thread(t).unwrap().status(), Some(-1));
        assert_eq!(task.join_thread(t), Ok(-1));
        assert_eq!(
            m.scheduler.take(),
            [Event::Remove(t), Event::Wakeup(t), Event::Reschedule]
        );
    });
}

#[test]
fn dispatched_threads_give_up_the_cpu_on_exit() {
    with_machine::<Sv39, _>(128, |m| {
        let code = Segment::new(m.memory, 4096, PageFlags::APPC, Color::WHITE).unwrap();
        let data = Segment::new(m.memory, 4096, PageFlags::APPD, Color::WHITE).unwrap();
        let mut task = Task::new(m.kernel, code, data, 0).unwrap();
        let main = task.main();
        m.scheduler.take();

        // Only the scheduler knows it switched to main.
        m.scheduler.running.set(Some(main));
        assert_eq!(task.thread(main).unwrap().state(), State::Ready);
        task.exit(main, 0).unwrap();
        assert_eq!(
            m.scheduler.take(),
            [Event::Remove(main), Event::Wakeup(main), Event::Reschedule]
        );
    });
}

#[test]
fn threads_move_through_the_state_machine() {
    with_machine::<Sv39, _>(128, |m| {
        let code = Segment::new(m.memory, 4096, PageFlags::APPC, Color::WHITE).unwrap();
        let data = Segment::new(m.memory, 4096, PageFlags::APPD, Color::WHITE).unwrap();
        let mut task = Task::new(m.kernel, code, data, 0).unwrap();
        let main = task.main();
        let worker = task
            .spawn(Configuration::default().with_stack_size(0), task.entry(), 0)
            .unwrap();
        fn state(task: &Task<'_, Sv39>, id: ThreadId) -> State {
            task.thread(id).unwrap().state()
        }
        m.scheduler.take();

        task.dispatch(main).unwrap();
        m.scheduler.running.set(Some(main));
        assert_eq!(state(&task, main), State::Running);
        assert_eq!(
            task.dispatch(main),
            Err(TaskError::BadTransition {
                thread: main,
                from: State::Running,
                to: State::Running
            })
        );

        // Running -> Ready -> Running.
        task.preempt(main).unwrap();
        assert_eq!(state(&task, main), State::Ready);
        task.dispatch(main).unwrap();

        // Running -> Waiting: the scheduler here returns before the worker ends.
        assert_eq!(task.join_thread(worker), Err(TaskError::NotFinished(worker)));
        assert_eq!(state(&task, main), State::Waiting);
        assert_eq!(task.thread(main).unwrap().joining(), Some(worker));
        assert_eq!(
            task.preempt(main),
            Err(TaskError::BadTransition {
                thread: main,
                from: State::Waiting,
                to: State::Ready
            })
        );

        // Waiting -> Ready once the worker finishes.
        m.scheduler.running.set(Some(worker));
        task.exit(worker, 3).unwrap();
        assert_eq!(state(&task, main), State::Ready);
        assert_eq!(task.thread(main).unwrap().joining(), None);

        // Ready -> Running -> Finishing.
        task.dispatch(main).unwrap();
        m.scheduler.running.set(Some(main));
        assert_eq!(task.join_thread(worker), Ok(3));
        assert_eq!(state(&task, main), State::Running);
        task.exit(main, 0).unwrap();
        assert_eq!(state(&task, main), State::Finishing);
        assert_eq!(
            task.dispatch(main),
            Err(TaskError::BadTransition {
                thread: main,
                from: State::Finishing,
                to: State::Running
            })
        );

        assert_eq!(
            m.scheduler.take(),
            [
                Event::WaitFor(worker),
                Event::Remove(worker),
                Event::Wakeup(worker),
                Event::Reschedule,
                Event::Remove(main),
                Event::Wakeup(main),
                Event::Reschedule,
            ]
        );
    });
}

#[test]
fn suspending_a_waiting_thread_forgets_the_join() {
    with_machine::<Sv39, _>(128, |m| {
        let code = Segment::new(m.memory, 4096, PageFlags::APPC, Color::WHITE).unwrap();
        let data = Segment::new(m.memory, 4096, PageFlags::APPD, Color::WHITE).unwrap();
        let mut task = Task::new(m.kernel, code, data, 0).unwrap();
        let main = task.main();
        let worker = task
            .spawn(Configuration::default().with_stack_size(0), task.entry(), 0)
            .unwrap();

        task.dispatch(main).unwrap();
        m.scheduler.running.set(Some(main));
        assert!(task.join_thread(worker).is_err());
        task.suspend(main).unwrap();
        assert_eq!(task.thread(main).unwrap().state(), State::Suspended);

        // The worker finishing does not wake a suspended thread.
        task.destroy_thread(worker).unwrap();
        assert_eq!(task.thread(main).unwrap().state(), State::Suspended);
        task.resume(main).unwrap();
        assert_eq!(task.thread(main).unwrap().state(), State::Ready);
    });
}

#[test]
fn thread_count_is_bounded() {
    with_machine::<Sv39, _>(128, |m| {
        let code = Segment::new(m.memory, 4096, PageFlags::APPC, Color::WHITE).unwrap();
        let data = Segment::new(m.memory, 4096, PageFlags::APPD, Color::WHITE).unwrap();
        let mut task = Task::new(m.kernel, code, data, 0).unwrap();
        let bare = Configuration::default().with_stack_size(0);
        for _ in 1..MAX_THREADS {
            task.spawn(bare, task.entry(), 0).unwrap();
        }
        assert_eq!(
            task.spawn(bare, task.entry(), 0),
            Err(TaskError::TooManyThreads { limit: MAX_THREADS })
        );
    });
}

#[test]
fn first_task_wraps_the_boot_image() {
    with_machine::<Sv39, _>(256, |m| {
        // What setup would have left behind: the image mapped in the master.
        let code = Chunk::new(m.memory, 2 * 4096, PageFlags::APPC, Color::WHITE).unwrap();
        let data = Chunk::new(m.memory, 4096, PageFlags::APPD, Color::WHITE).unwrap();
        let mut master = Directory::current(m.memory);
        master.attach_at(&code, m.slot(0)).unwrap();
        master.attach_at(&data, m.slot(1)).unwrap();
        let code_frame = code.phy_address().unwrap();

        let si = SystemInfo {
            pmm: PhysicalMemoryMap {
                free: [FreeRange::default(); MAX_FREE_RANGES],
                sys_pd: master.pd().as_u64(),
                app_code_pt: code.pt().as_u64(),
                app_code_at: code.at().as_u64(),
                app_data_pt: data.pt().as_u64(),
                app_data_at: data.at().as_u64(),
            },
            lm: LoadMap {
                has_app: true,
                has_ext: false,
                app_code: m.slot(0).as_u64(),
                app_code_size: 2 * 4096,
                app_data: m.slot(1).as_u64(),
                app_data_size: 4096,
                app_entry: m.slot(0).as_u64() + 0x80,
                app_extra: 0,
                app_extra_size: 0,
            },
        };

        let idle = LogicalAddress::new(0x8000_1000);
        let task = bootstrap(m.kernel, &si, idle).unwrap();
        assert_eq!(task.address_space().pd(), m.memory.current());
        assert_eq!(task.code(), m.slot(0));
        assert_eq!(task.entry(), m.slot(0) + 0x80);
        assert_eq!(task.code_segment().pages(), 2);
        assert_eq!(task.address_space().physical(m.slot(0)), Some(code_frame));

        let main = task.thread(task.main()).unwrap();
        assert_eq!(main.state(), State::Running);
        let idle_thread = task.threads().find(|t| t.id() != task.main()).unwrap();
        assert_eq!(idle_thread.state(), State::Ready);
        assert_eq!(idle_thread.priority(), Criterion::IDLE);
        assert_eq!(idle_thread.stack().map(|(_, size)| size), Some(IDLE_STACK_SIZE));
        assert_eq!(
            m.scheduler.take(),
            [
                Event::Insert(main.id(), State::Running),
                Event::Insert(idle_thread.id(), State::Ready)
            ]
        );

        // The wrappers release nothing; the boot chunks still own the memory.
        drop(task);
        assert_eq!(master.physical(m.slot(0)), None);
        assert_eq!(code.frame(0), Some(code_frame));
    });
}

#[test]
fn images_without_an_application_are_refused() {
    with_machine::<Sv39, _>(16, |m| {
        let si = SystemInfo {
            pmm: PhysicalMemoryMap {
                free: [FreeRange::default(); MAX_FREE_RANGES],
                sys_pd: 0,
                app_code_pt: 0,
                app_code_at: 0,
                app_data_pt: 0,
                app_data_at: 0,
            },
            lm: LoadMap {
                has_app: false,
                has_ext: false,
                app_code: 0,
                app_code_size: 0,
                app_data: 0,
                app_data_size: 0,
                app_entry: 0,
                app_extra: 0,
                app_extra_size: 0,
            },
        };
        assert!(matches!(
            bootstrap(m.kernel, &si, LogicalAddress::new(0)),
            Err(TaskError::NoImage)
        ));
    });
}
