use kernel_memory_addresses::PhysicalAddress;
use kernel_vmem::PhysMapper;

/// Header stored at the beginning of every **free** run.
///
/// ```text
/// +----------------------+-------------------------------+
/// | FreeRun (header)     |  rest of the run              |
/// +----------------------+-------------------------------+
/// ^ run base             ^ run base + size_of::<FreeRun>()
/// ```
///
/// - `units` is the length of the whole run, header included.
/// - `next` is the physical address of the next (lower) run, or `0`.
#[repr(C)]
struct FreeRun {
    units: u64,
    next: u64,
}

/// An intrusive free list of physical runs.
///
/// Runs are kept in **descending address order**. Allocation takes the
/// first run that is large enough and carves the request off its top, so
/// the header never moves and recently freed high memory is reused first.
/// Insertion merges with both neighbors.
///
/// # Invariants
/// - Runs never overlap and never touch: adjacent runs are always merged.
/// - Every unit is large enough to hold a [`FreeRun`].
/// - `free` is the sum of all run lengths.
pub(crate) struct FreeList {
    head: u64,
    free: u64,
    runs: usize,
    unit_bits: u32,
}

impl FreeList {
    pub(crate) const fn new(unit_bits: u32) -> Self {
        assert!(
            (1u64 << unit_bits) >= size_of::<FreeRun>() as u64,
            "allocation unit cannot hold a free-run header"
        );
        Self {
            head: 0,
            free: 0,
            runs: 0,
            unit_bits,
        }
    }

    /// Free units.
    pub(crate) const fn free(&self) -> u64 {
        self.free
    }

    pub(crate) const fn runs(&self) -> usize {
        self.runs
    }

    fn node(mapper: &dyn PhysMapper, pa: u64) -> *mut FreeRun {
        match mapper.phy_to_log(PhysicalAddress::new(pa)) {
            Some(la) => la.as_mut_ptr(),
            None => panic!("free run at {pa:#x} is not reachable"),
        }
    }

    fn read(mapper: &dyn PhysMapper, pa: u64) -> (u64, u64) {
        let p = Self::node(mapper, pa);
        unsafe { ((*p).units, (*p).next) }
    }

    fn end(&self, base: u64, units: u64) -> u64 {
        base + (units << self.unit_bits)
    }

    /// Make `owner.next` (or the head, for `owner == 0`) point at `target`.
    fn link(&mut self, mapper: &dyn PhysMapper, owner: u64, target: u64) {
        if owner == 0 {
            self.head = target;
        } else {
            unsafe { (*Self::node(mapper, owner)).next = target };
        }
    }

    /// Insert `[base, base + units)` and merge it with adjacent runs.
    ///
    /// # Safety
    /// The range must be unused memory that is not on any list, reachable
    /// through `mapper`.
    pub(crate) unsafe fn insert_merging(&mut self, mapper: &dyn PhysMapper, base: u64, units: u64) {
        assert!(units > 0, "empty run");
        assert!(base != 0, "null run");
        assert!(
            base.trailing_zeros() >= self.unit_bits,
            "run at {base:#x} is not unit aligned"
        );
        let end = self.end(base, units);

        // `above` is the lowest run above `base`, `pred` the run linking to it.
        let mut pred = 0;
        let mut above = 0;
        let mut below = self.head;
        while below != 0 && below > base {
            pred = above;
            above = below;
            below = Self::read(mapper, below).1;
        }
        assert!(below != base, "double free of {base:#x}");

        let mut merged = units;
        let mut owner = above;
        if above != 0 {
            assert!(end <= above, "double free of {base:#x} (overlaps run at {above:#x})");
            if end == above {
                merged += Self::read(mapper, above).0;
                owner = pred;
                self.runs -= 1;
            }
        }

        let below_end = if below == 0 {
            0
        } else {
            self.end(below, Self::read(mapper, below).0)
        };
        assert!(below_end <= base, "double free of {base:#x} (inside run at {below:#x})");
        if below != 0 && below_end == base {
            unsafe { (*Self::node(mapper, below)).units += merged };
            self.link(mapper, owner, below);
        } else {
            unsafe {
                Self::node(mapper, base).write(FreeRun {
                    units: merged,
                    next: below,
                });
            }
            self.link(mapper, owner, base);
            self.runs += 1;
        }
        self.free += units;
    }

    /// Take `units` from the first run that holds them.
    pub(crate) fn search_decrementing(&mut self, mapper: &dyn PhysMapper, units: u64) -> Option<u64> {
        debug_assert!(units > 0);
        let mut pred = 0;
        let mut cur = self.head;
        while cur != 0 {
            let (have, next) = Self::read(mapper, cur);
            if have >= units {
                let rest = have - units;
                if rest == 0 {
                    self.link(mapper, pred, next);
                    self.runs -= 1;
                } else {
                    unsafe { (*Self::node(mapper, cur)).units = rest };
                }
                self.free -= units;
                return Some(self.end(cur, rest));
            }
            pred = cur;
            cur = next;
        }
        None
    }

    /// Take exactly `[base, base + units)` if a single run covers it. The
    /// run is split around the claimed range.
    pub(crate) fn claim(&mut self, mapper: &dyn PhysMapper, base: u64, units: u64) -> bool {
        debug_assert!(units > 0);
        if base == 0 || base.trailing_zeros() < self.unit_bits {
            return false;
        }
        let end = self.end(base, units);

        // The only candidate is the highest run starting at or below `base`.
        let mut pred = 0;
        let mut cur = self.head;
        while cur != 0 && cur > base {
            pred = cur;
            cur = Self::read(mapper, cur).1;
        }
        if cur == 0 {
            return false;
        }
        let (have, next) = Self::read(mapper, cur);
        let run_end = self.end(cur, have);
        if run_end < end {
            return false;
        }

        let lead = (base - cur) >> self.unit_bits;
        let tail = (run_end - end) >> self.unit_bits;
        let below = if lead > 0 {
            unsafe { (*Self::node(mapper, cur)).units = lead };
            cur
        } else {
            self.runs -= 1;
            next
        };
        if tail > 0 {
            unsafe {
                Self::node(mapper, end).write(FreeRun {
                    units: tail,
                    next: below,
                });
            }
            self.link(mapper, pred, end);
            self.runs += 1;
        } else {
            self.link(mapper, pred, below);
        }
        self.free -= units;
        true
    }

    /// Length of the largest run.
    pub(crate) fn largest(&self, mapper: &dyn PhysMapper) -> u64 {
        let mut largest = 0;
        let mut cur = self.head;
        while cur != 0 {
            let (units, next) = Self::read(mapper, cur);
            largest = largest.max(units);
            cur = next;
        }
        largest
    }
}
