/// Periodic sample emitter.
///
/// The tick side runs in the timer ISR: it reads the active table, writes one
/// level to the DAC and advances a wrapping cursor. It never blocks, never
/// allocates and never logs.
///
/// The control side never takes a lock. It disables the emitter, pauses the
/// timer and waits out a tick already in flight on another core before
/// touching the table, and only re-enables both once the new cycle and
/// cursor are in place. The ISR therefore sees either the old table or the
/// new one, never a half-written one, and never waits on the control side.
use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

use crate::waveform::SampleTable;

/// Output primitive: put one level on the analog channel.
///
/// Called once per tick from interrupt context; must be infallible and O(1).
pub trait SampleSink {
    fn write_sample(&mut self, level: u8);
}

/// The periodic timer source that drives [`SampleEmitter::tick`].
pub trait ToneTimer {
    /// Stop raising tick interrupts.
    fn pause(&mut self);
    /// Start raising tick interrupts at the fixed period again.
    fn resume(&mut self);
}

/// Sample table shared between the control context (writer) and the tick
/// ISR (reader).
pub struct SampleEmitter<const N: usize> {
    table: UnsafeCell<SampleTable<N>>,
    active_len: AtomicUsize,
    cursor: AtomicUsize,
    enabled: AtomicBool,
    in_tick: AtomicBool,
    claimed: AtomicBool,
}

// SAFETY: the table is only written through `Paused`, which requires the
// unique `EmitterControl` and holds the emitter disabled with its timer
// paused, after any in-flight tick has cleared `in_tick`. The ISR reads the
// table only after observing `enabled`, which is published after the write
// completes.
unsafe impl<const N: usize> Sync for SampleEmitter<N> {}

impl<const N: usize> SampleEmitter<N> {
    /// Empty, disabled emitter. Suitable for a `static`.
    pub const fn new() -> Self {
        Self {
            table: UnsafeCell::new(SampleTable::new()),
            active_len: AtomicUsize::new(0),
            cursor: AtomicUsize::new(0),
            enabled: AtomicBool::new(false),
            in_tick: AtomicBool::new(false),
            claimed: AtomicBool::new(false),
        }
    }

    /// Claim the control side. Succeeds once per emitter.
    pub fn take_control(&self) -> Option<EmitterControl<'_, N>> {
        if self.claimed.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(EmitterControl { emitter: self })
        }
    }

    /// Timer ISR body: emit the next level of the active cycle.
    #[inline]
    pub fn tick<S: SampleSink + ?Sized>(&self, sink: &mut S) {
        if let Some(level) = self.next_sample() {
            sink.write_sample(level);
        }
    }

    /// Advance the cursor and return the level at its previous position,
    /// or `None` while disabled.
    #[inline]
    pub fn next_sample(&self) -> Option<u8> {
        // Pairs with the SeqCst store/load in `EmitterControl::pause`: either
        // this tick sees `enabled == false`, or pause sees `in_tick` and waits.
        self.in_tick.store(true, Ordering::SeqCst);
        if !self.enabled.load(Ordering::SeqCst) {
            self.in_tick.store(false, Ordering::Release);
            return None;
        }
        let len = self.active_len.load(Ordering::Relaxed);
        let mut cursor = self.cursor.load(Ordering::Relaxed);
        if cursor >= len {
            cursor = 0;
        }
        // SAFETY: enabled implies no `Paused` guard is alive, so nothing
        // writes the table; `cursor < len <= N` after the wrap above.
        let level = unsafe { (*self.table.get()).level(cursor) };
        self.cursor.store(cursor + 1, Ordering::Relaxed);
        self.in_tick.store(false, Ordering::Release);
        Some(level)
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Number of samples in the cycle being played.
    #[inline]
    pub fn active_len(&self) -> usize {
        self.active_len.load(Ordering::Relaxed)
    }

    /// Position the next tick will read (before wraparound).
    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }
}

impl<const N: usize> Default for SampleEmitter<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique control-plane handle of a [`SampleEmitter`].
pub struct EmitterControl<'a, const N: usize> {
    emitter: &'a SampleEmitter<N>,
}

impl<'a, const N: usize> EmitterControl<'a, N> {
    /// Disable the emitter and pause its timer. The returned guard is the
    /// only way to reach the table mutably.
    pub fn pause<'c, T: ToneTimer + ?Sized>(&'c mut self, timer: &'c mut T) -> Paused<'c, N, T> {
        self.emitter.enabled.store(false, Ordering::SeqCst);
        timer.pause();
        // A tick that started before the store above may still be reading
        // on another core. On a single core this never spins.
        while self.emitter.in_tick.load(Ordering::SeqCst) {
            core::hint::spin_loop();
        }
        Paused {
            emitter: self.emitter,
            timer,
        }
    }

    /// The table as last written.
    pub fn table(&self) -> &SampleTable<N> {
        // SAFETY: writes need `&mut self` (through `pause`), so none can
        // overlap this shared borrow; the ISR only reads.
        unsafe { &*self.emitter.table.get() }
    }

    pub fn emitter(&self) -> &'a SampleEmitter<N> {
        self.emitter
    }
}

/// Critical section of a reconfiguration: emitter disabled, timer paused.
///
/// Dropping the guard without [`Paused::resume`] leaves the tone off.
pub struct Paused<'c, const N: usize, T: ToneTimer + ?Sized> {
    emitter: &'c SampleEmitter<N>,
    timer: &'c mut T,
}

impl<'c, const N: usize, T: ToneTimer + ?Sized> Paused<'c, N, T> {
    pub fn table_mut(&mut self) -> &mut SampleTable<N> {
        // SAFETY: the emitter is disabled and its timer paused for the
        // lifetime of this guard, and the guard borrows the unique control
        // handle mutably.
        unsafe { &mut *self.emitter.table.get() }
    }

    /// Publish the table's cycle, rewind the cursor, re-enable and restart
    /// the timer. Returns the active length, or `None` (still paused) if
    /// the table is empty.
    pub fn resume(self) -> Option<usize> {
        // SAFETY: as in `table_mut`.
        let len = unsafe { (*self.emitter.table.get()).len() };
        if len == 0 {
            return None;
        }
        self.emitter.cursor.store(0, Ordering::Relaxed);
        self.emitter.active_len.store(len, Ordering::Relaxed);
        self.emitter.enabled.store(true, Ordering::Release);
        self.timer.resume();
        Some(len)
    }
}

const SLOT_EMPTY: u8 = 0;
const SLOT_WRITING: u8 = 1;
const SLOT_READY: u8 = 2;

/// A value handed to interrupt context once at startup.
///
/// Filled once with [`IsrSlot::put`] before the interrupt is enabled, then
/// read by the handler without locks. Until it is filled, every read
/// returns `None`.
pub struct IsrSlot<T> {
    state: AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
}

// SAFETY: the value is written exactly once, before `state` is published as
// READY (Release); readers observe READY (Acquire) before touching it.
// Shared access requires `T: Sync`; exclusive access is `unsafe` and left
// to the caller.
unsafe impl<T: Send> Sync for IsrSlot<T> {}

impl<T> IsrSlot<T> {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(SLOT_EMPTY),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Store the value. A slot that is already filled hands it back.
    pub fn put(&self, value: T) -> Result<(), T> {
        if self
            .state
            .compare_exchange(SLOT_EMPTY, SLOT_WRITING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(value);
        }
        // SAFETY: the successful exchange makes this the only writer, and no
        // reader looks at the value before READY.
        unsafe { (*self.value.get()).write(value) };
        self.state.store(SLOT_READY, Ordering::Release);
        Ok(())
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.state.load(Ordering::Acquire) == SLOT_READY
    }

    /// Shared access from any context.
    #[inline]
    pub fn get(&self) -> Option<&T>
    where
        T: Sync,
    {
        if !self.is_ready() {
            return None;
        }
        // SAFETY: READY means the value is initialized and never written again.
        Some(unsafe { (*self.value.get()).assume_init_ref() })
    }

    /// Exclusive access for the single context that owns the value.
    ///
    /// # Safety
    ///
    /// The caller must be the only context that ever calls `get_mut` on
    /// this slot, must not call `get` on it, and must not hold two returned
    /// references at once. An interrupt handler that cannot preempt itself
    /// satisfies this.
    #[inline]
    pub unsafe fn get_mut(&self) -> Option<&mut T> {
        if !self.is_ready() {
            return None;
        }
        Some(unsafe { (*self.value.get()).assume_init_mut() })
    }
}

impl<T> Default for IsrSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
