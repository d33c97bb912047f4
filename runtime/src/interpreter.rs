//! Executes a bytecode program against an input in breadth-first mode,
//! without backtracking.
//!
//! All pending alternatives of the program are simulated in lockstep, i.e.
//! the logical threads of the NFA share a common input index and are fed one
//! code unit at a time. Together with the per-program-counter deduplication
//! this gives a running time linear in the input length, in contrast to a
//! backtracking implementation.
//!
//! Reproducing backtracker semantics without backtracking requires care
//! around when a search may stop. Consider the program for
//! `abc|..|[a-c]{10,}` running against `"abcccccccccccccc"`. All three
//! alternatives match, and a backtracking engine reports `abc` because it
//! explores the first alternative before the others. In lockstep execution
//! the thread for the second alternative accepts first, after two code
//! units. That acceptance aborts the lower-priority `[a-c]{10,}` thread,
//! whose match could only be worse, but the higher-priority `abc` thread is
//! still blocked on its third code unit and must be run to completion: its
//! match, if it completes, supersedes the earlier acceptance. The
//! interpreter therefore keeps threads in priority order and only finishes
//! a search once a match is committed and no higher-priority thread remains
//! blocked.

use smallvec::SmallVec;

use crate::{InstConsumeRange, InstFork, InstIndex, InstJmp, Instructions, MatchRange, Opcode};

/// Input code-unit width over which the interpreter is instantiated, either
/// one or two bytes per unit. Comparison against consume ranges is always
/// performed on the 16-bit widening of a unit.
pub trait CodeUnit: Copy {
    fn as_u16(self) -> u16;
}

impl CodeUnit for u8 {
    #[inline]
    fn as_u16(self) -> u16 {
        u16::from(self)
    }
}

impl CodeUnit for u16 {
    #[inline]
    fn as_u16(self) -> u16 {
        self
    }
}

/// Finds up to `max_match_num` successive non-overlapping matches of
/// `program` in a one-byte-per-code-unit `input`, beginning at offset
/// `start`, and writes their boundaries to `matches_out`. Returns the number
/// of matches found.
///
/// Preconditions, asserted at entry: `program` is non-empty and upholds the
/// operand invariants of [`Instructions::validate`], `start <= input.len()`,
/// and `matches_out` holds at least `max_match_num` elements.
pub fn find_matches_one_byte(
    program: &Instructions,
    input: &[u8],
    start: usize,
    matches_out: &mut [MatchRange],
    max_match_num: usize,
) -> usize {
    NfaInterpreter::new(program, input, start).find_matches(matches_out, max_match_num)
}

/// The two-byte-per-code-unit equivalent of [`find_matches_one_byte`]. Code
/// units are compared to consume ranges without any interpretation, so
/// unpaired surrogates participate in matching like any other value.
pub fn find_matches_two_byte(
    program: &Instructions,
    input: &[u16],
    start: usize,
    matches_out: &mut [MatchRange],
    max_match_num: usize,
) -> usize {
    NfaInterpreter::new(program, input, start).find_matches(matches_out, max_match_num)
}

/// The state of a logical thread executing the bytecode. (Not to be confused
/// with an OS thread.)
#[derive(Debug, Clone, Copy)]
struct InterpreterThread {
    /// The index within the program of the next instruction to be executed.
    pc: InstIndex,
    /// The input offset at which this thread started matching.
    match_begin: usize,
}

/// A single-use simulation of one program over one input. The interpreter
/// owns its scratch state exclusively; the program and input are borrowed
/// read-only.
struct NfaInterpreter<'a, C> {
    program: &'a Instructions,
    input: &'a [C],
    input_index: usize,

    /// `pc_last_input_index[pc]` records the value of `input_index` the last
    /// time a thread at `pc` was stepped. One slot per instruction.
    pc_last_input_index: Vec<Option<usize>>,

    /// Threads that can potentially (but not necessarily) continue without
    /// input. Sorted from low to high priority.
    active_threads: SmallVec<[InterpreterThread; 64]>,

    /// Threads parked on an input-consuming instruction. Sorted from high to
    /// low priority, so the opposite of `active_threads`.
    blocked_threads: SmallVec<[InterpreterThread; 64]>,

    /// The match of the highest-priority accepting thread seen so far during
    /// the current search.
    best_match: Option<MatchRange>,
}

impl<'a, C: CodeUnit> NfaInterpreter<'a, C> {
    fn new(program: &'a Instructions, input: &'a [C], start: usize) -> Self {
        assert!(!program.is_empty());
        assert!(start <= input.len());
        debug_assert_eq!(Ok(()), program.validate());

        Self {
            program,
            input,
            input_index: start,
            pc_last_input_index: vec![None; program.len()],
            active_threads: SmallVec::new(),
            blocked_threads: SmallVec::new(),
            best_match: None,
        }
    }

    /// Finds up to `max_match_num` matches, beginning at the current input
    /// index, and writes their boundaries to `matches_out`. Returns the
    /// number of matches found.
    ///
    /// Successive searches resume at the end of the previous match. A
    /// zero-length match additionally advances the cursor by one code unit
    /// (or ends the loop at the end of input), so the same empty span is
    /// never reported twice and the driver always makes progress.
    fn find_matches(&mut self, matches_out: &mut [MatchRange], max_match_num: usize) -> usize {
        assert!(matches_out.len() >= max_match_num);

        let mut match_num = 0;
        while match_num != max_match_num {
            let found = match self.find_next_match() {
                Some(found) => found,
                None => break,
            };

            matches_out[match_num] = found;
            match_num += 1;

            if found.is_empty() {
                if found.end == self.input.len() {
                    break;
                }
                self.set_input_index(found.end + 1);
            } else {
                self.set_input_index(found.end);
            }
        }

        match_num
    }

    /// Changes the current input index for future searches.
    fn set_input_index(&mut self, new_input_index: usize) {
        debug_assert!(new_input_index <= self.input.len());

        self.input_index = new_input_index;
    }

    /// Finds the next match, beginning the search at the current input
    /// index.
    fn find_next_match(&mut self) -> Option<MatchRange> {
        debug_assert!(self.active_threads.is_empty());
        debug_assert!(self.blocked_threads.is_empty());
        debug_assert!(self.best_match.is_none());

        self.pc_last_input_index.fill(None);

        // All threads start at the first instruction.
        self.active_threads.push(InterpreterThread {
            pc: InstIndex::from(0),
            match_begin: self.input_index,
        });
        // Run the initial thread, potentially forking new threads, until
        // every thread is blocked without further input.
        self.run_active_threads();

        // The search stops once either the input is exhausted, or a match
        // has been committed and no thread with higher priority than the
        // accepting one remains. Lower-priority threads were aborted at the
        // accept, so the latter simply means `blocked_threads` is empty.
        while self.input_index != self.input.len()
            && !(self.best_match.is_some() && self.blocked_threads.is_empty())
        {
            debug_assert!(self.active_threads.is_empty());

            let input_char = self.input[self.input_index].as_u16();
            self.input_index += 1;

            // While no match has been found, seed a thread with least
            // priority that attempts a match starting after `input_char`.
            if self.best_match.is_none() {
                self.active_threads.push(InterpreterThread {
                    pc: InstIndex::from(0),
                    match_begin: self.input_index,
                });
            }

            self.flush_blocked_threads(input_char);
            self.run_active_threads();
        }

        let result = self.best_match.take();
        self.blocked_threads.clear();
        self.active_threads.clear();

        result
    }

    /// Runs each active thread until it can't continue without further
    /// input. `active_threads` is empty afterwards, and `blocked_threads`
    /// is sorted from high to low priority.
    fn run_active_threads(&mut self) {
        while let Some(t) = self.active_threads.pop() {
            self.run_active_thread(t);
        }
    }

    /// Runs a single thread `t` until it executes a consume or accept
    /// instruction, or until its PC value was already processed at the
    /// current input index.
    ///
    /// Forked siblings are parked on `active_threads` and picked up only
    /// after the continuation at PC+1 has been stepped to completion in this
    /// call, which keeps the continuation at the higher priority and so
    /// preserves the left bias of alternation.
    fn run_active_thread(&mut self, mut t: InterpreterThread) {
        loop {
            if self.is_pc_processed(t.pc) {
                return;
            }
            self.mark_pc_processed(t.pc);

            match self.program[t.pc] {
                Opcode::ConsumeRange(_) => {
                    self.blocked_threads.push(t);
                    return;
                }
                Opcode::Fork(InstFork { next }) => {
                    self.active_threads.push(InterpreterThread {
                        pc: next,
                        match_begin: t.match_begin,
                    });
                    t.pc = t.pc + 1;
                }
                Opcode::Jmp(InstJmp { next }) => t.pc = next,
                Opcode::Accept => {
                    self.best_match = Some(MatchRange::new(t.match_begin, self.input_index));
                    // Remaining active threads have strictly lower priority
                    // and could only produce worse matches.
                    self.active_threads.clear();
                    return;
                }
            }
        }
    }

    /// Unblocks all blocked threads by feeding them `input_char`. Must be
    /// called with `input_index` already pointing past `input_char` so that
    /// `pc_last_input_index` is updated correctly by subsequent stepping.
    fn flush_blocked_threads(&mut self, input_char: u16) {
        // `blocked_threads` is sorted from high to low priority while
        // `active_threads` wants low to high, hence the reverse traversal.
        for i in (0..self.blocked_threads.len()).rev() {
            let mut t = self.blocked_threads[i];

            debug_assert!(self.program[t.pc].is_consuming());
            if let Opcode::ConsumeRange(range) = self.program[t.pc] {
                if range.contains(input_char) {
                    t.pc = t.pc + 1;
                    self.active_threads.push(t);
                }
            }
        }
        self.blocked_threads.clear();
    }

    /// Two threads at the same PC value match iff the other does, so the
    /// later-arriving one is redundant and can be dropped: threads are
    /// stepped in priority order, so the first arrival is guaranteed to be
    /// the higher-priority one. Arrival is recorded per PC as the input
    /// index of the last step at that PC.
    fn is_pc_processed(&self, pc: InstIndex) -> bool {
        debug_assert!(self.pc_last_input_index[pc.as_usize()] <= Some(self.input_index));

        self.pc_last_input_index[pc.as_usize()] == Some(self.input_index)
    }

    fn mark_pc_processed(&mut self, pc: InstIndex) {
        debug_assert!(self.pc_last_input_index[pc.as_usize()] <= Some(self.input_index));

        self.pc_last_input_index[pc.as_usize()] = Some(self.input_index);
    }
}
