//! Property checks comparing the lockstep interpreter against a reference
//! depth-first backtracking evaluation of the same instruction set.
//!
//! The backtracker explores fork continuations before fork targets, which
//! makes its first reported match the leftmost/highest-priority one by
//! construction. The interpreter must reproduce that choice for every
//! program and input pair, despite never backtracking.

use std::collections::HashSet;

use pretty_assertions::assert_eq;
use regex_nfa_runtime::*;

/// Evaluates the program depth-first from `(pc, index)`, returning the end
/// offset of the first accepting path in priority order.
///
/// The visited set stands in for the interpreter's dedup table: a
/// `(pc, index)` pair is explored at most once, so fork/jump cycles
/// terminate and previously failed positions are not retried.
fn backtrack_at(
    prog: &Instructions,
    input: &[u16],
    pc: usize,
    index: usize,
    visited: &mut HashSet<(usize, usize)>,
) -> Option<usize> {
    if !visited.insert((pc, index)) {
        return None;
    }

    match prog.as_ref()[pc] {
        Opcode::ConsumeRange(range) => input
            .get(index)
            .filter(|&&unit| range.contains(unit))
            .and_then(|_| backtrack_at(prog, input, pc + 1, index + 1, visited)),
        Opcode::Fork(InstFork { next }) => backtrack_at(prog, input, pc + 1, index, visited)
            .or_else(|| backtrack_at(prog, input, next.as_usize(), index, visited)),
        Opcode::Jmp(InstJmp { next }) => backtrack_at(prog, input, next.as_usize(), index, visited),
        Opcode::Accept => Some(index),
    }
}

fn backtrack_next_match(prog: &Instructions, input: &[u16], start: usize) -> Option<MatchRange> {
    (start..=input.len()).find_map(|begin| {
        let mut visited = HashSet::new();
        backtrack_at(prog, input, 0, begin, &mut visited)
            .map(|end| MatchRange::new(begin, end))
    })
}

/// The multi-match driver of the reference evaluation, following the same
/// cursor-advancement policy as the interpreter: successive searches resume
/// at the previous match end, with an extra one-unit step after an empty
/// match.
fn backtrack_find_matches(
    prog: &Instructions,
    input: &[u16],
    start: usize,
    max: usize,
) -> Vec<MatchRange> {
    let mut matches = Vec::new();
    let mut index = start;

    while matches.len() < max {
        let found = match backtrack_next_match(prog, input, index) {
            Some(found) => found,
            None => break,
        };
        matches.push(found);

        if found.is_empty() {
            if found.end == input.len() {
                break;
            }
            index = found.end + 1;
        } else {
            index = found.end;
        }
    }

    matches
}

fn consume(unit: u8) -> Opcode {
    Opcode::ConsumeRange(InstConsumeRange::new(u16::from(unit), u16::from(unit)))
}

fn consume_range(min: u8, max: u8) -> Opcode {
    Opcode::ConsumeRange(InstConsumeRange::new(u16::from(min), u16::from(max)))
}

fn fork(next: u32) -> Opcode {
    Opcode::Fork(InstFork::new(InstIndex::from(next)))
}

fn jmp(next: u32) -> Opcode {
    Opcode::Jmp(InstJmp::new(InstIndex::from(next)))
}

/// A catalog of programs covering the epsilon-closure and priority shapes
/// expressible in the instruction set, each annotated with the pattern it
/// encodes.
fn program_catalog() -> Vec<(&'static str, Instructions)> {
    vec![
        (
            "ab",
            Instructions::default().with_opcodes(vec![
                consume(b'a'),
                consume(b'b'),
                Opcode::Accept,
            ]),
        ),
        (
            "a|b",
            Instructions::default().with_opcodes(vec![
                fork(3),
                consume(b'a'),
                jmp(4),
                consume(b'b'),
                Opcode::Accept,
            ]),
        ),
        (
            "a|aa",
            Instructions::default().with_opcodes(vec![
                fork(3),
                consume(b'a'),
                jmp(6),
                consume(b'a'),
                consume(b'a'),
                jmp(6),
                Opcode::Accept,
            ]),
        ),
        (
            "aa|a",
            Instructions::default().with_opcodes(vec![
                fork(4),
                consume(b'a'),
                consume(b'a'),
                jmp(5),
                consume(b'a'),
                Opcode::Accept,
            ]),
        ),
        (
            "a*",
            Instructions::default().with_opcodes(vec![
                fork(3),
                consume(b'a'),
                jmp(0),
                Opcode::Accept,
            ]),
        ),
        (
            "a+",
            Instructions::default().with_opcodes(vec![
                consume(b'a'),
                fork(3),
                jmp(0),
                Opcode::Accept,
            ]),
        ),
        (
            "a?b",
            Instructions::default().with_opcodes(vec![
                fork(2),
                consume(b'a'),
                consume(b'b'),
                Opcode::Accept,
            ]),
        ),
        (
            "(a*)*",
            Instructions::default().with_opcodes(vec![
                fork(5),
                fork(4),
                consume(b'a'),
                jmp(1),
                jmp(0),
                Opcode::Accept,
            ]),
        ),
        (
            "a(bc|cd)*e",
            Instructions::default().with_opcodes(vec![
                consume(b'a'),
                fork(9),
                fork(6),
                consume(b'b'),
                consume(b'c'),
                jmp(8),
                consume(b'c'),
                consume(b'd'),
                jmp(1),
                consume(b'e'),
                Opcode::Accept,
            ]),
        ),
        (
            "[a-c][a-c]",
            Instructions::default().with_opcodes(vec![
                consume_range(b'a', b'c'),
                consume_range(b'a', b'c'),
                Opcode::Accept,
            ]),
        ),
        (
            "empty pattern",
            Instructions::default().with_opcodes(vec![Opcode::Accept]),
        ),
        (
            "epsilon cycle without accept path",
            Instructions::default().with_opcodes(vec![
                fork(2),
                jmp(0),
                consume(b'a'),
                jmp(0),
            ]),
        ),
    ]
}

fn input_catalog() -> Vec<&'static [u8]> {
    vec![
        b"",
        b"a",
        b"b",
        b"aa",
        b"ab",
        b"ba",
        b"aaab",
        b"abab",
        b"abccdbce",
        b"xyz",
        b"acdeaab",
        b"aabbccdde",
    ]
}

#[test]
fn should_match_backtracker_verdict_for_single_matches() {
    for (prog_id, (pattern, prog)) in program_catalog().into_iter().enumerate() {
        for (input_id, input) in input_catalog().into_iter().enumerate() {
            let two_byte: Vec<u16> = input.iter().copied().map(u16::from).collect();

            let expected = backtrack_next_match(&prog, &two_byte, 0)
                .map(|found| vec![found])
                .unwrap_or_default();

            let mut matches = [MatchRange::default(); 1];
            let found = find_matches_one_byte(&prog, input, 0, &mut matches, 1);

            assert_eq!(
                (prog_id, pattern, input_id, expected),
                (prog_id, pattern, input_id, matches[..found].to_vec())
            );
        }
    }
}

#[test]
fn should_match_backtracker_verdict_for_multi_matches() {
    const MAX_MATCH_NUM: usize = 4;

    for (prog_id, (pattern, prog)) in program_catalog().into_iter().enumerate() {
        for (input_id, input) in input_catalog().into_iter().enumerate() {
            let two_byte: Vec<u16> = input.iter().copied().map(u16::from).collect();

            let expected = backtrack_find_matches(&prog, &two_byte, 0, MAX_MATCH_NUM);

            let mut matches = [MatchRange::default(); MAX_MATCH_NUM];
            let found = find_matches_one_byte(&prog, input, 0, &mut matches, MAX_MATCH_NUM);

            assert_eq!(
                (prog_id, pattern, input_id, expected),
                (prog_id, pattern, input_id, matches[..found].to_vec())
            );
        }
    }
}

#[test]
fn should_match_backtracker_verdict_across_start_offsets() {
    for (prog_id, (pattern, prog)) in program_catalog().into_iter().enumerate() {
        let input = b"abcabca";
        let two_byte: Vec<u16> = input.iter().copied().map(u16::from).collect();

        for start in 0..=input.len() {
            let expected = backtrack_next_match(&prog, &two_byte, start)
                .map(|found| vec![found])
                .unwrap_or_default();

            let mut matches = [MatchRange::default(); 1];
            let found = find_matches_one_byte(&prog, input, start, &mut matches, 1);

            assert_eq!(
                (prog_id, pattern, start, expected),
                (prog_id, pattern, start, matches[..found].to_vec())
            );
        }
    }
}

#[test]
fn should_match_backtracker_verdict_for_two_byte_inputs() {
    // a surrogate-range alternation only expressible over 16-bit units
    let prog = Instructions::default().with_opcodes(vec![
        fork(4),
        Opcode::ConsumeRange(InstConsumeRange::new(0xD800, 0xDBFF)),
        Opcode::ConsumeRange(InstConsumeRange::new(0xDC00, 0xDFFF)),
        jmp(5),
        Opcode::ConsumeRange(InstConsumeRange::new(0x3041, 0x3096)),
        Opcode::Accept,
    ]);

    let inputs: Vec<Vec<u16>> = vec![
        vec![],
        vec![0x0061],
        vec![0xD83D, 0xDE00],
        vec![0x3042, 0xD83D, 0xDE00],
        vec![0xDE00, 0xD83D],
        vec![0x0061, 0x3093, 0x0062],
    ];

    for (input_id, input) in inputs.into_iter().enumerate() {
        let expected = backtrack_next_match(&prog, &input, 0)
            .map(|found| vec![found])
            .unwrap_or_default();

        let mut matches = [MatchRange::default(); 1];
        let found = find_matches_two_byte(&prog, &input, 0, &mut matches, 1);

        assert_eq!(
            (input_id, expected),
            (input_id, matches[..found].to_vec())
        );
    }
}
