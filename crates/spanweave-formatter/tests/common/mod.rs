//! Text corpora, chunkings and expectations shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;

use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use spanweave_formatter::{BufferPool, FormattedRecord, RecordFormatterTask, TaskOutcome};
use spanweave_types::{BufferHandle, SequenceNumber};

const WORDS: &[&str] = &["alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta"];

/// Newline-separated lines of random words; some lines are empty.
pub fn random_text(rng: &mut StdRng, lines: usize) -> Vec<u8> {
    let mut text = Vec::new();
    for i in 0..lines {
        if i > 0 {
            text.push(b'\n');
        }
        if rng.gen_bool(0.1) {
            continue;
        }
        let words = rng.gen_range(1..=4);
        for w in 0..words {
            if w > 0 {
                text.push(b' ');
            }
            let word = WORDS[rng.gen_range(0..WORDS.len())];
            text.extend_from_slice(word.as_bytes());
        }
        text.extend_from_slice(i.to_string().as_bytes());
    }
    if rng.gen_bool(0.5) {
        text.push(b'\n');
    }
    text
}

/// Cut `text` into consecutive chunks of `1..=max_chunk` bytes.
pub fn random_chunks(rng: &mut StdRng, text: &[u8], max_chunk: usize) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let size = rng.gen_range(1..=max_chunk).min(rest.len());
        let (chunk, tail) = rest.split_at(size);
        chunks.push(chunk.to_vec());
        rest = tail;
    }
    if chunks.is_empty() {
        chunks.push(Vec::new());
    }
    chunks
}

/// Non-empty records of `text`, sorted.
pub fn expected_records(text: &[u8], delimiter: &[u8]) -> Vec<Vec<u8>> {
    let mut records = Vec::new();
    let mut rest = text;
    loop {
        match rest.windows(delimiter.len()).position(|w| w == delimiter) {
            Some(at) => {
                records.push(rest[..at].to_vec());
                rest = &rest[at + delimiter.len()..];
            }
            None => {
                records.push(rest.to_vec());
                break;
            }
        }
    }
    records.retain(|r| !r.is_empty());
    records.sort();
    records
}

/// Pool every chunk and return the handles in stream order.
pub fn pool_chunks(pool: &BufferPool, chunks: Vec<Vec<u8>>) -> Vec<BufferHandle> {
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| pool.insert(SequenceNumber::new(i as u64), chunk))
        .collect()
}

/// Process `handles` in shuffled order on the current thread, repeating
/// out-of-range buffers, then stop the task.
pub fn run_shuffled(
    task: &RecordFormatterTask,
    mut handles: Vec<BufferHandle>,
    rng: &mut StdRng,
) -> Vec<FormattedRecord> {
    let last = SequenceNumber::new(handles.len() as u64 - 1);
    handles.shuffle(rng);
    let mut queue: VecDeque<BufferHandle> = handles.into_iter().collect();
    let mut records = Vec::new();
    while let Some(handle) = queue.pop_front() {
        match task.process(handle).expect("process") {
            TaskOutcome::Done(emitted) => records.extend(emitted),
            TaskOutcome::Repeat => queue.push_back(handle),
        }
    }
    records.extend(task.stop(last).expect("stop"));
    records
}

/// Record bytes, sorted.
pub fn sorted_bytes(records: &[FormattedRecord]) -> Vec<Vec<u8>> {
    let mut bytes: Vec<Vec<u8>> = records.iter().map(|r| r.bytes.clone()).collect();
    bytes.sort();
    bytes
}
