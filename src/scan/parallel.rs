//! Parallel scanner: one reader thread, M worker threads, bounded
//! channels, `batch_id`-ordered reassembly.
//!
//! A bounded queue of owned batches sits between a reader thread and M
//! worker threads; a result queue with an ordering reassembler collects
//! their output, and a shared atomic flag handles cancellation once a
//! row limit is reached. `std::thread::scope` lets every thread borrow
//! `ctx` directly instead of requiring `'static` + `Arc`-wrapped clones.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::eval::eval;
use crate::field_parser;
use crate::record_reader::RecordReader;

use super::ScanContext;

const READER_BUFFER_CAPACITY: usize = 2 * 1024 * 1024;

struct RowBatch {
    batch_id: u64,
    rows: Vec<Vec<Vec<u8>>>,
}

struct BatchResult {
    batch_id: u64,
    /// Already projected: each inner `Vec<Vec<u8>>` holds exactly the
    /// projected columns, in projection order.
    rows: Vec<Vec<Vec<u8>>>,
}

pub fn scan_file_parallel<W: Write>(
    path: &Path,
    header_len: u64,
    ctx: &ScanContext,
    config: &EngineConfig,
    out: &mut csv::Writer<W>,
) -> EngineResult<u64> {
    let cancel = AtomicBool::new(false);
    let reader_error: Mutex<Option<EngineError>> = Mutex::new(None);

    let (batch_tx, batch_rx) = sync_channel::<RowBatch>(config.channel_capacity());
    let (result_tx, result_rx) = sync_channel::<BatchResult>(config.channel_capacity());
    let batch_rx = Mutex::new(batch_rx);

    let mut emitted = 0u64;

    std::thread::scope(|scope| {
        scope.spawn(move || {
            if let Err(e) = run_reader(path, header_len, config, &cancel, batch_tx) {
                *reader_error.lock().unwrap() = Some(e);
            }
        });

        for _ in 0..config.parallelism {
            let result_tx = result_tx.clone();
            let batch_rx = &batch_rx;
            scope.spawn(move || run_worker(ctx, batch_rx, result_tx));
        }
        drop(result_tx);

        emitted = drain_results(result_rx, ctx, config, &cancel, out)?;
        EngineResult::Ok(())
    })?;

    if let Some(err) = reader_error.into_inner().unwrap() {
        return Err(err);
    }

    Ok(emitted)
}

fn run_reader(
    path: &Path,
    header_len: u64,
    config: &EngineConfig,
    cancel: &AtomicBool,
    batch_tx: SyncSender<RowBatch>,
) -> EngineResult<()> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(header_len))?;
    let mut reader = BufReader::with_capacity(READER_BUFFER_CAPACITY, file);
    let mut record_reader = RecordReader::with_offset(&mut reader, header_len);

    let mut raw_buf = Vec::new();
    let mut fields = Vec::new();
    let mut batch_id = 0u64;
    let mut rows: Vec<Vec<Vec<u8>>> = Vec::with_capacity(config.batch_rows);

    loop {
        if cancel.load(Ordering::Acquire) {
            return Ok(());
        }

        let Some(_raw) = record_reader.read_raw(&mut raw_buf)? else {
            break;
        };
        if raw_buf.is_empty() {
            continue;
        }

        field_parser::parse_record(&raw_buf, &mut fields)?;
        rows.push(fields.iter().map(|f| f.to_vec()).collect());

        if rows.len() >= config.batch_rows {
            let batch = RowBatch {
                batch_id,
                rows: std::mem::replace(&mut rows, Vec::with_capacity(config.batch_rows)),
            };
            batch_id += 1;
            if !send_batch_or_cancel(&batch_tx, batch, cancel) {
                return Ok(());
            }
        }
    }

    if !rows.is_empty() {
        send_batch_or_cancel(&batch_tx, RowBatch { batch_id, rows }, cancel);
    }

    Ok(())
}

/// Sends `batch`, polling `cancel` while the bounded channel is full so a
/// downstream shutdown (hit `LIMIT`, write error) can't leave the reader
/// blocked on a `send` that will never be drained.
fn send_batch_or_cancel(batch_tx: &SyncSender<RowBatch>, batch: RowBatch, cancel: &AtomicBool) -> bool {
    let mut batch = batch;
    loop {
        match batch_tx.try_send(batch) {
            Ok(()) => return true,
            Err(TrySendError::Disconnected(_)) => return false,
            Err(TrySendError::Full(b)) => {
                if cancel.load(Ordering::Acquire) {
                    return false;
                }
                batch = b;
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }
}

fn run_worker(ctx: &ScanContext, batch_rx: &Mutex<Receiver<RowBatch>>, result_tx: SyncSender<BatchResult>) {
    loop {
        let batch = {
            let rx = batch_rx.lock().unwrap();
            rx.recv()
        };
        let Ok(batch) = batch else {
            return;
        };

        let rows = batch
            .rows
            .into_iter()
            .filter(|row| match &ctx.predicate {
                Some(expr) => eval(expr, &ctx.header, row),
                None => true,
            })
            .map(|row| {
                ctx.projection
                    .ordinals
                    .iter()
                    .map(|&i| row.get(i).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();

        if result_tx
            .send(BatchResult {
                batch_id: batch.batch_id,
                rows,
            })
            .is_err()
        {
            return;
        }
    }
}

fn drain_results<W: Write>(
    result_rx: Receiver<BatchResult>,
    ctx: &ScanContext,
    config: &EngineConfig,
    cancel: &AtomicBool,
    out: &mut csv::Writer<W>,
) -> EngineResult<u64> {
    let mut next_batch_id = 0u64;
    let mut pending: HashMap<u64, BatchResult> = HashMap::new();
    let mut emitted = 0u64;
    let mut since_flush = 0usize;
    let mut limit_reached = false;
    let mut write_error: Option<EngineError> = None;

    // Keep draining `result_rx` to exhaustion even after a shutdown
    // condition (limit reached, write failure) fires: dropping the
    // receiver early would make every worker's next `result_tx.send`
    // fail, which in turn leaves the reader blocked forever once the
    // channel it writes to fills up. `cancel` tells the reader and
    // workers to stop producing; this loop still empties what they've
    // already produced so nothing wedges.
    for result in result_rx.iter() {
        pending.insert(result.batch_id, result);

        while let Some(batch) = pending.remove(&next_batch_id) {
            if !limit_reached && write_error.is_none() {
                for row in &batch.rows {
                    if ctx.limit.map_or(false, |n| emitted >= n) {
                        limit_reached = true;
                        cancel.store(true, Ordering::Release);
                        break;
                    }
                    if let Err(e) = out.write_record(row.iter().map(|f| f.as_slice())) {
                        write_error = Some(e.into());
                        cancel.store(true, Ordering::Release);
                        break;
                    }
                    emitted += 1;
                    since_flush += 1;
                    if since_flush >= config.flush_every {
                        if let Err(e) = out.flush() {
                            write_error = Some(e.into());
                            cancel.store(true, Ordering::Release);
                            break;
                        }
                        since_flush = 0;
                    }
                }
            }
            next_batch_id += 1;
        }
    }

    if let Some(e) = write_error {
        return Err(e);
    }

    out.flush()?;
    Ok(emitted)
}
