// Two chained transfer pipelines over differently sized rings: the first
// scales every payload byte up, the second scales it back down, and the
// sink checks that the round trip is lossless.

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use ringio::pipeline::{recv_transfer, send_transfer, TransferPipeline};
use ringio::{NotifyMode, RingBuilder};

const SCALE: u8 = 3;
// Multiplicative inverse of SCALE mod 256; undoes the first stage exactly.
const INV_SCALE: u8 = 171;
const TRANSFER_LEN: usize = 4096;
const QUANTUM: usize = 1024;

fn main() -> Result<(), ringio::Error> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <num_transfers>", args[0]);
        std::process::exit(1);
    }
    let num_transfers: usize = args[1].parse().expect("Invalid number of transfers");

    let (mut src_w, src_r) = RingBuilder::new().capacity(16 * 1024).build()?;
    let (scaled_w, scaled_r) = RingBuilder::new().capacity(8 * 1024).build()?;
    let (out_w, mut out_r) = RingBuilder::new().capacity(16 * 1024).build()?;

    let running = Arc::new(AtomicBool::new(true));
    let running_for_handler = Arc::clone(&running);
    ctrlc::set_handler(move || {
        running_for_handler.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    let scale = thread::spawn(move || {
        let mut p = TransferPipeline::new(src_r, scaled_w, QUANTUM, |buf: &mut [u8]| {
            for b in buf.iter_mut() {
                *b = b.wrapping_mul(SCALE);
            }
        })?;
        p.run()?;
        p.shutdown()
    });

    let unscale = thread::spawn(move || {
        let mut p = TransferPipeline::new(scaled_r, out_w, QUANTUM, |buf: &mut [u8]| {
            for b in buf.iter_mut() {
                *b = b.wrapping_mul(INV_SCALE);
            }
        })?;
        p.run()?;
        p.shutdown()
    });

    let sink = thread::spawn(move || -> Result<usize, ringio::Error> {
        out_r.register_notifier(0, NotifyMode::Persistent)?;
        let mut verified = 0usize;
        while let Some(got) = recv_transfer(&mut out_r, QUANTUM, None)? {
            let ok = got
                .iter()
                .enumerate()
                .all(|(i, &b)| b == (i + verified) as u8);
            if !ok {
                eprintln!("Sink: transfer {} corrupted", verified);
            }
            verified += 1;
            if verified % 100 == 0 {
                println!("Sink: verified {} transfers", verified);
            }
        }
        Ok(verified)
    });

    println!(
        "Source: sending {} transfers of {} bytes (Ctrl+C to stop early)...",
        num_transfers, TRANSFER_LEN
    );
    src_w.register_notifier(0, NotifyMode::Persistent)?;
    let start = Instant::now();
    let mut sent = 0usize;
    while sent < num_transfers && running.load(Ordering::SeqCst) {
        let data: Vec<u8> = (0..TRANSFER_LEN).map(|i| (i + sent) as u8).collect();
        send_transfer(&mut src_w, &data, QUANTUM, None)?;
        sent += 1;
    }
    src_w.close(None)?;

    scale.join().expect("scale pipeline panicked")?;
    unscale.join().expect("unscale pipeline panicked")?;
    let verified = sink.join().expect("sink panicked")?;

    let elapsed = start.elapsed();
    println!(
        "Done: {} sent, {} verified in {:.2?} ({:.2} MiB/s)",
        sent,
        verified,
        elapsed,
        (sent * TRANSFER_LEN) as f64 / (1024.0 * 1024.0) / elapsed.as_secs_f64()
    );
    Ok(())
}
