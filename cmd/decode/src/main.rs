//! Packet channel replay
//!
//! Reads a packet channel from stdin and drives the decoder the way readiness
//! emulation does: recompute readiness, then read up to CHUNK bytes from every
//! ready connection, until every connection sits on End.
//!
//! # Usage
//!
//!   decode [CHUNK] [--bench] [--conns N]
//!
//! Without `--bench`, each readiness pass prints one line of
//! `(conn) "data"` and `(EOF conn)` entries. With `--bench`, only the total
//! number of bytes delivered and the elapsed time are printed.
//!
//! # Environment Variables
//!
//! - `DESOCK_MAX_CONNS=<n>` - Default for `--conns`
//! - `DESOCK_LOG_LEVEL=trace` - Log round transitions

use std::io::{Read, Write};
use std::process;
use std::time::{Duration, Instant};

use desock::{escape_payload, DecodeResult, Decoder, DesockConfig};

#[derive(Debug, PartialEq, Eq)]
struct Options {
    chunk: usize,
    bench: bool,
    conns: usize,
}

fn parse_args(args: &[String], default_conns: usize) -> Result<Options, String> {
    let mut opts = Options { chunk: 1, bench: false, conns: default_conns };
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--bench" => opts.bench = true,
            "--conns" => {
                let raw = iter.next().ok_or("--conns needs a value")?;
                opts.conns = raw.parse().map_err(|_| format!("bad connection count {:?}", raw))?;
            }
            raw => opts.chunk = raw.parse().map_err(|_| format!("bad chunk size {:?}", raw))?,
        }
    }

    if opts.chunk == 0 {
        return Err("chunk size must be > 0".into());
    }
    if opts.conns == 0 {
        return Err("connection count must be > 0".into());
    }
    Ok(opts)
}

/// One readiness pass: read once from every ready connection
fn pass<B: AsRef<[u8]>>(
    decoder: &mut Decoder<B>,
    buf: &mut [u8],
    mut each: impl FnMut(usize, &[u8]),
) -> DecodeResult<usize> {
    decoder.recompute_readiness()?;
    let ready: Vec<usize> = decoder.readiness().iter().collect();

    let mut total = 0;
    for conn in ready {
        let n = decoder.read(conn, buf)?;
        each(conn, &buf[..n]);
        total += n;
    }
    Ok(total)
}

fn dump<B: AsRef<[u8]>, W: Write>(decoder: &mut Decoder<B>, chunk: usize, out: &mut W) -> DecodeResult<()> {
    let mut buf = vec![0u8; chunk];
    while !decoder.is_end_of_stream() {
        let mut line = String::new();
        pass(decoder, &mut buf, |conn, data| {
            if data.is_empty() {
                line.push_str(&format!("(EOF {}) ", conn));
            } else {
                line.push_str(&format!("({}) \"{}\" ", conn, escape_payload(data)));
            }
        })?;
        let _ = writeln!(out, "{}", line);
    }
    Ok(())
}

fn bench<B: AsRef<[u8]>>(decoder: &mut Decoder<B>, chunk: usize) -> DecodeResult<(usize, Duration)> {
    let mut buf = vec![0u8; chunk];
    let mut total = 0;
    let start = Instant::now();
    while !decoder.is_end_of_stream() {
        total += pass(decoder, &mut buf, |_, _| {})?;
    }
    Ok((total, start.elapsed()))
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let opts = match parse_args(&args, DesockConfig::from_env().max_conns) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("decode: {}", e);
            eprintln!("usage: decode [CHUNK] [--bench] [--conns N]");
            process::exit(2);
        }
    };

    let mut stream = Vec::new();
    if let Err(e) = std::io::stdin().lock().read_to_end(&mut stream) {
        eprintln!("decode: reading stdin: {}", e);
        process::exit(1);
    }

    let result = Decoder::with_channel(opts.conns, stream).and_then(|mut decoder| {
        if opts.bench {
            let (total, elapsed) = bench(&mut decoder, opts.chunk)?;
            println!("Received {} bytes in {:?}", total, elapsed);
            Ok(())
        } else {
            dump(&mut decoder, opts.chunk, &mut std::io::stdout().lock())
        }
    });

    if let Err(e) = result {
        eprintln!("decode: {}", e);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use desock::StreamBuilder;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        assert_eq!(
            parse_args(&args(&["4", "--bench", "--conns", "2"]), 8).unwrap(),
            Options { chunk: 4, bench: true, conns: 2 }
        );
        assert_eq!(parse_args(&[], 8).unwrap(), Options { chunk: 1, bench: false, conns: 8 });
        assert!(parse_args(&args(&["0"]), 8).is_err());
        assert!(parse_args(&args(&["--conns"]), 8).is_err());
        assert!(parse_args(&args(&["big"]), 8).is_err());
    }

    #[test]
    fn test_dump_transcript() {
        let stream = StreamBuilder::new()
            .data(0, b"Hello")
            .separator()
            .data(1, b"x")
            .separator()
            .data(0, b"World")
            .finish();
        let mut decoder = Decoder::with_channel(2, stream).unwrap();
        let mut out = Vec::new();
        dump(&mut decoder, 16, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("(0) \"Hello\" \n"));
        assert!(text.contains("(1) \"x\" "));
        assert!(text.contains("(0) \"World\" "));
    }

    #[test]
    fn test_bench_counts_bytes() {
        let stream = StreamBuilder::new().data(0, b"abcd").data(1, b"ef").finish();
        let mut decoder = Decoder::with_channel(2, stream).unwrap();
        let (total, _) = bench(&mut decoder, 3).unwrap();
        assert_eq!(total, 6);
    }
}
