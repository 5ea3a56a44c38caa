//! Packet channel builder
//!
//! Encodes packet descriptions given on the command line into a channel
//! buffer on stdout, ready to be piped into `decode` or a target started
//! with `DESOCK_STDIN_FALLBACK=1`.
//!
//! # Usage
//!
//!   packets CONN:FLAGS:DATA...
//!
//! FLAGS is empty or `s` (the packet ends its round). DATA understands the
//! escapes `\n`, `\r`, `\t`, `\0`, `\\` and `\xNN`.
//!
//!   packets '0::Hello' '1:s:x' '0::World' | decode

use std::io::Write;
use std::process;

use desock::{encode_packets, Packet};

fn unescape(raw: &str) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(raw.len());
    let mut bytes = raw.bytes();

    while let Some(b) = bytes.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match bytes.next() {
            Some(b'n') => out.push(b'\n'),
            Some(b'r') => out.push(b'\r'),
            Some(b't') => out.push(b'\t'),
            Some(b'0') => out.push(0),
            Some(b'\\') => out.push(b'\\'),
            Some(b'x') => {
                let hex: Vec<u8> = bytes.by_ref().take(2).collect();
                let value = std::str::from_utf8(&hex)
                    .ok()
                    .filter(|h| h.len() == 2)
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| format!("bad \\x escape in {:?}", raw))?;
                out.push(value);
            }
            Some(other) => return Err(format!("unknown escape \\{} in {:?}", other as char, raw)),
            None => return Err(format!("trailing backslash in {:?}", raw)),
        }
    }
    Ok(out)
}

fn parse_packet(arg: &str) -> Result<Packet, String> {
    let mut parts = arg.splitn(3, ':');
    let (Some(conn), Some(flags), Some(data)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(format!("expected CONN:FLAGS:DATA, got {:?}", arg));
    };

    let conn: u32 = conn.parse().map_err(|_| format!("bad connection id {:?}", conn))?;
    let mut packet = Packet::new(conn, unescape(data)?);
    for flag in flags.chars() {
        match flag {
            's' => packet = packet.ending_round(),
            other => return Err(format!("unknown flag {:?} in {:?}", other, arg)),
        }
    }
    Ok(packet)
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || args.iter().any(|a| a == "-h" || a == "--help") {
        eprintln!("usage: packets CONN:FLAGS:DATA...");
        process::exit(2);
    }

    let packets = match args.iter().map(|a| parse_packet(a)).collect::<Result<Vec<_>, _>>() {
        Ok(packets) => packets,
        Err(e) => {
            eprintln!("packets: {}", e);
            process::exit(2);
        }
    };

    let stream = encode_packets(&packets);
    let mut stdout = std::io::stdout().lock();
    if let Err(e) = stdout.write_all(&stream).and_then(|_| stdout.flush()) {
        eprintln!("packets: {}", e);
        process::exit(1);
    }
}
