#![no_main]
use desock_core::Decoder;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let conns = usize::from(data[0] % 8) + 1;
    let chunk = usize::from(data[1]) + 1;
    let stream = &data[2..];

    let Ok(mut decoder) = Decoder::with_channel(conns, stream) else {
        return;
    };

    let mut buf = vec![0u8; chunk];
    let mut delivered = 0;
    // Every pass moves some cursor; a well-formed stream drains long before this
    for _ in 0..stream.len() * 4 + 64 {
        if decoder.is_end_of_stream() || decoder.recompute_readiness().is_err() {
            break;
        }
        let ready: Vec<usize> = decoder.readiness().iter().collect();
        assert!(ready.iter().all(|&conn| conn < conns));

        for conn in ready {
            match decoder.read(conn, &mut buf) {
                Ok(n) => delivered += n,
                Err(_) => return,
            }
        }
        assert!(delivered <= stream.len());
    }
});
